use chrono::Utc;
use sea_orm::sea_query::Func;
use sea_orm::{
    prelude::Expr, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
};

use crate::db::entities::{plan, subscriber};
use crate::db::enums::SubscriberStatus;

// --- Subscriber Service Functions ---

pub async fn get_subscriber<C: ConnectionTrait>(
    db: &C,
    subscriber_id: i32,
) -> Result<Option<subscriber::Model>, DbErr> {
    subscriber::Entity::find_by_id(subscriber_id).one(db).await
}

pub async fn get_plan<C: ConnectionTrait>(
    db: &C,
    plan_id: i32,
) -> Result<Option<plan::Model>, DbErr> {
    plan::Entity::find_by_id(plan_id).one(db).await
}

/// Finds a subscriber pre-registered on `olt_id` with the given ONU serial
/// that has not been brought online yet. Serials compare case-insensitively.
pub async fn find_pending_by_serial<C: ConnectionTrait>(
    db: &C,
    olt_id: i32,
    serial: &str,
) -> Result<Option<subscriber::Model>, DbErr> {
    subscriber::Entity::find()
        .filter(subscriber::Column::OltId.eq(olt_id))
        .filter(
            Expr::expr(Func::upper(Expr::col(subscriber::Column::OnuSerial)))
                .eq(serial.trim().to_ascii_uppercase()),
        )
        .filter(subscriber::Column::Status.eq(SubscriberStatus::Inactive))
        .order_by_asc(subscriber::Column::Id)
        .one(db)
        .await
}

pub async fn update_status<C: ConnectionTrait>(
    db: &C,
    subscriber_id: i32,
    status: SubscriberStatus,
) -> Result<u64, DbErr> {
    let result = subscriber::Entity::update_many()
        .col_expr(subscriber::Column::Status, Expr::value(status))
        .col_expr(subscriber::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(subscriber::Column::Id.eq(subscriber_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

pub async fn set_fup_active<C: ConnectionTrait>(
    db: &C,
    subscriber_id: i32,
    active: bool,
) -> Result<u64, DbErr> {
    let result = subscriber::Entity::update_many()
        .col_expr(subscriber::Column::FupActive, Expr::value(active))
        .col_expr(subscriber::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(subscriber::Column::Id.eq(subscriber_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Adds to the usage counter in a single UPDATE and returns the new total.
pub async fn add_usage<C: ConnectionTrait>(
    db: &C,
    subscriber_id: i32,
    bytes: i64,
) -> Result<Option<i64>, DbErr> {
    subscriber::Entity::update_many()
        .col_expr(
            subscriber::Column::UsageBytes,
            Expr::col(subscriber::Column::UsageBytes).add(bytes),
        )
        .col_expr(subscriber::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(subscriber::Column::Id.eq(subscriber_id))
        .exec(db)
        .await?;
    Ok(get_subscriber(db, subscriber_id).await?.map(|s| s.usage_bytes))
}

pub async fn reset_usage<C: ConnectionTrait>(db: &C, subscriber_id: i32) -> Result<u64, DbErr> {
    let result = subscriber::Entity::update_many()
        .col_expr(subscriber::Column::UsageBytes, Expr::value(0i64))
        .col_expr(subscriber::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(subscriber::Column::Id.eq(subscriber_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Active subscribers whose plan carries a FUP threshold.
pub async fn list_fup_candidates<C: ConnectionTrait>(
    db: &C,
) -> Result<Vec<subscriber::Model>, DbErr> {
    let plan_ids: Vec<i32> = plan::Entity::find()
        .filter(plan::Column::FupThresholdGb.gt(0))
        .all(db)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();
    if plan_ids.is_empty() {
        return Ok(Vec::new());
    }
    subscriber::Entity::find()
        .filter(subscriber::Column::Status.eq(SubscriberStatus::Active))
        .filter(subscriber::Column::PlanId.is_in(plan_ids))
        .order_by_asc(subscriber::Column::Id)
        .all(db)
        .await
}
