//! Fixtures shared by the unit tests.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, IntoActiveModel,
};

use crate::db::entities::prelude::{Device, Plan, PlanEntity, Subscriber, SubscriberEntity};
use crate::db::enums::{ConnectionMethod, DeviceKind, SubscriberStatus};
use crate::db::schema::ensure_schema;

/// In-memory SQLite with the full schema. One connection, so every query sees the same database.
pub async fn memory_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    ensure_schema(&db).await.unwrap();
    db
}

/// Persists a fixture row as-is, id included.
pub async fn insert_plan(db: &DatabaseConnection, plan: Plan) {
    PlanEntity::insert(plan.into_active_model().reset_all())
        .exec(db)
        .await
        .unwrap();
}

pub async fn insert_subscriber(db: &DatabaseConnection, subscriber: Subscriber) {
    SubscriberEntity::insert(subscriber.into_active_model().reset_all())
        .exec(db)
        .await
        .unwrap();
}

pub fn router_device(id: i32, ip: &str, port: Option<u16>) -> Device {
    let now = Utc::now();
    Device {
        id,
        name: format!("router-{id}"),
        kind: DeviceKind::Router,
        sub_type: Some("mikrotik".to_string()),
        ip_address: Some(ip.to_string()),
        username: Some("admin".to_string()),
        password: Some("secret".to_string()),
        port: port.map(i32::from),
        connection_method: ConnectionMethod::Api,
        radius_enabled: true,
        radius_secret: Some("nas-secret".to_string()),
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn olt_device(id: i32, vendor: &str) -> Device {
    Device {
        name: format!("olt-{id}"),
        kind: DeviceKind::Olt,
        sub_type: Some(vendor.to_string()),
        ip_address: Some(format!("192.0.2.{id}")),
        radius_enabled: false,
        radius_secret: None,
        connection_method: ConnectionMethod::Ping,
        ..router_device(id, "192.0.2.1", None)
    }
}

pub fn subscriber(id: i32, login: Option<&str>) -> Subscriber {
    let now = Utc::now();
    Subscriber {
        id,
        name: format!("customer-{id}"),
        login: login.map(str::to_string),
        password: Some("pw".to_string()),
        plan_id: Some(1),
        router_id: Some(1),
        olt_id: None,
        olt_port: None,
        onu_serial: None,
        status: SubscriberStatus::Active,
        usage_bytes: 0,
        fup_active: false,
        created_at: now,
        updated_at: now,
    }
}

pub fn plan(id: i32) -> Plan {
    let now = Utc::now();
    Plan {
        id,
        name: "Home 20M".to_string(),
        rate_limit: "20M/20M".to_string(),
        fup_threshold_gb: Some(100),
        fup_rate_limit: Some("5M/5M".to_string()),
        radius_profile: Some("home-20m".to_string()),
        created_at: now,
        updated_at: now,
    }
}
