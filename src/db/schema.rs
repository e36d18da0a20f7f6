//! Table bootstrap for development databases and tests.
//!
//! The RADIUS upserts depend on the unique indexes created here; a production
//! FreeRADIUS schema must carry the same ones.

use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Schema};
use tracing::info;

use crate::db::entities::{device, nas, plan, radcheck, radreply, radusergroup, setting, subscriber};

async fn create_table<C, E>(db: &C, schema: &Schema, entity: E) -> Result<(), DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let backend = db.get_database_backend();
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}

fn unique_username_attribute<E: EntityTrait>(
    name: &str,
    entity: E,
    username: E::Column,
    attribute: E::Column,
) -> IndexCreateStatement {
    Index::create()
        .if_not_exists()
        .name(name)
        .table(entity)
        .col(username)
        .col(attribute)
        .unique()
        .to_owned()
}

/// Creates every table this crate touches, if absent, plus the RADIUS unique indexes.
pub async fn ensure_schema<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    create_table(db, &schema, plan::Entity).await?;
    create_table(db, &schema, device::Entity).await?;
    create_table(db, &schema, subscriber::Entity).await?;
    create_table(db, &schema, setting::Entity).await?;
    create_table(db, &schema, radcheck::Entity).await?;
    create_table(db, &schema, radreply::Entity).await?;
    create_table(db, &schema, radusergroup::Entity).await?;
    create_table(db, &schema, nas::Entity).await?;

    let indexes = [
        unique_username_attribute(
            "radcheck_username_attribute_idx",
            radcheck::Entity,
            radcheck::Column::Username,
            radcheck::Column::Attribute,
        ),
        unique_username_attribute(
            "radreply_username_attribute_idx",
            radreply::Entity,
            radreply::Column::Username,
            radreply::Column::Attribute,
        ),
    ];
    for index in &indexes {
        db.execute(backend.build(index)).await?;
    }

    info!("Database schema ensured.");
    Ok(())
}
