pub mod entities;
pub mod enums;
pub mod repository;
pub mod schema;
pub mod services;

pub use repository::{
    DbStore, DeviceRegistry, RepositoryError, Settings, SettingsStore, SubscriberRepository,
};
