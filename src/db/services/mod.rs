//! Data access for the tables this crate reads and the collaborator traits
//! (`DeviceRegistry`, `SubscriberRepository`, `SettingsStore`) built on them.
//!
//! The free functions take any `ConnectionTrait`, so the same code runs on a
//! pooled connection or inside a transaction.

pub mod device_service;
pub mod settings_service;
pub mod subscriber_service;

pub use device_service::*;
pub use settings_service::*;
pub use subscriber_service::*;
