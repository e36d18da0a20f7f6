//! SeaORM Entity Crate
//!
//! Application tables (`devices`, `subscribers`, `plans`, `settings`) and the
//! FreeRADIUS tables this crate writes (`radcheck`, `radreply`, `radusergroup`, `nas`).

pub mod device;
pub mod nas;
pub mod plan;
pub mod radcheck;
pub mod radreply;
pub mod radusergroup;
pub mod setting;
pub mod subscriber;

// Prelude module for easy importing of all entities and their related types
pub mod prelude {
    pub use super::device::ActiveModel as DeviceActiveModel;
    pub use super::device::Column as DeviceColumn;
    pub use super::device::Entity as DeviceEntity;
    pub use super::device::Model as Device;

    pub use super::subscriber::ActiveModel as SubscriberActiveModel;
    pub use super::subscriber::Column as SubscriberColumn;
    pub use super::subscriber::Entity as SubscriberEntity;
    pub use super::subscriber::Model as Subscriber;

    pub use super::plan::ActiveModel as PlanActiveModel;
    pub use super::plan::Column as PlanColumn;
    pub use super::plan::Entity as PlanEntity;
    pub use super::plan::Model as Plan;

    pub use super::setting::Entity as Setting;
    pub use super::setting::Model as SettingModel;

    pub use super::radcheck::Entity as RadCheck;
    pub use super::radreply::Entity as RadReply;
    pub use super::radusergroup::Entity as RadUserGroup;
    pub use super::nas::Entity as Nas;
    pub use super::nas::Model as NasModel;
}
