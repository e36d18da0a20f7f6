//! FreeRADIUS row synchronization and Change-of-Authorization disconnects.

pub mod coa;
pub mod synchronizer;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use coa::{CoaClient, CoaError, DisconnectRequest, DisconnectService, RadclientCoa};
pub use synchronizer::RadiusSynchronizer;

pub const PASSWORD_ATTRIBUTE: &str = "Cleartext-Password";

#[derive(Error, Debug)]
pub enum RadiusError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Device {0} has no IP address to register as a NAS")]
    MissingNasAddress(i32),
}

/// One `radcheck`/`radreply` row without its username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadiusAttribute {
    pub name: String,
    pub op: String,
    pub value: String,
}

impl RadiusAttribute {
    pub fn new(name: impl Into<String>, op: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op: op.into(),
            value: value.into(),
        }
    }

    /// A check item, compared with `:=`.
    pub fn check(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, ":=", value)
    }

    /// A reply item, sent with `=`.
    pub fn reply(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, "=", value)
    }
}
