//! Multi-system workflows over RADIUS rows, live router state and the
//! subscriber/device repository.

pub mod device;
pub mod fup;
pub mod report;
pub mod subscriber;
pub mod ztp;

use thiserror::Error;

use crate::db::RepositoryError;

pub use device::{DeviceChanges, DeviceProvisioner, NewDevice, ProvisionError};
pub use report::{StepOutcome, StepStatus, WorkflowKind, WorkflowReport, WorkflowStep};
pub use subscriber::SubscriberOrchestrator;
pub use ztp::{DriverFactory, SweepSummary, VendorDriverFactory, ZtpSweeper};

/// Preconditions that stop a workflow before any step runs.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Subscriber {0} not found")]
    SubscriberNotFound(i32),
    #[error("Subscriber {0} has no login identity")]
    NoLoginIdentity(i32),
    #[error("Subscriber {0} has no plan")]
    NoPlan(i32),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

// RADIUS attribute names written by the workflows.
pub(crate) const RATE_LIMIT_ATTRIBUTE: &str = "Mikrotik-Rate-Limit";
pub(crate) const ADDRESS_LIST_ATTRIBUTE: &str = "Mikrotik-Address-List";
pub(crate) const SIMULTANEOUS_USE_ATTRIBUTE: &str = "Simultaneous-Use";
