use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Isolate,
    Restore,
    Provision,
    EnforceFup,
    ResetFup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    OnuRegistration,
    RadiusSync,
    GroupAssignment,
    AddressListPush,
    AddressListRemoval,
    CoaDisconnect,
    FupFlag,
    UsageReset,
    StatusUpdate,
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowStep::OnuRegistration => "onu_registration",
            WorkflowStep::RadiusSync => "radius_sync",
            WorkflowStep::GroupAssignment => "group_assignment",
            WorkflowStep::AddressListPush => "address_list_push",
            WorkflowStep::AddressListRemoval => "address_list_removal",
            WorkflowStep::CoaDisconnect => "coa_disconnect",
            WorkflowStep::FupFlag => "fup_flag",
            WorkflowStep::UsageReset => "usage_reset",
            WorkflowStep::StatusUpdate => "status_update",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub step: WorkflowStep,
    pub status: StepStatus,
}

/// What each step of a multi-system workflow did.
///
/// Steps run independently; a report with failed steps is still a completed
/// workflow. Callers re-query state when they need convergence guarantees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowReport {
    pub kind: WorkflowKind,
    pub subject: String,
    pub steps: Vec<StepOutcome>,
}

impl WorkflowReport {
    pub fn new(kind: WorkflowKind, subject: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            steps: Vec::new(),
        }
    }

    /// Records and logs one step.
    pub fn record(&mut self, step: WorkflowStep, status: StepStatus) {
        match &status {
            StepStatus::Succeeded => {
                info!(workflow = ?self.kind, subject = %self.subject, step = %step, "Workflow step succeeded.");
            }
            StepStatus::Failed(reason) => {
                warn!(workflow = ?self.kind, subject = %self.subject, step = %step, reason = %reason, "Workflow step failed.");
            }
            StepStatus::Skipped(reason) => {
                info!(workflow = ?self.kind, subject = %self.subject, step = %step, reason = %reason, "Workflow step skipped.");
            }
        }
        self.steps.push(StepOutcome { step, status });
    }

    /// Records `Succeeded` when `ok`, otherwise `Failed(reason)`.
    pub fn record_result(&mut self, step: WorkflowStep, ok: bool, reason: &str) {
        let status = if ok {
            StepStatus::Succeeded
        } else {
            StepStatus::Failed(reason.to_string())
        };
        self.record(step, status);
    }

    pub fn status(&self, step: WorkflowStep) -> Option<&StepStatus> {
        self.steps.iter().find(|o| o.step == step).map(|o| &o.status)
    }

    pub fn succeeded(&self, step: WorkflowStep) -> bool {
        self.status(step) == Some(&StepStatus::Succeeded)
    }

    pub fn failed_steps(&self) -> Vec<WorkflowStep> {
        self.steps
            .iter()
            .filter(|o| matches!(o.status, StepStatus::Failed(_)))
            .map(|o| o.step)
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failed_steps().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_failures_per_step() {
        let mut report = WorkflowReport::new(WorkflowKind::Isolate, "alice");
        report.record(WorkflowStep::RadiusSync, StepStatus::Succeeded);
        report.record_result(WorkflowStep::CoaDisconnect, false, "no ack");
        report.record(WorkflowStep::AddressListPush, StepStatus::Skipped("offline".into()));

        assert!(report.succeeded(WorkflowStep::RadiusSync));
        assert!(!report.succeeded(WorkflowStep::AddressListPush));
        assert_eq!(report.failed_steps(), vec![WorkflowStep::CoaDisconnect]);
        assert!(!report.is_clean());
        assert_eq!(report.status(WorkflowStep::StatusUpdate), None);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["steps"][1]["status"]["status"], "failed");
        assert_eq!(json["steps"][1]["status"]["reason"], "no ack");
    }
}
