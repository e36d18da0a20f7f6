//! Fair-usage throttling: usage accounting, threshold enforcement and the
//! billing-cycle reset.

use tracing::{info, warn};

use super::WorkflowError;
use super::report::{StepStatus, WorkflowKind, WorkflowReport, WorkflowStep};
use super::subscriber::{SubscriberOrchestrator, effective_rate_limit};
use super::RATE_LIMIT_ATTRIBUTE;
use crate::db::entities::prelude::{Plan, Subscriber};
use crate::db::enums::SubscriberStatus;
use crate::radius::RadiusAttribute;

impl SubscriberOrchestrator {
    /// Adds `bytes` to the usage counter and throttles the subscriber when the
    /// new total crosses the plan threshold.
    pub async fn record_usage(
        &self,
        subscriber_id: i32,
        bytes: i64,
    ) -> Result<Option<WorkflowReport>, WorkflowError> {
        let total = self.subscribers().add_usage(subscriber_id, bytes).await?;
        info!(subscriber_id = subscriber_id, usage_bytes = total, "Usage recorded.");
        match self.enforce_fup(subscriber_id).await {
            Ok(report) => Ok(report),
            // Usage without a login or plan is still accounted.
            Err(WorkflowError::NoLoginIdentity(_) | WorkflowError::NoPlan(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Throttles a subscriber whose usage reached the plan threshold.
    ///
    /// Returns `None` when the plan has no threshold, usage is below it, or
    /// the throttle is already active.
    pub async fn enforce_fup(&self, subscriber_id: i32) -> Result<Option<WorkflowReport>, WorkflowError> {
        let (subscriber, login) = self.load(subscriber_id).await?;
        let plan = self
            .plan_of(&subscriber)
            .await
            .ok_or(WorkflowError::NoPlan(subscriber_id))?;
        if subscriber.fup_active || !over_threshold(&subscriber, &plan) {
            return Ok(None);
        }

        let mut report = WorkflowReport::new(WorkflowKind::EnforceFup, login.as_str());
        let synced = self
            .apply_plan_rate(&mut report, &subscriber, &login, &plan, true)
            .await;

        let flagged = match self.subscribers().set_fup_active(subscriber.id, true).await {
            Ok(()) => StepStatus::Succeeded,
            Err(e) => StepStatus::Failed(e.to_string()),
        };
        report.record(WorkflowStep::FupFlag, flagged);

        if synced {
            self.disconnect_step(&mut report, &subscriber).await;
        } else {
            report.record(
                WorkflowStep::CoaDisconnect,
                StepStatus::Skipped("rate limit unchanged".to_string()),
            );
        }
        info!(subscriber_id = subscriber.id, username = %login, usage_bytes = subscriber.usage_bytes, "Fair-usage throttle applied.");
        Ok(Some(report))
    }

    /// Zeroes the usage counter and lifts an active throttle.
    pub async fn reset_fup(&self, subscriber_id: i32) -> Result<WorkflowReport, WorkflowError> {
        let (subscriber, login) = self.load(subscriber_id).await?;
        let mut report = WorkflowReport::new(WorkflowKind::ResetFup, login.as_str());

        let reset = match self.subscribers().reset_usage(subscriber.id).await {
            Ok(()) => StepStatus::Succeeded,
            Err(e) => StepStatus::Failed(e.to_string()),
        };
        report.record(WorkflowStep::UsageReset, reset);

        if !subscriber.fup_active {
            for step in [WorkflowStep::RadiusSync, WorkflowStep::FupFlag, WorkflowStep::CoaDisconnect] {
                report.record(step, StepStatus::Skipped("throttle not active".to_string()));
            }
            return Ok(report);
        }

        let synced = match self.plan_of(&subscriber).await {
            Some(plan) => {
                self.apply_plan_rate(&mut report, &subscriber, &login, &plan, false)
                    .await
            }
            None => {
                report.record(WorkflowStep::RadiusSync, StepStatus::Failed("no plan".to_string()));
                false
            }
        };

        let cleared = match self.subscribers().set_fup_active(subscriber.id, false).await {
            Ok(()) => StepStatus::Succeeded,
            Err(e) => StepStatus::Failed(e.to_string()),
        };
        report.record(WorkflowStep::FupFlag, cleared);

        if synced {
            self.disconnect_step(&mut report, &subscriber).await;
        } else {
            report.record(
                WorkflowStep::CoaDisconnect,
                StepStatus::Skipped("rate limit unchanged".to_string()),
            );
        }
        Ok(report)
    }

    /// One enforcement pass over every throttling candidate. Returns how many
    /// subscribers were throttled.
    pub async fn run_fup_check(&self) -> Result<usize, WorkflowError> {
        let candidates = self.subscribers().list_fup_candidates().await?;
        let mut throttled = 0;
        for candidate in &candidates {
            match self.enforce_fup(candidate.id).await {
                Ok(Some(_)) => throttled += 1,
                Ok(None) => {}
                Err(e) => {
                    warn!(subscriber_id = candidate.id, error = %e, "Fair-usage check skipped subscriber.");
                }
            }
        }
        info!(candidates = candidates.len(), throttled = throttled, "Fair-usage check finished.");
        Ok(throttled)
    }

    /// Writes the plan rate (throttled or normal). A suspended subscriber
    /// keeps the isolation rate, so the write is skipped.
    async fn apply_plan_rate(
        &self,
        report: &mut WorkflowReport,
        subscriber: &Subscriber,
        login: &str,
        plan: &Plan,
        throttled: bool,
    ) -> bool {
        if subscriber.status == SubscriberStatus::Suspended {
            report.record(
                WorkflowStep::RadiusSync,
                StepStatus::Skipped("subscriber suspended".to_string()),
            );
            return false;
        }
        let reply = [RadiusAttribute::reply(
            RATE_LIMIT_ATTRIBUTE,
            effective_rate_limit(plan, throttled),
        )];
        let check = self.check_items().await;
        let synced = self
            .radius()
            .sync_user(login, subscriber.password.as_deref(), &reply, &check)
            .await;
        report.record_result(WorkflowStep::RadiusSync, synced, "rate limit not written");
        synced
    }
}

fn over_threshold(subscriber: &Subscriber, plan: &Plan) -> bool {
    plan.fup_threshold_bytes()
        .is_some_and(|limit| subscriber.usage_bytes >= limit)
}
