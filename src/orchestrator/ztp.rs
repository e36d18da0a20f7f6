//! Zero-touch provisioning: find unconfigured ONUs on every active OLT and
//! hand matched ones to the provisioning workflow.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::WorkflowError;
use super::report::WorkflowStep;
use super::subscriber::SubscriberOrchestrator;
use crate::db::DeviceRegistry;
use crate::db::entities::prelude::Device;
use crate::db::enums::DeviceKind;
use crate::drivers::{DiscoveredOnu, DriverError, OltDriver, resolve_driver};
use crate::notifications::NotificationSink;

/// Builds the driver for one OLT.
pub trait DriverFactory: Send + Sync {
    fn resolve(&self, device: &Device) -> Result<Box<dyn OltDriver>, DriverError>;
}

/// Resolves drivers from the device vendor tag.
#[derive(Debug, Clone)]
pub struct VendorDriverFactory {
    timeout: Duration,
}

impl VendorDriverFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl DriverFactory for VendorDriverFactory {
    fn resolve(&self, device: &Device) -> Result<Box<dyn OltDriver>, DriverError> {
        resolve_driver(device, self.timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedOnu {
    pub olt_id: i32,
    pub olt_name: String,
    pub serial: String,
    pub interface: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub devices_scanned: usize,
    /// Unsupported vendor tag.
    pub devices_skipped: usize,
    pub devices_unreachable: usize,
    pub discovered: usize,
    pub matched: usize,
    pub provisioned: usize,
    pub unmatched: Vec<UnmatchedOnu>,
}

#[derive(Debug, Default)]
struct DeviceSweep {
    skipped: bool,
    unreachable: bool,
    discovered: usize,
    matched: usize,
    provisioned: usize,
    unmatched: Vec<UnmatchedOnu>,
}

pub struct ZtpSweeper {
    devices: Arc<dyn DeviceRegistry>,
    orchestrator: SubscriberOrchestrator,
    drivers: Arc<dyn DriverFactory>,
    notifier: Arc<dyn NotificationSink>,
    concurrency: usize,
}

impl ZtpSweeper {
    pub fn new(
        devices: Arc<dyn DeviceRegistry>,
        orchestrator: SubscriberOrchestrator,
        drivers: Arc<dyn DriverFactory>,
        notifier: Arc<dyn NotificationSink>,
        concurrency: usize,
    ) -> Self {
        Self {
            devices,
            orchestrator,
            drivers,
            notifier,
            concurrency: concurrency.max(1),
        }
    }

    /// One pass over every active OLT, `concurrency` devices at a time.
    ///
    /// Per-device failures are counted, never fatal; only listing the OLTs
    /// can fail the sweep.
    pub async fn sweep(&self) -> Result<SweepSummary, WorkflowError> {
        let olts = self.devices.list_by_kind(DeviceKind::Olt).await?;
        let results: Vec<DeviceSweep> = stream::iter(olts.iter())
            .map(|olt| self.sweep_device(olt))
            .boxed()
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut summary = SweepSummary {
            devices_scanned: olts.len(),
            ..Default::default()
        };
        for result in results {
            summary.devices_skipped += usize::from(result.skipped);
            summary.devices_unreachable += usize::from(result.unreachable);
            summary.discovered += result.discovered;
            summary.matched += result.matched;
            summary.provisioned += result.provisioned;
            summary.unmatched.extend(result.unmatched);
        }
        summary.unmatched.sort_by(|a, b| (a.olt_id, &a.serial).cmp(&(b.olt_id, &b.serial)));

        if !summary.unmatched.is_empty() {
            self.notify_unmatched(&summary.unmatched).await;
        }
        info!(
            scanned = summary.devices_scanned,
            skipped = summary.devices_skipped,
            unreachable = summary.devices_unreachable,
            discovered = summary.discovered,
            matched = summary.matched,
            provisioned = summary.provisioned,
            unmatched = summary.unmatched.len(),
            "ZTP sweep finished."
        );
        Ok(summary)
    }

    async fn sweep_device(&self, olt: &Device) -> DeviceSweep {
        let mut driver = match self.drivers.resolve(olt) {
            Ok(driver) => driver,
            Err(e) => {
                warn!(device_id = olt.id, vendor = %olt.vendor_tag(), error = %e, "Skipping OLT in ZTP sweep.");
                return DeviceSweep {
                    skipped: true,
                    ..Default::default()
                };
            }
        };
        if !driver.connect().await {
            warn!(device_id = olt.id, "OLT unreachable during ZTP sweep.");
            return DeviceSweep {
                unreachable: true,
                ..Default::default()
            };
        }

        let discovered = driver.discover_unconfigured_onus().await;
        debug!(device_id = olt.id, count = discovered.len(), "Unconfigured ONUs discovered.");
        let mut result = DeviceSweep {
            discovered: discovered.len(),
            ..Default::default()
        };
        for onu in &discovered {
            self.handle_onu(olt, onu, driver.as_mut(), &mut result).await;
        }
        driver.disconnect().await;
        result
    }

    async fn handle_onu(
        &self,
        olt: &Device,
        onu: &DiscoveredOnu,
        driver: &mut dyn OltDriver,
        result: &mut DeviceSweep,
    ) {
        let pending = match self
            .orchestrator
            .subscribers()
            .find_pending_by_serial(olt.id, &onu.serial)
            .await
        {
            Ok(pending) => pending,
            Err(e) => {
                warn!(device_id = olt.id, serial = %onu.serial, error = %e, "Pending subscriber lookup failed.");
                return;
            }
        };
        let Some(subscriber) = pending else {
            result.unmatched.push(UnmatchedOnu {
                olt_id: olt.id,
                olt_name: olt.name.clone(),
                serial: onu.serial.clone(),
                interface: onu.interface.clone(),
            });
            return;
        };

        result.matched += 1;
        let report = self
            .orchestrator
            .provision_subscriber(&subscriber, onu, driver)
            .await;
        if report.succeeded(WorkflowStep::OnuRegistration) && report.succeeded(WorkflowStep::StatusUpdate) {
            result.provisioned += 1;
        }
    }

    async fn notify_unmatched(&self, unmatched: &[UnmatchedOnu]) {
        let lines: Vec<String> = unmatched
            .iter()
            .map(|u| format!("{} ({}): {} on {}", u.olt_name, u.olt_id, u.serial, u.interface))
            .collect();
        let subject = format!("{} unmatched ONU(s) discovered", unmatched.len());
        if let Err(e) = self.notifier.notify(&subject, &lines.join("\n")).await {
            warn!(error = %e, "Failed to notify operators about unmatched ONUs.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RepositoryError;
    use crate::db::enums::SubscriberStatus;
    use crate::db::repository::{MockDeviceRegistry, MockSubscriberRepository};
    use crate::drivers::{MockDriver, normalize_vendor};
    use crate::notifications::MockNotificationSink;
    use crate::orchestrator::subscriber::tests::{build, pair, reply_rows};
    use crate::radius::coa::MockCoaClient;
    use crate::router::MockRouterGateway;
    use crate::testing::{memory_db, olt_device, plan, subscriber};
    use mockall::predicate::eq;
    use std::collections::HashMap;

    /// Validates the vendor tag like the real resolver, then hands out mocks.
    struct ScriptedDrivers {
        discovered: HashMap<i32, Vec<DiscoveredOnu>>,
    }

    impl DriverFactory for ScriptedDrivers {
        fn resolve(&self, device: &Device) -> Result<Box<dyn OltDriver>, DriverError> {
            normalize_vendor(&device.vendor_tag())?;
            let onus = self.discovered.get(&device.id).cloned().unwrap_or_default();
            Ok(Box::new(MockDriver::with_discovered(onus)))
        }
    }

    fn onu(serial: &str) -> DiscoveredOnu {
        DiscoveredOnu {
            serial: serial.to_string(),
            interface: "gpon-olt_1/1/1".to_string(),
        }
    }

    #[tokio::test]
    async fn sweep_matches_provisions_and_reports_the_rest() {
        let db = memory_db().await;
        let mut devices = MockDeviceRegistry::new();
        devices
            .expect_list_by_kind()
            .with(eq(DeviceKind::Olt))
            .returning(|_| Ok(vec![olt_device(1, "mock"), olt_device(2, "nokia"), olt_device(3, "")]));

        let mut pending = subscriber(9, Some("erin"));
        pending.status = SubscriberStatus::Inactive;
        let mut subscribers = MockSubscriberRepository::new();
        subscribers
            .expect_find_pending_by_serial()
            .returning(move |olt_id, serial| Ok((olt_id == 1 && serial == "SN-MATCH").then(|| pending.clone())));
        subscribers.expect_get_plan().returning(|id| Ok(Some(plan(id))));
        subscribers
            .expect_update_status()
            .with(eq(9), eq(SubscriberStatus::Active))
            .times(1)
            .returning(|_, _| Ok(()));

        let mut notifier = MockNotificationSink::new();
        notifier
            .expect_notify()
            .withf(|subject, message| subject.starts_with('1') && message.contains("SN-STRAY"))
            .times(1)
            .returning(|_, _| Ok(()));

        let orchestrator = build(&db, subscribers, MockDeviceRegistry::new(), MockRouterGateway::new(), MockCoaClient::new());
        let drivers = ScriptedDrivers {
            discovered: HashMap::from([(1, vec![onu("SN-MATCH"), onu("SN-STRAY")])]),
        };
        let sweeper = ZtpSweeper::new(Arc::new(devices), orchestrator, Arc::new(drivers), Arc::new(notifier), 2);

        let summary = sweeper.sweep().await.unwrap();
        assert_eq!(summary.devices_scanned, 3);
        assert_eq!(summary.devices_skipped, 1);
        assert_eq!(summary.devices_unreachable, 0);
        assert_eq!(summary.discovered, 2);
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.provisioned, 1);
        assert_eq!(summary.unmatched.len(), 1);
        assert_eq!(summary.unmatched[0].serial, "SN-STRAY");
        assert_eq!(reply_rows(&db, "erin").await, vec![pair("Mikrotik-Rate-Limit", "20M/20M")]);
    }

    #[tokio::test]
    async fn quiet_sweep_sends_no_alert() {
        let db = memory_db().await;
        let mut devices = MockDeviceRegistry::new();
        devices
            .expect_list_by_kind()
            .returning(|_| Ok(vec![olt_device(1, "mock")]));
        let orchestrator = build(
            &db,
            MockSubscriberRepository::new(),
            MockDeviceRegistry::new(),
            MockRouterGateway::new(),
            MockCoaClient::new(),
        );
        let drivers = ScriptedDrivers {
            discovered: HashMap::new(),
        };
        let sweeper = ZtpSweeper::new(
            Arc::new(devices),
            orchestrator,
            Arc::new(drivers),
            Arc::new(MockNotificationSink::new()),
            4,
        );
        let summary = sweeper.sweep().await.unwrap();
        assert_eq!(summary.devices_scanned, 1);
        assert_eq!(summary.discovered, 0);
    }

    #[tokio::test]
    async fn registry_failure_fails_the_sweep() {
        let db = memory_db().await;
        let mut devices = MockDeviceRegistry::new();
        devices
            .expect_list_by_kind()
            .returning(|_| Err(RepositoryError::NotFound("devices".into())));
        let orchestrator = build(
            &db,
            MockSubscriberRepository::new(),
            MockDeviceRegistry::new(),
            MockRouterGateway::new(),
            MockCoaClient::new(),
        );
        let sweeper = ZtpSweeper::new(
            Arc::new(devices),
            orchestrator,
            Arc::new(VendorDriverFactory::new(Duration::from_secs(1))),
            Arc::new(MockNotificationSink::new()),
            1,
        );
        assert!(matches!(sweeper.sweep().await, Err(WorkflowError::Repository(_))));
    }
}
