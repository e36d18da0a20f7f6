use std::sync::Arc;
use tracing::{info, warn};

use super::report::{StepStatus, WorkflowKind, WorkflowReport, WorkflowStep};
use super::{
    ADDRESS_LIST_ATTRIBUTE, RATE_LIMIT_ATTRIBUTE, SIMULTANEOUS_USE_ATTRIBUTE, WorkflowError,
};
use crate::db::entities::prelude::{Device, Plan, Subscriber};
use crate::db::enums::SubscriberStatus;
use crate::db::services::settings_service::keys;
use crate::db::{DeviceRegistry, Settings, SubscriberRepository};
use crate::drivers::{DiscoveredOnu, OltDriver, OnuConfig};
use crate::radius::{DisconnectService, RadiusAttribute, RadiusSynchronizer};
use crate::router::RouterGateway;

struct IsolationPolicy {
    address_list: String,
    profile: String,
    rate_limit: String,
}

/// Moves subscribers between the `active` and `suspended` shaping states.
///
/// Every step runs even when an earlier one failed; the returned report says
/// what each step did.
#[derive(Clone)]
pub struct SubscriberOrchestrator {
    subscribers: Arc<dyn SubscriberRepository>,
    devices: Arc<dyn DeviceRegistry>,
    router: Arc<dyn RouterGateway>,
    radius: RadiusSynchronizer,
    disconnect: DisconnectService,
    settings: Settings,
}

impl SubscriberOrchestrator {
    pub fn new(
        subscribers: Arc<dyn SubscriberRepository>,
        devices: Arc<dyn DeviceRegistry>,
        router: Arc<dyn RouterGateway>,
        radius: RadiusSynchronizer,
        disconnect: DisconnectService,
        settings: Settings,
    ) -> Self {
        Self {
            subscribers,
            devices,
            router,
            radius,
            disconnect,
            settings,
        }
    }

    pub(crate) fn subscribers(&self) -> &Arc<dyn SubscriberRepository> {
        &self.subscribers
    }

    pub(crate) fn radius(&self) -> &RadiusSynchronizer {
        &self.radius
    }

    /// Loads a subscriber that has a login identity.
    pub(crate) async fn load(&self, subscriber_id: i32) -> Result<(Subscriber, String), WorkflowError> {
        let subscriber = self
            .subscribers
            .get(subscriber_id)
            .await?
            .ok_or(WorkflowError::SubscriberNotFound(subscriber_id))?;
        let login = subscriber
            .login_identity()
            .map(str::to_string)
            .ok_or(WorkflowError::NoLoginIdentity(subscriber_id))?;
        Ok((subscriber, login))
    }

    /// The subscriber's plan, or `None` when unassigned or unreadable.
    pub(crate) async fn plan_of(&self, subscriber: &Subscriber) -> Option<Plan> {
        let plan_id = subscriber.plan_id?;
        match self.subscribers.get_plan(plan_id).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(subscriber_id = subscriber.id, plan_id = plan_id, error = %e, "Failed to load plan.");
                None
            }
        }
    }

    async fn isolation_policy(&self) -> IsolationPolicy {
        IsolationPolicy {
            address_list: self
                .settings
                .string(keys::ISOLATION_ADDRESS_LIST, keys::DEFAULT_ISOLATION_ADDRESS_LIST)
                .await,
            profile: self
                .settings
                .string(keys::ISOLATION_PROFILE, keys::DEFAULT_ISOLATION_PROFILE)
                .await,
            rate_limit: self
                .settings
                .string(keys::ISOLATION_RATE_LIMIT, keys::DEFAULT_ISOLATION_RATE_LIMIT)
                .await,
        }
    }

    pub(crate) async fn check_items(&self) -> Vec<RadiusAttribute> {
        let simultaneous = self
            .settings
            .int(
                keys::DEFAULT_SIMULTANEOUS_USE,
                keys::DEFAULT_SIMULTANEOUS_USE_VALUE,
            )
            .await;
        vec![RadiusAttribute::check(
            SIMULTANEOUS_USE_ATTRIBUTE,
            simultaneous.to_string(),
        )]
    }

    async fn resolve_router(&self, subscriber: &Subscriber) -> Result<Device, StepStatus> {
        let Some(router_id) = subscriber.router_id else {
            return Err(StepStatus::Skipped("no router assigned".to_string()));
        };
        match self.devices.get(router_id).await {
            Ok(Some(router)) => Ok(router),
            Ok(None) => Err(StepStatus::Failed(format!("router {router_id} not found"))),
            Err(e) => Err(StepStatus::Failed(format!("router {router_id} lookup failed: {e}"))),
        }
    }

    /// Router and the framed address of the subscriber's live session.
    async fn live_session(&self, subscriber: &Subscriber, login: &str) -> Result<(Device, String), StepStatus> {
        let router = self.resolve_router(subscriber).await?;
        match self.router.find_active_session(&router, login).await {
            Ok(Some(session)) => match session.address {
                Some(address) if !address.trim().is_empty() => Ok((router, address)),
                _ => Err(StepStatus::Skipped("active session has no address".to_string())),
            },
            Ok(None) => Err(StepStatus::Skipped(
                "subscriber offline, enforced at next authentication".to_string(),
            )),
            Err(e) => Err(StepStatus::Failed(format!("session lookup failed: {e}"))),
        }
    }

    pub(crate) async fn disconnect_step(&self, report: &mut WorkflowReport, subscriber: &Subscriber) {
        let status = match self.disconnect.try_send(subscriber).await {
            Ok(_) => StepStatus::Succeeded,
            Err(e) => StepStatus::Failed(e.to_string()),
        };
        report.record(WorkflowStep::CoaDisconnect, status);
    }

    async fn status_step(&self, report: &mut WorkflowReport, subscriber_id: i32, status: SubscriberStatus) {
        let outcome = match self.subscribers.update_status(subscriber_id, status).await {
            Ok(()) => StepStatus::Succeeded,
            Err(e) => StepStatus::Failed(e.to_string()),
        };
        report.record(WorkflowStep::StatusUpdate, outcome);
    }

    /// Suspends a subscriber: isolation attributes and group, address-list
    /// membership for a live session, CoA disconnect, then `suspended`.
    ///
    /// Fails only when the subscriber is missing or has no login; nothing is
    /// written in that case.
    pub async fn isolate(&self, subscriber_id: i32) -> Result<WorkflowReport, WorkflowError> {
        let (subscriber, login) = self.load(subscriber_id).await?;
        let policy = self.isolation_policy().await;
        let mut report = WorkflowReport::new(WorkflowKind::Isolate, login.as_str());

        let reply = [
            RadiusAttribute::reply(ADDRESS_LIST_ATTRIBUTE, policy.address_list.as_str()),
            RadiusAttribute::reply(RATE_LIMIT_ATTRIBUTE, policy.rate_limit.as_str()),
        ];
        let check = self.check_items().await;
        let synced = self
            .radius
            .sync_user(&login, subscriber.password.as_deref(), &reply, &check)
            .await;
        report.record_result(WorkflowStep::RadiusSync, synced, "isolation attributes not written");

        let grouped = self.radius.assign_group(&login, &policy.profile, 1).await;
        report.record_result(WorkflowStep::GroupAssignment, grouped, "isolation group not assigned");

        let push = match self.live_session(&subscriber, &login).await {
            Ok((router, address)) => {
                let comment = format!("isolated {login}");
                let added = self
                    .router
                    .add_address_list_entry(&router, &policy.address_list, &address, &comment)
                    .await;
                if added {
                    StepStatus::Succeeded
                } else {
                    StepStatus::Failed(format!("router {} rejected address-list entry", router.id))
                }
            }
            Err(status) => status,
        };
        report.record(WorkflowStep::AddressListPush, push);

        self.disconnect_step(&mut report, &subscriber).await;
        self.status_step(&mut report, subscriber.id, SubscriberStatus::Suspended)
            .await;

        info!(subscriber_id = subscriber.id, username = %login, failed = ?report.failed_steps(), "Isolate workflow finished.");
        Ok(report)
    }

    /// Mirror of `isolate`: plan rate limit and group, address-list removal,
    /// CoA disconnect, then `active`.
    pub async fn restore(&self, subscriber_id: i32) -> Result<WorkflowReport, WorkflowError> {
        let (subscriber, login) = self.load(subscriber_id).await?;
        let policy = self.isolation_policy().await;
        let plan = self.plan_of(&subscriber).await;
        let mut report = WorkflowReport::new(WorkflowKind::Restore, login.as_str());

        let rate = plan.as_ref().map(|p| effective_rate_limit(p, subscriber.fup_active));
        let reply: Vec<RadiusAttribute> = rate
            .iter()
            .map(|r| RadiusAttribute::reply(RATE_LIMIT_ATTRIBUTE, r.as_str()))
            .collect();
        // Without a plan the isolation rate must not linger.
        let stale: &[&str] = if rate.is_some() {
            &[ADDRESS_LIST_ATTRIBUTE]
        } else {
            &[ADDRESS_LIST_ATTRIBUTE, RATE_LIMIT_ATTRIBUTE]
        };
        let check = self.check_items().await;
        let synced = self
            .radius
            .sync_user(&login, subscriber.password.as_deref(), &reply, &check)
            .await;
        let cleared = self.radius.remove_reply_attributes(&login, stale).await;
        report.record_result(
            WorkflowStep::RadiusSync,
            synced && cleared,
            "plan attributes not restored",
        );

        let grouped = match plan.as_ref().and_then(|p| p.radius_profile.as_deref()) {
            Some(profile) => self.radius.assign_group(&login, profile, 1).await,
            None => self.radius.clear_group(&login).await,
        };
        report.record_result(WorkflowStep::GroupAssignment, grouped, "plan group not assigned");

        let removal = match self.live_session(&subscriber, &login).await {
            Ok((router, address)) => {
                let removed = self
                    .router
                    .remove_address_list_entries(&router, &policy.address_list, &address)
                    .await;
                if removed {
                    StepStatus::Succeeded
                } else {
                    StepStatus::Failed(format!("router {} did not remove address-list entry", router.id))
                }
            }
            Err(status) => status,
        };
        report.record(WorkflowStep::AddressListRemoval, removal);

        self.disconnect_step(&mut report, &subscriber).await;
        self.status_step(&mut report, subscriber.id, SubscriberStatus::Active)
            .await;

        info!(subscriber_id = subscriber.id, username = %login, failed = ?report.failed_steps(), "Restore workflow finished.");
        Ok(report)
    }

    /// Registers a discovered ONU for a pre-registered subscriber, then writes
    /// its RADIUS state and activates it. Later steps are skipped when the
    /// ONU could not be registered.
    pub async fn provision_subscriber(
        &self,
        subscriber: &Subscriber,
        onu: &DiscoveredOnu,
        driver: &mut dyn OltDriver,
    ) -> WorkflowReport {
        let login = subscriber.login_identity().map(str::to_string);
        let subject = login.clone().unwrap_or_else(|| subscriber.name.clone());
        let mut report = WorkflowReport::new(WorkflowKind::Provision, subject.as_str());

        let config = OnuConfig {
            interface: onu.interface.clone(),
            name: subject.clone(),
            ..OnuConfig::default()
        };
        let registered = driver.register_onu(&onu.serial, &config).await;
        report.record_result(
            WorkflowStep::OnuRegistration,
            registered,
            &format!("{} driver rejected ONU {}", driver.vendor(), onu.serial),
        );
        if !registered {
            for step in [WorkflowStep::RadiusSync, WorkflowStep::GroupAssignment, WorkflowStep::StatusUpdate] {
                report.record(step, StepStatus::Skipped("ONU not registered".to_string()));
            }
            return report;
        }

        match login {
            Some(login) => {
                let plan = self.plan_of(subscriber).await;
                let reply: Vec<RadiusAttribute> = plan
                    .iter()
                    .map(|p| RadiusAttribute::reply(RATE_LIMIT_ATTRIBUTE, effective_rate_limit(p, subscriber.fup_active)))
                    .collect();
                let check = self.check_items().await;
                let synced = self
                    .radius
                    .sync_user(&login, subscriber.password.as_deref(), &reply, &check)
                    .await;
                report.record_result(WorkflowStep::RadiusSync, synced, "subscriber attributes not written");

                let grouped = match plan.as_ref().and_then(|p| p.radius_profile.as_deref()) {
                    Some(profile) => self.radius.assign_group(&login, profile, 1).await,
                    None => self.radius.clear_group(&login).await,
                };
                report.record_result(WorkflowStep::GroupAssignment, grouped, "plan group not assigned");
            }
            None => {
                for step in [WorkflowStep::RadiusSync, WorkflowStep::GroupAssignment] {
                    report.record(step, StepStatus::Skipped("no login identity".to_string()));
                }
            }
        }

        self.status_step(&mut report, subscriber.id, SubscriberStatus::Active)
            .await;
        report
    }
}

/// The throttled rate while the fair-usage flag is up, otherwise the plan rate.
pub(crate) fn effective_rate_limit(plan: &Plan, fup_active: bool) -> String {
    match plan.fup_rate_limit.as_deref() {
        Some(throttled) if fup_active && !throttled.trim().is_empty() => throttled.to_string(),
        _ => plan.rate_limit.clone(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::RepositoryError;
    use crate::db::entities::{radcheck, radreply, radusergroup};
    use crate::db::repository::{MockDeviceRegistry, MockSettingsStore, MockSubscriberRepository};
    use crate::drivers::MockDriver;
    use crate::drivers::MockOltDriver;
    use crate::radius::coa::MockCoaClient;
    use crate::router::{DeviceSession, MockRouterGateway, SessionKind};
    use crate::routeros::ApiError;
    use crate::testing::{memory_db, plan, router_device, subscriber};
    use mockall::predicate::eq;
    use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};

    pub(crate) fn default_settings() -> Settings {
        let mut store = MockSettingsStore::new();
        store.expect_get_value().returning(|_| Ok(None));
        Settings::new(Arc::new(store))
    }

    pub(crate) fn build(
        db: &DatabaseConnection,
        subscribers: MockSubscriberRepository,
        devices: MockDeviceRegistry,
        router: MockRouterGateway,
        coa: MockCoaClient,
    ) -> SubscriberOrchestrator {
        let devices: Arc<dyn DeviceRegistry> = Arc::new(devices);
        let disconnect = DisconnectService::new(devices.clone(), Arc::new(coa), default_settings(), 1700);
        SubscriberOrchestrator::new(
            Arc::new(subscribers),
            devices,
            Arc::new(router),
            RadiusSynchronizer::new(db.clone(), default_settings()),
            disconnect,
            default_settings(),
        )
    }

    pub(crate) async fn reply_rows(db: &DatabaseConnection, user: &str) -> Vec<(String, String)> {
        radreply::Entity::find()
            .filter(radreply::Column::Username.eq(user))
            .order_by_asc(radreply::Column::Attribute)
            .all(db)
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.attribute, r.value))
            .collect()
    }

    async fn group_of(db: &DatabaseConnection, user: &str) -> Option<String> {
        radusergroup::Entity::find()
            .filter(radusergroup::Column::Username.eq(user))
            .one(db)
            .await
            .unwrap()
            .map(|g| g.groupname)
    }

    pub(crate) fn pair(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    fn online(address: &str) -> DeviceSession {
        DeviceSession {
            id: "*1".to_string(),
            kind: SessionKind::Ppp,
            login: "alice".to_string(),
            address: Some(address.to_string()),
            uptime: None,
        }
    }

    fn lookup(sub: Subscriber) -> MockSubscriberRepository {
        let mut subscribers = MockSubscriberRepository::new();
        subscribers
            .expect_get()
            .returning(move |_| Ok(Some(sub.clone())));
        subscribers
    }

    #[tokio::test]
    async fn isolate_without_login_writes_nothing() {
        let db = memory_db().await;
        let orchestrator = build(
            &db,
            lookup(subscriber(7, Some("   "))),
            MockDeviceRegistry::new(),
            MockRouterGateway::new(),
            MockCoaClient::new(),
        );

        let result = orchestrator.isolate(7).await;
        assert!(matches!(result, Err(WorkflowError::NoLoginIdentity(7))));
        assert!(radcheck::Entity::find().all(&db).await.unwrap().is_empty());
        assert!(reply_rows(&db, "   ").await.is_empty());
    }

    #[tokio::test]
    async fn isolate_unknown_subscriber_is_an_error() {
        let db = memory_db().await;
        let mut subscribers = MockSubscriberRepository::new();
        subscribers.expect_get().returning(|_| Ok(None));
        let orchestrator = build(
            &db,
            subscribers,
            MockDeviceRegistry::new(),
            MockRouterGateway::new(),
            MockCoaClient::new(),
        );
        assert!(matches!(
            orchestrator.isolate(3).await,
            Err(WorkflowError::SubscriberNotFound(3))
        ));
    }

    #[tokio::test]
    async fn router_lookup_failure_keeps_radius_sync_and_attempts_coa() {
        let db = memory_db().await;
        let mut subscribers = lookup(subscriber(7, Some("alice")));
        subscribers
            .expect_update_status()
            .with(eq(7), eq(SubscriberStatus::Suspended))
            .times(1)
            .returning(|_, _| Ok(()));
        let mut devices = MockDeviceRegistry::new();
        devices
            .expect_get()
            .returning(|_| Err(RepositoryError::NotFound("devices".into())));

        let orchestrator = build(&db, subscribers, devices, MockRouterGateway::new(), MockCoaClient::new());
        let report = orchestrator.isolate(7).await.unwrap();

        assert!(report.succeeded(WorkflowStep::RadiusSync));
        assert!(report.succeeded(WorkflowStep::GroupAssignment));
        assert!(matches!(report.status(WorkflowStep::AddressListPush), Some(StepStatus::Failed(_))));
        assert!(matches!(report.status(WorkflowStep::CoaDisconnect), Some(StepStatus::Failed(_))));
        assert!(report.succeeded(WorkflowStep::StatusUpdate));

        assert_eq!(
            reply_rows(&db, "alice").await,
            vec![pair("Mikrotik-Address-List", "ISOLIR"), pair("Mikrotik-Rate-Limit", "1k/1k")]
        );
        assert_eq!(group_of(&db, "alice").await.as_deref(), Some("isolir"));
    }

    #[tokio::test]
    async fn isolate_online_subscriber_runs_every_step() {
        let db = memory_db().await;
        let mut subscribers = lookup(subscriber(7, Some("alice")));
        subscribers.expect_update_status().returning(|_, _| Ok(()));
        let mut devices = MockDeviceRegistry::new();
        devices
            .expect_get()
            .with(eq(1))
            .returning(|id| Ok(Some(router_device(id, "10.0.0.1", None))));
        let mut router = MockRouterGateway::new();
        router
            .expect_find_active_session()
            .withf(|_, login| login == "alice")
            .returning(|_, _| Ok(Some(online("10.9.0.7"))));
        router
            .expect_add_address_list_entry()
            .withf(|_, list, address, comment| list == "ISOLIR" && address == "10.9.0.7" && comment.contains("alice"))
            .times(1)
            .returning(|_, _, _, _| true);
        let mut coa = MockCoaClient::new();
        coa.expect_disconnect()
            .withf(|r| r.username == "alice" && r.nas_ip == "10.0.0.1")
            .times(1)
            .returning(|_| Ok(()));

        let report = build(&db, subscribers, devices, router, coa)
            .isolate(7)
            .await
            .unwrap();
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(report.steps.len(), 5);
    }

    #[tokio::test]
    async fn unreachable_router_fails_only_the_push() {
        let db = memory_db().await;
        let mut subscribers = lookup(subscriber(7, Some("alice")));
        subscribers.expect_update_status().returning(|_, _| Ok(()));
        let mut devices = MockDeviceRegistry::new();
        devices
            .expect_get()
            .returning(|id| Ok(Some(router_device(id, "10.0.0.1", None))));
        let mut router = MockRouterGateway::new();
        router
            .expect_find_active_session()
            .returning(|_, _| Err(ApiError::Timeout("connect")));
        let mut coa = MockCoaClient::new();
        coa.expect_disconnect().times(1).returning(|_| Ok(()));

        let report = build(&db, subscribers, devices, router, coa)
            .isolate(7)
            .await
            .unwrap();
        assert_eq!(report.failed_steps(), vec![WorkflowStep::AddressListPush]);
        assert!(report.succeeded(WorkflowStep::CoaDisconnect));
    }

    #[tokio::test]
    async fn offline_subscriber_skips_the_push() {
        let db = memory_db().await;
        let mut subscribers = lookup(subscriber(7, Some("alice")));
        subscribers.expect_update_status().returning(|_, _| Ok(()));
        let mut devices = MockDeviceRegistry::new();
        devices
            .expect_get()
            .returning(|id| Ok(Some(router_device(id, "10.0.0.1", None))));
        let mut router = MockRouterGateway::new();
        router.expect_find_active_session().returning(|_, _| Ok(None));
        let mut coa = MockCoaClient::new();
        coa.expect_disconnect().returning(|_| Ok(()));

        let report = build(&db, subscribers, devices, router, coa)
            .isolate(7)
            .await
            .unwrap();
        assert!(matches!(report.status(WorkflowStep::AddressListPush), Some(StepStatus::Skipped(_))));
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn restore_reapplies_plan_and_removes_isolation() {
        let db = memory_db().await;
        let seed = RadiusSynchronizer::new(db.clone(), default_settings());
        assert!(
            seed.sync_user(
                "alice",
                Some("pw"),
                &[
                    RadiusAttribute::reply("Mikrotik-Address-List", "ISOLIR"),
                    RadiusAttribute::reply("Mikrotik-Rate-Limit", "1k/1k"),
                ],
                &[],
            )
            .await
        );
        assert!(seed.assign_group("alice", "isolir", 1).await);

        let mut sub = subscriber(7, Some("alice"));
        sub.status = SubscriberStatus::Suspended;
        let mut subscribers = lookup(sub);
        subscribers
            .expect_get_plan()
            .with(eq(1))
            .returning(|id| Ok(Some(plan(id))));
        subscribers
            .expect_update_status()
            .with(eq(7), eq(SubscriberStatus::Active))
            .times(1)
            .returning(|_, _| Ok(()));
        let mut devices = MockDeviceRegistry::new();
        devices
            .expect_get()
            .returning(|id| Ok(Some(router_device(id, "10.0.0.1", None))));
        let mut router = MockRouterGateway::new();
        router
            .expect_find_active_session()
            .returning(|_, _| Ok(Some(online("10.9.0.7"))));
        router
            .expect_remove_address_list_entries()
            .withf(|_, list, address| list == "ISOLIR" && address == "10.9.0.7")
            .times(1)
            .returning(|_, _, _| true);
        let mut coa = MockCoaClient::new();
        coa.expect_disconnect().times(1).returning(|_| Ok(()));

        let report = build(&db, subscribers, devices, router, coa)
            .restore(7)
            .await
            .unwrap();
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(
            reply_rows(&db, "alice").await,
            vec![pair("Mikrotik-Rate-Limit", "20M/20M")]
        );
        assert_eq!(group_of(&db, "alice").await.as_deref(), Some("home-20m"));
    }

    #[tokio::test]
    async fn provisioning_stops_when_the_onu_is_rejected() {
        let db = memory_db().await;
        let orchestrator = build(
            &db,
            MockSubscriberRepository::new(),
            MockDeviceRegistry::new(),
            MockRouterGateway::new(),
            MockCoaClient::new(),
        );
        let mut driver = MockOltDriver::new();
        driver.expect_vendor().return_const("zte");
        driver.expect_register_onu().returning(|_, _| false);

        let onu = DiscoveredOnu {
            serial: "ZTEG00000001".to_string(),
            interface: "gpon-olt_1/1/1".to_string(),
        };
        let report = orchestrator
            .provision_subscriber(&subscriber(9, Some("bob")), &onu, &mut driver)
            .await;
        assert_eq!(report.failed_steps(), vec![WorkflowStep::OnuRegistration]);
        assert!(matches!(report.status(WorkflowStep::StatusUpdate), Some(StepStatus::Skipped(_))));
        assert!(reply_rows(&db, "bob").await.is_empty());
    }

    #[tokio::test]
    async fn provisioning_writes_plan_and_activates() {
        let db = memory_db().await;
        let mut subscribers = MockSubscriberRepository::new();
        subscribers.expect_get_plan().returning(|id| Ok(Some(plan(id))));
        subscribers
            .expect_update_status()
            .with(eq(9), eq(SubscriberStatus::Active))
            .times(1)
            .returning(|_, _| Ok(()));
        let orchestrator = build(
            &db,
            subscribers,
            MockDeviceRegistry::new(),
            MockRouterGateway::new(),
            MockCoaClient::new(),
        );

        let mut sub = subscriber(9, Some("bob"));
        sub.status = SubscriberStatus::Inactive;
        let onu = DiscoveredOnu {
            serial: "HWTC00000001".to_string(),
            interface: "0/1/0".to_string(),
        };
        let mut driver = MockDriver::default();
        let report = orchestrator.provision_subscriber(&sub, &onu, &mut driver).await;
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(reply_rows(&db, "bob").await, vec![pair("Mikrotik-Rate-Limit", "20M/20M")]);
    }

    #[test]
    fn throttled_rate_applies_only_while_flagged() {
        let p = plan(1);
        assert_eq!(effective_rate_limit(&p, false), "20M/20M");
        assert_eq!(effective_rate_limit(&p, true), "5M/5M");
        let unthrottled = Plan {
            fup_rate_limit: None,
            ..plan(1)
        };
        assert_eq!(effective_rate_limit(&unthrottled, true), "20M/20M");
    }
}
