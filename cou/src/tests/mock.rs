//! Mock testing utils, mostly you want the `status_*`/`topology_*` builders,
//! but the scripted [`MockJuju`] client and the consts will help you drive
//! the engine and assert the results.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use cou_juju::status::{ApplicationStatus, MachineStatus, UnitStatus};
use cou_juju::{
    ActionResult, Channel, ExecOutput, FullStatus, IdleScope, JujuClient, JujuError, JujuResult,
};
use serde_json::Value;

use crate::analyze::{self, CloudSnapshot};
use crate::catalog::ReleaseCatalog;
use crate::config::{Config, Tunables};
use crate::engine::Prompt;
use crate::errors::CouResult;
use crate::step::Step;
use crate::strategy::PlanContext;
use crate::topology::Topology;

pub const KEYSTONE_USSURI: &str = "17.0.1";
pub const KEYSTONE_VICTORIA: &str = "18.1.0";
pub const KEYSTONE_YOGA: &str = "21.0.1";
pub const GLANCE_WALLABY: &str = "22.0.0";
pub const NOVA_USSURI: &str = "21.0.0";
pub const NOVA_VICTORIA: &str = "22.0.0";
pub const CEPH_OCTOPUS: &str = "15.2.17";

pub fn unit(machine: &str, workload: &str, leader: bool) -> UnitStatus {
    UnitStatus {
        machine: machine.to_owned(),
        workload_version: workload.to_owned(),
        subordinates: BTreeMap::new(),
        leader,
    }
}

pub fn machine_in(az: &str) -> MachineStatus {
    MachineStatus {
        hardware: format!("arch=amd64 cores=8 availability-zone={az}"),
        series: "focal".to_owned(),
    }
}

pub fn principal_app(
    charm: &str,
    channel: &str,
    units: BTreeMap<String, UnitStatus>,
) -> ApplicationStatus {
    ApplicationStatus {
        charm: format!("ch:amd64/focal/{charm}-42"),
        charm_name: charm.to_owned(),
        charm_channel: channel.to_owned(),
        charm_origin: "charmhub".to_owned(),
        series: "focal".to_owned(),
        subordinate_to: Vec::new(),
        units,
        workload_version: String::new(),
    }
}

pub fn subordinate_app(charm: &str, channel: &str, principal: &str) -> ApplicationStatus {
    ApplicationStatus {
        charm: format!("ch:amd64/focal/{charm}-7"),
        charm_name: charm.to_owned(),
        charm_channel: channel.to_owned(),
        charm_origin: "charmhub".to_owned(),
        series: "focal".to_owned(),
        subordinate_to: vec![principal.to_owned()],
        units: BTreeMap::new(),
        workload_version: String::new(),
    }
}

/// The S1 cloud: keystone (+ldap), one nova-compute in az-0 (+ovn-chassis),
/// one ceph-osd, everything at ussuri on focal.
pub fn status_s1() -> FullStatus {
    let mut status = FullStatus::default();
    status.model.name = "openstack".to_owned();
    status.machines.insert("0".to_owned(), machine_in("az-0"));
    status.machines.insert("1".to_owned(), machine_in("az-0"));
    status.machines.insert("2".to_owned(), machine_in("az-0"));

    let mut keystone_unit = unit("1", KEYSTONE_USSURI, true);
    keystone_unit
        .subordinates
        .insert("keystone-ldap/0".to_owned(), unit("1", "", false));
    status.applications.insert(
        "keystone".to_owned(),
        principal_app(
            "keystone",
            "ussuri/stable",
            BTreeMap::from([("keystone/0".to_owned(), keystone_unit)]),
        ),
    );
    status.applications.insert(
        "keystone-ldap".to_owned(),
        subordinate_app("keystone-ldap", "ussuri/stable", "keystone"),
    );

    let mut nova_unit = unit("0", NOVA_USSURI, true);
    nova_unit
        .subordinates
        .insert("ovn-chassis/0".to_owned(), unit("0", "20.03.2", false));
    status.applications.insert(
        "nova-compute".to_owned(),
        principal_app(
            "nova-compute",
            "ussuri/stable",
            BTreeMap::from([("nova-compute/0".to_owned(), nova_unit)]),
        ),
    );
    status.applications.insert(
        "ovn-chassis".to_owned(),
        subordinate_app("ovn-chassis", "20.03/stable", "nova-compute"),
    );

    status.applications.insert(
        "ceph-osd".to_owned(),
        principal_app(
            "ceph-osd",
            "octopus/stable",
            BTreeMap::from([("ceph-osd/0".to_owned(), unit("2", CEPH_OCTOPUS, true))]),
        ),
    );
    status
}

pub fn configs_s1() -> BTreeMap<String, BTreeMap<String, Value>> {
    BTreeMap::from([
        (
            "keystone".to_owned(),
            BTreeMap::from([
                ("action-managed-upgrade".to_owned(), Value::Bool(false)),
                ("openstack-origin".to_owned(), Value::from("distro")),
            ]),
        ),
        (
            "nova-compute".to_owned(),
            BTreeMap::from([
                ("action-managed-upgrade".to_owned(), Value::Bool(true)),
                ("openstack-origin".to_owned(), Value::from("distro")),
            ]),
        ),
        (
            "ceph-osd".to_owned(),
            BTreeMap::from([("source".to_owned(), Value::from("distro"))]),
        ),
    ])
}

pub fn topology_s1() -> Topology {
    Topology::from_status(&status_s1(), configs_s1(), BTreeMap::new()).unwrap()
}

/// Two zones, one nova-compute unit each, plus keystone so the cloud has a
/// control plane to derive its release from.
pub fn status_two_zones() -> FullStatus {
    let mut status = FullStatus::default();
    status.model.name = "openstack".to_owned();
    status.machines.insert("0".to_owned(), machine_in("az-0"));
    status.machines.insert("1".to_owned(), machine_in("az-1"));
    status.machines.insert("2".to_owned(), machine_in("az-0"));

    status.applications.insert(
        "keystone".to_owned(),
        principal_app(
            "keystone",
            "ussuri/stable",
            BTreeMap::from([("keystone/0".to_owned(), unit("2", KEYSTONE_USSURI, true))]),
        ),
    );
    status.applications.insert(
        "nova-compute".to_owned(),
        principal_app(
            "nova-compute",
            "ussuri/stable",
            BTreeMap::from([
                ("nova-compute/0".to_owned(), unit("0", NOVA_USSURI, true)),
                ("nova-compute/1".to_owned(), unit("1", NOVA_USSURI, false)),
            ]),
        ),
    );
    status
}

pub fn topology_two_zones(instance_counts: BTreeMap<String, u64>) -> Topology {
    Topology::from_status(&status_two_zones(), BTreeMap::new(), instance_counts).unwrap()
}

/// Analyze a topology and build the invocation's plan in one go.
pub fn plan_for(topology: &Topology, config: &Config) -> CouResult<Step> {
    let catalog = ReleaseCatalog::bundled().unwrap();
    let tunables = Tunables::default();
    let snapshot = analyze::analyze(topology, &catalog, config)?;
    let ctx = PlanContext {
        snapshot: &snapshot,
        catalog: &catalog,
        config,
        tunables: &tunables,
    };
    crate::plan::build_plan(&ctx)
}

pub fn snapshot_for(topology: &Topology, config: &Config) -> CouResult<CloudSnapshot> {
    let catalog = ReleaseCatalog::bundled().unwrap();
    analyze::analyze(topology, &catalog, config)
}

/// Every description in the tree, in left-to-right depth-first order.
pub fn all_descriptions(plan: &Step) -> Vec<String> {
    let mut out = Vec::new();
    plan.walk(&mut |step| out.push(step.description.clone()));
    out
}

pub fn top_level_descriptions(plan: &Step) -> Vec<String> {
    plan.children()
        .iter()
        .map(|child| child.description.clone())
        .collect()
}

/// A scripted controller: canned status and action results, recorded calls,
/// optional per-scope wait delays/failures and transient refresh failures.
#[derive(Default)]
pub struct MockJuju {
    pub status: Mutex<FullStatus>,
    pub configs: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
    pub action_results: Mutex<BTreeMap<(String, String), ActionResult>>,
    pub wait_delays: Mutex<BTreeMap<String, Duration>>,
    pub wait_failures: Mutex<BTreeMap<String, bool>>,
    pub refresh_failures: Mutex<BTreeMap<String, u32>>,
    pub calls: Mutex<Vec<String>>,
}

impl MockJuju {
    pub fn new(status: FullStatus) -> Self {
        MockJuju {
            status: Mutex::new(status),
            ..Default::default()
        }
    }

    pub fn with_config(self, app: &str, config: BTreeMap<String, Value>) -> Self {
        self.configs.lock().unwrap().insert(app.to_owned(), config);
        self
    }

    pub fn with_action_result(self, unit: &str, action: &str, result: ActionResult) -> Self {
        self.action_results
            .lock()
            .unwrap()
            .insert((unit.to_owned(), action.to_owned()), result);
        self
    }

    /// Delay a wait-for-idle on the given scope key (`app:<name>` or `model`).
    pub fn with_wait_delay(self, scope: &str, delay: Duration) -> Self {
        self.wait_delays
            .lock()
            .unwrap()
            .insert(scope.to_owned(), delay);
        self
    }

    /// Make a wait-for-idle on the given scope key time out.
    pub fn with_wait_failure(self, scope: &str) -> Self {
        self.wait_failures.lock().unwrap().insert(scope.to_owned(), true);
        self
    }

    /// Fail the next `count` refreshes of `app` with a connection error.
    pub fn with_transient_refresh_failures(self, app: &str, count: u32) -> Self {
        self.refresh_failures
            .lock()
            .unwrap()
            .insert(app.to_owned(), count);
        self
    }

    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn scope_key(scope: &IdleScope) -> String {
    match scope {
        IdleScope::Application(app) => format!("app:{app}"),
        IdleScope::Model => "model".to_owned(),
    }
}

#[async_trait]
impl JujuClient for MockJuju {
    async fn status(&self) -> JujuResult<FullStatus> {
        self.record("status".to_owned());
        Ok(self.status.lock().unwrap().clone())
    }

    async fn get_config(&self, app: &str) -> JujuResult<BTreeMap<String, Value>> {
        self.record(format!("get-config {app}"));
        Ok(self
            .configs
            .lock()
            .unwrap()
            .get(app)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_config(&self, app: &str, key: &str, value: &str) -> JujuResult<()> {
        self.record(format!("set-config {app} {key}={value}"));
        self.configs
            .lock()
            .unwrap()
            .entry(app.to_owned())
            .or_default()
            .insert(key.to_owned(), Value::from(value));
        Ok(())
    }

    async fn refresh_charm(&self, app: &str) -> JujuResult<()> {
        self.record(format!("refresh {app}"));
        let mut failures = self.refresh_failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(app) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(JujuError::TransientConnection {
                    message: "connection reset by peer".to_owned(),
                });
            }
        }
        Ok(())
    }

    async fn set_channel(&self, app: &str, channel: &Channel) -> JujuResult<()> {
        self.record(format!("set-channel {app} {channel}"));
        Ok(())
    }

    async fn run_action(
        &self,
        unit: &str,
        action: &str,
        _params: &BTreeMap<String, Value>,
    ) -> JujuResult<ActionResult> {
        self.record(format!("run-action {unit} {action}"));
        let canned = self
            .action_results
            .lock()
            .unwrap()
            .get(&(unit.to_owned(), action.to_owned()))
            .cloned();
        Ok(canned.unwrap_or(ActionResult {
            status: "completed".to_owned(),
            results: BTreeMap::new(),
        }))
    }

    async fn run_on_unit(&self, unit: &str, command: &str) -> JujuResult<ExecOutput> {
        let head: String = command.chars().take(20).collect();
        self.record(format!("exec {unit} {head}"));
        Ok(ExecOutput {
            stdout: String::new(),
            code: 0,
        })
    }

    async fn wait_for_idle(&self, scope: &IdleScope, timeout: Duration) -> JujuResult<()> {
        let key = scope_key(scope);
        self.record(format!("wait {key}"));
        let delay = self.wait_delays.lock().unwrap().get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let fails = self
            .wait_failures
            .lock()
            .unwrap()
            .get(&key)
            .copied()
            .unwrap_or(false);
        if fails {
            return Err(JujuError::Timeout {
                what: key,
                seconds: timeout.as_secs(),
            });
        }
        Ok(())
    }
}

/// A [`Prompt`] that answers from a script, defaulting to yes.
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<bool>>,
    pub asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        ScriptedPrompt {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }
}

impl Prompt for ScriptedPrompt {
    fn confirm(&self, description: &str) -> CouResult<bool> {
        self.asked.lock().unwrap().push(description.to_owned());
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or(true))
    }
}
