//! A typed snapshot of the live cloud, built from one status fetch.
//!
//! Loading performs every controller round-trip the rest of the tool needs
//! (status, per-application config, hypervisor instance counts) so that
//! analysis and planning afterwards are pure.

use std::collections::{BTreeMap, BTreeSet};

use cou_juju::{Channel, FullStatus, JujuClient};
use serde_json::Value;
use tracing::debug;

use crate::catalog::release::Series;
use crate::errors::{CouError, CouResult};

/// One machine of the model
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Machine {
    /// The machine id
    pub id: String,
    /// The availability zone, when the provider reports one
    pub az: Option<String>,
    /// Applications with a unit on this machine
    pub hosted: BTreeSet<String>,
}

/// One unit of an application
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unit {
    /// The unit name, e.g. `keystone/0`
    pub name: String,
    /// The machine hosting it
    pub machine: String,
    /// The workload version it reports
    pub workload_version: String,
    /// Whether the unit holds leadership
    pub leader: bool,
    /// Running VMs on this unit, fetched for hypervisors only
    pub instance_count: Option<u64>,
}

/// One application of the model
#[derive(Clone, Debug, PartialEq)]
pub struct Application {
    /// The application name
    pub name: String,
    /// The charm it deploys
    pub charm: String,
    /// The channel the charm tracks
    pub channel: Channel,
    /// Where the charm came from
    pub origin: String,
    /// The base series it runs on
    pub series: Series,
    /// The application's effective configuration
    pub config: BTreeMap<String, Value>,
    /// Principals this application rides on; empty means principal
    pub subordinate_to: Vec<String>,
    /// The application's units; empty for subordinates, which own none
    pub units: BTreeMap<String, Unit>,
    /// The machines the units sit on; inherited from the principals, for
    /// subordinates
    pub machines: BTreeSet<String>,
    /// The application-level workload version
    pub workload_version: String,
}

impl Application {
    /// Whether this application is a principal.
    pub fn is_principal(&self) -> bool {
        self.subordinate_to.is_empty()
    }
}

/// The typed form of one full status fetch
#[derive(Clone, Debug, PartialEq)]
pub struct Topology {
    /// The model name
    pub model: String,
    /// All machines, keyed by id
    pub machines: BTreeMap<String, Machine>,
    /// All applications, keyed by name
    pub applications: BTreeMap<String, Application>,
}

impl Topology {
    /// Fetch everything the analyzer and planner will need.
    pub async fn load(client: &dyn JujuClient) -> CouResult<Topology> {
        let status = client.status().await?;

        // Subordinates still carry config (their channel/origin options).
        let mut configs = BTreeMap::new();
        for name in status.applications.keys() {
            debug!("fetching config of '{name}'");
            configs.insert(name.clone(), client.get_config(name).await?);
        }

        let mut instance_counts = BTreeMap::new();
        for app in status.applications.values() {
            if app.resolved_charm_name() != "nova-compute" {
                continue;
            }
            for unit in app.units.keys() {
                debug!("fetching instance count of '{unit}'");
                let result = client
                    .run_action(unit, "instance-count", &BTreeMap::new())
                    .await?;
                let count = result
                    .result_str("instance-count")
                    .and_then(|raw| raw.parse::<u64>().ok())
                    .unwrap_or(0);
                instance_counts.insert(unit.clone(), count);
            }
        }

        Topology::from_status(&status, configs, instance_counts)
    }

    /// Build the typed topology from raw parts. Pure; this is the seam the
    /// tests drive.
    pub fn from_status(
        status: &FullStatus,
        configs: BTreeMap<String, BTreeMap<String, Value>>,
        instance_counts: BTreeMap<String, u64>,
    ) -> CouResult<Topology> {
        let mut machines: BTreeMap<String, Machine> = status
            .machines
            .iter()
            .map(|(id, machine)| {
                (
                    id.clone(),
                    Machine {
                        id: id.clone(),
                        az: machine.availability_zone().map(str::to_owned),
                        hosted: BTreeSet::new(),
                    },
                )
            })
            .collect();

        let mut applications = BTreeMap::new();

        // Principals first; subordinate units only exist inside them.
        for (name, raw) in &status.applications {
            let charm = raw.resolved_charm_name();
            if charm.is_empty() {
                return Err(CouError::TopologyField {
                    app: name.clone(),
                    field: "charm",
                });
            }
            if raw.charm_channel.is_empty() {
                return Err(CouError::TopologyField {
                    app: name.clone(),
                    field: "charm-channel",
                });
            }
            if raw.series.is_empty() {
                return Err(CouError::TopologyField {
                    app: name.clone(),
                    field: "series",
                });
            }
            let channel: Channel = raw.charm_channel.parse()?;
            let series: Series = raw.series.parse().map_err(|_| CouError::UnknownSeries {
                app: name.clone(),
                series: raw.series.clone(),
            })?;

            let mut units = BTreeMap::new();
            if raw.subordinate_to.is_empty() {
                for (unit_name, unit) in &raw.units {
                    if unit.workload_version.is_empty() {
                        return Err(CouError::EmptyWorkloadVersion {
                            app: name.clone(),
                            unit: unit_name.clone(),
                        });
                    }
                    units.insert(
                        unit_name.clone(),
                        Unit {
                            name: unit_name.clone(),
                            machine: unit.machine.clone(),
                            workload_version: unit.workload_version.clone(),
                            leader: unit.leader,
                            instance_count: instance_counts.get(unit_name).copied(),
                        },
                    );
                }
            }

            let machines_of_app: BTreeSet<String> =
                units.values().map(|u| u.machine.clone()).collect();
            applications.insert(
                name.clone(),
                Application {
                    name: name.clone(),
                    charm: charm.to_owned(),
                    channel,
                    origin: raw.charm_origin.clone(),
                    series,
                    config: configs.get(name).cloned().unwrap_or_default(),
                    subordinate_to: raw.subordinate_to.clone(),
                    units,
                    machines: machines_of_app,
                    workload_version: raw.workload_version.clone(),
                },
            );
        }

        // A subordinate has no units of its own; it only inherits the
        // machines of the principal units it is attached to.
        for raw in status.applications.values() {
            for unit in raw.units.values() {
                for sub_unit in unit.subordinates.keys() {
                    let Some(sub_app_name) = sub_unit.rsplit_once('/').map(|(app, _)| app) else {
                        continue;
                    };
                    let Some(sub_app) = applications.get_mut(sub_app_name) else {
                        continue;
                    };
                    sub_app.machines.insert(unit.machine.clone());
                }
            }
        }

        // Hosted-apps index on machines.
        for app in applications.values() {
            for machine_id in &app.machines {
                if let Some(machine) = machines.get_mut(machine_id) {
                    machine.hosted.insert(app.name.clone());
                }
            }
        }

        Ok(Topology {
            model: status.model.name.clone(),
            machines,
            applications,
        })
    }
}
