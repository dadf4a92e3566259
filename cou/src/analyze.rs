//! Turning a topology into a cloud snapshot: derived releases, upgrade
//! scopes, and the cloud-wide current/target pair.
//!
//! Analysis is deterministic and side-effect-free; analyzing the same
//! topology twice yields equal snapshots.

use std::collections::{BTreeMap, BTreeSet};

use cou_juju::Channel;
use itertools::Itertools;
use serde_json::Value;
use tracing::warn;

use crate::catalog::release::{CephRelease, OpenStackRelease, Series};
use crate::catalog::{CharmCategory, ReleaseCatalog, UpgradeScope};
use crate::config::Config;
use crate::errors::{CouError, CouResult};
use crate::topology::{Machine, Topology};

/// One unit with its derived release
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unit {
    /// The unit name
    pub name: String,
    /// The machine hosting it
    pub machine: String,
    /// The workload version it reports
    pub workload_version: String,
    /// Whether it holds leadership
    pub leader: bool,
    /// Running VMs, for hypervisor units
    pub instance_count: Option<u64>,
    /// The release its workload version maps to, when derivable
    pub release: Option<OpenStackRelease>,
}

/// One application with everything analysis derived about it
#[derive(Clone, Debug, PartialEq)]
pub struct Application {
    /// The application name
    pub name: String,
    /// The charm it deploys
    pub charm: String,
    /// The charm's delivery category; `None` for unknown, skipped charms
    pub category: Option<CharmCategory>,
    /// Where it sits in the upgrade ordering; `None` for unknown charms
    pub scope: Option<UpgradeScope>,
    /// The channel the charm tracks
    pub channel: Channel,
    /// Where the charm came from
    pub origin: String,
    /// The base series
    pub series: Series,
    /// The application's effective configuration
    pub config: BTreeMap<String, Value>,
    /// Principals this application rides on
    pub subordinate_to: Vec<String>,
    /// The application's units with derived releases; empty for
    /// subordinates, which own none
    pub units: BTreeMap<String, Unit>,
    /// The machines it occupies
    pub machines: BTreeSet<String>,
    /// The application-level workload version
    pub workload_version: String,
    /// The derived OpenStack release
    pub release: Option<OpenStackRelease>,
    /// The derived ceph release, for ceph-family charms
    pub ceph_release: Option<CephRelease>,
    /// Whether the operator asked to leave this application alone
    pub skipped: bool,
}

impl Application {
    /// Whether this application is a principal.
    pub fn is_principal(&self) -> bool {
        self.subordinate_to.is_empty()
    }
}

/// The immutable result of one analysis
#[derive(Clone, Debug, PartialEq)]
pub struct CloudSnapshot {
    /// The model name
    pub model: String,
    /// All applications, analyzed
    pub applications: BTreeMap<String, Application>,
    /// All machines
    pub machines: BTreeMap<String, Machine>,
    /// The cloud's current release: the minimum across in-scope principals
    pub current: OpenStackRelease,
    /// The release this invocation upgrades to
    pub target: OpenStackRelease,
    /// The base series of the whole deployment
    pub series: Series,
}

/// Analyze one topology against the catalog.
pub fn analyze(
    topology: &Topology,
    catalog: &ReleaseCatalog,
    config: &Config,
) -> CouResult<CloudSnapshot> {
    let series = uniform_series(topology)?;

    let mut applications = BTreeMap::new();
    for (name, app) in &topology.applications {
        let skipped = config.skips(name);
        if skipped && !catalog.known(&app.charm) {
            warn!("skipping '{name}': charm '{}' is not in the release tables", app.charm);
        }
        if !skipped && !catalog.known(&app.charm) {
            return Err(CouError::UnknownCharm {
                charm: app.charm.clone(),
                app: name.clone(),
            });
        }

        let mut analyzed = Application {
            name: name.clone(),
            charm: app.charm.clone(),
            category: catalog.category(&app.charm),
            scope: catalog.classify(&app.charm),
            channel: app.channel.clone(),
            origin: app.origin.clone(),
            series: app.series,
            config: app.config.clone(),
            subordinate_to: app.subordinate_to.clone(),
            units: app
                .units
                .iter()
                .map(|(unit_name, unit)| {
                    (
                        unit_name.clone(),
                        Unit {
                            name: unit.name.clone(),
                            machine: unit.machine.clone(),
                            workload_version: unit.workload_version.clone(),
                            leader: unit.leader,
                            instance_count: unit.instance_count,
                            release: None,
                        },
                    )
                })
                .collect(),
            machines: app.machines.clone(),
            workload_version: app.workload_version.clone(),
            release: None,
            ceph_release: None,
            skipped,
        };

        if !skipped {
            derive_release(&mut analyzed, catalog)?;
        }
        applications.insert(name.clone(), analyzed);
    }

    // Subordinates follow the principals they are attached to.
    let principal_releases: BTreeMap<String, Option<OpenStackRelease>> = applications
        .iter()
        .map(|(name, app)| (name.clone(), app.release))
        .collect();
    for app in applications.values_mut() {
        if app.is_principal() || app.skipped {
            continue;
        }
        app.release = app
            .subordinate_to
            .iter()
            .filter_map(|principal| principal_releases.get(principal).copied().flatten())
            .min();
    }

    let current = cloud_minimum(&applications)?;
    consistency_check(&applications, current)?;

    let target = match current.next() {
        Some(next) if next.is_supported_on(series) => next,
        _ => {
            return Err(CouError::AlreadyAtFinal {
                release: current,
                series,
            })
        }
    };

    // Not an error, but worth surfacing: the operator deviated from the
    // channel we would have picked for the current release.
    for app in applications.values() {
        if app.skipped || app.release.is_none() {
            continue;
        }
        if let Some(expected) = catalog.target_channel(&app.charm, series, current) {
            if expected.track != app.channel.track {
                warn!(
                    "application '{}' tracks '{}' where '{}' is expected at {}",
                    app.name, app.channel, expected, current
                );
            }
        }
    }

    Ok(CloudSnapshot {
        model: topology.model.clone(),
        applications,
        machines: topology.machines.clone(),
        current,
        target,
        series,
    })
}

/// All applications must agree on the base series; a cloud caught mid
/// series-upgrade is out of scope.
fn uniform_series(topology: &Topology) -> CouResult<Series> {
    let mut found: Option<Series> = None;
    for app in topology.applications.values() {
        match found {
            None => found = Some(app.series),
            Some(series) if series != app.series => {
                return Err(CouError::MixedSeries {
                    first: series,
                    second: app.series,
                })
            }
            Some(_) => {}
        }
    }
    found.ok_or(CouError::NoControlPlane)
}

/// Fill in the per-unit and per-application releases for one application.
fn derive_release(app: &mut Application, catalog: &ReleaseCatalog) -> CouResult<()> {
    match app.category {
        Some(CharmCategory::OpenStackPrincipal) | Some(CharmCategory::Ceph)
            if app.is_principal() =>
        {
            for unit in app.units.values_mut() {
                let release = catalog
                    .release_of(&app.charm, &unit.workload_version)
                    .ok_or_else(|| CouError::UnknownWorkload {
                        app: app.name.clone(),
                        version: unit.workload_version.clone(),
                    })?;
                unit.release = Some(release);
            }
            let releases: BTreeSet<OpenStackRelease> =
                app.units.values().filter_map(|u| u.release).collect();
            if releases.len() > 1 {
                let detail = app
                    .units
                    .values()
                    .filter_map(|u| u.release.map(|r| format!("{}={}", u.name, r)))
                    .join(", ");
                return Err(CouError::MixedReleases {
                    app: app.name.clone(),
                    detail,
                });
            }
            app.release = releases.into_iter().next();
            if app.release.is_none() {
                warn!("'{}' has no units; its release is unknown", app.name);
            }
            if app.category == Some(CharmCategory::Ceph) {
                app.ceph_release = app
                    .units
                    .values()
                    .next()
                    .and_then(|u| catalog.ceph_release_of(&u.workload_version));
            }
        }
        Some(CharmCategory::AuxiliaryPrincipal) | Some(CharmCategory::Special)
            if app.is_principal() =>
        {
            // Auxiliary workload versions do not encode OpenStack releases;
            // the channel track is the best signal available.
            app.release =
                catalog.reverse_track_release(&app.charm, app.series, &app.channel.track);
            if app.release.is_none() {
                warn!(
                    "cannot determine the release of '{}' from channel '{}'",
                    app.name, app.channel
                );
            }
        }
        _ => {}
    }
    Ok(())
}

/// The cloud release: the minimum across OpenStack control-plane principals.
fn cloud_minimum(applications: &BTreeMap<String, Application>) -> CouResult<OpenStackRelease> {
    applications
        .values()
        .filter(|app| {
            !app.skipped
                && app.scope == Some(UpgradeScope::ControlPlanePrincipal)
                && app.category == Some(CharmCategory::OpenStackPrincipal)
        })
        .filter_map(|app| app.release)
        .min()
        .ok_or(CouError::NoControlPlane)
}

/// No in-scope principal may sit more than one release past the minimum.
fn consistency_check(
    applications: &BTreeMap<String, Application>,
    current: OpenStackRelease,
) -> CouResult<()> {
    let limit = current.next();
    for app in applications.values() {
        if app.skipped
            || app.scope != Some(UpgradeScope::ControlPlanePrincipal)
            || app.category != Some(CharmCategory::OpenStackPrincipal)
        {
            continue;
        }
        if let Some(release) = app.release {
            let too_far = match limit {
                Some(limit) => release > limit,
                None => release > current,
            };
            if too_far {
                return Err(CouError::InconsistentCloud {
                    app: app.name.clone(),
                    release,
                    cloud: current,
                });
            }
        }
    }
    Ok(())
}
