//! Assembling the cloud-wide plan from an analyzed snapshot.
//!
//! The ordering contract: control-plane principals (in the fixed priority
//! order), control-plane subordinates, hypervisor zones, remaining data-plane
//! principals, data-plane subordinates, then the ceph post-upgrade
//! reconciliation. Partial-group invocations prune to the chosen group plus
//! the pre/post hooks relevant to it.

use std::collections::{BTreeMap, BTreeSet};

use cou_juju::IdleScope;
use tracing::warn;

use crate::analyze::Application;
use crate::catalog::release::CephRelease;
use crate::catalog::UpgradeScope;
use crate::errors::{CouError, CouResult};
use crate::step::{Action, Step};
use crate::strategy::{self, PlanContext, UnitScope};

/// Build the root plan for one invocation.
pub fn build_plan(ctx: &PlanContext<'_>) -> CouResult<Step> {
    let snapshot = ctx.snapshot;
    let mut root = Step::group(format!(
        "Upgrade cloud from '{}' to '{}'",
        snapshot.current, snapshot.target
    ));

    push_pre_upgrade(ctx, &mut root);

    let colocated = colocated_apps(ctx);

    if ctx.config.group.includes_control_plane() {
        for app in ordered_control_plane_principals(ctx, &colocated) {
            push_app(ctx, app, &mut root);
        }
        for app in ordered_by_name(ctx, UpgradeScope::ControlPlaneSubordinate) {
            push_app(ctx, app, &mut root);
        }
        for app in ordered_by_name(ctx, UpgradeScope::Auxiliary) {
            push_app(ctx, app, &mut root);
        }
    }

    if ctx.config.group.includes_hypervisors() {
        for zone_group in hypervisor_zone_groups(ctx, &colocated)? {
            root.push(zone_group);
        }
    }

    if ctx.config.group.includes_data_plane() {
        let hypervisor_apps: Vec<&Application> = snapshot
            .applications
            .values()
            .filter(|app| !app.skipped && app.scope == Some(UpgradeScope::DataPlaneHypervisor))
            .collect();
        for app in ordered_by_name(ctx, UpgradeScope::DataPlanePrincipal) {
            let mut step = strategy::app_plan(ctx, app, None);
            if app.skipped {
                root.push(step);
                continue;
            }
            if step.is_empty_group() {
                continue;
            }
            // Storage only moves once every hypervisor is done.
            for nova in hypervisor_apps.iter().rev() {
                step.push_front(
                    Step::leaf(
                        format!(
                            "Verify that all '{}' units have been upgraded to '{}'",
                            nova.name, snapshot.target
                        ),
                        Action::VerifyUnitsAtTarget {
                            app: nova.name.clone(),
                            target: snapshot.target,
                        },
                    )
                    .for_app(&nova.name),
                );
            }
            root.push(step.gated());
        }
        for app in ordered_by_name(ctx, UpgradeScope::DataPlaneSubordinate) {
            push_app(ctx, app, &mut root);
        }
        push_post_upgrade(ctx, &mut root);
    }

    Ok(root)
}

/// The cloud pre-upgrade steps: an idle check always, the database
/// housekeeping only when the invocation covers the control plane.
fn push_pre_upgrade(ctx: &PlanContext<'_>, root: &mut Step) {
    root.push(Step::leaf(
        "Verify that all OpenStack applications are in idle state",
        Action::WaitForIdle {
            scope: IdleScope::Model,
            timeout: ctx.tunables.standard_idle_timeout,
        },
    ));
    if !ctx.config.group.includes_control_plane() {
        return;
    }
    if ctx.config.backup {
        root.push(Step::leaf("Back up MySQL databases", Action::BackupDatabase));
    }
    if ctx.config.archive {
        root.push(Step::leaf(
            "Archive old database data",
            Action::ArchiveData {
                batch_size: ctx.config.archive_batch_size,
            },
        ));
    }
    if ctx.config.purge {
        let before = ctx
            .config
            .purge_before
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string());
        let description = match &before {
            Some(ts) => format!("Purge stale shadow table data before '{ts}'"),
            None => "Purge stale shadow table data".to_owned(),
        };
        root.push(Step::leaf(description, Action::PurgeData { before }));
    }
}

/// The ceph reconciliation that closes a data-plane upgrade.
fn push_post_upgrade(ctx: &PlanContext<'_>, root: &mut Step) {
    let has_ceph_osd = ctx
        .snapshot
        .applications
        .values()
        .any(|app| app.charm == "ceph-osd" && !app.skipped);
    if !has_ceph_osd {
        return;
    }
    let release = CephRelease::for_openstack(ctx.snapshot.target);
    root.push(Step::leaf(
        format!("Ensure that 'require-osd-release' on 'ceph-mon' matches '{release}'"),
        Action::EnsureOsdRelease { release },
    ));
}

/// Add one application's subtree to the root, gated behind a prompt.
/// Applications with nothing to do disappear from the plan; skipped ones
/// keep their explanatory (empty) group.
fn push_app(ctx: &PlanContext<'_>, app: &Application, root: &mut Step) {
    let step = strategy::app_plan(ctx, app, None);
    if step.is_empty_group() && !app.skipped {
        return;
    }
    if app.skipped {
        root.push(step);
    } else {
        root.push(step.gated());
    }
}

/// Principals that ride on hypervisor machines and therefore follow the
/// hypervisor schedule rather than the control-plane one.
fn colocated_apps(ctx: &PlanContext<'_>) -> BTreeSet<String> {
    let hypervisor_machines: BTreeSet<&String> = ctx
        .snapshot
        .applications
        .values()
        .filter(|app| app.scope == Some(UpgradeScope::DataPlaneHypervisor))
        .flat_map(|app| app.machines.iter())
        .collect();
    ctx.snapshot
        .applications
        .values()
        .filter(|app| {
            ctx.catalog.is_colocatable(&app.charm)
                && app.machines.iter().any(|m| hypervisor_machines.contains(m))
        })
        .map(|app| app.name.clone())
        .collect()
}

fn ordered_control_plane_principals<'a>(
    ctx: &'a PlanContext<'_>,
    colocated: &BTreeSet<String>,
) -> Vec<&'a Application> {
    let mut apps: Vec<&Application> = ctx
        .snapshot
        .applications
        .values()
        .filter(|app| {
            app.scope == Some(UpgradeScope::ControlPlanePrincipal) && !colocated.contains(&app.name)
        })
        .collect();
    apps.sort_by_key(|app| (ctx.catalog.priority(&app.charm), app.name.clone()));
    apps
}

fn ordered_by_name<'a>(ctx: &'a PlanContext<'_>, scope: UpgradeScope) -> Vec<&'a Application> {
    let mut apps: Vec<&Application> = ctx
        .snapshot
        .applications
        .values()
        .filter(|app| app.scope == Some(scope))
        .collect();
    apps.sort_by_key(|app| app.name.clone());
    apps
}

/// Build one group per availability zone, sorted by zone name. Machines
/// within a zone upgrade in parallel; units sharing a machine go one at a
/// time; a machine hosting VMs is left out with a warning unless `--force`.
fn hypervisor_zone_groups(
    ctx: &PlanContext<'_>,
    colocated: &BTreeSet<String>,
) -> CouResult<Vec<Step>> {
    let snapshot = ctx.snapshot;

    let hypervisor_apps: Vec<&Application> = snapshot
        .applications
        .values()
        .filter(|app| !app.skipped && app.scope == Some(UpgradeScope::DataPlaneHypervisor))
        .collect();

    // machine id → zone, for every machine hosting a hypervisor unit
    let mut zone_of: BTreeMap<String, String> = BTreeMap::new();
    for app in &hypervisor_apps {
        for machine_id in &app.machines {
            let zone = snapshot
                .machines
                .get(machine_id)
                .and_then(|m| m.az.clone())
                .unwrap_or_else(|| "default".to_owned());
            zone_of.insert(machine_id.clone(), zone);
        }
    }

    // Apply the operator's filters before anything else.
    if !ctx.config.machines.is_empty() {
        for wanted in &ctx.config.machines {
            if !zone_of.contains_key(wanted) {
                return Err(CouError::UnknownMachine {
                    machine: wanted.clone(),
                });
            }
        }
        zone_of.retain(|machine, _| ctx.config.machines.contains(machine));
    }
    if !ctx.config.availability_zones.is_empty() {
        let known_zones: BTreeSet<&String> = zone_of.values().collect();
        for wanted in &ctx.config.availability_zones {
            if !known_zones.contains(wanted) {
                return Err(CouError::UnknownZone {
                    zone: wanted.clone(),
                });
            }
        }
        zone_of.retain(|_, zone| ctx.config.availability_zones.contains(zone));
    }

    // Leave out machines with running VMs unless forced.
    let mut vms_on: BTreeMap<String, u64> = BTreeMap::new();
    if !ctx.config.force {
        for app in &hypervisor_apps {
            for unit in app.units.values() {
                let count = unit.instance_count.unwrap_or(0);
                if count > 0 {
                    *vms_on.entry(unit.machine.clone()).or_default() += count;
                }
            }
        }
    }

    let mut zones: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (machine, zone) in &zone_of {
        zones.entry(zone.clone()).or_default().push(machine.clone());
    }

    let mut groups = Vec::new();
    for (zone, machines) in zones {
        let mut group = Step::group(format!(
            "Upgrade plan for '{zone}' to '{}'",
            snapshot.target
        ))
        .gated();

        let mut included = Vec::new();
        for machine in machines {
            match vms_on.get(&machine) {
                Some(count) => {
                    warn!("machine '{machine}' hosts {count} running VMs; leaving it out");
                    group.push(Step::leaf(
                        format!(
                            "Skipping machine '{machine}': it hosts {count} running VMs \
                             (use --force to include it)"
                        ),
                        Action::Notice,
                    ));
                }
                None => included.push(machine),
            }
        }

        if !included.is_empty() {
            let scope = UnitScope {
                zone: zone.clone(),
                machines: included,
            };
            let mut hosted: Vec<&Application> = hypervisor_apps
                .iter()
                .copied()
                .chain(
                    snapshot
                        .applications
                        .values()
                        .filter(|app| colocated.contains(&app.name) && !app.skipped),
                )
                .filter(|app| {
                    app.units
                        .values()
                        .any(|unit| scope.machines.iter().any(|m| *m == unit.machine))
                })
                .collect();
            hosted.sort_by_key(|app| (ctx.catalog.priority(&app.charm), app.name.clone()));
            for app in hosted {
                group.push(strategy::app_plan(ctx, app, Some(&scope)));
            }
        }

        if !group.is_empty_group() {
            groups.push(group);
        }
    }
    Ok(groups)
}
