//! Per-charm upgrade strategies.
//!
//! A strategy turns one application into the ordered group of steps that
//! moves it to the target release. Behaviour lives in functions keyed by
//! charm category and name, not in type identity; the planner composes the
//! groups produced here into the cloud-wide plan.

use std::collections::BTreeMap;

use cou_juju::IdleScope;
use serde_json::Value;

use crate::analyze::{Application, CloudSnapshot, Unit};
use crate::catalog::release::CephRelease;
use crate::catalog::{CharmCategory, ReleaseCatalog, UpgradeScope};
use crate::config::{Config, Tunables};
use crate::step::{Action, Step};

/// Everything strategies and the planner need to build steps
pub struct PlanContext<'a> {
    /// The analyzed cloud
    pub snapshot: &'a CloudSnapshot,
    /// The frozen catalog
    pub catalog: &'a ReleaseCatalog,
    /// The invocation options
    pub config: &'a Config,
    /// The environment knobs
    pub tunables: &'a Tunables,
}

/// Restrict an application plan to the units on the given machines, as the
/// hypervisor planner does when building one availability zone.
pub struct UnitScope {
    /// The zone this scope describes, for step descriptions
    pub zone: String,
    /// The machines whose units are in scope
    pub machines: Vec<String>,
}

/// The strategy variants, selected by classification plus name override
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// The canonical OpenStack principal sequence
    OpenStackPrincipal,
    /// Hypervisor-hosting principals, one paused unit at a time
    PausedSingleUnit,
    /// Charm refresh and channel switch only
    Subordinate,
    /// Auxiliary and ceph principals, verified by channel or ceph release
    Auxiliary,
    /// ceph-osd: no channel switch unless the ceph release moves
    CephOsd,
    /// Left alone on operator request
    Skipped,
}

/// Pick the strategy for one application.
pub fn select(app: &Application) -> Strategy {
    if app.skipped {
        return Strategy::Skipped;
    }
    if app.charm == "ceph-osd" {
        return Strategy::CephOsd;
    }
    if app.scope == Some(UpgradeScope::DataPlaneHypervisor) {
        return Strategy::PausedSingleUnit;
    }
    match app.category {
        Some(CharmCategory::OpenStackSubordinate) | Some(CharmCategory::AuxiliarySubordinate) => {
            Strategy::Subordinate
        }
        Some(CharmCategory::AuxiliaryPrincipal)
        | Some(CharmCategory::Special)
        | Some(CharmCategory::Ceph) => Strategy::Auxiliary,
        _ => Strategy::OpenStackPrincipal,
    }
}

/// Build the step group that upgrades one application.
///
/// `scope` restricts a hypervisor-hosting application to one availability
/// zone's units; it is `None` everywhere else.
pub fn app_plan(ctx: &PlanContext<'_>, app: &Application, scope: Option<&UnitScope>) -> Step {
    match select(app) {
        Strategy::Skipped => Step::group(format!(
            "Skip upgrade of '{}': requested via --skip-apps",
            app.name
        )),
        Strategy::Subordinate => subordinate_plan(ctx, app),
        Strategy::Auxiliary => auxiliary_plan(ctx, app),
        Strategy::CephOsd => ceph_osd_plan(ctx, app),
        Strategy::PausedSingleUnit => principal_plan(ctx, app, scope, true),
        Strategy::OpenStackPrincipal => principal_plan(ctx, app, scope, false),
    }
}

fn group_description(ctx: &PlanContext<'_>, app: &Application) -> String {
    format!("Upgrade plan for '{}' to '{}'", app.name, ctx.snapshot.target)
}

fn idle_timeout(ctx: &PlanContext<'_>, app: &Application) -> std::time::Duration {
    if ctx.catalog.is_long_idle(&app.charm) {
        ctx.tunables.long_idle_timeout
    } else {
        ctx.tunables.standard_idle_timeout
    }
}

fn scoped_units<'a>(app: &'a Application, scope: Option<&UnitScope>) -> Vec<&'a Unit> {
    app.units
        .values()
        .filter(|unit| match scope {
            Some(scope) => scope.machines.iter().any(|m| *m == unit.machine),
            None => true,
        })
        .collect()
}

fn config_is_true(config: &BTreeMap<String, Value>, key: &str) -> bool {
    match config.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Steps 1–2 of the canonical sequence: neutralize action-managed upgrades
/// and bring the payload packages up to date.
fn push_preparation(app: &Application, units: &[&Unit], plan: &mut Step) {
    if config_is_true(&app.config, "action-managed-upgrade") {
        plan.push(
            Step::leaf(
                format!("Change 'action-managed-upgrade' of '{}' to 'false'", app.name),
                Action::SetConfig {
                    app: app.name.clone(),
                    key: "action-managed-upgrade".to_owned(),
                    value: "false".to_owned(),
                },
            )
            .for_app(&app.name),
        );
    }
    if !units.is_empty() {
        let mut packages = Step::parallel_group(format!(
            "Upgrade software packages of '{}' from the current APT mirrors",
            app.name
        ));
        for unit in units {
            packages.push(
                Step::leaf(
                    format!("Upgrade software packages on unit '{}'", unit.name),
                    Action::UpgradePackages {
                        unit: unit.name.clone(),
                    },
                )
                .for_app(&app.name)
                .for_unit(&unit.name),
            );
        }
        plan.push(packages);
    }
}

/// Steps 3–4: refresh within the current channel, then let things settle.
fn push_refresh(ctx: &PlanContext<'_>, app: &Application, plan: &mut Step) {
    plan.push(
        Step::leaf(
            format!(
                "Refresh '{}' to the latest revision of '{}'",
                app.name, app.channel
            ),
            Action::RefreshCharm {
                app: app.name.clone(),
            },
        )
        .for_app(&app.name),
    );
    push_wait_app(ctx, app, plan);
}

fn push_wait_app(ctx: &PlanContext<'_>, app: &Application, plan: &mut Step) {
    let timeout = idle_timeout(ctx, app);
    plan.push(
        Step::leaf(
            format!(
                "Wait for up to {}s for '{}' to reach the idle state",
                timeout.as_secs(),
                app.name
            ),
            Action::WaitForIdle {
                scope: IdleScope::Application(app.name.clone()),
                timeout,
            },
        )
        .for_app(&app.name),
    );
}

fn push_wait_model(ctx: &PlanContext<'_>, plan: &mut Step) {
    let timeout = ctx.tunables.long_idle_timeout;
    plan.push(Step::leaf(
        format!(
            "Wait for up to {}s for the model to reach the idle state",
            timeout.as_secs()
        ),
        Action::WaitForIdle {
            scope: IdleScope::Model,
            timeout,
        },
    ));
}

/// Step 5: the channel switch, when the target track differs. The follow-up
/// wait is the caller's to place; hypervisors splice their per-unit subtrees
/// in between. Returns whether a switch was emitted.
fn push_channel_switch(ctx: &PlanContext<'_>, app: &Application, plan: &mut Step) -> bool {
    let Some(target_channel) =
        ctx.catalog
            .target_channel(&app.charm, ctx.snapshot.series, ctx.snapshot.target)
    else {
        return false;
    };
    if target_channel.track == app.channel.track {
        return false;
    }
    let channel = target_channel.with_risk(app.channel.risk);
    plan.push(
        Step::leaf(
            format!(
                "Upgrade '{}' from '{}' to the new channel: '{}'",
                app.name, app.channel, channel
            ),
            Action::SwitchChannel {
                app: app.name.clone(),
                channel,
            },
        )
        .for_app(&app.name),
    );
    true
}

/// Step 7: point the package origin at the target cloud archive.
fn push_origin_change(ctx: &PlanContext<'_>, app: &Application, plan: &mut Step) -> bool {
    let key = ctx.catalog.origin_config_key(&app.charm);
    if !app.config.contains_key(key) {
        return false;
    }
    let value = format!("cloud:{}-{}", ctx.snapshot.series, ctx.snapshot.target);
    plan.push(
        Step::leaf(
            format!("Change '{key}' of '{}' to '{value}'", app.name),
            Action::SetConfig {
                app: app.name.clone(),
                key: key.to_owned(),
                value,
            },
        )
        .for_app(&app.name),
    );
    true
}

/// The canonical OpenStack principal sequence, with the paused-single-unit
/// subtree spliced in after the channel switch for hypervisor hosts.
fn principal_plan(
    ctx: &PlanContext<'_>,
    app: &Application,
    scope: Option<&UnitScope>,
    paused_single_unit: bool,
) -> Step {
    let units = scoped_units(app, scope);
    let mut plan = Step::group(group_description(ctx, app));

    push_preparation(app, &units, &mut plan);
    push_refresh(ctx, app, &mut plan);
    let switched = push_channel_switch(ctx, app, &mut plan);

    // The per-unit subtrees go right after the channel switch, before the
    // application settles.
    if paused_single_unit {
        plan.push(unit_upgrade_group(ctx, app, &units, scope));
    }
    if switched {
        push_wait_app(ctx, app, &mut plan);
    }

    if push_origin_change(ctx, app, &mut plan) {
        push_wait_model(ctx, &mut plan);
    }

    let unit_names = match scope {
        Some(_) => units.iter().map(|u| u.name.clone()).collect(),
        None => Vec::new(),
    };
    plan.push(
        Step::leaf(
            format!(
                "Verify that the workload of '{}' has been upgraded to '{}'",
                app.name, ctx.snapshot.target
            ),
            Action::VerifyWorkload {
                app: app.name.clone(),
                target: ctx.snapshot.target,
                units: unit_names,
            },
        )
        .for_app(&app.name),
    );
    plan
}

/// The per-unit pause/upgrade/resume subtrees, machine by machine: machines
/// run in parallel, units sharing a machine go one at a time.
fn unit_upgrade_group(
    ctx: &PlanContext<'_>,
    app: &Application,
    units: &[&Unit],
    scope: Option<&UnitScope>,
) -> Step {
    let description = match scope {
        Some(scope) => format!(
            "Upgrade the units of '{}' in '{}' one machine at a time",
            app.name, scope.zone
        ),
        None => format!("Upgrade the units of '{}' one machine at a time", app.name),
    };
    let mut by_machine: BTreeMap<&str, Vec<&Unit>> = BTreeMap::new();
    for unit in units.iter().copied() {
        by_machine.entry(unit.machine.as_str()).or_default().push(unit);
    }
    let mut group = Step::parallel_group(description);
    for (machine, machine_units) in by_machine {
        let mut machine_group = Step::group(format!("Upgrade units on machine '{machine}'"));
        for unit in machine_units {
            machine_group.push(unit_subtree(ctx, app, unit));
        }
        group.push(machine_group);
    }
    group
}

/// One hypervisor unit: drain it, upgrade it, put it back.
fn unit_subtree(ctx: &PlanContext<'_>, app: &Application, unit: &Unit) -> Step {
    let manages_scheduler = app.charm == "nova-compute";
    let mut plan = Step::group(format!("Upgrade plan for unit '{}'", unit.name));
    let leaf = |description: String, action: String| {
        Step::leaf(
            description,
            Action::RunAction {
                unit: unit.name.clone(),
                action,
                params: BTreeMap::new(),
            },
        )
        .for_app(&app.name)
        .for_unit(&unit.name)
    };

    if manages_scheduler {
        plan.push(leaf(
            format!("Disable the nova-compute scheduler on unit '{}'", unit.name),
            "disable".to_owned(),
        ));
    }
    if !ctx.config.force {
        plan.push(
            Step::leaf(
                format!("Verify that unit '{}' has no VMs running", unit.name),
                Action::VerifyNoVms {
                    unit: unit.name.clone(),
                },
            )
            .for_app(&app.name)
            .for_unit(&unit.name),
        );
    }
    plan.push(leaf(format!("Pause unit '{}'", unit.name), "pause".to_owned()));
    plan.push(leaf(
        format!(
            "Upgrade the workload of unit '{}' via the 'openstack-upgrade' action",
            unit.name
        ),
        "openstack-upgrade".to_owned(),
    ));
    plan.push(leaf(format!("Resume unit '{}'", unit.name), "resume".to_owned()));
    if manages_scheduler {
        plan.push(leaf(
            format!("Enable the nova-compute scheduler on unit '{}'", unit.name),
            "enable".to_owned(),
        ));
    }
    plan
}

/// Subordinates move with a charm refresh and a channel switch; everything
/// else follows their principal. A subordinate already on the target track
/// needs nothing at all.
fn subordinate_plan(ctx: &PlanContext<'_>, app: &Application) -> Step {
    let mut plan = Step::group(group_description(ctx, app));
    let Some(target_channel) =
        ctx.catalog
            .target_channel(&app.charm, ctx.snapshot.series, ctx.snapshot.target)
    else {
        return plan;
    };
    if target_channel.track == app.channel.track {
        return plan;
    }
    plan.push(
        Step::leaf(
            format!(
                "Refresh '{}' to the latest revision of '{}'",
                app.name, app.channel
            ),
            Action::RefreshCharm {
                app: app.name.clone(),
            },
        )
        .for_app(&app.name),
    );
    if push_channel_switch(ctx, app, &mut plan) {
        push_wait_app(ctx, app, &mut plan);
    }
    plan
}

/// Auxiliary and ceph principals: the canonical sequence, but verified by
/// channel (or ceph release) because their workload versions do not encode
/// OpenStack releases.
fn auxiliary_plan(ctx: &PlanContext<'_>, app: &Application) -> Step {
    let units = scoped_units(app, None);
    let mut plan = Step::group(group_description(ctx, app));

    push_preparation(app, &units, &mut plan);
    push_refresh(ctx, app, &mut plan);
    if push_channel_switch(ctx, app, &mut plan) {
        push_wait_app(ctx, app, &mut plan);
    }
    if push_origin_change(ctx, app, &mut plan) {
        push_wait_model(ctx, &mut plan);
    }

    if app.category == Some(CharmCategory::Ceph) {
        let release = CephRelease::for_openstack(ctx.snapshot.target);
        plan.push(
            Step::leaf(
                format!("Verify that '{}' is running ceph '{release}'", app.name),
                Action::VerifyCephRelease {
                    app: app.name.clone(),
                    release,
                },
            )
            .for_app(&app.name),
        );
    } else {
        let channel = ctx
            .catalog
            .target_channel(&app.charm, ctx.snapshot.series, ctx.snapshot.target)
            .unwrap_or_else(|| app.channel.clone());
        plan.push(
            Step::leaf(
                format!("Verify that '{}' tracks the channel '{channel}'", app.name),
                Action::VerifyChannel {
                    app: app.name.clone(),
                    channel,
                },
            )
            .for_app(&app.name),
        );
    }
    plan
}

/// ceph-osd keeps serving during the package upgrade and only switches
/// channel when the ceph release itself moves.
fn ceph_osd_plan(ctx: &PlanContext<'_>, app: &Application) -> Step {
    let units = scoped_units(app, None);
    let target_ceph = CephRelease::for_openstack(ctx.snapshot.target);
    let mut plan = Step::group(group_description(ctx, app));

    push_preparation(app, &units, &mut plan);
    push_refresh(ctx, app, &mut plan);
    if app.ceph_release != Some(target_ceph) && push_channel_switch(ctx, app, &mut plan) {
        push_wait_app(ctx, app, &mut plan);
    }
    if push_origin_change(ctx, app, &mut plan) {
        push_wait_model(ctx, &mut plan);
    }
    plan.push(
        Step::leaf(
            format!("Verify that '{}' is running ceph '{target_ceph}'", app.name),
            Action::VerifyCephRelease {
                app: app.name.clone(),
                release: target_ceph,
            },
        )
        .for_app(&app.name),
    );
    plan
}
