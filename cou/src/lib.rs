#![deny(missing_docs)]

//! # cou
//!
//! Charmed OpenStack Upgrader: reads the live topology of a Juju-managed
//! OpenStack cloud, determines the current release, derives the totally
//! ordered plan that moves the cloud to the next one, and executes that plan
//! with controlled concurrency, confirmation gates and safe interruption.
//!
//! The pipeline is deliberately staged: [`topology`][] performs every
//! controller round-trip up front, [`analyze`][] and [`plan`][] are pure over
//! that snapshot, and only [`engine`][] (through the `cou-juju` capability
//! surface) has side effects.

use std::sync::Arc;

use cou_juju::JujuClient;

pub mod analyze;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod plan;
pub mod step;
pub mod strategy;
pub mod topology;

#[cfg(test)]
mod tests;

use crate::catalog::ReleaseCatalog;
use crate::config::{Config, Tunables};
use crate::engine::{InterruptState, Prompt, RunOutcome, Runner};
use crate::errors::{CouError, CouResult};
use crate::step::Step;
use crate::strategy::PlanContext;

/// Analyze the cloud and build the plan for one invocation.
pub async fn make_plan(
    client: &dyn JujuClient,
    catalog: &ReleaseCatalog,
    config: &Config,
    tunables: &Tunables,
) -> CouResult<Step> {
    config.validate()?;
    let topology = topology::Topology::load(client).await?;
    let snapshot = analyze::analyze(&topology, catalog, config)?;
    let ctx = PlanContext {
        snapshot: &snapshot,
        catalog,
        config,
        tunables,
    };
    plan::build_plan(&ctx)
}

/// `cou plan`: analyze the cloud and print the plan.
pub async fn do_plan(
    client: &dyn JujuClient,
    config: &Config,
    tunables: &Tunables,
) -> CouResult<()> {
    let catalog = ReleaseCatalog::bundled()?;
    let plan = make_plan(client, &catalog, config, tunables).await?;
    print!("{plan}");
    Ok(())
}

/// `cou upgrade`: analyze, plan, then execute.
pub async fn do_upgrade(
    client: &dyn JujuClient,
    config: &Config,
    tunables: &Tunables,
    prompt: Option<Arc<dyn Prompt>>,
    interrupts: InterruptState,
) -> CouResult<()> {
    let catalog = ReleaseCatalog::bundled()?;
    let plan = make_plan(client, &catalog, config, tunables).await?;
    print!("{plan}");

    // A signal that arrived while we were still planning means: don't start.
    if interrupts.soft() {
        return Err(CouError::Canceled { aborted: false });
    }

    let runner = Runner::new(client, &catalog, *tunables, prompt, interrupts);
    let report = runner.run(plan).await;
    match report.outcome {
        RunOutcome::Done => {
            println!("{}", console::style("Upgrade completed.").green().bold());
            Ok(())
        }
        RunOutcome::CancelledSafely => Err(CouError::Canceled { aborted: false }),
        RunOutcome::CancelledAbruptly => Err(CouError::Canceled { aborted: true }),
        RunOutcome::Failed => Err(report
            .first_failure
            .map(engine::Failure::into_error)
            .unwrap_or(CouError::StepFailed {
                description: "upgrade plan".to_owned(),
                application: None,
                unit: None,
                kind: "other".to_owned(),
                message: "a step failed without a report".to_owned(),
                retries: 0,
            })),
    }
}
