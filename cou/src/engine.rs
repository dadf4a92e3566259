//! The step engine.
//!
//! One cooperative scheduler executes the plan tree: sequential groups run
//! children in declared order, parallel groups run them concurrently through
//! a [`FuturesUnordered`][], and every controller call, wait, prompt and
//! backoff sleep is a suspension point. The only shared mutable state is the
//! interrupt counter and the first-failure slot.
//!
//! Interrupts are two-level: the first signal lets running leaves finish but
//! starts nothing new; the second abandons the controller-facing awaits
//! outright. SIGINT and SIGTERM are treated identically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cou_juju::{FullStatus, JujuClient, JujuError, JujuResult};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::catalog::ReleaseCatalog;
use crate::config::Tunables;
use crate::errors::{CouError, CouResult};
use crate::step::{Action, OnFail, Step, StepKind, StepState};

/// The command that refreshes the APT cache and installs package upgrades.
const PACKAGE_UPGRADE_CMD: &str =
    "apt-get update && DEBIAN_FRONTEND=noninteractive apt-get --assume-yes \
     -o Dpkg::Options::=--force-confnew dist-upgrade";

/// The shared interrupt counter.
///
/// Signals and tests raise it; the engine polls it at every suspension point
/// and parks a watcher on it to implement forceful cancellation.
#[derive(Clone)]
pub struct InterruptState {
    tx: Arc<watch::Sender<usize>>,
}

impl InterruptState {
    /// A fresh counter at zero.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0usize);
        InterruptState { tx: Arc::new(tx) }
    }

    /// Record one interrupt; returns how many have been seen.
    pub fn raise(&self) -> usize {
        let mut seen = 0;
        self.tx.send_modify(|count| {
            *count += 1;
            seen = *count;
        });
        seen
    }

    /// Whether at least one interrupt arrived (cooperative stop).
    pub fn soft(&self) -> bool {
        *self.tx.borrow() >= 1
    }

    /// Whether a second interrupt arrived (forceful stop).
    pub fn hard(&self) -> bool {
        *self.tx.borrow() >= 2
    }

    /// Resolves once the second interrupt arrives; pends forever otherwise.
    pub async fn hard_raised(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow_and_update() >= 2 {
                return;
            }
            if rx.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}

impl Default for InterruptState {
    fn default() -> Self {
        InterruptState::new()
    }
}

/// Route SIGINT and SIGTERM into the interrupt counter for the lifetime of
/// the process.
pub fn spawn_signal_listener(interrupts: InterruptState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let (Ok(mut int), Ok(mut term)) = (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) else {
            warn!("failed to install signal handlers; interrupts will be abrupt");
            return;
        };
        loop {
            tokio::select! {
                _ = int.recv() => {}
                _ = term.recv() => {}
            }
            match interrupts.raise() {
                1 => warn!(
                    "interrupt received: letting running steps finish, starting nothing new \
                     (interrupt again to abort immediately)"
                ),
                _ => warn!("second interrupt: aborting running steps"),
            }
        }
    })
}

/// The confirmation gate. The engine only ever asks yes/no questions; a
/// scripted implementation makes the engine testable without a terminal.
pub trait Prompt: Send + Sync {
    /// Ask the operator whether to enter the described subtree.
    fn confirm(&self, description: &str) -> CouResult<bool>;
}

/// A [`Prompt`][] over the controlling terminal.
pub struct ConsolePrompt;

impl Prompt for ConsolePrompt {
    fn confirm(&self, description: &str) -> CouResult<bool> {
        dialoguer::Confirm::new()
            .with_prompt(format!("{description}\nContinue?"))
            .default(false)
            .interact()
            .map_err(|err| CouError::Prompt {
                message: err.to_string(),
            })
    }
}

/// One failed leaf, reported structurally
#[derive(Clone, Debug)]
pub struct Failure {
    /// The failed step's description
    pub description: String,
    /// The application the step was acting on, when known
    pub application: Option<String>,
    /// The unit the step was acting on, when known
    pub unit: Option<String>,
    /// The error kind, from the controller taxonomy
    pub kind: String,
    /// The failure message, verbatim
    pub message: String,
    /// How many retries were spent before giving up
    pub retries: u32,
}

impl Failure {
    /// Fold this failure into the crate error type.
    pub fn into_error(self) -> CouError {
        CouError::StepFailed {
            description: self.description,
            application: self.application,
            unit: self.unit,
            kind: self.kind,
            message: self.message,
            retries: self.retries,
        }
    }
}

/// The terminal state of one step after a run
#[derive(Clone, Debug)]
pub struct StepReport {
    /// The step's description
    pub description: String,
    /// The state it terminated in
    pub state: StepState,
    /// The failure, for failed leaves
    pub failure: Option<Failure>,
    /// Child reports, in plan order
    pub children: Vec<StepReport>,
}

/// How a whole run ended
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every step done
    Done,
    /// At least one step failed
    Failed,
    /// Stopped cooperatively after one interrupt (or a declined prompt)
    CancelledSafely,
    /// Stopped forcefully after a second interrupt
    CancelledAbruptly,
}

/// The result of consuming one plan
#[derive(Debug)]
pub struct RunReport {
    /// How the run ended
    pub outcome: RunOutcome,
    /// The full per-step report tree
    pub root: StepReport,
    /// The first failure observed, verbatim
    pub first_failure: Option<Failure>,
}

/// Executes one plan tree against a controller.
pub struct Runner<'a> {
    client: &'a dyn JujuClient,
    catalog: &'a ReleaseCatalog,
    tunables: Tunables,
    prompt: Option<Arc<dyn Prompt>>,
    interrupts: InterruptState,
    soft_stop: AtomicBool,
    first_failure: Mutex<Option<Failure>>,
}

impl<'a> Runner<'a> {
    /// A runner over the given capability surface. Passing no prompt runs
    /// non-interactively (`--auto-approve`).
    pub fn new(
        client: &'a dyn JujuClient,
        catalog: &'a ReleaseCatalog,
        tunables: Tunables,
        prompt: Option<Arc<dyn Prompt>>,
        interrupts: InterruptState,
    ) -> Self {
        Runner {
            client,
            catalog,
            tunables,
            prompt,
            interrupts,
            soft_stop: AtomicBool::new(false),
            first_failure: Mutex::new(None),
        }
    }

    /// Consume and execute the plan.
    pub async fn run(&self, plan: Step) -> RunReport {
        let root = self.run_step(plan).await;
        let outcome = if self.interrupts.hard() {
            RunOutcome::CancelledAbruptly
        } else if self.interrupts.soft() || self.soft_stop.load(Ordering::SeqCst) {
            RunOutcome::CancelledSafely
        } else {
            match root.state {
                StepState::Failed => RunOutcome::Failed,
                StepState::Aborted => RunOutcome::CancelledAbruptly,
                StepState::Cancelled => RunOutcome::CancelledSafely,
                _ => RunOutcome::Done,
            }
        };
        let first_failure = self.first_failure.lock().expect("poisoned").take();
        RunReport {
            outcome,
            root,
            first_failure,
        }
    }

    fn stopping(&self) -> bool {
        self.interrupts.soft() || self.soft_stop.load(Ordering::SeqCst)
    }

    fn record_failure(&self, failure: &Failure) {
        let mut slot = self.first_failure.lock().expect("poisoned");
        if slot.is_none() {
            *slot = Some(failure.clone());
        }
    }

    async fn confirm(&self, description: &str) -> CouResult<bool> {
        let Some(prompt) = self.prompt.clone() else {
            return Ok(true);
        };
        let description = description.to_owned();
        tokio::task::spawn_blocking(move || prompt.confirm(&description))
            .await
            .map_err(|err| CouError::Prompt {
                message: err.to_string(),
            })?
    }

    fn run_step<'s>(&'s self, step: Step) -> BoxFuture<'s, StepReport> {
        async move {
            if self.interrupts.hard() {
                return skipped_report(&step, StepState::Aborted);
            }
            if self.stopping() {
                return skipped_report(&step, StepState::Cancelled);
            }

            if step.prompt {
                match self.confirm(&step.description).await {
                    Ok(true) => {}
                    Ok(false) => {
                        info!("'{}' declined; stopping after running steps", step.description);
                        self.soft_stop.store(true, Ordering::SeqCst);
                        return skipped_report(&step, StepState::Cancelled);
                    }
                    Err(err) => {
                        let failure = Failure {
                            description: step.description.clone(),
                            application: step.app.clone(),
                            unit: step.unit.clone(),
                            kind: "prompt".to_owned(),
                            message: err.to_string(),
                            retries: 0,
                        };
                        self.record_failure(&failure);
                        let mut report = skipped_report(&step, StepState::Failed);
                        report.failure = Some(failure);
                        return report;
                    }
                }
            }

            let Step {
                description,
                kind,
                parallel,
                app,
                unit,
                ..
            } = step;
            debug!("starting step: {description}");
            match kind {
                StepKind::Leaf(action) => self.run_leaf(description, app, unit, action).await,
                StepKind::Group(children) if parallel => {
                    self.run_parallel(description, children).await
                }
                StepKind::Group(children) => self.run_sequential(description, children).await,
            }
        }
        .boxed()
    }

    async fn run_leaf(
        &self,
        description: String,
        app: Option<String>,
        unit: Option<String>,
        action: Action,
    ) -> StepReport {
        let mut attempt: u32 = 0;
        loop {
            // The select arms only yield values; reports are built after the
            // borrowed futures are dropped.
            let result = tokio::select! {
                biased;
                _ = self.interrupts.hard_raised() => None,
                result = self.execute(&description, &action) => Some(result),
            };
            let Some(result) = result else {
                return StepReport {
                    description,
                    state: StepState::Aborted,
                    failure: None,
                    children: Vec::new(),
                };
            };
            match result {
                Ok(()) => {
                    info!("{description}: done");
                    return StepReport {
                        description,
                        state: StepState::Done,
                        failure: None,
                        children: Vec::new(),
                    };
                }
                Err(err) if err.is_transient() && attempt < self.tunables.model_retries => {
                    attempt += 1;
                    let backoff = self.tunables.retry_backoff * attempt;
                    warn!(
                        "{description}: transient failure (attempt {attempt}/{}), \
                         retrying in {}s: {err}",
                        self.tunables.model_retries,
                        backoff.as_secs()
                    );
                    let aborted = tokio::select! {
                        biased;
                        _ = self.interrupts.hard_raised() => true,
                        _ = tokio::time::sleep(backoff) => false,
                    };
                    if aborted {
                        return StepReport {
                            description,
                            state: StepState::Aborted,
                            failure: None,
                            children: Vec::new(),
                        };
                    }
                }
                Err(err) => {
                    let failure = Failure {
                        description: description.clone(),
                        application: app,
                        unit,
                        kind: error_kind(&err).to_owned(),
                        message: err.to_string(),
                        retries: attempt,
                    };
                    self.record_failure(&failure);
                    warn!("{description}: failed: {err}");
                    return StepReport {
                        description,
                        state: StepState::Failed,
                        failure: Some(failure),
                        children: Vec::new(),
                    };
                }
            }
        }
    }

    async fn run_sequential(&self, description: String, children: Vec<Step>) -> StepReport {
        let mut reports = Vec::with_capacity(children.len());
        let mut parent = StepState::Done;
        let mut skip_rest = false;
        for child in children {
            if skip_rest || parent != StepState::Done {
                reports.push(skipped_report(&child, StepState::Cancelled));
                continue;
            }
            let on_fail = child.on_fail;
            let report = self.run_step(child).await;
            let state = report.state;
            reports.push(report);
            match state {
                StepState::Done => {}
                StepState::Failed => match on_fail {
                    OnFail::Abort => parent = StepState::Failed,
                    OnFail::SkipRemaining => skip_rest = true,
                    OnFail::RecordAndContinue => {}
                },
                StepState::Cancelled => parent = StepState::Cancelled,
                StepState::Aborted => parent = StepState::Aborted,
                StepState::Pending | StepState::Running => {
                    unreachable!("child reports are terminal")
                }
            }
        }
        StepReport {
            description,
            state: parent,
            failure: None,
            children: reports,
        }
    }

    /// Parallel composition: start every child whose sibling dependencies are
    /// met, wait for all of them, never pre-empt a sibling because another
    /// failed. The first non-done result decides the parent's state.
    async fn run_parallel(&self, description: String, children: Vec<Step>) -> StepReport {
        let count = children.len();
        let mut slots: Vec<Option<Step>> = children.into_iter().map(Some).collect();
        let mut reports: Vec<Option<StepReport>> = (0..count).map(|_| None).collect();
        let mut states: Vec<Option<StepState>> = vec![None; count];
        let mut running = FuturesUnordered::new();
        let mut first_non_done: Option<StepState> = None;

        loop {
            if !self.stopping() && !self.interrupts.hard() {
                for idx in 0..count {
                    let deps = match &slots[idx] {
                        Some(pending) => pending.depends_on.clone(),
                        None => continue,
                    };
                    let blocked_forever = deps.iter().any(|dep| {
                        matches!(states.get(*dep).copied().flatten(),
                                 Some(state) if state != StepState::Done)
                    });
                    if blocked_forever {
                        let step = slots[idx].take().expect("slot checked above");
                        states[idx] = Some(StepState::Cancelled);
                        reports[idx] = Some(skipped_report(&step, StepState::Cancelled));
                        continue;
                    }
                    let ready = deps
                        .iter()
                        .all(|dep| states.get(*dep).copied().flatten() == Some(StepState::Done));
                    if ready {
                        let step = slots[idx].take().expect("slot checked above");
                        running.push(async move { (idx, self.run_step(step).await) });
                    }
                }
            }
            let Some((idx, report)) = running.next().await else {
                break;
            };
            states[idx] = Some(report.state);
            if report.state != StepState::Done && first_non_done.is_none() {
                first_non_done = Some(report.state);
            }
            reports[idx] = Some(report);
        }

        // Children that never got to start (stop requested, unsatisfiable
        // dependencies) terminate as cancelled.
        for idx in 0..count {
            if let Some(step) = slots[idx].take() {
                states[idx] = Some(StepState::Cancelled);
                reports[idx] = Some(skipped_report(&step, StepState::Cancelled));
            }
        }

        let any_non_done = states
            .iter()
            .any(|state| *state != Some(StepState::Done));
        let parent = first_non_done.unwrap_or(if any_non_done {
            StepState::Cancelled
        } else {
            StepState::Done
        });
        StepReport {
            description,
            state: parent,
            failure: None,
            children: reports.into_iter().flatten().collect(),
        }
    }

    /// Interpret one action against the capability surface.
    async fn execute(&self, description: &str, action: &Action) -> JujuResult<()> {
        match action {
            Action::SetConfig { app, key, value } => {
                self.quick(self.client.set_config(app, key, value)).await
            }
            Action::UpgradePackages { unit } => {
                let output = self.client.run_on_unit(unit, PACKAGE_UPGRADE_CMD).await?;
                if output.code != 0 {
                    return Err(JujuError::UnitError {
                        unit: unit.clone(),
                        operation: "package upgrade".to_owned(),
                        message: output.stdout.trim().to_owned(),
                    });
                }
                Ok(())
            }
            Action::RefreshCharm { app } => self.client.refresh_charm(app).await,
            Action::SwitchChannel { app, channel } => self.client.set_channel(app, channel).await,
            Action::WaitForIdle { scope, timeout } => {
                self.client.wait_for_idle(scope, *timeout).await
            }
            Action::RunAction {
                unit,
                action,
                params,
            } => {
                let result = self.client.run_action(unit, action, params).await?;
                if !result.completed() {
                    return Err(JujuError::UnitError {
                        unit: unit.clone(),
                        operation: action.clone(),
                        message: format!("action finished as '{}'", result.status),
                    });
                }
                Ok(())
            }
            Action::VerifyWorkload { app, target, units } => {
                self.verify_workload(app, *target, units).await
            }
            Action::VerifyUnitsAtTarget { app, target } => {
                self.verify_workload(app, *target, &[]).await
            }
            Action::VerifyChannel { app, channel } => {
                let status = self.client.status().await?;
                let raw = status
                    .applications
                    .get(app)
                    .ok_or_else(|| JujuError::NotFound {
                        entity: format!("application {app}"),
                    })?;
                let current: cou_juju::Channel = raw.charm_channel.parse()?;
                if current.track != channel.track {
                    return Err(JujuError::UnitError {
                        unit: app.clone(),
                        operation: "verify channel".to_owned(),
                        message: format!(
                            "still tracking '{current}' where '{channel}' is expected"
                        ),
                    });
                }
                Ok(())
            }
            Action::VerifyCephRelease { app, release } => {
                let status = self.client.status().await?;
                let raw = status
                    .applications
                    .get(app)
                    .ok_or_else(|| JujuError::NotFound {
                        entity: format!("application {app}"),
                    })?;
                let version = if raw.workload_version.is_empty() {
                    raw.units
                        .values()
                        .next()
                        .map(|u| u.workload_version.clone())
                        .unwrap_or_default()
                } else {
                    raw.workload_version.clone()
                };
                match self.catalog.ceph_release_of(&version) {
                    Some(observed) if observed >= *release => Ok(()),
                    observed => Err(JujuError::UnitError {
                        unit: app.clone(),
                        operation: "verify ceph release".to_owned(),
                        message: format!(
                            "workload '{version}' maps to {observed:?}, expected '{release}'"
                        ),
                    }),
                }
            }
            Action::VerifyNoVms { unit } => {
                let result = self
                    .client
                    .run_action(unit, "instance-count", &Default::default())
                    .await?;
                let count = result
                    .result_str("instance-count")
                    .and_then(|raw| raw.parse::<u64>().ok())
                    .unwrap_or(0);
                if count > 0 {
                    return Err(JujuError::UnitError {
                        unit: unit.clone(),
                        operation: "verify no VMs".to_owned(),
                        message: format!(
                            "unit hosts {count} running VMs; migrate them or use --force"
                        ),
                    });
                }
                Ok(())
            }
            Action::BackupDatabase => {
                let unit = self.leader_of("mysql-innodb-cluster").await?;
                self.client
                    .run_action(&unit, "mysqldump", &Default::default())
                    .await?;
                Ok(())
            }
            Action::ArchiveData { batch_size } => {
                let unit = self.leader_of("nova-cloud-controller").await?;
                let mut params = std::collections::BTreeMap::new();
                params.insert("batch-size".to_owned(), serde_json::json!(batch_size));
                self.client.run_action(&unit, "archive-data", &params).await?;
                Ok(())
            }
            Action::PurgeData { before } => {
                let unit = self.leader_of("nova-cloud-controller").await?;
                let mut params = std::collections::BTreeMap::new();
                if let Some(before) = before {
                    params.insert("before".to_owned(), serde_json::json!(before));
                }
                self.client.run_action(&unit, "purge-data", &params).await?;
                Ok(())
            }
            Action::EnsureOsdRelease { release } => {
                let status = self.client.status().await?;
                let Some((name, _)) = status
                    .applications
                    .iter()
                    .find(|(_, app)| app.resolved_charm_name() == "ceph-mon")
                else {
                    warn!("no ceph-mon in the model; skipping require-osd-release reconciliation");
                    return Ok(());
                };
                let config = self.quick(self.client.get_config(name)).await?;
                let current = config
                    .get("require-osd-release")
                    .and_then(|value| value.as_str())
                    .unwrap_or_default()
                    .to_owned();
                if current != release.codename() {
                    info!(
                        "setting require-osd-release on '{name}' from '{current}' to '{release}'"
                    );
                    self.quick(self.client.set_config(
                        name,
                        "require-osd-release",
                        release.codename(),
                    ))
                    .await?;
                }
                Ok(())
            }
            Action::Notice => {
                warn!("{description}");
                Ok(())
            }
        }
    }

    /// Bound a quick controller call by the call timeout; expiry counts as
    /// flaky (and is therefore retried), unlike an idle-wait timeout.
    async fn quick<T>(
        &self,
        call: impl std::future::Future<Output = JujuResult<T>>,
    ) -> JujuResult<T> {
        match tokio::time::timeout(self.tunables.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(JujuError::TransientConnection {
                message: format!(
                    "controller call exceeded {}s",
                    self.tunables.call_timeout.as_secs()
                ),
            }),
        }
    }

    async fn fetch_status(&self) -> JujuResult<FullStatus> {
        self.client.status().await
    }

    /// The leader unit (or the first one) of the application deploying the
    /// given charm.
    async fn leader_of(&self, charm: &str) -> JujuResult<String> {
        let status = self.fetch_status().await?;
        for (name, app) in &status.applications {
            if app.resolved_charm_name() != charm {
                continue;
            }
            let unit = app
                .units
                .iter()
                .find(|(_, unit)| unit.leader)
                .map(|(unit_name, _)| unit_name.clone())
                .or_else(|| app.units.keys().next().cloned());
            return unit.ok_or_else(|| JujuError::NotFound {
                entity: format!("units of {name}"),
            });
        }
        Err(JujuError::NotFound {
            entity: format!("an application deploying '{charm}'"),
        })
    }

    /// Re-fetch workload versions and assert the target release was reached.
    async fn verify_workload(
        &self,
        app: &str,
        target: crate::catalog::release::OpenStackRelease,
        unit_filter: &[String],
    ) -> JujuResult<()> {
        let status = self.fetch_status().await?;
        let raw = status
            .applications
            .get(app)
            .ok_or_else(|| JujuError::NotFound {
                entity: format!("application {app}"),
            })?;
        let charm = raw.resolved_charm_name().to_owned();
        for (unit_name, unit) in &raw.units {
            if !unit_filter.is_empty() && !unit_filter.iter().any(|u| u == unit_name) {
                continue;
            }
            match self.catalog.release_of(&charm, &unit.workload_version) {
                Some(release) if release >= target => {}
                _ => {
                    return Err(JujuError::UnitError {
                        unit: unit_name.clone(),
                        operation: "verify workload upgraded".to_owned(),
                        message: format!(
                            "workload version '{}' has not reached '{target}'",
                            unit.workload_version
                        ),
                    })
                }
            }
        }
        Ok(())
    }
}

/// Mark a step and its descendants terminated without running: the step
/// itself with `state`, everything below it as cancelled.
fn skipped_report(step: &Step, state: StepState) -> StepReport {
    StepReport {
        description: step.description.clone(),
        state,
        failure: None,
        children: step
            .children()
            .iter()
            .map(|child| skipped_report(child, StepState::Cancelled))
            .collect(),
    }
}

/// The `error-kind` field of a failure report.
fn error_kind(err: &JujuError) -> &'static str {
    match err {
        JujuError::TransientConnection { .. } => "transient-connection",
        JujuError::UnitError { .. } => "unit-error",
        JujuError::Timeout { .. } => "timeout",
        JujuError::Permission { .. } => "permission",
        JujuError::NotFound { .. } => "not-found",
        JujuError::InvalidChannel { .. } | JujuError::Other { .. } => "other",
    }
}
