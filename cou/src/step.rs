//! The plan is data.
//!
//! A plan is a tree of [`Step`][]s: groups compose sequentially or in
//! parallel, leaves carry a typed [`Action`][]. Building the tree is pure, so
//! plans can be printed and unit-tested without a controller; only the engine
//! interprets actions against one.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use cou_juju::{Channel, IdleScope};
use serde_json::Value;

use crate::catalog::release::{CephRelease, OpenStackRelease};

/// What a failing step does to its parent group
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OnFail {
    /// The parent fails; later siblings are skipped
    #[default]
    Abort,
    /// Later siblings are skipped, but the parent still counts as done
    SkipRemaining,
    /// The failure is recorded and the parent carries on
    RecordAndContinue,
}

/// The effectful procedure behind a leaf step
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Set one config option on an application
    SetConfig {
        /// The application
        app: String,
        /// The option key
        key: String,
        /// The value to set
        value: String,
    },
    /// Refresh the APT cache and install package upgrades on one unit
    UpgradePackages {
        /// The unit to upgrade
        unit: String,
    },
    /// Refresh the charm to the latest revision of its current channel
    RefreshCharm {
        /// The application
        app: String,
    },
    /// Switch the charm to a different channel
    SwitchChannel {
        /// The application
        app: String,
        /// The channel to switch to
        channel: Channel,
    },
    /// Wait for an application or the whole model to go idle
    WaitForIdle {
        /// What to wait on
        scope: IdleScope,
        /// How long to wait before giving up
        timeout: Duration,
    },
    /// Invoke a charm action on one unit
    RunAction {
        /// The unit
        unit: String,
        /// The action name
        action: String,
        /// Action parameters, verbatim
        params: BTreeMap<String, Value>,
    },
    /// Re-fetch workload versions and assert the release was reached
    VerifyWorkload {
        /// The application to verify
        app: String,
        /// The release every unit must have reached
        target: OpenStackRelease,
        /// Restrict the check to these units; empty means all
        units: Vec<String>,
    },
    /// Assert an application's channel reached the given one
    VerifyChannel {
        /// The application to verify
        app: String,
        /// The channel it must track
        channel: Channel,
    },
    /// Assert a ceph application runs the given ceph release
    VerifyCephRelease {
        /// The application to verify
        app: String,
        /// The ceph release it must run
        release: CephRelease,
    },
    /// Assert a hypervisor unit hosts no running VMs
    VerifyNoVms {
        /// The nova-compute unit
        unit: String,
    },
    /// Assert every unit of an application reached the target release
    VerifyUnitsAtTarget {
        /// The application whose units are checked
        app: String,
        /// The release they must have reached
        target: OpenStackRelease,
    },
    /// Dump the MySQL databases via the cluster leader's backup action.
    /// The unit is resolved at execution time.
    BackupDatabase,
    /// Archive deleted database rows via nova-cloud-controller's leader.
    /// The unit is resolved at execution time.
    ArchiveData {
        /// Rows per batch
        batch_size: u32,
    },
    /// Purge stale shadow-table data via nova-cloud-controller's leader.
    /// The unit is resolved at execution time.
    PurgeData {
        /// Only purge rows older than this timestamp, when given
        before: Option<String>,
    },
    /// Reconcile ceph-mon's `require-osd-release` option with a ceph release.
    /// The ceph-mon application is resolved at execution time.
    EnsureOsdRelease {
        /// The ceph release the option must name
        release: CephRelease,
    },
    /// No effect; the description itself is the point (planning warnings)
    Notice,
}

/// A node of the plan tree
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    /// What this step does, in operator-facing words
    pub description: String,
    /// Leaf or group
    pub kind: StepKind,
    /// For groups: run children concurrently instead of in order
    pub parallel: bool,
    /// What a failure here does to the parent
    pub on_fail: OnFail,
    /// Gate this step behind an interactive confirmation
    pub prompt: bool,
    /// Sibling indices that must be done before this child may start
    /// (only meaningful inside a parallel group)
    pub depends_on: Vec<usize>,
    /// The application this step acts on, for failure reports
    pub app: Option<String>,
    /// The unit this step acts on, for failure reports
    pub unit: Option<String>,
}

/// Leaf or group
#[derive(Clone, Debug, PartialEq)]
pub enum StepKind {
    /// An ordered list of children
    Group(Vec<Step>),
    /// An effectful procedure
    Leaf(Action),
}

impl Step {
    /// A sequential group with no children yet.
    pub fn group(description: impl Into<String>) -> Step {
        Step {
            description: description.into(),
            kind: StepKind::Group(Vec::new()),
            parallel: false,
            on_fail: OnFail::Abort,
            prompt: false,
            depends_on: Vec::new(),
            app: None,
            unit: None,
        }
    }

    /// A parallel group with no children yet.
    pub fn parallel_group(description: impl Into<String>) -> Step {
        Step {
            parallel: true,
            ..Step::group(description)
        }
    }

    /// A leaf performing the given action.
    pub fn leaf(description: impl Into<String>, action: Action) -> Step {
        Step {
            description: description.into(),
            kind: StepKind::Leaf(action),
            parallel: false,
            on_fail: OnFail::Abort,
            prompt: false,
            depends_on: Vec::new(),
            app: None,
            unit: None,
        }
    }

    /// Attach the application this step acts on.
    pub fn for_app(mut self, app: impl Into<String>) -> Step {
        self.app = Some(app.into());
        self
    }

    /// Attach the unit this step acts on.
    pub fn for_unit(mut self, unit: impl Into<String>) -> Step {
        self.unit = Some(unit.into());
        self
    }

    /// Gate this step behind a confirmation prompt.
    pub fn gated(mut self) -> Step {
        self.prompt = true;
        self
    }

    /// Append a child to a group. Panics on leaves; that is a planner bug.
    pub fn push(&mut self, child: Step) {
        match &mut self.kind {
            StepKind::Group(children) => children.push(child),
            StepKind::Leaf(_) => unreachable!("cannot add children to a leaf step"),
        }
    }

    /// Prepend a child to a group. Panics on leaves; that is a planner bug.
    pub fn push_front(&mut self, child: Step) {
        match &mut self.kind {
            StepKind::Group(children) => children.insert(0, child),
            StepKind::Leaf(_) => unreachable!("cannot add children to a leaf step"),
        }
    }

    /// The children of a group; empty for leaves.
    pub fn children(&self) -> &[Step] {
        match &self.kind {
            StepKind::Group(children) => children,
            StepKind::Leaf(_) => &[],
        }
    }

    /// Whether this is a group with nothing inside.
    pub fn is_empty_group(&self) -> bool {
        matches!(&self.kind, StepKind::Group(children) if children.is_empty())
    }

    /// Visit this step and every descendant in left-to-right depth-first
    /// order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Step)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{:indent$}{}", "", self.description, indent = depth * 4)?;
        for child in self.children() {
            child.render(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Step {
    /// The indented tree `cou plan` prints.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

/// The lifecycle of a step under execution
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepState {
    /// Not started
    Pending,
    /// Currently executing
    Running,
    /// Finished successfully
    Done,
    /// Finished with a failure
    Failed,
    /// Skipped or stopped cooperatively
    Cancelled,
    /// Stopped forcefully mid-flight
    Aborted,
}

impl StepState {
    /// Whether the step has terminated, successfully or not.
    pub fn is_terminal(self) -> bool {
        !matches!(self, StepState::Pending | StepState::Running)
    }
}
