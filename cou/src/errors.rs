//! The error taxonomy, and how it maps onto exit codes.
//!
//! Configuration and inconsistency errors are reported before any upgrade
//! operation runs (exit 1); a failure while executing the plan exits 2;
//! cancellation is not an error but is reported through the same channel so
//! `main` has a single place to derive the process exit code (130 after one
//! interrupt, 137 after two).

use miette::Diagnostic;
use thiserror::Error;

use crate::catalog::release::{OpenStackRelease, Series};

/// An alias for the common Result type of this crate
pub type CouResult<T> = std::result::Result<T, CouError>;

/// Everything the upgrader can fail with
#[derive(Debug, Error, Diagnostic)]
pub enum CouError {
    /// A controller call failed outside of plan execution
    #[error(transparent)]
    #[diagnostic(transparent)]
    Juju(#[from] cou_juju::JujuError),

    /// random i/o error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// One of the built-in lookup tables failed to parse
    #[error("the built-in table '{name}' is corrupt")]
    #[diagnostic(help("this is a bug in cou, please file an issue"))]
    LookupTable {
        /// Which table failed
        name: &'static str,
        /// The parse failure
        #[source]
        source: csv::Error,
    },

    /// A row in a built-in table carries an unusable value
    #[error("the built-in table '{name}' has an invalid row: {detail}")]
    #[diagnostic(help("this is a bug in cou, please file an issue"))]
    LookupRow {
        /// Which table failed
        name: &'static str,
        /// What was wrong with the row
        detail: String,
    },

    /// `--machine` and `--availability-zone` were combined
    #[error("--machine and --availability-zone cannot be used together")]
    #[diagnostic(help("pick either a machine filter or an availability-zone filter"))]
    ExclusiveFilters,

    /// `--skip-apps` named an application that may not be skipped
    #[error("'{app}' cannot be skipped")]
    #[diagnostic(help("applications that may be skipped: {allowed}"))]
    SkipAppNotAllowed {
        /// The application that was requested
        app: String,
        /// The allow-list, rendered for the operator
        allowed: String,
    },

    /// `--purge-before-date` did not parse
    #[error("'{value}' is not a valid purge date")]
    #[diagnostic(help("expected YYYY-MM-DD, optionally followed by HH:mm or HH:mm:ss"))]
    BadPurgeDate {
        /// The offending input
        value: String,
    },

    /// A machine filter named a machine that hosts no hypervisor
    #[error("machine '{machine}' is not a hypervisor in this model")]
    UnknownMachine {
        /// The machine id from the filter
        machine: String,
    },

    /// An availability-zone filter named an unknown zone
    #[error("availability zone '{zone}' does not exist in this model")]
    UnknownZone {
        /// The zone name from the filter
        zone: String,
    },

    /// The status response was missing a required field
    #[error("application '{app}' has no '{field}' in the controller status")]
    #[diagnostic(help("the model looks unhealthy; check `juju status` by hand"))]
    TopologyField {
        /// The application with the incomplete status
        app: String,
        /// The field that was missing or empty
        field: &'static str,
    },

    /// A principal unit reported no workload version
    #[error("unit '{unit}' of '{app}' reports an empty workload version")]
    #[diagnostic(help("the unit may still be installing; wait for the model to settle"))]
    EmptyWorkloadVersion {
        /// The application owning the unit
        app: String,
        /// The offending unit
        unit: String,
    },

    /// An application's series string is not one we know how to upgrade
    #[error("'{app}' runs on unsupported series '{series}'")]
    UnknownSeries {
        /// The application with the odd series
        app: String,
        /// The series string from the status
        series: String,
    },

    /// Applications disagree on the base series
    #[error("the cloud mixes base series '{first}' and '{second}'")]
    #[diagnostic(help("finish the series upgrade before upgrading OpenStack"))]
    MixedSeries {
        /// One observed series
        first: Series,
        /// The other observed series
        second: Series,
    },

    /// A charm the catalog knows nothing about, and no skip was requested
    #[error("charm '{charm}' of application '{app}' is not a supported OpenStack charm")]
    #[diagnostic(help("cou only upgrades charms in its built-in tables"))]
    UnknownCharm {
        /// The charm name
        charm: String,
        /// The application deploying it
        app: String,
    },

    /// A workload version that matches no interval of its charm
    #[error("cannot derive the OpenStack release of '{app}' from workload version '{version}'")]
    #[diagnostic(help("the workload may predate the supported range, or the charm tables are stale"))]
    UnknownWorkload {
        /// The application
        app: String,
        /// The workload version that failed to match
        version: String,
    },

    /// Units of one application sit at different releases
    #[error("'{app}' has units at mixed OpenStack releases: {detail}")]
    #[diagnostic(help("bring all units of the application to one release before running cou"))]
    MixedReleases {
        /// The application
        app: String,
        /// unit → release pairs, rendered
        detail: String,
    },

    /// A principal is further ahead than one release past the cloud minimum
    #[error("the cloud is inconsistent: '{app}' is at '{release}' while the cloud is at '{cloud}'")]
    #[diagnostic(help("cou upgrades one release at a time; repair the deployment first"))]
    InconsistentCloud {
        /// The application that is ahead
        app: String,
        /// Its release
        release: OpenStackRelease,
        /// The cloud minimum
        cloud: OpenStackRelease,
    },

    /// No release follows the current one on this series
    #[error("the cloud is already at '{release}', the final release supported on '{series}'")]
    #[diagnostic(help("upgrade the base series to continue past this release"))]
    AlreadyAtFinal {
        /// The cloud's current release
        release: OpenStackRelease,
        /// The series that caps it
        series: Series,
    },

    /// No in-scope control-plane principal to derive the cloud release from
    #[error("could not determine the cloud's OpenStack release: no supported control-plane principal found")]
    NoControlPlane,

    /// The confirmation prompt could not be read
    #[error("failed to read the confirmation prompt: {message}")]
    Prompt {
        /// What the terminal reported
        message: String,
    },

    /// A step of the upgrade plan failed
    #[error("upgrade step failed: {description}")]
    #[diagnostic(help("{message}"))]
    StepFailed {
        /// The failed step's description
        description: String,
        /// The application the step was acting on, when known
        application: Option<String>,
        /// The unit the step was acting on, when known
        unit: Option<String>,
        /// The error kind, from the controller taxonomy
        kind: String,
        /// The failure message, verbatim
        message: String,
        /// How many times the step was retried before giving up
        retries: u32,
    },

    /// The run was interrupted by the operator
    #[error("upgrade canceled by the operator")]
    Canceled {
        /// Whether the second, forceful interrupt was used
        aborted: bool,
    },
}

impl CouError {
    /// The process exit code this error maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            CouError::StepFailed { .. } => 2,
            CouError::Canceled { aborted: false } => 130,
            CouError::Canceled { aborted: true } => 137,
            _ => 1,
        }
    }
}
