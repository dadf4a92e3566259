//! Failure classification for controller calls.
//!
//! The retry policy lives in the engine, not here: this module only decides
//! *what kind* of failure a controller call produced.

use miette::Diagnostic;
use thiserror::Error;

/// An alias for the common Result type of this crate
pub type JujuResult<T> = std::result::Result<T, JujuError>;

/// Everything a controller call can fail with
#[derive(Debug, Error, Diagnostic)]
pub enum JujuError {
    /// The controller connection dropped or flaked mid-call
    #[error("lost connection to the controller: {message}")]
    #[diagnostic(help("check that the controller is reachable; transient failures are retried"))]
    TransientConnection {
        /// What the underlying transport reported
        message: String,
    },

    /// A unit-level operation (action, command, hook) failed on the workload
    #[error("unit {unit} failed while running '{operation}'")]
    #[diagnostic(help("{message}"))]
    UnitError {
        /// The unit that reported the failure
        unit: String,
        /// The operation that was being run
        operation: String,
        /// The failure output, verbatim
        message: String,
    },

    /// A wait or call exceeded its deadline
    #[error("timed out after {seconds}s waiting for {what}")]
    Timeout {
        /// What was being waited on
        what: String,
        /// The deadline that expired
        seconds: u64,
    },

    /// The controller rejected the call outright
    #[error("permission denied by the controller: {message}")]
    #[diagnostic(help("check the credentials under $JUJU_DATA"))]
    Permission {
        /// What the controller reported
        message: String,
    },

    /// The named application, unit, or model does not exist
    #[error("{entity} was not found on the controller")]
    NotFound {
        /// The entity that was looked up
        entity: String,
    },

    /// A channel string that is not `track` or `track/risk`
    #[error("'{value}' is not a valid charm channel")]
    #[diagnostic(help("expected 'track' or 'track/risk', e.g. 'victoria/stable'"))]
    InvalidChannel {
        /// The offending input
        value: String,
    },

    /// Anything the classifier could not place
    #[error("controller call failed: {message}")]
    Other {
        /// What the call reported
        message: String,
    },
}

impl JujuError {
    /// Whether the call that produced this error may be retried.
    ///
    /// Only connection-level flakiness qualifies; unit errors, timeouts and
    /// permission failures describe real state and retrying would not help.
    pub fn is_transient(&self) -> bool {
        matches!(self, JujuError::TransientConnection { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_errors_are_transient() {
        assert!(JujuError::TransientConnection {
            message: "reset by peer".into()
        }
        .is_transient());
        assert!(!JujuError::Timeout {
            what: "keystone".into(),
            seconds: 300
        }
        .is_transient());
        assert!(!JujuError::NotFound {
            entity: "application nova-compute".into()
        }
        .is_transient());
    }
}
