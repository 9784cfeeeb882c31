use std::time::Duration;

use thiserror::Error;

/// Failures raised by the deploy flow itself, as opposed to plain I/O or
/// Kubernetes client errors which are carried through `anyhow`.
#[derive(Error, Debug)]
pub enum DeployError {
    /// The operator declined a prompt. This exits the process with status 0.
    #[error("Cancelled by user")]
    Cancelled,
    #[error("Pre-condition for {unit} not met: {reason}")]
    PreconditionFailed { unit: &'static str, reason: String },
    #[error("Timed out after {timeout:?} waiting for {what}")]
    ReadinessTimeout { what: String, timeout: Duration },
    #[error("`{command}` failed: {message}")]
    CommandFailed { command: String, message: String },
    #[error("Unsupported operating system: {0}")]
    UnsupportedOs(String),
    #[error("Expected {expected} VMs with prefix '{prefix}' but found {found}")]
    InventoryMismatch {
        prefix: String,
        expected: u32,
        found: usize,
    },
}

impl DeployError {
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        DeployError::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn precondition(unit: &'static str, reason: impl Into<String>) -> Self {
        DeployError::PreconditionFailed {
            unit,
            reason: reason.into(),
        }
    }
}

/// Returns true if the error chain bottoms out in a user cancellation.
pub fn is_cancellation(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<DeployError>(),
        Some(DeployError::Cancelled)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_detected_through_context() {
        let error = anyhow::Error::new(DeployError::Cancelled).context("Reconciling VMs");
        assert!(is_cancellation(&error));

        let error = anyhow::Error::new(DeployError::precondition("storage", "no labels"));
        assert!(!is_cancellation(&error));
    }
}
