//! Error types for IOSSM driver operations

use thiserror::Error;

/// Result type alias for IOSSM operations
pub type Result<T> = std::result::Result<T, IossmError>;

/// Errors that can occur while driving the IOSSM sequencer
#[derive(Debug, Error)]
pub enum IossmError {
    /// Mailbox still busy with a previous command past the timeout
    #[error("Mailbox not ready on instance at {csr_base:#x}")]
    NotReady {
        /// CSR base address of the busy instance
        csr_base: u64,
    },

    /// A bounded wait expired
    #[error("Timeout after {timeout_ms}ms waiting for {what}")]
    Timeout {
        /// What was being waited on
        what: String,
        /// Bound in milliseconds
        timeout_ms: u64,
    },

    /// Cross-interface property mismatch
    #[error("Mismatched {property} on instance {instance}: expected {expected}, found {found}")]
    Consistency {
        /// Property that disagreed (memory technology, ECC mode)
        property: &'static str,
        /// Offending instance index
        instance: usize,
        /// Value established by the first interface
        expected: String,
        /// Conflicting value
        found: String,
    },

    /// Calibration retry bound reached without success
    #[error("Calibration failed on instance {instance} interface {interface} after {attempts} attempts")]
    RetryExhausted {
        /// Instance index
        instance: usize,
        /// Interface index within the instance
        interface: usize,
        /// Attempts made
        attempts: usize,
    },

    /// Internal programming error caught before touching hardware
    #[error("Invalid parameter: {reason}")]
    InvalidParameter {
        /// What was out of range
        reason: String,
    },

    /// The sequencer answered, but with something the protocol forbids
    #[error("Invalid response: {reason}")]
    InvalidResponse {
        /// What was wrong with the response
        reason: String,
    },

    /// Register access failed at the backend level
    #[error("Bus error: {reason}")]
    Bus {
        /// Reason for failure
        reason: String,
    },
}

impl IossmError {
    /// Create a timeout error from a wait description and its bound
    pub fn timeout(what: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            reason: reason.into(),
        }
    }

    /// Create an invalid response error
    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }

    /// Create a bus error
    pub fn bus(reason: impl Into<String>) -> Self {
        Self::Bus {
            reason: reason.into(),
        }
    }
}
