//! Error types for dhcp-helper operations.
//!
//! All errors implement `std::error::Error` via `thiserror`. Failures of the
//! external `nft` tool are represented here too, but the firewall layer
//! logs and absorbs them instead of returning them to its caller.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dhcp-helper operations.
pub type HelperResult<T> = Result<T, HelperError>;

/// Errors that can occur while synchronising kernel network state.
#[derive(Debug, Error)]
pub enum HelperError {
    /// Failed to execute a shell command (spawn error).
    #[error("Failed to execute shell command '{command}': {source}")]
    ShellExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Shell command returned non-zero exit code.
    #[error("Shell command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// The rule file could not be created or written.
    #[error("Temporary rule file error: {source}")]
    TempFile {
        #[source]
        source: io::Error,
    },

    /// Netlink socket operation failed or the kernel rejected the request.
    #[error("Netlink operation failed: {operation}: {message}")]
    Netlink {
        /// The operation that failed.
        operation: String,
        /// Error message (kernel error description where available).
        message: String,
    },

    /// The datagram socket used as an ioctl handle could not be opened.
    #[error("Failed to open control socket: {source}")]
    ControlSocket {
        #[source]
        source: io::Error,
    },

    /// A kernel control request was rejected.
    #[error("Kernel rejected {operation}: {source}")]
    Kernel {
        /// The request that failed (e.g. "SIOCSARP").
        operation: String,
        #[source]
        source: io::Error,
    },

    /// Interface index does not resolve to a name.
    #[error("Interface not found: index {0}")]
    InterfaceNotFound(u32),

    /// Configuration file could not be read.
    #[error("Failed to read configuration {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Another firewall reconfiguration holds the rule file.
    #[error("Firewall reconfiguration already in progress")]
    ReconfigureInProgress,
}

impl HelperError {
    /// Creates a netlink error.
    pub fn netlink(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Netlink {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Creates a kernel rejection error.
    pub fn kernel(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Kernel {
            operation: operation.into(),
            source,
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns true for failures of the external rule tool.
    ///
    /// These are logged where they happen and never fail the caller.
    pub fn is_external_tool(&self) -> bool {
        matches!(
            self,
            HelperError::ShellExec { .. } | HelperError::ShellCommandFailed { .. }
        )
    }

    /// Returns true when a netlink socket could not be created, bound or
    /// connected, as opposed to a request the kernel answered with an error.
    pub fn is_socket_setup(&self) -> bool {
        matches!(
            self,
            HelperError::Netlink { operation, .. }
                if matches!(operation.as_str(), "socket" | "bind" | "connect")
        )
    }
}
