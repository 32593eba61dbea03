//! Common infrastructure for the dhcp-helper relay.
//!
//! - [`config`]: interface groups loaded from the relay's JSON configuration
//! - [`shell`]: blocking shell command execution with proper quoting
//! - [`error`]: the shared error type
//!
//! # Example
//!
//! ```ignore
//! use dhcp_helper_common::{
//!     shell::{self, NFT_CMD, shellquote},
//!     HelperResult,
//! };
//!
//! fn delete_chain(chain: &str) -> HelperResult<()> {
//!     let cmd = format!("{} delete chain bridge filter {}", NFT_CMD, shellquote(chain));
//!     shell::run(&cmd)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod shell;

pub use config::{Interface, InterfaceGroup, RelayConfig, DEFAULT_CONFIG_PATH};
pub use error::{HelperError, HelperResult};
