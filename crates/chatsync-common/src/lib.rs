//! Chatsync Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing for the chatsync workspace members:
//!
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//! - **Environment**: typed lookups of environment variables with `.env` support
//! - **Errors**: the [`CommonError`] type returned by both
//!
//! # Example
//!
//! ```no_run
//! use chatsync_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> chatsync_common::Result<()> {
//!     chatsync_common::env::load_dotenv();
//!     init_logging(&LogConfig::from_env()?)?;
//!     Ok(())
//! }
//! ```

pub mod env;
pub mod error;
pub mod logging;

pub use error::{CommonError, Result};
