//! `golem-core`: shared building blocks for the golem scheduler crates.
//!
//! - [`args::ArgList`]: the ordered, deduplicated multi-value container every
//!   multi-valued tag resolves to.
//! - [`error::GolemError`]: the configuration / parameter / repository error
//!   taxonomy plus the per-iteration signals.
//! - [`config::GolemConfig`]: figment-backed process settings.

pub mod args;
pub mod config;
pub mod error;

pub use args::{ArgList, AsArgs};
pub use config::GolemConfig;
pub use error::{GolemError, Result};
