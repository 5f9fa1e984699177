//! `golem-repo`: the filesystem repository jobs read from and write to.
//!
//! Resolves rendered templates to absolute paths, audits what exists,
//! and runs the per-iteration output lifecycle:
//!
//! ```text
//! prepare_output ──► (user writes outputs) ──► finalize_output
//!        ▲                                          │
//!        └──────────── purge_output ◄───────────────┘
//! ```

pub mod glob;
pub mod repository;

pub use repository::{Audit, OutputAudit, PrepareOptions, Presence, Repository};
