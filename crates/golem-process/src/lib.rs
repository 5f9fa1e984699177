//! `golem-process`: runs a job over the iterations of a view.
//!
//! Each iteration checks its inputs, prepares its outputs, is handed to the
//! caller and is then finalized. Signals raised on the way go through a
//! [`SignalHandler`], which skips the iteration or aborts the run.

pub mod handler;
pub mod process;
pub mod report;

pub use handler::{DefaultHandler, SignalHandler};
pub use process::{GolemProcess, Iteration, Iterations, ProcessOptions, RunSummary};
pub use report::{IterationStatus, PathReport};
