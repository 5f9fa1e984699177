//! `golem-jobs`: the job model and the windows it is viewed through.
//!
//! A [`Job`] is an immutable description: cadence, loops, tags, inputs and
//! outputs. A [`View`] pairs a job with a requested date range and loop
//! selection and derives the bins and iterations to run. Jobs come from
//! [`JobBuilder`] in code or from TOML definitions through [`JobRegistry`].

pub mod builtin;
pub mod definition;
pub mod job;
pub mod loops;
pub mod registry;
pub mod template;
pub mod view;

pub use definition::JobDefinition;
pub use job::{
    FlowMap, GolemInput, GolemInputSpec, InputSpec, InputTemplate, Job, JobBuilder, JobKey,
    OutputSpec, OutputTemplate, QueryTemplate,
};
pub use loops::{Loop, LoopItem, DEFAULT_LOOP_SEPARATOR};
pub use registry::JobRegistry;
pub use template::Template;
pub use view::{SyncOptions, View};
