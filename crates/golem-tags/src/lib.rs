//! `golem-tags`: resolves the tag dictionary of an iteration.
//!
//! [`GolemTags`] turns a [`golem_jobs::View`] into [`Tags`]: built-in time
//! tags, loop selections, user and argument tags, resolved output and input
//! paths ([`GolemOutputs`], [`GolemInputs`]) and flow-query descriptors.

pub mod io;
pub mod resolver;
pub mod value;

pub use io::{upstream_view, GolemInputs, GolemOutputs, ResolvedInput, ResolvedOutput};
pub use resolver::{GolemTags, Resolved, TagContext, Tags};
pub use value::{FlowQuery, TagValue};
