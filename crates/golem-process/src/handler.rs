use golem_core::{GolemError, Result};
use golem_jobs::View;
use tracing::debug;

/// Decides what a signal raised during one iteration means for the run.
///
/// Return `Err(GolemError::Ignore)` to skip the iteration, any other `Err`
/// to abort the run, or `Ok(())` to proceed as if nothing was raised.
pub trait SignalHandler: Send + Sync {
    fn handle(&self, signal: GolemError, view: &View) -> Result<()>;
}

/// Skips complete iterations, and incomplete or partial ones when asked to.
/// Everything else aborts with the iteration as context.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHandler {
    pub skip_incomplete: bool,
    pub skip_partial: bool,
}

impl SignalHandler for DefaultHandler {
    fn handle(&self, signal: GolemError, view: &View) -> Result<()> {
        let skip = match &signal {
            GolemError::Complete | GolemError::Ignore => true,
            GolemError::InputMissing { .. } => self.skip_incomplete,
            GolemError::PartialComplete { .. } => self.skip_partial,
            _ => false,
        };
        if skip {
            debug!(iteration = %view, reason = signal.code(), "iteration skipped");
            return Err(GolemError::Ignore);
        }
        Err(signal.in_context(view.describe()))
    }
}
