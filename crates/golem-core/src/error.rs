use thiserror::Error;

/// Every failure the scheduler, resolver, planner and process driver can raise.
///
/// `InputMissing`, `PartialComplete`, `Complete` and `Ignore` are signals:
/// they are routed through a process handler which decides whether the
/// current iteration is skipped or the whole run aborts.
#[derive(Debug, Error)]
pub enum GolemError {
    /// Static job definition problem, raised at construction time.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad value supplied by the host (date range, loop selection, query).
    #[error("Parameter error: {0}")]
    Parameter(String),

    /// Repository root is unusable or a path would escape it.
    #[error("Repository error: {0}")]
    Repository(String),

    /// A required input file is absent for the current iteration.
    #[error("Input missing for {label}: {path}")]
    InputMissing { label: String, path: String },

    /// Some outputs of the current iteration exist and some do not.
    #[error("Partial output: {} present, {} missing (present: {})", present.len(), missing.len(), present.join(" "))]
    PartialComplete {
        present: Vec<String>,
        missing: Vec<String>,
    },

    /// Every output of the current iteration already exists.
    #[error("Output complete")]
    Complete,

    /// Drop the current iteration silently.
    #[error("Iteration ignored")]
    Ignore,

    /// A signal or failure re-raised with the iteration it happened in.
    #[error("{context}: {message}")]
    User { context: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GolemError {
    /// Short error code string used in machine-readable reports.
    pub fn code(&self) -> &'static str {
        match self {
            GolemError::Config(_) => "CONFIG_ERROR",
            GolemError::Parameter(_) => "PARAMETER_ERROR",
            GolemError::Repository(_) => "REPOSITORY_ERROR",
            GolemError::InputMissing { .. } => "INPUT_MISSING",
            GolemError::PartialComplete { .. } => "PARTIAL_COMPLETE",
            GolemError::Complete => "COMPLETE",
            GolemError::Ignore => "IGNORE",
            GolemError::User { .. } => "USER_ERROR",
            GolemError::Serialization(_) => "SERIALIZATION_ERROR",
            GolemError::Io(_) => "IO_ERROR",
        }
    }

    /// True for the recoverable per-iteration outcomes a handler may skip.
    pub fn is_signal(&self) -> bool {
        matches!(
            self,
            GolemError::InputMissing { .. }
                | GolemError::PartialComplete { .. }
                | GolemError::Complete
                | GolemError::Ignore
        )
    }

    /// Wrap this error with the iteration it happened in.
    pub fn in_context(self, context: impl Into<String>) -> Self {
        GolemError::User {
            context: context.into(),
            message: self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GolemError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_are_recognised() {
        assert!(GolemError::Complete.is_signal());
        assert!(GolemError::Ignore.is_signal());
        assert!(GolemError::InputMissing {
            label: "flows".into(),
            path: "/repo/a".into()
        }
        .is_signal());
        assert!(!GolemError::Config("x".into()).is_signal());
    }

    #[test]
    fn context_is_prefixed() {
        let err = GolemError::InputMissing {
            label: "flows".into(),
            path: "/repo/a.rw".into(),
        }
        .in_context("2024-02-12 (sensor=LAB0)");
        assert_eq!(err.code(), "USER_ERROR");
        assert_eq!(
            err.to_string(),
            "2024-02-12 (sensor=LAB0): Input missing for flows: /repo/a.rw"
        );
    }

    #[test]
    fn partial_names_present_files() {
        let err = GolemError::PartialComplete {
            present: vec!["a.out".into()],
            missing: vec!["b.out".into()],
        };
        assert!(err.to_string().contains("a.out"));
    }
}
