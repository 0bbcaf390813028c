use std::path::PathBuf;

/// Why a greedy policy could not be read out of a Q-table
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvergenceFailure {
    /// A state inside the look-back window was visited again
    #[error("loop detected at state #{state} (window {window})")]
    LoopDetected { state: usize, window: usize },
    /// A non-terminal state has no learned action value
    #[error("no learned action for non-terminal state #{state}")]
    NoQualifyingAction { state: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("structural defect: {0}")]
    Structural(String),

    #[error("invalid configuration for `{field}`: {reason}")]
    Configuration { field: &'static str, reason: String },

    #[error("policy extraction failed: {0}")]
    Convergence(#[from] ConvergenceFailure),

    #[error("failed to access {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot encoding error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("action kind {0} has no defined behavior")]
    UnsupportedAction(&'static str),
}

impl Error {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Error::Configuration {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Persistence {
            path: path.into(),
            source,
        }
    }

    pub fn is_convergence(&self) -> bool {
        matches!(self, Error::Convergence(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_message_names_field() {
        let err = Error::config("discount_factor", "must be in [0, 1], got 1.5");
        assert_eq!(
            err.to_string(),
            "invalid configuration for `discount_factor`: must be in [0, 1], got 1.5"
        );
    }

    #[test]
    fn test_convergence_display() {
        let err = Error::Convergence(ConvergenceFailure::LoopDetected { state: 3, window: 2 });
        assert!(err.is_convergence());
        assert!(err.to_string().contains("loop detected at state #3"));
    }

    #[test]
    fn test_convergence_failure_is_an_error() {
        let failure = ConvergenceFailure::NoQualifyingAction { state: 7 };
        let source: &dyn std::error::Error = &failure;
        assert_eq!(source.to_string(), "no learned action for non-terminal state #7");

        let err: Error = failure.clone().into();
        assert!(matches!(err, Error::Convergence(ref f) if *f == failure));
        assert_eq!(
            err.to_string(),
            "policy extraction failed: no learned action for non-terminal state #7"
        );
    }
}
