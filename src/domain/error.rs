//! Domain error types.
//!
//! Configuration and data problems are fatal and propagate immediately.
//! Numerically degenerate situations (zero volatility, zero-variance return
//! samples, too-short windows) are never errors: they surface as `None` or as
//! floored values at the call site.

/// Top-level error type for trendpilot.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Invalid relationship between parameters (e.g. `fast >= slow`).
    #[error("invalid configuration for {parameter}: {reason}")]
    Configuration { parameter: String, reason: String },

    /// The supplied price series violates an input invariant.
    #[error("invalid price data: {reason}")]
    Data { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn configuration(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Configuration {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub fn data(reason: impl Into<String>) -> Self {
        PipelineError::Data {
            reason: reason.into(),
        }
    }
}

impl From<&PipelineError> for std::process::ExitCode {
    fn from(err: &PipelineError) -> Self {
        let code: u8 = match err {
            PipelineError::Io(_) => 1,
            PipelineError::ConfigParse { .. }
            | PipelineError::ConfigMissing { .. }
            | PipelineError::ConfigInvalid { .. } => 2,
            PipelineError::Data { .. } => 3,
            PipelineError::Configuration { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_message() {
        let err = PipelineError::configuration("macd", "fast window must be below slow window");
        assert_eq!(
            err.to_string(),
            "invalid configuration for macd: fast window must be below slow window"
        );
    }

    #[test]
    fn data_error_message() {
        let err = PipelineError::data("duplicate timestamp 2024-01-02");
        assert_eq!(
            err.to_string(),
            "invalid price data: duplicate timestamp 2024-01-02"
        );
    }

    #[test]
    fn config_missing_message() {
        let err = PipelineError::ConfigMissing {
            section: "overlay".into(),
            key: "effective_date".into(),
        };
        assert_eq!(err.to_string(), "missing config key [overlay] effective_date");
    }

    #[test]
    fn io_error_is_transparent() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PipelineError = io.into();
        assert_eq!(err.to_string(), "gone");
    }
}
