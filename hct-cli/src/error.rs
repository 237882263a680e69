//! CLI-specific error types and exit code mapping

use hct_core::error::HctError;
use hct_tracker::TrackerError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// JSON serialisation or parsing failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from hct-core.
    #[error("{0}")]
    Core(#[from] HctError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                |
    /// |------|------------------------|
    /// | 0    | Success                |
    /// | 1    | General / command error |
    /// | 2    | Configuration error     |
    /// | 10   | IO error                |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(HctError::Config(_)) => 2,
            Self::Io(_) | Self::Core(HctError::Io(_)) => 10,
            Self::Command(_) | Self::Json(_) | Self::Core(_) => 1,
        }
    }
}

impl From<TrackerError> for CliError {
    fn from(e: TrackerError) -> Self {
        Self::Core(e.into())
    }
}

impl From<hct_core::error::CodecError> for CliError {
    fn from(e: hct_core::error::CodecError) -> Self {
        Self::Command(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hct_core::error::{ConfigError, TransportError};

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("bad".to_owned());
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_core_config_error() {
        let err: CliError = HctError::Config(ConfigError::FileNotFound {
            path: "hct.toml".to_owned(),
        })
        .into();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        assert_eq!(CliError::Io(io_err).exit_code(), 10);
    }

    #[test]
    fn test_exit_code_command_error() {
        assert_eq!(CliError::Command("failed".to_owned()).exit_code(), 1);
        let err: CliError = HctError::Transport(TransportError::ChannelClosed).into();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_tracker_config_error_maps_to_config_exit_code() {
        let err: CliError = TrackerError::Config {
            field: "session_expiration".to_owned(),
            reason: "must be greater than 0".to_owned(),
        }
        .into();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("session_expiration"));
    }

    #[test]
    fn test_error_display_command() {
        let err = CliError::Command("execution failed".to_owned());
        assert_eq!(err.to_string(), "execution failed");
    }
}
