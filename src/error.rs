/// authload error types
use thiserror::Error;

/// Errors raised while setting up or reporting on a load test.
///
/// Per-request problems never surface here: actions fold them into an
/// [`ActionOutcome`](crate::actions::ActionOutcome) so one virtual user
/// cannot abort the run.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Configuration rejected before the run starts
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A weighted task table with no selectable entry
    #[error("Invalid task weights: {reason}")]
    InvalidWeights { reason: String },

    /// Unknown scenario name on the command line
    #[error("Unknown scenario '{name}' (expected one of: {expected})")]
    UnknownScenario { name: String, expected: String },

    /// HTTP client could not be constructed
    #[error("HTTP client setup failed: {0}")]
    ClientSetup(#[from] reqwest::Error),

    /// Report could not be written
    #[error("Report output failed for {path}: {source}")]
    ReportIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Report could not be serialized
    #[error("Report serialization failed: {0}")]
    ReportEncode(#[from] serde_json::Error),

    /// Mock server failed to bind or serve
    #[error("Mock server error: {0}")]
    Server(String),
}

impl LoadError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Errors that happen below the HTTP status line: the request never got a
/// usable response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("response body could not be decoded: {0}")]
    Decode(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Short label used to group transport failures in metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Connect(_) => "connect",
            Self::Decode(_) => "decode",
            Self::Request(_) => "request",
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_display() {
        let err = LoadError::invalid_config("users must be greater than zero");
        let msg = err.to_string();
        assert!(msg.contains("Invalid configuration"));
        assert!(msg.contains("users must be greater than zero"));
    }

    #[test]
    fn test_unknown_scenario_lists_choices() {
        let err = LoadError::UnknownScenario {
            name: "checkout".to_string(),
            expected: "profile, auth, smoke".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("checkout"));
        assert!(msg.contains("profile, auth, smoke"));
    }

    #[test]
    fn test_transport_kinds() {
        assert_eq!(TransportError::Timeout("10s".into()).kind(), "timeout");
        assert_eq!(TransportError::Connect("refused".into()).kind(), "connect");
        assert_eq!(TransportError::Decode("eof".into()).kind(), "decode");
        assert_eq!(TransportError::Request("reset".into()).kind(), "request");
    }
}
