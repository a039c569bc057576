use thiserror::Error;

/// Errors raised by the import pipeline.
///
/// Row- and record-level variants (`Relay`, `Decode`, `RecordValidation`, and
/// `Persistence` under the default policy) are logged and counted by the
/// component that hits them. The rest fail the whole invocation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Configuration(String),

    #[error("Failed to sign upload handle for {key}: {message}")]
    Signing { key: String, message: String },

    #[error("Failed to read source object {container}/{key}: {message}")]
    SourceRead {
        container: String,
        key: String,
        message: String,
    },

    #[error("Failed to parse {key}: {message}")]
    Parse { key: String, message: String },

    #[error("Failed to relocate {from} to {to}: {message}")]
    Relocation {
        from: String,
        to: String,
        message: String,
    },

    #[error("Failed to relay row {row} to queue: {message}")]
    Relay { row: usize, message: String },

    #[error("Failed to decode queued record: {0}")]
    Decode(String),

    #[error("Invalid queued record: {0}")]
    RecordValidation(String),

    #[error("Failed to persist record {id}: {message}")]
    Persistence { id: String, message: String },

    #[error("Failed to publish notification: {0}")]
    Notification(String),
}

impl PipelineError {
    /// HTTP-style status for this error
    pub fn status_code(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::Validation(_))
    }

    /// Stable machine-readable code for logs and metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "VALIDATION_ERROR",
            PipelineError::Configuration(_) => "CONFIGURATION_ERROR",
            PipelineError::Signing { .. } => "SIGNING_ERROR",
            PipelineError::SourceRead { .. } => "SOURCE_READ_ERROR",
            PipelineError::Parse { .. } => "PARSE_ERROR",
            PipelineError::Relocation { .. } => "RELOCATION_ERROR",
            PipelineError::Relay { .. } => "RELAY_ERROR",
            PipelineError::Decode(_) => "DECODE_ERROR",
            PipelineError::RecordValidation(_) => "RECORD_VALIDATION_ERROR",
            PipelineError::Persistence { .. } => "PERSISTENCE_ERROR",
            PipelineError::Notification(_) => "NOTIFICATION_ERROR",
        }
    }

    /// Message safe to return to an API client
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::Validation(_) | PipelineError::Configuration(_) => self.to_string(),
            _ => "Internal Server Error".to_string(),
        }
    }
}

/// Render an adapter error with its context chain
pub(crate) fn describe(err: &anyhow::Error) -> String {
    format!("{err:#}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(PipelineError::Validation("x".into()).status_code(), 400);
        assert_eq!(PipelineError::Configuration("x".into()).status_code(), 500);
        assert_eq!(
            PipelineError::Parse {
                key: "intake/a.csv".into(),
                message: "bad".into()
            }
            .status_code(),
            500
        );
    }

    #[test]
    fn test_public_message_hides_internals() {
        let err = PipelineError::Signing {
            key: "intake/a.csv".into(),
            message: "credentials expired".into(),
        };
        assert_eq!(err.public_message(), "Internal Server Error");
        assert_eq!(err.code(), "SIGNING_ERROR");

        let err = PipelineError::Configuration("INTAKE_CONTAINER not set in environment.".into());
        assert_eq!(err.public_message(), "INTAKE_CONTAINER not set in environment.");
    }

    #[test]
    fn test_describe_includes_context() {
        let err = anyhow::anyhow!("connection refused").context("Failed to send");
        assert_eq!(describe(&err), "Failed to send: connection refused");
    }
}
