use serde::Serialize;
use thiserror::Error;

/// Fatal export errors. Anything here aborts the job before a document is
/// delivered.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no sections available to export")]
    NoSectionsRequested,
    #[error("invalid export request: {0}")]
    InvalidRequest(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("document assembly failed: {0}")]
    Assembly(String),
    #[error("scene error: {0}")]
    Scene(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    /// True for errors raised before any capture work starts.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ExportError::NoSectionsRequested
                | ExportError::InvalidRequest(_)
                | ExportError::InvalidConfiguration(_)
        )
    }
}

impl From<lopdf::Error> for ExportError {
    fn from(value: lopdf::Error) -> Self {
        ExportError::Assembly(format!("output pdf failed to parse: {value}"))
    }
}

/// Why one section was left out of the document. Recorded, never raised.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SectionFailure {
    #[error("section not found")]
    NotFound,
    #[error("section has zero width or height")]
    ZeroSize,
    #[error("every capture strategy failed (last tried: {last_strategy})")]
    RasterizationExhausted { last_strategy: String },
    #[error("captured bitmap looks blank ({:.2}% content, last tried: {last_strategy})", content_ratio * 100.0)]
    ContentRejected {
        last_strategy: String,
        content_ratio: f32,
    },
    #[error("export cancelled before this section was captured")]
    Cancelled,
}

impl SectionFailure {
    pub fn code(&self) -> &'static str {
        match self {
            SectionFailure::NotFound => "SECTION_NOT_FOUND",
            SectionFailure::ZeroSize => "SECTION_ZERO_SIZE",
            SectionFailure::RasterizationExhausted { .. } => "RASTERIZATION_EXHAUSTED",
            SectionFailure::ContentRejected { .. } => "CONTENT_REJECTED",
            SectionFailure::Cancelled => "CANCELLED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_classified() {
        assert!(ExportError::NoSectionsRequested.is_configuration_error());
        assert!(ExportError::InvalidRequest("dup".into()).is_configuration_error());
        assert!(!ExportError::Assembly("x".into()).is_configuration_error());
    }

    #[test]
    fn empty_request_message_is_user_facing() {
        assert_eq!(
            ExportError::NoSectionsRequested.to_string(),
            "no sections available to export"
        );
    }

    #[test]
    fn rejected_failure_reports_percentage() {
        let failure = SectionFailure::ContentRejected {
            last_strategy: "low-fidelity".into(),
            content_ratio: 0.001,
        };
        assert!(failure.to_string().contains("0.10%"));
        assert_eq!(failure.code(), "CONTENT_REJECTED");
    }
}
