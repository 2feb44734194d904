//! Error types for the SATB transcription system

use thiserror::Error;

/// Error type for SATB transcription, rendering and service calls
#[derive(Debug, Error)]
pub enum SatbError {
    /// E001: Unsupported or unreadable container/codec
    #[error("E001: Invalid audio format - {0}")]
    InvalidAudioFormat(String),
    /// E002: Unsupported sample rate
    #[error("E002: Unsupported sample rate {0} Hz")]
    UnsupportedSampleRate(u32),
    /// E003: Configuration validation failed
    #[error("E003: Configuration validation failed - {0}")]
    ConfigValidationFailed(String),
    /// E004: Audio file I/O error
    #[error("E004: Audio file I/O error - {0}")]
    AudioFileError(String),
    /// E005: Compressed audio could not be decoded
    #[error("E005: Audio decode error - {0}")]
    DecodeError(String),
    /// E006: STFT processing error
    #[error("E006: STFT processing error - {0}")]
    StftProcessingError(String),
    /// E007: Processing pipeline error (pass ordering, missing products)
    #[error("E007: Processing pipeline error - {0}")]
    ProcessingPipelineError(String),
    /// E008: MIDI export error
    #[error("E008: MIDI export error - {0}")]
    MidiExportError(String),
    /// E010: Audio/PDF rendering error
    #[error("E010: Render error - {0}")]
    RenderError(String),
    /// E011: Analysis export error
    #[error("E011: Analysis export error - {0}")]
    AnalysisExportError(String),
    /// E012: QA artifact generation error
    #[error("E012: QA artifact generation error - {0}")]
    QaGenerationError(String),
    /// E013: Input validation error
    #[error("E013: Input validation error - {0}")]
    InputValidationError(String),
    /// E014: Remote service returned an error
    #[error("E014: Service error - {0}")]
    ServiceError(String),
    /// E015: Credentials for a remote service are not configured
    #[error("E015: Missing credentials - {0}")]
    MissingCredentials(String),
    /// E016: Microphone capture failed
    #[error("E016: Recording error - {0}")]
    RecordingError(String),
}

impl From<std::io::Error> for SatbError {
    fn from(err: std::io::Error) -> Self {
        SatbError::AudioFileError(format!("File I/O error: {}", err))
    }
}

impl From<serde_json::Error> for SatbError {
    fn from(err: serde_json::Error) -> Self {
        SatbError::AnalysisExportError(format!("JSON serialization error: {}", err))
    }
}

impl From<anyhow::Error> for SatbError {
    fn from(err: anyhow::Error) -> Self {
        SatbError::ProcessingPipelineError(format!("Generic error: {}", err))
    }
}

impl From<reqwest::Error> for SatbError {
    fn from(err: reqwest::Error) -> Self {
        SatbError::ServiceError(format!("HTTP error: {}", err))
    }
}

/// Result type alias for SATB operations
pub type Result<T> = std::result::Result<T, SatbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_in_messages() {
        let err = SatbError::UnsupportedSampleRate(4000);
        assert_eq!(err.to_string(), "E002: Unsupported sample rate 4000 Hz");

        let err = SatbError::ServiceError("503 Service Unavailable".to_string());
        assert!(err.to_string().starts_with("E014"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: SatbError = io.into();
        assert!(matches!(err, SatbError::AudioFileError(_)));
    }
}
