//! Error types. The `Display` text of each variant is what the page shows.

use thiserror::Error;

use crate::gemini::GeminiError;

pub const UNKNOWN_ERROR: &str = "An unknown error occurred.";

/// Browser `GeolocationPositionError.PERMISSION_DENIED`.
pub const PERMISSION_DENIED_CODE: u16 = 1;

const PERMISSION_DENIED_TEXT: &str = "User denied Geolocation";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("Geolocation is not supported by your browser.")]
    Unsupported,
    #[error("{message}")]
    Platform { code: Option<u16>, message: String },
    #[error("The reported position is outside valid coordinate ranges.")]
    InvalidPosition,
    #[error("No position has been reported yet.")]
    NotReported,
}

impl LocationError {
    /// Structured code first; the message match is only used when the
    /// platform did not send a code.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            LocationError::Platform { code: Some(code), .. } => *code == PERMISSION_DENIED_CODE,
            LocationError::Platform { code: None, message } => message.contains(PERMISSION_DENIED_TEXT),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("API key not found. Please set the GEMINI_API_KEY environment variable.")]
    MissingCredential,
    #[error("Failed to generate avatar. The AI model might be unavailable.")]
    FromText(#[source] GeminiError),
    #[error("Failed to generate avatar from image. The AI model might be unavailable or the image could not be processed.")]
    FromImage(#[source] GeminiError),
}

impl SynthesisError {
    pub fn is_missing_credential(&self) -> bool { matches!(self, SynthesisError::MissingCredential) }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Location permission is required. Please enable location services for this site in your browser settings.")]
    PermissionDenied,
    #[error(transparent)]
    Location(LocationError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error("A generation is already in progress.")]
    Busy,
}

impl From<LocationError> for GenerationError {
    fn from(err: LocationError) -> Self {
        if err.is_permission_denied() { GenerationError::PermissionDenied } else { GenerationError::Location(err) }
    }
}

impl GenerationError {
    /// Never empty, so it can always back an `Error` view.
    pub fn user_message(&self) -> String {
        let msg = self.to_string();
        if msg.trim().is_empty() { UNKNOWN_ERROR.to_string() } else { msg }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntakeError {
    #[error("Please upload a valid image file (e.g., JPG, PNG).")]
    NotAnImage { media_type: String },
    #[error("The selected file is empty.")]
    Empty,
    #[error("The selected image could not be read.")]
    Unreadable,
    #[error("Select an image before generating.")]
    NothingSelected,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShareError {
    #[error("sharing is not supported on this platform")]
    Unsupported,
    #[error("share failed: {0}")]
    Platform(String),
    #[error("clipboard write failed: {0}")]
    Clipboard(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn permission_denied_prefers_structured_code() {
        let denied = LocationError::Platform { code: Some(1), message: "nope".into() };
        assert!(denied.is_permission_denied());
        let timeout = LocationError::Platform { code: Some(3), message: "User denied Geolocation".into() };
        assert!(!timeout.is_permission_denied());
    }

    #[test]
    fn permission_denied_falls_back_to_message_match() {
        let denied = LocationError::Platform { code: None, message: "User denied Geolocation".into() };
        assert!(denied.is_permission_denied());
        let other = LocationError::Platform { code: None, message: "Position unavailable".into() };
        assert!(!other.is_permission_denied());
        assert!(!LocationError::Unsupported.is_permission_denied());
    }

    #[test]
    fn location_errors_classify_into_generation_errors() {
        let err: GenerationError = LocationError::Platform { code: None, message: "User denied Geolocation".into() }.into();
        assert!(matches!(err, GenerationError::PermissionDenied));
        let err: GenerationError = LocationError::Platform { code: Some(2), message: "Position unavailable".into() }.into();
        assert_eq!(err.user_message(), "Position unavailable");
    }

    #[test]
    fn empty_platform_message_becomes_unknown_error() {
        let err: GenerationError = LocationError::Platform { code: Some(2), message: String::new() }.into();
        assert_eq!(err.user_message(), UNKNOWN_ERROR);
    }

    #[test]
    fn missing_credential_is_distinct_from_generation_failure() {
        let missing = SynthesisError::MissingCredential;
        let failed = SynthesisError::FromText(GeminiError::NoImages);
        assert!(missing.is_missing_credential());
        assert!(!failed.is_missing_credential());
        assert_ne!(missing.to_string(), failed.to_string());
    }
}
