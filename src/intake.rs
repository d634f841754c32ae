//! Uploaded-photo intake: validation, preview, and the payload handed to
//! the image flow.

use base64::Engine;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::IntakeError;
use crate::models::{DataUri, ImagePayload, IntakeSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeSource {
    #[default]
    Picker,
    DragDrop,
}

#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: Option<String>,
    pub media_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Default)]
struct Accepted {
    preview_uri: String,
    media_type: String,
    file_name: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    accepted: Option<Accepted>,
    error: Option<String>,
}

#[derive(Default)]
pub struct ImageIntake {
    state: RwLock<State>,
}

pub fn is_image_type(media_type: &str) -> bool {
    media_type.trim().to_ascii_lowercase().starts_with("image/")
}

impl ImageIntake {
    pub fn new() -> Self { Self::default() }

    /// Picker and drag-drop both land here. A rejected file leaves any
    /// previously accepted image in place.
    pub async fn accept(&self, file: SelectedFile, source: IntakeSource) -> Result<String, IntakeError> {
        match Self::encode(file, source).await {
            Ok(accepted) => {
                let preview = accepted.preview_uri.clone();
                let mut state = self.state.write();
                state.accepted = Some(accepted);
                state.error = None;
                Ok(preview)
            }
            Err(e) => {
                warn!("⚠️ Rejected upload: {:?}", e);
                self.state.write().error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn encode(file: SelectedFile, source: IntakeSource) -> Result<Accepted, IntakeError> {
        if !is_image_type(&file.media_type) {
            return Err(IntakeError::NotAnImage { media_type: file.media_type });
        }
        if file.bytes.is_empty() {
            return Err(IntakeError::Empty);
        }

        info!("📷 Accepting {} ({} bytes) via {:?}", file.media_type, file.bytes.len(), source);
        let bytes = file.bytes;
        let encoded = tokio::task::spawn_blocking(move || base64::engine::general_purpose::STANDARD.encode(&bytes))
            .await
            .map_err(|_| IntakeError::Unreadable)?;

        Ok(Accepted {
            preview_uri: DataUri::new(file.media_type.clone(), encoded).to_string(),
            media_type: file.media_type,
            file_name: file.name,
        })
    }

    /// Base64 after the preview's comma, with the file's declared type.
    pub fn payload(&self) -> Result<ImagePayload, IntakeError> {
        let state = self.state.read();
        let accepted = state.accepted.as_ref().ok_or(IntakeError::NothingSelected)?;
        let (_, data) = accepted.preview_uri.split_once(',').ok_or(IntakeError::Unreadable)?;
        Ok(ImagePayload { data: data.to_string(), media_type: accepted.media_type.clone() })
    }

    pub fn preview(&self) -> Option<String> {
        self.state.read().accepted.as_ref().map(|a| a.preview_uri.clone())
    }

    pub fn error(&self) -> Option<String> { self.state.read().error.clone() }

    pub fn can_generate(&self) -> bool { self.state.read().accepted.is_some() }

    pub fn clear(&self) { *self.state.write() = State::default(); }

    pub fn snapshot(&self) -> IntakeSnapshot {
        let state = self.state.read();
        IntakeSnapshot {
            preview_uri: state.accepted.as_ref().map(|a| a.preview_uri.clone()),
            media_type: state.accepted.as_ref().map(|a| a.media_type.clone()),
            file_name: state.accepted.as_ref().and_then(|a| a.file_name.clone()),
            error: state.error.clone(),
            can_generate: state.accepted.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    fn file(media_type: &str, bytes: &'static [u8]) -> SelectedFile {
        SelectedFile { name: Some("me.png".into()), media_type: media_type.into(), bytes: Bytes::from_static(bytes) }
    }

    #[test]
    fn image_types_are_recognized() {
        assert!(is_image_type("image/png"));
        assert!(is_image_type("IMAGE/JPEG"));
        assert!(!is_image_type("text/plain"));
        assert!(!is_image_type(""));
        assert!(!is_image_type("application/image"));
    }

    #[tokio::test]
    async fn text_file_is_rejected_without_preview() {
        let intake = ImageIntake::new();
        let err = intake.accept(file("text/plain", b"hello"), IntakeSource::Picker).await.unwrap_err();

        assert_eq!(err, IntakeError::NotAnImage { media_type: "text/plain".into() });
        assert_eq!(intake.preview(), None);
        assert_eq!(intake.error().as_deref(), Some("Please upload a valid image file (e.g., JPG, PNG)."));
        assert!(!intake.can_generate());
        assert_eq!(intake.payload(), Err(IntakeError::NothingSelected));
    }

    #[tokio::test]
    async fn png_produces_preview_and_payload() {
        let intake = ImageIntake::new();
        let preview = intake.accept(file("image/png", PNG), IntakeSource::DragDrop).await.unwrap();

        let encoded = base64::engine::general_purpose::STANDARD.encode(PNG);
        assert_eq!(preview, format!("data:image/png;base64,{encoded}"));
        assert!(intake.can_generate());
        assert_eq!(intake.error(), None);
        assert_eq!(intake.payload().unwrap(), ImagePayload { data: encoded, media_type: "image/png".into() });
    }

    #[tokio::test]
    async fn rejection_keeps_earlier_image() {
        let intake = ImageIntake::new();
        intake.accept(file("image/png", PNG), IntakeSource::Picker).await.unwrap();
        intake.accept(file("application/pdf", b"%PDF"), IntakeSource::Picker).await.unwrap_err();

        assert!(intake.can_generate());
        assert!(intake.error().is_some());
        let snap = intake.snapshot();
        assert_eq!(snap.media_type.as_deref(), Some("image/png"));
        assert_eq!(snap.file_name.as_deref(), Some("me.png"));
    }

    #[tokio::test]
    async fn empty_image_is_rejected() {
        let intake = ImageIntake::new();
        let err = intake.accept(file("image/png", b""), IntakeSource::Picker).await.unwrap_err();
        assert_eq!(err, IntakeError::Empty);
        assert!(!intake.can_generate());
    }

    #[tokio::test]
    async fn clear_forgets_everything() {
        let intake = ImageIntake::new();
        intake.accept(file("image/png", PNG), IntakeSource::Picker).await.unwrap();
        intake.clear();
        assert_eq!(intake.snapshot(), IntakeSnapshot::default());
    }
}
