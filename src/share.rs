//! Share and copy actions for a finished avatar. Nothing here touches the
//! orchestrator; every failure ends as a log line or a transient indicator.
//!
//! The share sheet and clipboard belong to the browser, so the HTTP API only
//! serves [`share_info`] links and the downloadable file. [`SharingHelper`]'s
//! `native_share` and `copy_image_uri` are for front ends that own those
//! facilities and plug them in through [`ShareSheet`] and [`Clipboard`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, error};

use crate::error::ShareError;
use crate::models::{DataUri, ShareInfo};

pub const SHARE_TITLE: &str = "My Geo Avatar";
pub const SHARE_TEXT: &str = "Look at this amazing AI avatar I created based on my location! You can create your own too.";
pub const HASHTAGS: &str = "GeoAvatar,AIGeneratedArt,Gemini";
pub const SHARE_FILE_NAME: &str = "geo-avatar.jpg";
pub const COPY_INDICATOR: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareFile {
    pub name: String,
    pub media_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharePayload {
    pub title: String,
    pub text: String,
    pub files: Vec<ShareFile>,
    pub url: Option<String>,
}

/// The platform's native share sheet.
#[async_trait]
pub trait ShareSheet: Send + Sync {
    fn is_available(&self) -> bool;
    fn can_share_files(&self, files: &[ShareFile]) -> bool;
    async fn share(&self, payload: SharePayload) -> Result<(), ShareError>;
}

#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn write_text(&self, text: &str) -> Result<(), ShareError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    Unsupported,
    SharedFile,
    SharedLink,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CopyStatus {
    Copied,
    Failed,
}

impl CopyStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CopyStatus::Copied => "Copied!",
            CopyStatus::Failed => "Failed!",
        }
    }
}

/// Decodes a base64 data URI into a named file.
pub fn data_uri_to_file(image_uri: &str, name: &str) -> Option<ShareFile> {
    let uri = DataUri::parse(image_uri)?;
    match base64::engine::general_purpose::STANDARD.decode(uri.data.as_bytes()) {
        Ok(bytes) => Some(ShareFile { name: name.to_string(), media_type: uri.media_type, bytes: Bytes::from(bytes) }),
        Err(e) => {
            error!("Error converting data URL to file: {}", e);
            None
        }
    }
}

/// File name whose extension matches the image bytes, defaulting to jpg.
pub fn download_name(file: &ShareFile) -> String {
    let ext = image::guess_format(&file.bytes)
        .ok()
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("jpg");
    format!("geo-avatar.{ext}")
}

pub fn share_info(app_url: &str) -> ShareInfo {
    let text = urlencoding::encode(SHARE_TEXT);
    let url = urlencoding::encode(app_url);
    ShareInfo {
        title: SHARE_TITLE.to_string(),
        text: SHARE_TEXT.to_string(),
        app_url: app_url.to_string(),
        twitter_url: format!(
            "https://twitter.com/intent/tweet?text={}&url={}&hashtags={}",
            text, url, urlencoding::encode(HASHTAGS)
        ),
        facebook_url: format!("https://www.facebook.com/sharer/sharer.php?u={}&quote={}", url, text),
    }
}

pub struct SharingHelper {
    sheet: Arc<dyn ShareSheet>,
    clipboard: Arc<dyn Clipboard>,
    app_url: String,
    indicator: Arc<RwLock<Option<CopyStatus>>>,
    indicator_seq: Arc<AtomicU64>,
}

impl SharingHelper {
    pub fn new(sheet: Arc<dyn ShareSheet>, clipboard: Arc<dyn Clipboard>, app_url: impl Into<String>) -> Self {
        Self {
            sheet,
            clipboard,
            app_url: app_url.into(),
            indicator: Arc::default(),
            indicator_seq: Arc::default(),
        }
    }

    pub fn links(&self) -> ShareInfo { share_info(&self.app_url) }

    /// File first when the platform takes files, otherwise (or when that
    /// fails) text plus the app link.
    pub async fn native_share(&self, image_uri: &str) -> ShareOutcome {
        if !self.sheet.is_available() {
            info!("Native share is not available on this platform");
            return ShareOutcome::Unsupported;
        }

        if let Some(file) = data_uri_to_file(image_uri, SHARE_FILE_NAME) {
            let files = vec![file];
            if self.sheet.can_share_files(&files) {
                let payload = SharePayload {
                    title: SHARE_TITLE.to_string(),
                    text: SHARE_TEXT.to_string(),
                    files,
                    url: None,
                };
                match self.sheet.share(payload).await {
                    Ok(()) => return ShareOutcome::SharedFile,
                    Err(e) => error!("Error sharing file: {}", e),
                }
            }
        }

        let payload = SharePayload {
            title: SHARE_TITLE.to_string(),
            text: SHARE_TEXT.to_string(),
            files: Vec::new(),
            url: Some(self.app_url.clone()),
        };
        match self.sheet.share(payload).await {
            Ok(()) => ShareOutcome::SharedLink,
            Err(e) => {
                error!("Error sharing URL: {}", e);
                ShareOutcome::Failed
            }
        }
    }

    /// Sets the indicator and schedules its removal; a later copy resets
    /// the timer.
    pub async fn copy_image_uri(&self, image_uri: &str) -> CopyStatus {
        let status = match self.clipboard.write_text(image_uri).await {
            Ok(()) => CopyStatus::Copied,
            Err(e) => {
                error!("Could not copy image data URL: {}", e);
                CopyStatus::Failed
            }
        };

        let seq = self.indicator_seq.fetch_add(1, Ordering::AcqRel) + 1;
        *self.indicator.write() = Some(status);

        let indicator = self.indicator.clone();
        let current = self.indicator_seq.clone();
        tokio::spawn(async move {
            tokio::time::sleep(COPY_INDICATOR).await;
            if current.load(Ordering::Acquire) == seq {
                *indicator.write() = None;
            }
        });
        status
    }

    pub fn copy_indicator(&self) -> Option<CopyStatus> { *self.indicator.read() }
}
