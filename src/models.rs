use serde::{Serialize, Deserialize};
use serde_with::skip_serializing_none;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use std::fmt;

/// What the page should render. Exactly one is active per session.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ViewState {
    #[default]
    Idle,
    Loading { message: String },
    Error { message: String },
    Result { image_uri: String },
}

impl ViewState {
    pub fn is_loading(&self) -> bool { matches!(self, ViewState::Loading { .. }) }

    pub fn image_uri(&self) -> Option<&str> {
        match self {
            ViewState::Result { image_uri } => Some(image_uri),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Returns `None` unless both values are finite and inside WGS84 bounds.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let c = Self { latitude, longitude };
        c.is_valid().then_some(c)
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Base64 image data plus its media type, as handed to the synthesis client.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub data: String,
    pub media_type: String,
}

/// The remembered input of the last generation, replayed by "regenerate".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationRequest {
    FromLocation,
    FromImage(ImagePayload),
}

impl GenerationRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationRequest::FromLocation => "location",
            GenerationRequest::FromImage(_) => "image",
        }
    }
}

/// `data:<media-type>;base64,<payload>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub media_type: String,
    pub data: String,
}

impl DataUri {
    pub fn new(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self { media_type: media_type.into(), data: data.into() }
    }

    /// Only base64 data URIs are understood; anything else yields `None`.
    pub fn parse(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix("data:")?;
        let (header, data) = rest.split_once(',')?;
        let media_type = header.strip_suffix(";base64")?;
        Some(Self { media_type: media_type.to_string(), data: data.to_string() })
    }

    pub fn into_payload(self) -> ImagePayload {
        ImagePayload { data: self.data, media_type: self.media_type }
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.media_type, self.data)
    }
}

/// Outcome of the browser's single current-position request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GeolocationReport {
    Position { latitude: f64, longitude: f64 },
    Error {
        #[serde(default)]
        code: Option<u16>,
        #[serde(default)]
        message: String,
    },
    Unsupported,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct IntakeSnapshot {
    pub preview_uri: Option<String>,
    pub media_type: Option<String>,
    pub file_name: Option<String>,
    pub error: Option<String>,
    pub can_generate: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub view: ViewState,
    pub can_retry: bool,
    pub intake: IntakeSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ShareInfo {
    pub title: String,
    pub text: String,
    pub app_url: String,
    pub twitter_url: String,
    pub facebook_url: String,
}
