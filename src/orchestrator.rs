//! The per-session generation state machine.
//!
//! Owns the [`ViewState`] and the last [`GenerationRequest`]. A second
//! generation while one is in flight is rejected with
//! [`GenerationError::Busy`]; `start_over` during a flight wins, and the
//! stale flow's later writes are dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{info, warn, error};

use crate::error::GenerationError;
use crate::gemini::AvatarSynthesizer;
use crate::location::{CoordinateProvider, RegionResolver, UNRESOLVED_REGION};
use crate::models::{GenerationRequest, ImagePayload, ViewState};

pub const FINDING_LOCATION: &str = "Finding you on the map...";
pub const IDENTIFYING_REGION: &str = "Identifying your region...";
pub const ANALYZING_IMAGE: &str = "Analyzing your image...";
pub const PAINTING_AVATAR: &str = "Painting your new avatar...";

pub fn crafting_message(region: &str) -> String {
    format!("Crafting an avatar for {region}...")
}

struct Inner {
    view: ViewState,
    last: Option<GenerationRequest>,
    /// Bumped by every new flight and by `start_over`.
    epoch: u64,
    updated_at: DateTime<Utc>,
}

impl Inner {
    fn set_view(&mut self, view: ViewState) {
        self.view = view;
        self.updated_at = Utc::now();
    }
}

pub struct Orchestrator {
    coordinates: Arc<dyn CoordinateProvider>,
    resolver: Arc<dyn RegionResolver>,
    synthesizer: Arc<dyn AvatarSynthesizer>,
    in_flight: AtomicBool,
    inner: RwLock<Inner>,
}

/// Releases the flight slot and clears a leftover `Loading` view, whether
/// the flow finished or its future was dropped.
struct FlightGuard<'a> {
    orchestrator: &'a Orchestrator,
    epoch: u64,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        {
            let mut inner = self.orchestrator.inner.write();
            if inner.epoch == self.epoch && inner.view.is_loading() {
                warn!("⚠️ Generation abandoned before finishing; returning to idle");
                inner.set_view(ViewState::Idle);
            }
        }
        self.orchestrator.in_flight.store(false, Ordering::Release);
    }
}

impl Orchestrator {
    pub fn new(
        coordinates: Arc<dyn CoordinateProvider>,
        resolver: Arc<dyn RegionResolver>,
        synthesizer: Arc<dyn AvatarSynthesizer>,
    ) -> Self {
        Self {
            coordinates,
            resolver,
            synthesizer,
            in_flight: AtomicBool::new(false),
            inner: RwLock::new(Inner {
                view: ViewState::Idle,
                last: None,
                epoch: 0,
                updated_at: Utc::now(),
            }),
        }
    }

    pub fn view(&self) -> ViewState { self.inner.read().view.clone() }

    pub fn can_retry(&self) -> bool { self.inner.read().last.is_some() }

    pub fn last_request(&self) -> Option<GenerationRequest> { self.inner.read().last.clone() }

    pub fn updated_at(&self) -> DateTime<Utc> { self.inner.read().updated_at }

    pub fn is_busy(&self) -> bool { self.in_flight.load(Ordering::Acquire) }

    pub async fn generate_from_location(&self) -> Result<String, GenerationError> {
        self.run(GenerationRequest::FromLocation).await
    }

    pub async fn generate_from_image(&self, payload: ImagePayload) -> Result<String, GenerationError> {
        self.run(GenerationRequest::FromImage(payload)).await
    }

    /// `None` when there is nothing to replay.
    pub async fn retry_last(&self) -> Option<Result<String, GenerationError>> {
        let last = self.last_request()?;
        info!("🔄 Regenerating from {}", last.kind());
        Some(self.run(last).await)
    }

    pub fn start_over(&self) {
        let mut inner = self.inner.write();
        inner.epoch += 1;
        inner.last = None;
        inner.set_view(ViewState::Idle);
        info!("↩️ Session reset to idle");
    }

    /// Runs one generation flow to a terminal view. The returned value
    /// mirrors what was written to the view.
    pub async fn run(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let guard = self.begin(&request)?;
        let epoch = guard.epoch;

        let outcome = match &request {
            GenerationRequest::FromLocation => self.location_flow(epoch).await,
            GenerationRequest::FromImage(payload) => self.image_flow(epoch, payload).await,
        };

        self.finish(epoch, &outcome);
        drop(guard);
        outcome
    }

    fn begin(&self, request: &GenerationRequest) -> Result<FlightGuard<'_>, GenerationError> {
        if self.in_flight.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            warn!("⏳ Rejected {} generation: another one is in flight", request.kind());
            return Err(GenerationError::Busy);
        }

        let first_stage = match request {
            GenerationRequest::FromLocation => FINDING_LOCATION,
            GenerationRequest::FromImage(_) => ANALYZING_IMAGE,
        };

        let mut inner = self.inner.write();
        inner.epoch += 1;
        inner.last = Some(request.clone());
        inner.set_view(ViewState::Loading { message: first_stage.to_string() });
        info!("🚀 Starting {} generation", request.kind());
        Ok(FlightGuard { orchestrator: self, epoch: inner.epoch })
    }

    fn set_stage(&self, epoch: u64, message: impl Into<String>) {
        let mut inner = self.inner.write();
        if inner.epoch == epoch && inner.view.is_loading() {
            inner.set_view(ViewState::Loading { message: message.into() });
        }
    }

    fn finish(&self, epoch: u64, outcome: &Result<String, GenerationError>) {
        let mut inner = self.inner.write();
        if inner.epoch != epoch {
            info!("🗑️ Discarding result of a superseded generation");
            return;
        }
        match outcome {
            Ok(image_uri) => {
                info!("✅ Avatar ready ({} chars)", image_uri.len());
                inner.set_view(ViewState::Result { image_uri: image_uri.clone() });
            }
            Err(e) => {
                error!("❌ Generation failed: {}", e);
                inner.set_view(ViewState::Error { message: e.user_message() });
            }
        }
    }

    async fn location_flow(&self, epoch: u64) -> Result<String, GenerationError> {
        let coords = self.coordinates.current_position().await.map_err(|e| {
            warn!("⚠️ Could not get coordinates: {}", e);
            GenerationError::from(e)
        })?;

        self.set_stage(epoch, IDENTIFYING_REGION);
        let region = self.resolver.resolve(coords).await;
        let region = if region.trim().is_empty() { UNRESOLVED_REGION.to_string() } else { region };

        self.set_stage(epoch, crafting_message(&region));
        Ok(self.synthesizer.synthesize_from_text(&region).await?)
    }

    async fn image_flow(&self, epoch: u64, payload: &ImagePayload) -> Result<String, GenerationError> {
        let image_uri = self.synthesizer.synthesize_from_image(payload).await?;
        self.set_stage(epoch, PAINTING_AVATAR);
        Ok(image_uri)
    }
}
