//! Geo Avatar: turns a location or a photo into a stylized avatar.
//!
//! The [`orchestrator`] drives both generation flows; [`location`] and
//! [`gemini`] talk to the geocoding and image services, [`intake`] handles
//! uploads, [`share`] the share/copy actions, and [`routes`] exposes a
//! session-scoped JSON API to the page.

pub mod config;
pub mod error;
pub mod gemini;
pub mod intake;
pub mod location;
pub mod models;
pub mod orchestrator;
pub mod routes;
pub mod share;

#[cfg(test)]
mod testing;
