//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the playback engine
//! every handler drives. The engine owns the database-backed collaborators and
//! the generation provider.

use tutor_core::PlaybackEngine;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: PlaybackEngine,
}
