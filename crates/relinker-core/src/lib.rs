//! Core of the relinker playlist player: playlist parsing, library scanning,
//! persisted resume positions, the saved-playlists registry and the player
//! controller that drives a [`engine::MediaEngine`].
//!
//! Nothing in here touches the terminal; the `relinker-tui` crate owns the
//! presentation layer and the mpv-backed engine.

pub mod config;
pub mod controller;
pub mod engine;
pub mod persist;
pub mod platform;
pub mod playlist;
pub mod positions;
pub mod registry;
pub mod scanner;
pub mod tags;
