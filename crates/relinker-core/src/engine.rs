//! The narrow interface the controller needs from a playback engine.
//!
//! Decoding, output and the gapless hand-over between tracks all happen inside
//! the engine. The controller only loads, pre-queues, seeks and polls.

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::playlist::TrackRef;

/// Things the engine reports without being asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// The current media finished loading; seeks are accepted from now on.
    FileLoaded,
    /// The current media played to its natural end.
    TrackEnded,
    /// The engine process or connection went away.
    EngineLost,
}

pub trait MediaEngine {
    /// Replace whatever is playing with `track`, paused or running.
    fn load(
        &mut self,
        track: &TrackRef,
        paused: bool,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Queue `track` behind the current one so the engine can switch without a gap.
    fn enqueue(&mut self, track: &TrackRef) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Drop everything queued behind the current track.
    fn clear_queue(&mut self) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn play(&mut self) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn pause(&mut self) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Unload the current media.
    fn stop(&mut self) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Absolute seek within the current track.
    fn seek(&mut self, offset_ms: u64) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn position(&mut self) -> impl Future<Output = anyhow::Result<Option<u64>>> + Send;

    fn duration(&mut self) -> impl Future<Output = anyhow::Result<Option<u64>>> + Send;

    /// Location of the media the engine currently holds, as passed to
    /// `load` or `enqueue` ([`TrackRef::key`]). `None` while idle.
    fn current_media(&mut self) -> impl Future<Output = anyhow::Result<Option<String>>> + Send;

    fn set_audio_output(
        &mut self,
        output: AudioOutput,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn shutdown(&mut self) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Audio output back-ends the player can switch between at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioOutput {
    #[default]
    Default,
    Pulse,
    Pipewire,
    Alsa,
    #[serde(rename = "coreaudio")]
    CoreAudio,
    WasapiShared,
    WasapiExclusive,
}

impl AudioOutput {
    pub const ALL: [AudioOutput; 7] = [
        AudioOutput::Default,
        AudioOutput::Pulse,
        AudioOutput::Pipewire,
        AudioOutput::Alsa,
        AudioOutput::CoreAudio,
        AudioOutput::WasapiShared,
        AudioOutput::WasapiExclusive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Pulse => "pulse",
            Self::Pipewire => "pipewire",
            Self::Alsa => "alsa",
            Self::CoreAudio => "coreaudio",
            Self::WasapiShared => "wasapi_shared",
            Self::WasapiExclusive => "wasapi_exclusive",
        }
    }

    /// Next mode in [`AudioOutput::ALL`], wrapping around.
    pub fn next(self) -> Self {
        let pos = Self::ALL.iter().position(|&m| m == self).unwrap_or(0);
        Self::ALL[(pos + 1) % Self::ALL.len()]
    }

    pub fn is_exclusive(self) -> bool {
        self == Self::WasapiExclusive
    }
}

impl fmt::Display for AudioOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown audio output '{0}'")]
pub struct UnknownAudioOutput(pub String);

impl FromStr for AudioOutput {
    type Err = UnknownAudioOutput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| UnknownAudioOutput(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_output_round_trips_through_names() {
        for mode in AudioOutput::ALL {
            assert_eq!(mode.as_str().parse::<AudioOutput>().unwrap(), mode);
        }
    }

    #[test]
    fn unknown_audio_output_is_rejected() {
        let err = "bogus".parse::<AudioOutput>().unwrap_err();
        assert_eq!(err, UnknownAudioOutput("bogus".to_string()));
    }

    #[test]
    fn next_wraps() {
        assert_eq!(AudioOutput::WasapiExclusive.next(), AudioOutput::Default);
        assert_eq!(AudioOutput::Default.next(), AudioOutput::Pulse);
    }
}
