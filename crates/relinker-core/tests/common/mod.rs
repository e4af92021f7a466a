#![allow(dead_code)]

use std::path::{Path, PathBuf};

use relinker_core::engine::{AudioOutput, MediaEngine};
use relinker_core::playlist::{Playlist, PlaylistFormat, Track, TrackRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cmd {
    Load { track: String, paused: bool },
    Enqueue(String),
    ClearQueue,
    Play,
    Pause,
    Stop,
    Seek(u64),
    SetOutput(AudioOutput),
    Shutdown,
}

/// Engine double that records every command it receives.
#[derive(Debug, Default)]
pub struct MockEngine {
    pub commands: Vec<Cmd>,
    pub position: Option<u64>,
    pub duration: Option<u64>,
    pub fail_load: bool,
    /// What `current_media` reports.
    pub media: Option<String>,
    /// When set, `load` leaves the old media in place until `finish_loading`.
    pub slow_loads: bool,
    pub loading: Option<String>,
    pub queue: Vec<String>,
}

impl MockEngine {
    pub fn finish_loading(&mut self) {
        if let Some(next) = self.loading.take() {
            self.media = Some(next);
        }
    }

    /// The engine moves on to its first queued track by itself.
    pub fn advance(&mut self) {
        if !self.queue.is_empty() {
            self.media = Some(self.queue.remove(0));
        }
    }

    pub fn take(&mut self) -> Vec<Cmd> {
        std::mem::take(&mut self.commands)
    }

    pub fn loads(&self) -> Vec<&Cmd> {
        self.commands
            .iter()
            .filter(|c| matches!(c, Cmd::Load { .. }))
            .collect()
    }
}

impl MediaEngine for MockEngine {
    async fn load(&mut self, track: &TrackRef, paused: bool) -> anyhow::Result<()> {
        if self.fail_load {
            anyhow::bail!("mock load failure");
        }
        self.commands.push(Cmd::Load {
            track: track.key(),
            paused,
        });
        if self.slow_loads {
            self.loading = Some(track.key());
        } else {
            self.media = Some(track.key());
        }
        self.position = Some(0);
        self.duration = None;
        Ok(())
    }

    async fn enqueue(&mut self, track: &TrackRef) -> anyhow::Result<()> {
        self.commands.push(Cmd::Enqueue(track.key()));
        self.queue.push(track.key());
        Ok(())
    }

    async fn clear_queue(&mut self) -> anyhow::Result<()> {
        self.commands.push(Cmd::ClearQueue);
        self.queue.clear();
        Ok(())
    }

    async fn play(&mut self) -> anyhow::Result<()> {
        self.commands.push(Cmd::Play);
        Ok(())
    }

    async fn pause(&mut self) -> anyhow::Result<()> {
        self.commands.push(Cmd::Pause);
        Ok(())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        self.commands.push(Cmd::Stop);
        self.media = None;
        Ok(())
    }

    async fn seek(&mut self, offset_ms: u64) -> anyhow::Result<()> {
        self.commands.push(Cmd::Seek(offset_ms));
        self.position = Some(offset_ms);
        Ok(())
    }

    async fn position(&mut self) -> anyhow::Result<Option<u64>> {
        Ok(self.position)
    }

    async fn duration(&mut self) -> anyhow::Result<Option<u64>> {
        Ok(self.duration)
    }

    async fn current_media(&mut self) -> anyhow::Result<Option<String>> {
        Ok(self.media.clone())
    }

    async fn set_audio_output(&mut self, output: AudioOutput) -> anyhow::Result<()> {
        self.commands.push(Cmd::SetOutput(output));
        Ok(())
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.commands.push(Cmd::Shutdown);
        Ok(())
    }
}

/// In-memory playlist of `n` local tracks under `/music/<name>/`.
pub fn playlist(name: &str, n: usize) -> Playlist {
    let dir = PathBuf::from("/music").join(name);
    Playlist {
        path: dir.join(format!("{}.m3u8", name)),
        format: PlaylistFormat::M3u8,
        tracks: (0..n)
            .map(|i| Track::new(TrackRef::Path(dir.join(format!("{:02}.flac", i + 1)))))
            .collect(),
    }
}

pub fn track_key(playlist: &Playlist, index: usize) -> String {
    playlist.tracks[index].location.key()
}

pub fn load_cmd(playlist: &Playlist, index: usize, paused: bool) -> Cmd {
    Cmd::Load {
        track: track_key(playlist, index),
        paused,
    }
}

pub fn write_playlist(dir: &Path, name: &str, tracks: &[&str]) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    for t in tracks {
        std::fs::write(dir.join(t), b"audio").unwrap();
    }
    let path = dir.join(name);
    let mut body = String::from("#EXTM3U\n");
    for t in tracks {
        body.push_str(t);
        body.push('\n');
    }
    std::fs::write(&path, body).unwrap();
    path
}
