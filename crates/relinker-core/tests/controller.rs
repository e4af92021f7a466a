mod common;

use std::time::Duration;

use common::{load_cmd, playlist, track_key, Cmd, MockEngine};
use relinker_core::controller::{PlayerController, PlayerState};
use relinker_core::engine::{AudioOutput, EngineEvent};
use relinker_core::positions::PositionStore;

fn controller() -> PlayerController<MockEngine> {
    PlayerController::new(MockEngine::default(), PositionStore::in_memory())
        .with_prefetch_lead(Duration::from_secs(10))
}

/// Open `pl` and bring it to the playing state with the file loaded.
async fn start(c: &mut PlayerController<MockEngine>, pl: relinker_core::playlist::Playlist) {
    c.open(pl).await.unwrap();
    c.on_engine_event(EngineEvent::FileLoaded).await.unwrap();
    c.play().await.unwrap();
}

#[tokio::test]
async fn open_loads_stored_track_and_seeks_after_file_loaded() {
    let pl = playlist("a", 3);
    let mut store = PositionStore::in_memory();
    store.set_track_count(&pl.path, 3);
    store.put(&pl.path, 1, 30_000);
    let mut c = PlayerController::new(MockEngine::default(), store);

    c.open(pl.clone()).await.unwrap();
    assert_eq!(c.state(), PlayerState::Loaded);
    assert_eq!(c.engine().commands, vec![load_cmd(&pl, 1, true)]);

    c.on_engine_event(EngineEvent::FileLoaded).await.unwrap();
    assert_eq!(c.engine().commands.last(), Some(&Cmd::Seek(30_000)));
    let cursor = c.cursor().unwrap();
    assert_eq!((cursor.track_index, cursor.offset_ms), (1, 30_000));
}

#[tokio::test]
async fn fresh_playlist_starts_at_zero_without_seek() {
    let pl = playlist("a", 2);
    let mut c = controller();
    c.open(pl.clone()).await.unwrap();
    c.on_engine_event(EngineEvent::FileLoaded).await.unwrap();
    assert_eq!(c.engine().commands, vec![load_cmd(&pl, 0, true)]);
}

#[tokio::test]
async fn poll_does_not_overwrite_position_while_restore_seek_pending() {
    let pl = playlist("a", 3);
    let mut store = PositionStore::in_memory();
    store.put(&pl.path, 0, 12_000);
    let mut c = PlayerController::new(MockEngine::default(), store);

    c.open(pl.clone()).await.unwrap();
    c.poll().await.unwrap();
    assert_eq!(c.cursor().unwrap().offset_ms, 12_000);
    assert_eq!(c.store().get(&pl.path).offset_ms, 12_000);
}

#[tokio::test]
async fn poll_tracks_engine_position() {
    let pl = playlist("a", 3);
    let mut c = controller();
    start(&mut c, pl.clone()).await;

    c.engine_position(61_500, 200_000);
    c.poll().await.unwrap();
    let cursor = c.cursor().unwrap();
    assert_eq!(cursor.offset_ms, 61_500);
    assert_eq!(cursor.duration_ms, Some(200_000));
    assert_eq!(c.store().get(&pl.path).offset_ms, 61_500);
}

#[tokio::test]
async fn prequeues_next_track_once_near_the_end() {
    let pl = playlist("a", 3);
    let mut c = controller();
    start(&mut c, pl.clone()).await;

    c.engine_position(100_000, 200_000);
    c.poll().await.unwrap();
    assert!(!c.engine().commands.iter().any(|x| matches!(x, Cmd::Enqueue(_))));

    c.engine_position(192_000, 200_000);
    c.poll().await.unwrap();
    c.poll().await.unwrap();
    let enqueued: Vec<&Cmd> = c
        .engine()
        .commands
        .iter()
        .filter(|x| matches!(x, Cmd::Enqueue(_)))
        .collect();
    assert_eq!(enqueued, vec![&Cmd::Enqueue(track_key(&pl, 1))]);
}

#[tokio::test]
async fn track_end_with_prequeued_track_advances_without_reload() {
    let pl = playlist("a", 3);
    let mut c = controller();
    start(&mut c, pl.clone()).await;
    c.engine_position(195_000, 200_000);
    c.poll().await.unwrap();
    let loads_before = c.engine().loads().len();

    c.on_engine_event(EngineEvent::TrackEnded).await.unwrap();
    assert_eq!(c.engine().loads().len(), loads_before);
    assert_eq!(c.state(), PlayerState::Playing);
    let cursor = c.cursor().unwrap();
    assert_eq!((cursor.track_index, cursor.offset_ms), (1, 0));
    assert!(c.store().finished(&pl.path).contains(&track_key(&pl, 0)));
}

#[tokio::test]
async fn track_end_without_prequeue_loads_next_explicitly() {
    let pl = playlist("a", 3);
    let mut c = controller();
    start(&mut c, pl.clone()).await;

    c.on_engine_event(EngineEvent::TrackEnded).await.unwrap();
    assert_eq!(c.engine().commands.last(), Some(&load_cmd(&pl, 1, false)));
    assert_eq!(c.state(), PlayerState::Playing);
    assert_eq!(c.cursor().unwrap().track_index, 1);
}

#[tokio::test]
async fn end_of_playlist_stops_on_last_track_at_zero() {
    let pl = playlist("a", 2);
    let mut store = PositionStore::in_memory();
    store.put(&pl.path, 1, 0);
    let mut c = PlayerController::new(MockEngine::default(), store);
    start(&mut c, pl.clone()).await;
    c.engine_position(80_000, 90_000);
    c.poll().await.unwrap();

    c.on_engine_event(EngineEvent::TrackEnded).await.unwrap();
    assert_eq!(c.state(), PlayerState::Stopped);
    let cursor = c.cursor().unwrap();
    assert_eq!((cursor.track_index, cursor.offset_ms), (1, 0));
    let record = c.store().get(&pl.path);
    assert_eq!((record.track_index, record.offset_ms), (1, 0));

    // playing again restarts the last track
    c.play().await.unwrap();
    assert_eq!(c.engine().commands.last(), Some(&load_cmd(&pl, 1, false)));
}

#[tokio::test]
async fn seek_before_start_clamps_to_zero() {
    let pl = playlist("a", 2);
    let mut c = controller();
    start(&mut c, pl).await;
    c.engine_position(3_000, 60_000);
    c.poll().await.unwrap();

    c.seek_by(-5_000).await.unwrap();
    assert_eq!(c.engine().commands.last(), Some(&Cmd::Seek(0)));
    assert_eq!(c.cursor().unwrap().offset_ms, 0);
}

#[tokio::test]
async fn fine_and_coarse_steps_are_relative_to_cursor() {
    let pl = playlist("a", 2);
    let mut c = controller();
    start(&mut c, pl).await;
    c.engine_position(10_000, 60_000);
    c.poll().await.unwrap();

    c.seek_by(5_000).await.unwrap();
    c.seek_by(1_000).await.unwrap();
    assert_eq!(c.engine().commands.last(), Some(&Cmd::Seek(16_000)));
}

#[tokio::test]
async fn seek_past_end_advances_to_next_track() {
    let pl = playlist("a", 3);
    let mut c = controller();
    start(&mut c, pl.clone()).await;
    c.engine_position(58_000, 60_000);
    c.poll().await.unwrap();

    c.seek_by(5_000).await.unwrap();
    assert_eq!(c.cursor().unwrap().track_index, 1);
    assert_eq!(c.engine().commands.last(), Some(&load_cmd(&pl, 1, false)));
}

#[tokio::test]
async fn seek_before_file_loaded_is_deferred() {
    let pl = playlist("a", 2);
    let mut c = controller();
    c.open(pl).await.unwrap();
    c.seek_to(7_000).await.unwrap();
    assert!(!c.engine().commands.iter().any(|x| matches!(x, Cmd::Seek(_))));

    c.on_engine_event(EngineEvent::FileLoaded).await.unwrap();
    assert_eq!(c.engine().commands.last(), Some(&Cmd::Seek(7_000)));
}

#[tokio::test]
async fn next_on_last_track_is_noop_and_prev_on_first_restarts() {
    let pl = playlist("a", 2);
    let mut c = controller();
    start(&mut c, pl.clone()).await;

    c.prev().await.unwrap();
    assert_eq!(c.engine().commands.last(), Some(&Cmd::Seek(0)));
    assert_eq!(c.cursor().unwrap().track_index, 0);

    c.next().await.unwrap();
    assert_eq!(c.cursor().unwrap().track_index, 1);
    assert!(c.store().finished(&pl.path).contains(&track_key(&pl, 0)));
    c.on_engine_event(EngineEvent::FileLoaded).await.unwrap();

    let before = c.engine().commands.len();
    c.next().await.unwrap();
    assert_eq!(c.engine().commands.len(), before);
    assert_eq!(c.cursor().unwrap().track_index, 1);
}

#[tokio::test]
async fn next_while_paused_loads_paused() {
    let pl = playlist("a", 3);
    let mut c = controller();
    start(&mut c, pl.clone()).await;
    c.pause().await.unwrap();

    c.next().await.unwrap();
    assert_eq!(c.engine().commands.last(), Some(&load_cmd(&pl, 1, true)));
    assert_eq!(c.state(), PlayerState::Loaded);
}

#[tokio::test]
async fn jump_to_plays_the_chosen_track() {
    let pl = playlist("a", 4);
    let mut c = controller();
    start(&mut c, pl.clone()).await;

    c.jump_to(3).await.unwrap();
    assert_eq!(c.engine().commands.last(), Some(&load_cmd(&pl, 3, false)));
    assert_eq!(c.state(), PlayerState::Playing);
    assert!(c.jump_to(4).await.is_err());
}

#[tokio::test]
async fn toggle_alternates_play_and_pause() {
    let pl = playlist("a", 1);
    let mut c = controller();
    c.open(pl).await.unwrap();
    c.on_engine_event(EngineEvent::FileLoaded).await.unwrap();

    c.toggle().await.unwrap();
    assert_eq!(c.state(), PlayerState::Playing);
    c.toggle().await.unwrap();
    assert_eq!(c.state(), PlayerState::Paused);
    c.toggle().await.unwrap();
    assert_eq!(c.state(), PlayerState::Playing);
}

#[tokio::test]
async fn empty_playlist_opens_stopped() {
    let pl = playlist("empty", 0);
    let mut c = controller();
    c.open(pl).await.unwrap();
    assert_eq!(c.state(), PlayerState::Stopped);
    assert!(c.engine().loads().is_empty());
    c.play().await.unwrap();
    assert_eq!(c.state(), PlayerState::Stopped);
}

#[tokio::test]
async fn switching_playlists_flushes_old_one_and_clears_queue() {
    let tmp = tempfile::TempDir::new().unwrap();
    let file = tmp.path().join("positions.toml");
    let a = playlist("a", 3);
    let b = playlist("b", 2);

    let mut c = PlayerController::new(MockEngine::default(), PositionStore::load(&file));
    start(&mut c, a.clone()).await;
    c.engine_position(191_000, 200_000);
    c.poll().await.unwrap();
    c.engine_mut().take();

    c.open(b.clone()).await.unwrap();
    let cmds = c.engine().commands.clone();
    assert_eq!(
        cmds,
        vec![Cmd::ClearQueue, Cmd::Stop, load_cmd(&b, 0, true)]
    );

    let on_disk = PositionStore::load(&file).get(&a.path);
    assert_eq!((on_disk.track_index, on_disk.offset_ms), (0, 191_000));
}

#[tokio::test]
async fn pause_is_a_flush_point() {
    let tmp = tempfile::TempDir::new().unwrap();
    let file = tmp.path().join("positions.toml");
    let pl = playlist("a", 3);

    let mut c = PlayerController::new(MockEngine::default(), PositionStore::load(&file));
    start(&mut c, pl.clone()).await;
    c.engine_position(42_000, 100_000);
    c.poll().await.unwrap();
    assert!(!file.exists() || PositionStore::load(&file).get(&pl.path).offset_ms != 42_000);

    c.pause().await.unwrap();
    assert_eq!(PositionStore::load(&file).get(&pl.path).offset_ms, 42_000);
}

#[tokio::test]
async fn flush_failure_is_reported_and_playback_continues() {
    let tmp = tempfile::TempDir::new().unwrap();
    let blocker = tmp.path().join("state");
    std::fs::write(&blocker, b"file in the way").unwrap();
    let pl = playlist("a", 3);

    let mut c = PlayerController::new(
        MockEngine::default(),
        PositionStore::load(blocker.join("positions.toml")),
    );
    start(&mut c, pl.clone()).await;
    c.next().await.unwrap();
    assert!(c.take_flush_error().is_some());
    assert!(c.take_flush_error().is_none());
    assert_eq!(c.state(), PlayerState::Playing);
    assert!(c.store().is_dirty());

    std::fs::remove_file(&blocker).unwrap();
    c.on_engine_event(EngineEvent::FileLoaded).await.unwrap();
    c.pause().await.unwrap();
    assert!(c.take_flush_error().is_none());
    assert!(!c.store().is_dirty());
}

#[tokio::test]
async fn engine_lost_flushes_and_stops() {
    let tmp = tempfile::TempDir::new().unwrap();
    let file = tmp.path().join("positions.toml");
    let pl = playlist("a", 3);

    let mut c = PlayerController::new(MockEngine::default(), PositionStore::load(&file));
    start(&mut c, pl.clone()).await;
    c.engine_position(5_000, 100_000);
    c.poll().await.unwrap();

    c.on_engine_event(EngineEvent::EngineLost).await.unwrap();
    assert_eq!(c.state(), PlayerState::Stopped);
    assert_eq!(PositionStore::load(&file).get(&pl.path).offset_ms, 5_000);
}

#[tokio::test]
async fn audio_output_change_is_skipped_when_unchanged() {
    let mut c = controller().with_output(AudioOutput::Pulse);
    assert!(!c.set_audio_output(AudioOutput::Pulse).await.unwrap());
    assert!(c.engine().commands.is_empty());

    assert!(c.set_audio_output(AudioOutput::WasapiExclusive).await.unwrap());
    assert_eq!(
        c.engine().commands,
        vec![Cmd::SetOutput(AudioOutput::WasapiExclusive)]
    );
    assert_eq!(c.output(), AudioOutput::WasapiExclusive);
    assert!("directsound".parse::<AudioOutput>().is_err());
}

#[tokio::test]
async fn failed_load_leaves_player_stopped() {
    let pl = playlist("a", 2);
    let engine = MockEngine {
        fail_load: true,
        ..MockEngine::default()
    };
    let mut c = PlayerController::new(engine, PositionStore::in_memory());
    assert!(c.open(pl).await.is_err());
    assert_eq!(c.state(), PlayerState::Stopped);
}

#[tokio::test]
async fn shutdown_flushes_and_stops_engine() {
    let tmp = tempfile::TempDir::new().unwrap();
    let file = tmp.path().join("positions.toml");
    let pl = playlist("a", 3);

    let mut c = PlayerController::new(MockEngine::default(), PositionStore::load(&file));
    start(&mut c, pl.clone()).await;
    c.engine_position(9_000, 100_000);
    c.shutdown().await.unwrap();

    assert_eq!(c.engine().commands.last(), Some(&Cmd::Shutdown));
    assert_eq!(PositionStore::load(&file).get(&pl.path).offset_ms, 9_000);
}

#[tokio::test]
async fn end_of_replaced_track_does_not_skip_the_next_one() {
    let pl = playlist("a", 5);
    let mut c = controller();
    start(&mut c, pl.clone()).await;
    c.engine_mut().slow_loads = true;

    // track 0 hits eof just as the user skips; mpv still holds track 0
    c.next().await.unwrap();
    c.on_engine_event(EngineEvent::FileLoaded).await.unwrap();
    c.on_engine_event(EngineEvent::TrackEnded).await.unwrap();

    let cursor = c.cursor().unwrap();
    assert_eq!(cursor.track_index, 1);
    assert_eq!(c.state(), PlayerState::Playing);
    assert!(!c.store().finished(&pl.path).contains(&track_key(&pl, 1)));
    assert_eq!(c.engine().loads().len(), 2);

    // once track 1 is really loaded its own end advances normally
    c.engine_mut().finish_loading();
    c.on_engine_event(EngineEvent::FileLoaded).await.unwrap();
    c.on_engine_event(EngineEvent::TrackEnded).await.unwrap();
    assert_eq!(c.cursor().unwrap().track_index, 2);
    assert!(c.store().finished(&pl.path).contains(&track_key(&pl, 1)));
}

#[tokio::test]
async fn stale_file_loaded_keeps_the_restore_seek() {
    let a = playlist("a", 2);
    let b = playlist("b", 3);
    let mut store = PositionStore::in_memory();
    store.set_track_count(&b.path, 3);
    store.put(&b.path, 2, 45_000);
    let mut c = PlayerController::new(MockEngine::default(), store);
    start(&mut c, a.clone()).await;

    // switching playlists while mpv is still busy with the old file
    c.engine_mut().slow_loads = true;
    c.open(b.clone()).await.unwrap();
    c.engine_mut().media = Some(track_key(&a, 0));
    c.on_engine_event(EngineEvent::FileLoaded).await.unwrap();
    assert!(!c.engine().commands.iter().any(|x| matches!(x, Cmd::Seek(_))));

    c.engine_mut().finish_loading();
    c.on_engine_event(EngineEvent::FileLoaded).await.unwrap();
    assert_eq!(c.engine().commands.last(), Some(&Cmd::Seek(45_000)));
    let cursor = c.cursor().unwrap();
    assert_eq!((cursor.track_index, cursor.offset_ms), (2, 45_000));
}

#[tokio::test]
async fn gapless_switch_accepts_file_loaded_of_queued_track() {
    let pl = playlist("a", 3);
    let mut c = controller();
    start(&mut c, pl.clone()).await;
    c.engine_position(195_000, 200_000);
    c.poll().await.unwrap();

    c.engine_mut().advance();
    c.on_engine_event(EngineEvent::TrackEnded).await.unwrap();
    c.on_engine_event(EngineEvent::FileLoaded).await.unwrap();
    c.engine_position(4_000, 180_000);
    c.poll().await.unwrap();
    let cursor = c.cursor().unwrap();
    assert_eq!((cursor.track_index, cursor.offset_ms), (1, 4_000));
}

trait EngineKnobs {
    fn engine_position(&mut self, position_ms: u64, duration_ms: u64);
}

impl EngineKnobs for PlayerController<MockEngine> {
    fn engine_position(&mut self, position_ms: u64, duration_ms: u64) {
        let engine = self.engine_mut();
        engine.position = Some(position_ms);
        engine.duration = Some(duration_ms);
    }
}
