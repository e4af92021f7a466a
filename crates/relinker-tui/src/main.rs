mod action;
mod app;
mod app_state;
mod component;
mod components;
mod focus;
mod mpv;
mod theme;
mod widgets;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use relinker_core::config::{Config, ThemeMode};
use relinker_core::platform;
use relinker_core::playlist::{self, Track, TrackRef};
use relinker_core::positions::PositionStore;
use relinker_core::registry::{Registry, RegistryEntry};
use relinker_core::scanner;

#[derive(Parser, Debug)]
#[command(name = "relinker", version, about = "Terminal playlist player that remembers where you left off")]
struct Args {
    /// Scan a folder for playlists before starting (repeatable)
    #[arg(long, value_name = "DIR")]
    scan: Vec<PathBuf>,

    /// Colour theme for this run
    #[arg(long, value_name = "dark|light")]
    theme: Option<ThemeMode>,

    /// Only look for mpv on PATH
    #[arg(long)]
    use_system_deps: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a folder, register the playlists found and print them
    Scan { dir: PathBuf },
    /// Write an m3u8 playlist from the given tracks and register it
    Create {
        out: PathBuf,
        #[arg(required = true)]
        tracks: Vec<String>,
    },
    /// Print registered playlists with their resume point
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    platform::set_use_system_deps(args.use_system_deps);

    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("relinker.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Allow RUST_LOG override; lofty is chatty about odd tags at debug.
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "debug,lofty=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    tracing::info!("relinker starting…");

    // ── Load config ──────────────────────────────────────────────────────────
    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("config: {:#}; using defaults", e);
        Config::default()
    });
    if let Some(theme) = args.theme {
        config.ui.theme = theme;
    }

    let mut registry = Registry::load(&config.paths.registry_file);

    match args.command {
        Some(Command::Scan { dir }) => return scan_command(&mut registry, &dir),
        Some(Command::Create { out, tracks }) => {
            return create_command(&mut registry, &out, &tracks)
        }
        Some(Command::List) => return list_command(&registry, &config),
        None => {}
    }

    // Print log path to stderr so the operator can tail it immediately.
    eprintln!("relinker log: {}", log_path.display());

    for dir in &args.scan {
        let added = registry.extend(scanner::scan(dir).iter().map(RegistryEntry::for_playlist));
        tracing::info!("--scan {}: {} new playlist(s)", dir.display(), added);
    }
    let pruned = registry.prune_missing();
    for entry in &pruned {
        tracing::info!("registry: dropping {} (file is gone)", entry.path.display());
    }
    if !args.scan.is_empty() || !pruned.is_empty() {
        if let Err(e) = registry.save() {
            tracing::warn!("registry: {}", e);
        }
    }

    // ── Run TUI ──────────────────────────────────────────────────────────────
    let app = app::App::new(config, registry);
    app.run().await?;

    Ok(())
}

fn scan_command(registry: &mut Registry, dir: &Path) -> anyhow::Result<()> {
    anyhow::ensure!(dir.is_dir(), "not a directory: {}", dir.display());
    let found: Vec<PathBuf> = scanner::scan(dir).iter().collect();
    let added = registry.extend(found.iter().cloned().map(RegistryEntry::for_playlist));
    registry.save().context("saving playlist registry")?;
    for path in &found {
        println!("{}", path.display());
    }
    println!("{} playlist(s) found, {} new", found.len(), added);
    Ok(())
}

fn create_command(registry: &mut Registry, out: &Path, tracks: &[String]) -> anyhow::Result<()> {
    let tracks: Vec<Track> = tracks
        .iter()
        .map(|t| {
            if t.contains("://") {
                Track::new(TrackRef::Url(t.clone()))
            } else {
                let path = PathBuf::from(t);
                Track::new(TrackRef::Path(std::fs::canonicalize(&path).unwrap_or(path)))
            }
        })
        .collect();
    playlist::write_m3u8(out, &tracks)
        .with_context(|| format!("writing {}", out.display()))?;
    let path = std::fs::canonicalize(out)?;
    registry.add(RegistryEntry::for_playlist(&path));
    registry.save().context("saving playlist registry")?;
    println!("{} ({} track(s))", path.display(), tracks.len());
    Ok(())
}

fn list_command(registry: &Registry, config: &Config) -> anyhow::Result<()> {
    let store = PositionStore::load(&config.paths.positions_file);
    for entry in registry.entries() {
        let record = store.get(&entry.path);
        let updated = store
            .updated_at(&entry.path)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never played".to_string());
        println!(
            "{}\t{}\ttrack {} at {}\t{}",
            entry.name,
            entry.path.display(),
            record.track_index + 1,
            widgets::progress_bar::fmt_time(record.offset_ms),
            updated
        );
    }
    Ok(())
}
