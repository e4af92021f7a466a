//! Playlist files: `.m3u`, `.m3u8` and the `.fplite` list format.
//!
//! All three are line-oriented: one track per line, `#` lines are comments.
//! M3U flavours additionally carry `#EXTINF:<secs>,<title>` directives that
//! describe the entry that follows. Entries may be plain paths (absolute or
//! relative to the playlist), `file://` URIs, or remote URLs.

use std::borrow::Cow;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use encoding_rs::WINDOWS_1252;
use tracing::{debug, warn};

use crate::persist::{self, StoreError};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Longest first so `file:\\` wins over `file:\`.
const FILE_URI_PREFIXES: [&str; 3] = ["file://", "file:\\\\", "file:\\"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaylistFormat {
    M3u,
    M3u8,
    Fplite,
}

impl PlaylistFormat {
    pub const ALL: [PlaylistFormat; 3] = [Self::M3u, Self::M3u8, Self::Fplite];

    pub fn extension(self) -> &'static str {
        match self {
            Self::M3u => "m3u",
            Self::M3u8 => "m3u8",
            Self::Fplite => "fplite",
        }
    }

    /// Resolve the format from the file extension, ignoring case.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(ext))
    }

    pub fn is_playlist(path: &Path) -> bool {
        Self::from_path(path).is_some()
    }

    fn reads_extinf(self) -> bool {
        !matches!(self, Self::Fplite)
    }
}

/// Where a track lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackRef {
    Path(PathBuf),
    Url(String),
}

impl TrackRef {
    /// Stable string form, used as a key in persisted state.
    pub fn key(&self) -> String {
        match self {
            Self::Path(p) => p.to_string_lossy().into_owned(),
            Self::Url(u) => u.clone(),
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(p) => Some(p),
            Self::Url(_) => None,
        }
    }

    /// Remote entries are assumed reachable; local ones must exist on disk.
    pub fn exists(&self) -> bool {
        match self {
            Self::Path(p) => p.is_file(),
            Self::Url(_) => true,
        }
    }

    /// Last path segment, for display when no tag title is known.
    pub fn file_name(&self) -> String {
        match self {
            Self::Path(p) => p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.to_string_lossy().into_owned()),
            Self::Url(u) => u
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .unwrap_or(u)
                .to_string(),
        }
    }
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => write!(f, "{}", p.display()),
            Self::Url(u) => f.write_str(u),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub location: TrackRef,
    /// Title from a preceding `#EXTINF` line.
    pub title: Option<String>,
    pub duration_secs: Option<u64>,
}

impl Track {
    pub fn new(location: TrackRef) -> Self {
        Self {
            location,
            title: None,
            duration_secs: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Playlist {
    /// Canonical absolute path; the playlist's identity.
    pub path: PathBuf,
    pub format: PlaylistFormat,
    pub tracks: Vec<Track>,
}

impl Playlist {
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn default_name(&self) -> String {
        default_name(&self.path)
    }
}

/// Display name derived from the file name.
pub fn default_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[derive(Debug, thiserror::Error)]
pub enum PlaylistError {
    #[error("not a playlist file: {0}")]
    UnknownFormat(PathBuf),
    #[error("failed to read playlist {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Write(#[from] StoreError),
}

/// Read and parse the playlist at `path`.
pub fn load(path: &Path) -> Result<Playlist, PlaylistError> {
    let format =
        PlaylistFormat::from_path(path).ok_or_else(|| PlaylistError::UnknownFormat(path.into()))?;
    let bytes = std::fs::read(path).map_err(|source| PlaylistError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let (text, fell_back) = decode_bytes(&bytes);
    if fell_back {
        if format == PlaylistFormat::M3u8 {
            warn!("{}: not valid UTF-8, decoded as Windows-1252", path.display());
        } else {
            debug!("{}: decoded as Windows-1252", path.display());
        }
    }

    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let base_dir = absolute.parent().unwrap_or(Path::new("/")).to_path_buf();
    let tracks = parse_str(format, &text, &base_dir);
    let identity = std::fs::canonicalize(&absolute).unwrap_or(absolute);

    Ok(Playlist {
        path: identity,
        format,
        tracks,
    })
}

/// Decode playlist bytes as UTF-8 (BOM stripped), falling back to
/// Windows-1252 for legacy files. The flag is true when the fallback was used.
pub fn decode_bytes(bytes: &[u8]) -> (Cow<'_, str>, bool) {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => (Cow::Borrowed(s), false),
        Err(_) => {
            let (decoded, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
            (decoded, true)
        }
    }
}

#[derive(Default)]
struct ExtInf {
    title: Option<String>,
    duration_secs: Option<u64>,
}

fn parse_extinf(rest: &str) -> ExtInf {
    let (head, title) = match rest.split_once(',') {
        Some((head, title)) => (head, Some(title.trim())),
        None => (rest, None),
    };
    // `#EXTINF:-1 tvg-id="x",Title`: attributes follow the duration
    let duration_secs = head
        .split_whitespace()
        .next()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| *d > 0.0)
        .map(|d| d.round() as u64);
    ExtInf {
        title: title.filter(|t| !t.is_empty()).map(str::to_string),
        duration_secs,
    }
}

/// Parse playlist text. Relative entries resolve against `base_dir`.
pub fn parse_str(format: PlaylistFormat, text: &str, base_dir: &Path) -> Vec<Track> {
    let mut tracks = Vec::new();
    let mut pending: Option<ExtInf> = None;

    for raw in text.lines() {
        let line = raw.trim_start_matches('\u{feff}').trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('#') {
            if format.reads_extinf() {
                if let Some(rest) = line.strip_prefix("#EXTINF:") {
                    pending = Some(parse_extinf(rest));
                }
            }
            continue;
        }

        let info = pending.take().unwrap_or_default();
        if let Some(location) = resolve_location(line, base_dir) {
            tracks.push(Track {
                location,
                title: info.title,
                duration_secs: info.duration_secs,
            });
        }
    }

    tracks
}

fn resolve_location(line: &str, base_dir: &Path) -> Option<TrackRef> {
    let line = line.trim_matches('"').trim();
    if is_remote_url(line) {
        return Some(TrackRef::Url(line.to_string()));
    }

    let rest = strip_file_prefix(line);
    let decoded = urlencoding::decode(rest).unwrap_or(Cow::Borrowed(rest));
    let normalized = normalize_separators(&decoded);
    if normalized.is_empty() {
        return None;
    }

    let path = PathBuf::from(normalized.as_ref());
    let path = if path.is_absolute() || has_drive_letter(&normalized) {
        path
    } else {
        base_dir.join(path)
    };
    Some(TrackRef::Path(clean_lexically(&path)))
}

fn is_remote_url(line: &str) -> bool {
    let Some((scheme, _)) = line.split_once("://") else {
        return false;
    };
    scheme.len() > 1
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        && !scheme.eq_ignore_ascii_case("file")
}

fn strip_file_prefix(line: &str) -> &str {
    for prefix in FILE_URI_PREFIXES {
        let matches = line
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if matches {
            let rest = &line[prefix.len()..];
            // file:///C:/x carries a slash before the drive letter
            return match rest.strip_prefix('/') {
                Some(tail) if has_drive_letter(tail) => tail,
                _ => rest,
            };
        }
    }
    line
}

fn has_drive_letter(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 2 && b[0].is_ascii_alphabetic() && b[1] == b':'
}

fn normalize_separators(s: &str) -> Cow<'_, str> {
    if cfg!(windows) || !s.contains('\\') {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(s.replace('\\', "/"))
    }
}

/// Drop `.` segments and fold `..` without touching the filesystem.
fn clean_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                ) {
                    out.push("..");
                } else {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Write `tracks` as an extended M3U8 playlist at `path`.
pub fn write_m3u8(path: &Path, tracks: &[Track]) -> Result<(), PlaylistError> {
    let mut out = String::from("#EXTM3U\n");
    for track in tracks {
        if let Some(title) = &track.title {
            let secs = track
                .duration_secs
                .map(|d| d as i64)
                .unwrap_or(-1);
            out.push_str(&format!("#EXTINF:{},{}\n", secs, title));
        }
        match &track.location {
            // readers percent-decode local entries, so a literal `%` must be escaped
            TrackRef::Path(p) => out.push_str(&p.display().to_string().replace('%', "%25")),
            TrackRef::Url(u) => out.push_str(u),
        }
        out.push('\n');
    }
    persist::write_atomic(path, out.as_bytes())?;
    Ok(())
}
