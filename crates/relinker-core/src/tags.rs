//! Tag and cover-art reading, behind the [`TagReader`] seam.
//!
//! Cover selection gathers every embedded picture plus the usual folder
//! images (`cover.jpg`, `folder.png`, ...) and keeps the largest one.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lofty::file::{AudioFile, TaggedFile, TaggedFileExt};
use lofty::picture::{MimeType, PictureType};
use lofty::probe::Probe;
use lofty::tag::Accessor;
use tracing::debug;

use crate::persist::{self, StoreError};

/// Folder images considered as cover art, matched case-insensitively.
const COVER_STEMS: &[&str] = &["cover", "folder", "front", "albumart", "artwork"];
const COVER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    fn sniff(data: &[u8]) -> Option<Self> {
        match image::guess_format(data).ok()? {
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::Png => Some(Self::Png),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverSource {
    Embedded { front: bool },
    Folder(PathBuf),
}

impl CoverSource {
    /// Tie-breaker between equally large candidates.
    fn priority(&self) -> u8 {
        match self {
            Self::Embedded { front: true } => 2,
            Self::Embedded { front: false } => 1,
            Self::Folder(_) => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoverArt {
    pub data: Vec<u8>,
    pub kind: ImageKind,
    pub source: CoverSource,
    pub width: u32,
    pub height: u32,
}

impl CoverArt {
    fn new(data: Vec<u8>, hint: Option<ImageKind>, source: CoverSource) -> Option<Self> {
        let kind = ImageKind::sniff(&data).or(hint)?;
        let (width, height) = image::ImageReader::new(Cursor::new(&data))
            .with_guessed_format()
            .ok()
            .and_then(|r| r.into_dimensions().ok())
            .unwrap_or((0, 0));
        Some(Self {
            data,
            kind,
            source,
            width,
            height,
        })
    }

    fn rank(&self) -> (u64, usize, u8) {
        (
            u64::from(self.width) * u64::from(self.height),
            self.data.len(),
            self.source.priority(),
        )
    }
}

pub trait TagReader {
    fn read_info(&self, path: &Path) -> Option<TrackInfo>;

    fn read_cover_art(&self, path: &Path) -> Option<CoverArt>;

    /// Tags and cover art together. Readers that parse the file should
    /// override this to parse it once.
    fn read_track(&self, path: &Path) -> (Option<TrackInfo>, Option<CoverArt>) {
        (self.read_info(path), self.read_cover_art(path))
    }

    fn read_duration(&self, path: &Path) -> Option<Duration> {
        self.read_info(path).and_then(|info| info.duration)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn read_info(&self, path: &Path) -> Option<TrackInfo> {
        parse(path).map(|f| track_info(&f))
    }

    fn read_cover_art(&self, path: &Path) -> Option<CoverArt> {
        let embedded = parse(path).map(|f| embedded_pictures(&f)).unwrap_or_default();
        best_cover(path, embedded)
    }

    fn read_track(&self, path: &Path) -> (Option<TrackInfo>, Option<CoverArt>) {
        let tagged_file = parse(path);
        let info = tagged_file.as_ref().map(track_info);
        let embedded = tagged_file.as_ref().map(embedded_pictures).unwrap_or_default();
        (info, best_cover(path, embedded))
    }
}

fn parse(path: &Path) -> Option<TaggedFile> {
    Probe::open(path).ok()?.read().ok()
}

fn track_info(tagged_file: &TaggedFile) -> TrackInfo {
    let duration = tagged_file.properties().duration();
    let mut info = TrackInfo {
        duration: (!duration.is_zero()).then_some(duration),
        ..TrackInfo::default()
    };

    if let Some(tag) = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
    {
        info.title = non_empty(tag.title().map(|s| s.to_string()));
        info.artist = non_empty(tag.artist().map(|s| s.to_string()));
        info.album = non_empty(tag.album().map(|s| s.to_string()));
    }
    info
}

/// Largest of `embedded` and the folder images next to `track`.
fn best_cover(track: &Path, mut candidates: Vec<CoverArt>) -> Option<CoverArt> {
    candidates.extend(folder_images(track));
    let best = candidates.into_iter().max_by_key(CoverArt::rank)?;
    debug!(
        "cover: {} -> {:?} {}x{}",
        track.display(),
        best.source,
        best.width,
        best.height
    );
    Some(best)
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn embedded_pictures(tagged_file: &TaggedFile) -> Vec<CoverArt> {
    tagged_file
        .tags()
        .iter()
        .flat_map(|tag| tag.pictures())
        .filter_map(|pic| {
            let hint = match pic.mime_type() {
                Some(MimeType::Png) => Some(ImageKind::Png),
                Some(MimeType::Jpeg) => Some(ImageKind::Jpeg),
                _ => None,
            };
            let front = pic.pic_type() == PictureType::CoverFront;
            CoverArt::new(pic.data().to_vec(), hint, CoverSource::Embedded { front })
        })
        .collect()
}

fn folder_images(track: &Path) -> Vec<CoverArt> {
    let Some(dir) = track.parent() else {
        return Vec::new();
    };
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    read_dir
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| is_cover_file(p))
        .filter_map(|p| {
            let data = std::fs::read(&p).ok()?;
            CoverArt::new(data, None, CoverSource::Folder(p))
        })
        .collect()
}

fn is_cover_file(path: &Path) -> bool {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    COVER_STEMS.iter().any(|c| c.eq_ignore_ascii_case(stem))
        && COVER_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext))
        && path.is_file()
}

/// On-disk cache of chosen cover art, one file per track named by the MD5
/// of the track path.
#[derive(Debug, Clone)]
pub struct CoverCache {
    dir: PathBuf,
}

impl CoverCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stem(track: &Path) -> String {
        format!("{:x}", md5::compute(track.to_string_lossy().as_bytes()))
    }

    /// Previously cached art for `track`, if any.
    pub fn cached(&self, track: &Path) -> Option<PathBuf> {
        let stem = Self::stem(track);
        [ImageKind::Jpeg, ImageKind::Png]
            .into_iter()
            .map(|k| self.dir.join(format!("{}.{}", stem, k.extension())))
            .find(|p| p.is_file())
    }

    /// Write `art` for `track`, reusing an existing file.
    pub fn store(&self, track: &Path, art: &CoverArt) -> Result<PathBuf, StoreError> {
        let target = self
            .dir
            .join(format!("{}.{}", Self::stem(track), art.kind.extension()));
        if !target.is_file() {
            persist::write_atomic(&target, &art.data)?;
        }
        Ok(target)
    }

    /// Cached art for `track`, extracting it with `reader` on a miss.
    pub fn fetch(&self, reader: &impl TagReader, track: &Path) -> Option<PathBuf> {
        if let Some(hit) = self.cached(track) {
            return Some(hit);
        }
        let art = reader.read_cover_art(track)?;
        self.keep(track, &art)
    }

    /// Tags for `track` plus its cached art. A cache miss reads both from a
    /// single parse of the file.
    pub fn fetch_with_info(
        &self,
        reader: &impl TagReader,
        track: &Path,
    ) -> (Option<TrackInfo>, Option<PathBuf>) {
        if let Some(hit) = self.cached(track) {
            return (reader.read_info(track), Some(hit));
        }
        let (info, art) = reader.read_track(track);
        (info, art.and_then(|art| self.keep(track, &art)))
    }

    fn keep(&self, track: &Path, art: &CoverArt) -> Option<PathBuf> {
        match self.store(track, art) {
            Ok(path) => Some(path),
            Err(e) => {
                debug!("cover: cache write failed: {}", e);
                None
            }
        }
    }
}

/// `"artist – title"` from tags, or the file name when tags are missing.
pub fn display_title(info: Option<&TrackInfo>, fallback: &str) -> String {
    let title = info.and_then(|i| i.title.as_deref());
    let artist = info.and_then(|i| i.artist.as_deref());
    match (artist, title) {
        (Some(a), Some(t)) => format!("{} – {}", a, t),
        (None, Some(t)) => t.to_string(),
        (Some(a), None) => format!("{} – {}", a, fallback),
        (None, None) => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 10, 10]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn picks_largest_folder_image() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("folder.png"), png(4, 4)).unwrap();
        std::fs::write(tmp.path().join("Cover.PNG"), png(16, 16)).unwrap();
        std::fs::write(tmp.path().join("back.png"), png(64, 64)).unwrap();
        let track = tmp.path().join("01.mp3");
        std::fs::write(&track, b"not really audio").unwrap();

        let art = LoftyTagReader.read_cover_art(&track).unwrap();
        assert_eq!((art.width, art.height), (16, 16));
        assert_eq!(art.kind, ImageKind::Png);
        assert!(matches!(art.source, CoverSource::Folder(ref p) if p.ends_with("Cover.PNG")));
    }

    #[test]
    fn no_cover_when_nothing_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        let track = tmp.path().join("01.mp3");
        std::fs::write(&track, b"x").unwrap();
        assert!(LoftyTagReader.read_cover_art(&track).is_none());
        assert!(LoftyTagReader.read_info(&track).is_none());
    }

    #[test]
    fn rank_prefers_area_then_size_then_front_cover() {
        let small = CoverArt::new(png(2, 2), None, CoverSource::Embedded { front: true }).unwrap();
        let big = CoverArt::new(png(8, 8), None, CoverSource::Folder("x".into())).unwrap();
        assert!(big.rank() > small.rank());

        let a = CoverArt::new(png(8, 8), None, CoverSource::Embedded { front: true }).unwrap();
        let b = CoverArt::new(png(8, 8), None, CoverSource::Embedded { front: false }).unwrap();
        assert!(a.rank() > b.rank());
    }

    #[test]
    fn cache_names_files_by_track_hash_and_reuses_them() {
        let tmp = tempfile::TempDir::new().unwrap();
        let album = tmp.path().join("album");
        std::fs::create_dir_all(&album).unwrap();
        std::fs::write(album.join("cover.png"), png(3, 3)).unwrap();
        let track = album.join("01.flac");
        std::fs::write(&track, b"x").unwrap();

        let cache = CoverCache::new(tmp.path().join("art"));
        assert!(cache.cached(&track).is_none());
        let stored = cache.fetch(&LoftyTagReader, &track).unwrap();
        let expected = format!("{:x}.png", md5::compute(track.to_string_lossy().as_bytes()));
        assert!(stored.ends_with(expected));
        assert_eq!(cache.cached(&track), Some(stored));
    }

    /// Counts parses so callers can check the file is read only once.
    #[derive(Default)]
    struct CountingReader {
        parses: std::cell::Cell<usize>,
    }

    impl CountingReader {
        fn parse(&self) {
            self.parses.set(self.parses.get() + 1);
        }
    }

    impl TagReader for CountingReader {
        fn read_info(&self, _path: &Path) -> Option<TrackInfo> {
            self.parse();
            Some(TrackInfo::default())
        }

        fn read_cover_art(&self, path: &Path) -> Option<CoverArt> {
            self.parse();
            best_cover(path, Vec::new())
        }

        fn read_track(&self, path: &Path) -> (Option<TrackInfo>, Option<CoverArt>) {
            self.parse();
            (Some(TrackInfo::default()), best_cover(path, Vec::new()))
        }
    }

    #[test]
    fn fetch_with_info_parses_the_track_once() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("front.jpg"), png(5, 5)).unwrap();
        let track = tmp.path().join("01.ogg");
        std::fs::write(&track, b"x").unwrap();
        let cache = CoverCache::new(tmp.path().join("art"));

        let reader = CountingReader::default();
        let (info, art) = cache.fetch_with_info(&reader, &track);
        assert!(info.is_some());
        assert_eq!(art, cache.cached(&track));
        assert!(art.is_some());
        assert_eq!(reader.parses.get(), 1);

        // a cache hit only needs the tags
        let (_, again) = cache.fetch_with_info(&reader, &track);
        assert_eq!(again, art);
        assert_eq!(reader.parses.get(), 2);
    }

    #[test]
    fn read_track_matches_separate_reads() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("cover.png"), png(6, 6)).unwrap();
        let track = tmp.path().join("01.mp3");
        std::fs::write(&track, b"not really audio").unwrap();

        let (info, art) = LoftyTagReader.read_track(&track);
        assert!(info.is_none());
        let art = art.unwrap();
        assert_eq!((art.width, art.height), (6, 6));
        assert!(matches!(art.source, CoverSource::Folder(ref p) if p.ends_with("cover.png")));
    }

    #[test]
    fn display_title_falls_back_to_file_name() {
        let info = TrackInfo {
            title: Some("Song".into()),
            artist: Some("Band".into()),
            ..TrackInfo::default()
        };
        assert_eq!(display_title(Some(&info), "01.mp3"), "Band – Song");
        assert_eq!(display_title(None, "01.mp3"), "01.mp3");
        let title_only = TrackInfo {
            title: Some("Song".into()),
            ..TrackInfo::default()
        };
        assert_eq!(display_title(Some(&title_only), "01.mp3"), "Song");
    }
}
