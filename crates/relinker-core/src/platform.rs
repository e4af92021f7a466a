use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Global flag to control whether to use a system-installed mpv from PATH
/// instead of one bundled beside the executable.
/// Defaults to false (bundled binary wins when present).
static USE_SYSTEM_DEPS: AtomicBool = AtomicBool::new(false);

/// Environment variable that points at a non-default mpv install.
pub const MPV_PATH_ENV: &str = "MPV_PATH";

/// Set whether to use system dependencies (from PATH) instead of bundled ones.
pub fn set_use_system_deps(use_system: bool) {
    USE_SYSTEM_DEPS.store(use_system, Ordering::Relaxed);
}

/// Check whether to use system dependencies from PATH.
pub fn should_use_system_deps() -> bool {
    USE_SYSTEM_DEPS.load(Ordering::Relaxed)
}

#[cfg(unix)]
pub fn mpv_socket_name() -> String {
    format!(
        "{}/relinker-mpv-{}.sock",
        std::env::temp_dir().display(),
        std::process::id()
    )
}

#[cfg(windows)]
pub fn mpv_socket_name() -> String {
    format!("relinker-mpv-{}", std::process::id())
}

#[cfg(unix)]
pub fn mpv_socket_arg(socket_name: &str) -> String {
    format!("--input-ipc-server={}", socket_name)
}

#[cfg(windows)]
pub fn mpv_socket_arg(socket_name: &str) -> String {
    format!("--input-ipc-server=\\\\.\\pipe\\{}", socket_name)
}

pub fn data_dir() -> PathBuf {
    // ~/.local/share/relinker/ on macOS too, rather than Application Support
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("relinker")
    }
    #[cfg(windows)]
    {
        // Portable installs keep their data beside the executable
        if let Some(dir) = exe_dir() {
            let portable_data = dir.join("data");
            if portable_data.exists() {
                return portable_data;
            }
        }

        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("relinker")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(dir) = exe_dir() {
            if dir.join("config.toml").exists() {
                return dir;
            }
        }
    }

    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("relinker")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("relinker")
    }
}

pub fn cache_dir() -> PathBuf {
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".cache")
            .join("relinker")
    }
    #[cfg(windows)]
    {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("relinker")
    }
}

#[cfg(unix)]
pub fn mpv_binary_name() -> &'static str {
    "mpv"
}

#[cfg(windows)]
pub fn mpv_binary_name() -> &'static str {
    "mpv.exe"
}

fn exe_dir() -> Option<PathBuf> {
    let current_exe = std::env::current_exe().ok()?;
    current_exe.parent().map(Path::to_path_buf)
}

fn find_beside_exe(name: &str) -> Option<PathBuf> {
    let dir = exe_dir()?;
    [dir.join(name), dir.join("external").join(name)]
        .into_iter()
        .find(|p| p.exists())
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|p| p.exists())
}

/// Find the mpv binary used as the playback engine.
///
/// Searches in order:
/// 1. `MPV_PATH` environment variable
/// 2. `configured` (the `engine.mpv_path` config value)
/// 3. Beside the current executable (unless use_system_deps is set)
/// 4. PATH
pub fn find_mpv_binary(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = std::env::var_os(MPV_PATH_ENV) {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    if let Some(p) = configured.filter(|p| !p.as_os_str().is_empty()) {
        if p.exists() {
            return Some(p.to_path_buf());
        }
    }

    if !should_use_system_deps() {
        if let Some(p) = find_beside_exe(mpv_binary_name()) {
            return Some(p);
        }
    }

    find_on_path(mpv_binary_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirs_are_app_scoped() {
        assert!(data_dir().ends_with("relinker"));
        assert!(config_dir().ends_with("relinker"));
        assert!(cache_dir().ends_with("relinker"));
    }

    #[test]
    fn configured_mpv_path_is_used_when_present() {
        let tmp = tempfile::TempDir::new().unwrap();
        let fake = tmp.path().join(mpv_binary_name());
        std::fs::write(&fake, b"").unwrap();
        if std::env::var_os(MPV_PATH_ENV).is_none() {
            assert_eq!(find_mpv_binary(Some(&fake)), Some(fake));
        }
    }
}
