//! Locating a Chrome/Chromium executable.

use std::path::{Path, PathBuf};

/// Environment override checked before any fixed location.
pub const ENV_CHROME_PATH: &str = "PAGEGRAB_CHROME_PATH";

#[cfg(target_os = "macos")]
const CANDIDATES: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
];

#[cfg(target_os = "windows")]
const CANDIDATES: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const CANDIDATES: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
];

/// The fixed install locations for this platform, in lookup order.
pub fn candidates() -> &'static [&'static str] {
    CANDIDATES
}

/// First usable path: the env override, then the fixed list.
///
/// This is the lookup screenshot capture uses; it never consults `PATH`.
pub fn find_browser() -> Option<PathBuf> {
    let env = std::env::var_os(ENV_CHROME_PATH).map(PathBuf::from);
    first_usable(env.iter().map(PathBuf::as_path).chain(CANDIDATES.iter().map(Path::new)))
}

/// [`find_browser`], falling back to well-known names on `PATH`.
pub fn find_chromium() -> Option<PathBuf> {
    find_browser().or_else(|| {
        ["google-chrome", "chromium", "chromium-browser"]
            .into_iter()
            .find_map(|name| which::which(name).ok())
    })
}

fn first_usable<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Option<PathBuf> {
    paths
        .into_iter()
        .find(|p| p.is_file())
        .map(Path::to_path_buf)
}
