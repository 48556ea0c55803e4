//! Launch targets that need an icon.
//!
//! A [`Referent`] names the thing a launcher button points at. Its variant
//! decides both how the cache key is fingerprinted and which extraction
//! strategies are tried.

use std::fmt;
use std::path::{Path, PathBuf};

/// The logical thing needing an icon.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Referent {
    /// An executable, document, or folder on disk.
    FilePath(PathBuf),
    /// A shell link (`.lnk`).
    ShortcutPath(PathBuf),
    /// A packaged application named by its AUMID.
    PackagedAppId { aumid: String, display_name: String },
    /// An internet shortcut document (`.url`).
    WebUrlFile(PathBuf),
    /// A bare URL.
    PlainUrl(String),
}

/// Discriminant of a [`Referent`], used for logging and strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferentKind {
    File,
    Shortcut,
    PackagedApp,
    UrlFile,
    Url,
}

impl Referent {
    /// Classify a path on disk by its extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match extension_of(&path).as_deref() {
            Some("lnk") => Referent::ShortcutPath(path),
            Some("url") => Referent::WebUrlFile(path),
            _ => Referent::FilePath(path),
        }
    }

    /// A packaged application entry.
    pub fn packaged(aumid: impl Into<String>, display_name: impl Into<String>) -> Self {
        Referent::PackagedAppId {
            aumid: aumid.into(),
            display_name: display_name.into(),
        }
    }

    /// Classify a raw launch target string as stored in a group configuration.
    ///
    /// URLs are recognised by scheme (single-letter schemes are drive letters),
    /// AUMIDs by the `Family!App` form with no path separators; everything else
    /// is treated as a path.
    pub fn classify(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(parsed) = url::Url::parse(trimmed) {
            if parsed.scheme().len() > 1 && parsed.scheme() != "file" {
                return Referent::PlainUrl(trimmed.to_string());
            }
            if parsed.scheme() == "file" {
                if let Ok(path) = parsed.to_file_path() {
                    return Referent::from_path(path);
                }
            }
        }
        if is_aumid(trimmed) {
            let display_name = trimmed
                .split('!')
                .next_back()
                .unwrap_or(trimmed)
                .to_string();
            return Referent::packaged(trimmed, display_name);
        }
        Referent::from_path(trimmed)
    }

    pub fn kind(&self) -> ReferentKind {
        match self {
            Referent::FilePath(_) => ReferentKind::File,
            Referent::ShortcutPath(_) => ReferentKind::Shortcut,
            Referent::PackagedAppId { .. } => ReferentKind::PackagedApp,
            Referent::WebUrlFile(_) => ReferentKind::UrlFile,
            Referent::PlainUrl(_) => ReferentKind::Url,
        }
    }

    /// The backing file, for referents that have one.
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            Referent::FilePath(path) | Referent::ShortcutPath(path) | Referent::WebUrlFile(path) => {
                Some(path)
            }
            Referent::PackagedAppId { .. } | Referent::PlainUrl(_) => None,
        }
    }

    /// Human-readable description stored alongside cache entries.
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Referent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Referent::FilePath(path) => write!(f, "file {}", path.display()),
            Referent::ShortcutPath(path) => write!(f, "shortcut {}", path.display()),
            Referent::PackagedAppId {
                aumid,
                display_name,
            } => write!(f, "packaged app {} ({})", display_name, aumid),
            Referent::WebUrlFile(path) => write!(f, "url file {}", path.display()),
            Referent::PlainUrl(url) => write!(f, "url {}", url),
        }
    }
}

/// Lower-cased extension of a path, if any.
pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

fn is_aumid(raw: &str) -> bool {
    let mut parts = raw.split('!');
    let (Some(family), Some(app), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !family.is_empty()
        && !app.is_empty()
        && !raw.contains(['\\', '/', ' '])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path_by_extension() {
        assert_eq!(
            Referent::from_path("C:/Apps/Tool.LNK").kind(),
            ReferentKind::Shortcut
        );
        assert_eq!(
            Referent::from_path("/home/u/site.url").kind(),
            ReferentKind::UrlFile
        );
        assert_eq!(
            Referent::from_path("/usr/bin/tool").kind(),
            ReferentKind::File
        );
    }

    #[test]
    fn test_classify_urls_and_drive_letters() {
        assert_eq!(
            Referent::classify("https://example.com/page"),
            Referent::PlainUrl("https://example.com/page".to_string())
        );
        assert_eq!(
            Referent::classify(r"C:\Apps\tool.exe"),
            Referent::FilePath(PathBuf::from(r"C:\Apps\tool.exe"))
        );
    }

    #[test]
    fn test_classify_aumid() {
        let referent = Referent::classify("Microsoft.WindowsCalculator_8wekyb3d8bbwe!App");
        assert_eq!(
            referent,
            Referent::packaged("Microsoft.WindowsCalculator_8wekyb3d8bbwe!App", "App")
        );
        assert_eq!(
            Referent::classify("/tmp/odd!name").kind(),
            ReferentKind::File
        );
    }

    #[test]
    fn test_file_path_only_for_file_backed() {
        assert!(Referent::from_path("/a/b.exe").file_path().is_some());
        assert!(Referent::PlainUrl("https://x.y".into()).file_path().is_none());
        assert!(Referent::packaged("A!B", "B").file_path().is_none());
    }
}
