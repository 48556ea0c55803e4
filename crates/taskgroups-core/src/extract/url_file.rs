//! Internet shortcut (`.url`) documents.

use crate::error::{IconError, Result};
use std::path::{Path, PathBuf};

const SECTION: &str = "internetshortcut";

/// The `[InternetShortcut]` fields used for icon resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlFile {
    pub url: Option<String>,
    pub icon_file: Option<String>,
    pub icon_index: i32,
}

impl UrlFile {
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IconError::ReferentNotFound(path.display().to_string())
            } else {
                IconError::io_with_path(e, path)
            }
        })?;
        Ok(Self::parse(&String::from_utf8_lossy(&bytes)))
    }

    /// Parse the document. Keys and section names are case-insensitive;
    /// entries outside `[InternetShortcut]` are ignored.
    pub fn parse(contents: &str) -> Self {
        let mut parsed = Self::default();
        let mut in_section = false;

        for line in contents.lines() {
            let line = line.trim().trim_start_matches('\u{feff}');
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                in_section = name.trim().eq_ignore_ascii_case(SECTION);
                continue;
            }
            if !in_section {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "url" => parsed.url = non_empty(value),
                "iconfile" => parsed.icon_file = non_empty(value),
                "iconindex" => parsed.icon_index = value.parse().unwrap_or(0),
                _ => {}
            }
        }
        parsed
    }

    /// Referenced icon file, anchored at `base` when relative.
    pub fn icon_source(&self, base: &Path) -> Option<(PathBuf, i32)> {
        let raw = self.icon_file.as_deref()?;
        // Remote icons are not fetched.
        if raw.contains("://") && !raw.to_ascii_lowercase().starts_with("file://") {
            return None;
        }
        let local = match url::Url::parse(raw) {
            Ok(parsed) if parsed.scheme() == "file" => parsed
                .to_file_path()
                .ok()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|| raw.to_string()),
            _ => raw.to_string(),
        };
        Some((
            super::shortcut::resolve_location(&local, base),
            self.icon_index,
        ))
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fields_case_insensitively() {
        let doc = "[InternetShortcut]\r\nURL=https://example.com/\r\nIconFile=C:\\Icons\\site.ico\r\niconindex=3\r\n";
        let parsed = UrlFile::parse(doc);
        assert_eq!(parsed.url.as_deref(), Some("https://example.com/"));
        assert_eq!(parsed.icon_file.as_deref(), Some("C:\\Icons\\site.ico"));
        assert_eq!(parsed.icon_index, 3);
    }

    #[test]
    fn test_ignores_other_sections() {
        let doc = "[{000214A0-0000-0000-C000-000000000046}]\nIconFile=/wrong.ico\n[internetshortcut]\nURL=https://a.b/\n";
        let parsed = UrlFile::parse(doc);
        assert!(parsed.icon_file.is_none());
        assert!(parsed.icon_source(Path::new("/")).is_none());
        assert_eq!(parsed.url.as_deref(), Some("https://a.b/"));
    }

    #[test]
    fn test_icon_source_resolution() {
        let parsed = UrlFile::parse("[InternetShortcut]\nIconFile=icons/site.png\nIconIndex=bogus\n");
        assert_eq!(
            parsed.icon_source(Path::new("/links")),
            Some((PathBuf::from("/links/icons/site.png"), 0))
        );

        let remote = UrlFile::parse("[InternetShortcut]\nIconFile=https://a.b/favicon.ico\n");
        assert!(remote.icon_source(Path::new("/")).is_none());

        let file_url = UrlFile::parse("[InternetShortcut]\nIconFile=file:///opt/site.ico\n");
        assert_eq!(
            file_url.icon_source(Path::new("/")).unwrap().0,
            PathBuf::from("/opt/site.ico")
        );
    }
}
