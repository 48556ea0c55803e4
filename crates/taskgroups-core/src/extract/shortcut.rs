//! Shell link (`.lnk`) reading and writing.
//!
//! The binary format is handled by the `lnk` crate; this module reduces a
//! parsed link to what icon resolution needs (target and icon location) and
//! resolves those against the file system.

use crate::error::{IconError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The parts of a shell link that matter for icon resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellLink {
    /// Absolute target from `LinkInfo`.
    pub target: Option<String>,
    pub name: Option<String>,
    pub relative_path: Option<String>,
    pub working_dir: Option<String>,
    pub arguments: Option<String>,
    pub icon_location: Option<String>,
    pub icon_index: i32,
}

impl ShellLink {
    /// A link to `target`, as written for scoped temporary shortcuts.
    pub fn to_target(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::default()
        }
    }

    /// Icon location written into the link; the index is always 0.
    pub fn with_icon(mut self, location: impl Into<String>) -> Self {
        self.icon_location = Some(location.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }

    /// Read and parse a `.lnk` file.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(IconError::ReferentNotFound(path.display().to_string()));
        }
        let parsed = lnk::ShellLink::open(path, encoding_rs::WINDOWS_1252)
            .map_err(|e| IconError::invalid("shell link", e.to_string()))?;
        let link = Self::from_lnk(&parsed);
        debug!("Parsed shell link {}: {:?}", path.display(), link);
        Ok(link)
    }

    fn from_lnk(parsed: &lnk::ShellLink) -> Self {
        let strings = parsed.string_data();
        Self {
            target: parsed
                .link_info()
                .as_ref()
                .and_then(|info| info.local_base_path().as_ref().map(|p| p.to_string()))
                .filter(|p| !p.is_empty()),
            name: strings.name_string().as_ref().map(|s| s.to_string()),
            relative_path: strings.relative_path().as_ref().map(|s| s.to_string()),
            working_dir: strings.working_dir().as_ref().map(|s| s.to_string()),
            arguments: strings
                .command_line_arguments()
                .as_ref()
                .map(|s| s.to_string()),
            icon_location: strings.icon_location().as_ref().map(|s| s.to_string()),
            icon_index: parsed.header().icon_index().to_owned(),
        }
    }

    /// The file the link points at.
    ///
    /// `LinkInfo` wins; a relative path is tried against the working
    /// directory, then against the link's own directory.
    pub fn target_path(&self, link_dir: &Path) -> Option<PathBuf> {
        if let Some(target) = self.target.as_deref().filter(|t| !t.is_empty()) {
            return Some(resolve_location(target, link_dir));
        }
        let relative = self.relative_path.as_deref().filter(|t| !t.trim().is_empty())?;
        let in_working_dir = self
            .working_dir
            .as_deref()
            .filter(|dir| !dir.trim().is_empty())
            .map(|dir| join_relative(&resolve_location(dir, link_dir), relative));
        match in_working_dir {
            Some(path) if path.exists() => Some(path),
            _ => Some(join_relative(link_dir, relative)),
        }
    }

    /// Explicit icon location and index, if the link carries one.
    pub fn icon_source(&self, link_dir: &Path) -> Option<(PathBuf, i32)> {
        self.icon_location
            .as_deref()
            .filter(|location| !location.trim().is_empty())
            .map(|location| (resolve_location(location, link_dir), self.icon_index))
    }

    /// Write the link to `path`. The target must exist.
    pub fn save(&self, path: &Path) -> Result<()> {
        let target = self
            .target
            .as_deref()
            .ok_or_else(|| IconError::invalid("shell link", "link has no target"))?;
        let mut link = lnk::ShellLink::new_simple(target).map_err(|e| {
            IconError::invalid("shell link", format!("cannot link to {}: {}", target, e))
        })?;
        link.set_name(self.name.clone());
        link.set_arguments(self.arguments.clone());
        link.set_icon_location(self.icon_location.clone());
        link.create_lnk(path).map_err(|e| {
            IconError::invalid("shell link", format!("cannot write {}: {}", path.display(), e))
        })
    }
}

/// Expand `%VAR%` references from the process environment. Unknown variables
/// are left as written.
pub fn expand_env(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        out.push('%');
                        out.push_str(name);
                        out.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Expand variables, strip quotes, and anchor relative locations at `base`.
pub(crate) fn resolve_location(raw: &str, base: &Path) -> PathBuf {
    let expanded = expand_env(raw.trim());
    let path = PathBuf::from(expanded.trim_matches('"'));
    if path.is_absolute() || looks_like_windows_absolute(&path) {
        path
    } else {
        base.join(path)
    }
}

/// Join a link-relative path such as `.\bin\tool.exe` onto `base`.
fn join_relative(base: &Path, relative: &str) -> PathBuf {
    let expanded = expand_env(relative.trim());
    expanded
        .trim_matches('"')
        .split(['\\', '/'])
        .filter(|part| !part.is_empty() && *part != ".")
        .fold(base.to_path_buf(), |path, part| match part {
            ".." => path.parent().map(Path::to_path_buf).unwrap_or(path),
            _ => path.join(part),
        })
}

fn looks_like_windows_absolute(path: &Path) -> bool {
    let s = path.to_string_lossy();
    let b = s.as_bytes();
    s.starts_with("\\\\") || (b.len() >= 3 && b[0].is_ascii_alphabetic() && b[1] == b':')
}
