//! Packaged-application namespace.
//!
//! Enumerating installed packaged apps is platform shell territory and lives
//! outside the engine. The engine only needs to find an app by AUMID and,
//! when the app has no backing executable, to write a shortcut to it.

use super::shortcut::ShellLink;
use crate::error::{IconError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One installed packaged application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagedApp {
    pub aumid: String,
    pub display_name: String,
    /// Backing executable, when the package exposes one.
    #[serde(default)]
    pub executable: Option<PathBuf>,
    /// Logo asset declared by the package manifest.
    #[serde(default)]
    pub logo: Option<PathBuf>,
}

/// Source of installed packaged applications.
pub trait AppNamespace: Send + Sync {
    /// All installed apps.
    fn enumerate(&self) -> Result<Vec<PackagedApp>>;

    /// Find an app by AUMID, ignoring ASCII case.
    fn lookup(&self, aumid: &str) -> Result<Option<PackagedApp>> {
        let wanted = aumid.trim();
        Ok(self
            .enumerate()?
            .into_iter()
            .find(|app| app.aumid.eq_ignore_ascii_case(wanted)))
    }

    /// Write a shell link for `app` at `dest`.
    ///
    /// The default link targets the executable, or the package logo when
    /// there is none, and carries the logo as its icon location. A link
    /// needs an existing target, so an app with neither is an error.
    fn write_shortcut(&self, app: &PackagedApp, dest: &Path) -> Result<()> {
        let target = app
            .executable
            .as_deref()
            .filter(|p| p.is_file())
            .or_else(|| app.logo.as_deref().filter(|p| p.is_file()))
            .ok_or_else(|| {
                IconError::ReferentNotFound(format!("{} (no executable or logo)", app.aumid))
            })?;
        let mut link =
            ShellLink::to_target(target.to_string_lossy()).with_name(app.display_name.clone());
        if let Some(logo) = &app.logo {
            link = link.with_icon(logo.to_string_lossy());
        }
        link.save(dest)
    }
}

/// A namespace with no apps, for hosts without packaged applications.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyNamespace;

impl AppNamespace for EmptyNamespace {
    fn enumerate(&self) -> Result<Vec<PackagedApp>> {
        Ok(Vec::new())
    }
}

/// A fixed list of apps, e.g. loaded from a JSON snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticNamespace {
    apps: Vec<PackagedApp>,
}

impl StaticNamespace {
    pub fn new(apps: Vec<PackagedApp>) -> Self {
        Self { apps }
    }

    /// Load a JSON array of apps.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }
}

impl AppNamespace for StaticNamespace {
    fn enumerate(&self) -> Result<Vec<PackagedApp>> {
        Ok(self.apps.clone())
    }
}
