//! The page surface the helper layer drives
//!
//! Every helper talks to the application through [`Page`]. The production
//! implementation is [`crate::chrome::ChromePage`]; `StubPage` (the `stub`
//! feature) implements the same trait over an in-memory table for tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::E2eResult;
use crate::locator::Locator;

/// Cells of one rendered table row, trimmed, in DOM order
pub type RowSnapshot = Vec<String>;

/// Serialized authentication state captured after login.
///
/// The content is opaque to the suite: it is written once per login and
/// replayed verbatim on later runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    /// Origin the state belongs to (e.g. `https://app.omnigrowthos.io`)
    pub origin: String,
    /// `document.cookie` at capture time
    #[serde(default)]
    pub cookies: String,
    /// Local storage entries
    #[serde(default)]
    pub local_storage: BTreeMap<String, String>,
}

impl StorageState {
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.local_storage.is_empty()
    }

    /// Load a previously saved state
    pub fn load(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Persist the state, creating the parent directory if needed
    pub fn save(&self, path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate to an absolute URL and wait for the document to load
    async fn goto(&self, url: &str) -> E2eResult<()>;

    async fn current_url(&self) -> E2eResult<String>;

    /// Click the single element the locator resolves to (first match)
    async fn click(&self, locator: &Locator) -> E2eResult<()>;

    /// Replace the value of an input
    async fn fill(&self, locator: &Locator, value: &str) -> E2eResult<()>;

    /// Press a keyboard key on the focused element
    async fn press(&self, key: &str) -> E2eResult<()>;

    /// Whether any matched element is currently visible. Absence is `false`.
    async fn is_visible(&self, locator: &Locator) -> E2eResult<bool>;

    /// Number of matched elements
    async fn count(&self, locator: &Locator) -> E2eResult<usize>;

    /// Trimmed inner text of every matched element
    async fn texts(&self, locator: &Locator) -> E2eResult<Vec<String>>;

    /// Cell texts of every row matched by `rows`
    async fn row_cells(&self, rows: &Locator) -> E2eResult<Vec<RowSnapshot>>;

    /// Wait until no network activity is observed, up to `timeout`.
    /// Returns `false` when the page never went idle.
    async fn wait_for_network_idle(&self, timeout: Duration) -> E2eResult<bool>;

    async fn storage_state(&self) -> E2eResult<StorageState>;

    async fn restore_storage_state(&self, state: &StorageState) -> E2eResult<()>;

    /// Click `trigger` and wait for a finished download in `dir`
    async fn download(&self, trigger: &Locator, dir: &Path, timeout: Duration) -> E2eResult<PathBuf>;

    /// Save a screenshot of the full page to `path`
    async fn screenshot(&self, path: &Path) -> E2eResult<()>;

    /// First matched element's text, if any element matches
    async fn text(&self, locator: &Locator) -> E2eResult<Option<String>> {
        Ok(self.texts(locator).await?.into_iter().next())
    }
}
