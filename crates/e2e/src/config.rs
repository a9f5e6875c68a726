//! Suite configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{E2eError, E2eResult};
use crate::pages::AppModule;
use crate::retry::RetryPolicy;
use crate::session::SessionSettings;
use crate::table::StabilizeConfig;

pub const DEFAULT_BASE_URL: &str = "https://app.omnigrowthos.io";

pub const ENV_BASE_URL: &str = "OMNI_BASE_URL";
pub const ENV_EMAIL: &str = "OMNI_EMAIL";
pub const ENV_PASSWORD: &str = "OMNI_PASSWORD";

/// Suite configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Application origin
    pub base_url: String,

    /// Where the authenticated storage state is kept
    pub auth_state_path: PathBuf,

    /// Replay a saved storage state instead of logging in
    pub reuse_auth: bool,

    /// Results and screenshots
    pub output_dir: PathBuf,

    /// Exported files land here
    pub download_dir: PathBuf,

    /// Login credentials
    pub credentials: Credentials,

    /// Browser configuration
    pub browser: BrowserSettings,

    /// Wait and retry bounds
    pub timeouts: TimeoutSettings,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_state_path: PathBuf::from(".auth/state.json"),
            reuse_auth: true,
            output_dir: PathBuf::from("target/e2e-results"),
            download_dir: std::env::temp_dir().join("omnigrowth-e2e-downloads"),
            credentials: Credentials::default(),
            browser: BrowserSettings::default(),
            timeouts: TimeoutSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub email: String,

    /// Never written back by [`SuiteConfig::save`]
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

/// Browser configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Navigation and element timeout inside the browser
    pub timeout_seconds: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            timeout_seconds: 30,
        }
    }
}

/// Wait and retry bounds, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub table_wait_ms: u64,
    pub rows_wait_ms: u64,
    pub spinner_wait_ms: u64,
    pub network_idle_ms: u64,
    pub grace_ms: u64,
    pub poll_interval_ms: u64,
    pub retry_attempts: u32,
    pub retry_attempt_ms: u64,
    pub login_ms: u64,
    pub probe_ms: u64,
    pub download_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            table_wait_ms: 30_000,
            rows_wait_ms: 40_000,
            spinner_wait_ms: 30_000,
            network_idle_ms: 30_000,
            grace_ms: 3_000,
            poll_interval_ms: 250,
            retry_attempts: 3,
            retry_attempt_ms: 5_000,
            login_ms: 40_000,
            probe_ms: 5_000,
            download_ms: 30_000,
        }
    }
}

impl SuiteConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Load from file, then apply environment overrides
    pub fn load_with_env(path: &Path) -> E2eResult<Self> {
        let mut config = Self::load(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> E2eResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| E2eError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `OMNI_*` overrides from `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            self.base_url = url;
        }
        if let Some(email) = lookup(ENV_EMAIL).filter(|v| !v.is_empty()) {
            self.credentials.email = email;
        }
        if let Some(password) = lookup(ENV_PASSWORD).filter(|v| !v.is_empty()) {
            self.credentials.password = Some(password);
        }
    }

    pub fn stabilize_config(&self) -> StabilizeConfig {
        let t = &self.timeouts;
        StabilizeConfig {
            spinner_timeout: Duration::from_millis(t.spinner_wait_ms),
            table_timeout: Duration::from_millis(t.table_wait_ms),
            rows_timeout: Duration::from_millis(t.rows_wait_ms),
            network_idle_timeout: Duration::from_millis(t.network_idle_ms),
            grace: Duration::from_millis(t.grace_ms),
            poll_interval: Duration::from_millis(t.poll_interval_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.timeouts.retry_attempts,
            per_attempt_timeout: Duration::from_millis(self.timeouts.retry_attempt_ms),
            poll_interval: Duration::from_millis(self.timeouts.poll_interval_ms),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            base_url: self.base_url.clone(),
            email: self.credentials.email.clone(),
            password: self.credentials.password.clone(),
            state_path: self.auth_state_path.clone(),
            reuse_state: self.reuse_auth,
            landing: AppModule::BattleMap,
            login_timeout: Duration::from_millis(self.timeouts.login_ms),
            probe_timeout: Duration::from_millis(self.timeouts.probe_ms),
        }
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.download_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.probe_ms)
    }

    /// Results file path
    pub fn results_path(&self) -> PathBuf {
        self.output_dir.join("results.json")
    }

    pub fn screenshot_dir(&self) -> PathBuf {
        self.output_dir.join("screenshots")
    }
}
