//! Authenticated session bootstrap and module navigation
//!
//! Logging in through the UI is slow, so the authenticated storage state is
//! written once per login and replayed on later runs. A replayed state is
//! trusted only after the authenticated shell (the sidebar toggle) shows up.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;
use crate::page::{Page, StorageState};
use crate::pages::AppModule;
use crate::probe::{probe_visible, Probe};
use crate::retry::ActionRetrier;
use crate::wait::poll_until;

pub const LOGIN_PATH: &str = "/auth/login";

pub fn email_field() -> Locator {
    Locator::role("textbox").named("Email")
}

pub fn password_field() -> Locator {
    Locator::role("textbox").named("Password")
}

pub fn login_button() -> Locator {
    Locator::role("button").named("Login").exact()
}

/// Present on every page once the user is signed in
pub fn shell_marker() -> Locator {
    Locator::label("Toggle Sidebar")
}

pub fn admin_menu() -> Locator {
    Locator::role("button").named("Admin").exact()
}

pub fn teams_link() -> Locator {
    Locator::css("a").has_text("Teams")
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub base_url: String,
    pub email: String,
    pub password: Option<String>,
    pub state_path: PathBuf,
    pub reuse_state: bool,
    /// Module opened to validate a replayed state
    pub landing: AppModule,
    pub login_timeout: Duration,
    pub probe_timeout: Duration,
}

impl SessionSettings {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOrigin {
    /// Saved storage state was accepted
    Reused,
    /// A fresh UI login was performed
    LoggedIn,
}

/// Make `page` authenticated, reusing saved state when allowed.
pub async fn establish(page: &dyn Page, settings: &SessionSettings) -> E2eResult<SessionOrigin> {
    if settings.reuse_state && settings.state_path.exists() {
        match try_reuse(page, settings).await {
            Ok(true) => {
                info!("Reusing saved session from {}", settings.state_path.display());
                return Ok(SessionOrigin::Reused);
            }
            Ok(false) => info!("Saved session rejected, logging in again"),
            Err(e) => warn!("Could not replay saved session: {}", e),
        }
    }

    login(page, settings).await?;
    Ok(SessionOrigin::LoggedIn)
}

async fn try_reuse(page: &dyn Page, settings: &SessionSettings) -> E2eResult<bool> {
    let state = StorageState::load(&settings.state_path)?;
    if state.is_empty() {
        return Ok(false);
    }

    page.goto(&settings.url("/")).await?;
    page.restore_storage_state(&state).await?;
    open_direct(page, settings, settings.landing).await?;

    let probe = probe_visible(page, &shell_marker(), settings.probe_timeout).await?;
    Ok(probe == Probe::Matches)
}

/// Sign in through the login form and persist the resulting storage state.
pub async fn login(page: &dyn Page, settings: &SessionSettings) -> E2eResult<()> {
    let password = settings
        .password
        .as_deref()
        .ok_or_else(|| E2eError::Config("no password configured (set OMNI_PASSWORD)".to_string()))?;

    info!("Logging in as {}", settings.email);
    page.goto(&settings.url(LOGIN_PATH)).await?;

    let email = email_field();
    poll_until("login form", settings.login_timeout, Duration::from_millis(250), || {
        page.is_visible(&email)
    })
    .await?;

    page.fill(&email, &settings.email).await?;
    page.fill(&password_field(), password).await?;
    page.click(&login_button()).await?;

    let shell = shell_marker();
    poll_until(
        "authenticated shell",
        settings.login_timeout,
        Duration::from_millis(250),
        || page.is_visible(&shell),
    )
    .await?;

    let state = page.storage_state().await?;
    state.save(&settings.state_path)?;
    info!("Session state saved to {}", settings.state_path.display());
    Ok(())
}

async fn open_direct(page: &dyn Page, settings: &SessionSettings, module: AppModule) -> E2eResult<()> {
    match module.path() {
        Some(path) => page.goto(&settings.url(path)).await,
        None => Err(E2eError::Config(format!("module '{}' has no direct URL", module))),
    }
}

/// Open `module`, going through the Admin menu when it has no direct URL.
pub async fn navigate(
    page: &dyn Page,
    settings: &SessionSettings,
    module: AppModule,
    retrier: &ActionRetrier,
) -> E2eResult<()> {
    info!("Navigating to {}", module);
    if module.path().is_some() {
        return open_direct(page, settings, module).await;
    }

    let admin = admin_menu();
    let teams = teams_link();

    if !page.is_visible(&admin).await? {
        info!("Admin menu hidden, toggling sidebar");
        page.click(&shell_marker()).await?;
        poll_until("admin menu visible", retrier.policy().per_attempt_timeout, retrier.policy().poll_interval, || {
            page.is_visible(&admin)
        })
        .await?;
    }

    retrier
        .run("open Admin menu", "Teams link visible", || page.click(&admin), || {
            page.is_visible(&teams)
        })
        .await?;
    page.click(&teams).await?;
    page.wait_for_network_idle(retrier.policy().per_attempt_timeout).await?;
    Ok(())
}
