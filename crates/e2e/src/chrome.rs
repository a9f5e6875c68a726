//! [`Page`] backed by Chrome DevTools Protocol
//!
//! Locators are resolved inside the page: each call serializes the locator
//! to JSON and evaluates a small resolver script (CSS, ARIA role + accessible
//! name, innermost text match, placeholder, label) followed by the operation.
//! Scripts return `JSON.stringify`-ed results so arrays come back by value.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Browser::{SetDownloadBehavior, SetDownloadBehaviorBehaviorOption};
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::config::BrowserSettings;
use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;
use crate::page::{Page, RowSnapshot, StorageState};
use crate::wait::poll_until;

/// No new resource entries for this long counts as network idle
const NETWORK_QUIET_WINDOW: Duration = Duration::from_millis(500);

const RESOLVER: &str = r#"
const norm = s => (s || '').replace(/\s+/g, ' ').trim();
const matches = (value, wanted, exact) => exact
    ? norm(value) === norm(wanted)
    : norm(value).toLowerCase().includes(norm(wanted).toLowerCase());
const visible = el => {
    const s = getComputedStyle(el);
    return s.visibility !== 'hidden' && s.display !== 'none' && el.getClientRects().length > 0;
};
const implicitRole = el => {
    const tag = el.tagName.toLowerCase();
    const type = (el.getAttribute('type') || '').toLowerCase();
    if (tag === 'button') return 'button';
    if (tag === 'a' && el.hasAttribute('href')) return 'link';
    if (tag === 'input') {
        if (['button', 'submit', 'reset'].includes(type)) return 'button';
        if (type === 'checkbox') return 'checkbox';
        if (type === 'radio') return 'radio';
        if (['', 'text', 'email', 'password', 'search', 'tel', 'url'].includes(type)) return 'textbox';
        return '';
    }
    if (tag === 'textarea') return 'textbox';
    if (tag === 'select') return 'combobox';
    if (tag === 'option') return 'option';
    if (/^h[1-6]$/.test(tag)) return 'heading';
    if (tag === 'td') return 'cell';
    if (tag === 'tr') return 'row';
    if (tag === 'table') return 'table';
    if (tag === 'img') return 'img';
    return '';
};
const roleOf = el => el.getAttribute('role') || implicitRole(el);
const labelText = el => {
    const aria = el.getAttribute('aria-label');
    if (aria) return aria;
    const by = el.getAttribute('aria-labelledby');
    if (by) return by.split(/\s+/).map(id => document.getElementById(id)).filter(Boolean).map(e => e.innerText).join(' ');
    if (el.labels && el.labels.length) return Array.from(el.labels).map(l => l.innerText).join(' ');
    return '';
};
const accessibleName = el => {
    const label = labelText(el);
    if (label) return label;
    const tag = el.tagName.toLowerCase();
    if (tag === 'input' || tag === 'textarea') return el.getAttribute('placeholder') || el.getAttribute('title') || '';
    if (tag === 'img') return el.getAttribute('alt') || '';
    return el.innerText || el.textContent || el.getAttribute('title') || '';
};
const byText = (root, wanted, exact) => {
    const all = Array.from(root.querySelectorAll('*'))
        .filter(el => !['SCRIPT', 'STYLE', 'HEAD', 'TITLE'].includes(el.tagName))
        .filter(el => matches(el.innerText || el.textContent, wanted, exact));
    return all.filter(el => !all.some(other => other !== el && el.contains(other)));
};
const resolve = spec => {
    const roots = spec.within ? resolve(spec.within) : [document];
    const seen = new Set();
    let found = [];
    for (const root of roots) {
        let els = [];
        if (spec.css !== undefined) {
            els = Array.from(root.querySelectorAll(spec.css));
        } else if (spec.role !== undefined) {
            els = Array.from(root.querySelectorAll('*')).filter(el => roleOf(el) === spec.role
                && (spec.name === undefined || matches(accessibleName(el), spec.name, !!spec.exact)));
        } else if (spec.text !== undefined) {
            els = byText(root, spec.text, !!spec.exact);
        } else if (spec.placeholder !== undefined) {
            els = Array.from(root.querySelectorAll('[placeholder]'))
                .filter(el => matches(el.getAttribute('placeholder'), spec.placeholder, !!spec.exact));
        } else if (spec.label !== undefined) {
            els = Array.from(root.querySelectorAll('*')).filter(el => {
                const l = labelText(el);
                return l && matches(l, spec.label, !!spec.exact);
            });
        }
        for (const el of els) {
            if (!seen.has(el)) { seen.add(el); found.push(el); }
        }
    }
    if (spec.has_text !== undefined) {
        found = found.filter(el => matches(el.innerText || el.textContent, spec.has_text, false));
    }
    const pick = spec.pick;
    if (pick === 'first') return found.slice(0, 1);
    if (pick === 'last') return found.slice(-1);
    if (pick && pick.nth !== undefined) return found.slice(pick.nth, pick.nth + 1);
    return found;
};
"#;

const OP_VISIBLE: &str = "els.some(visible)";
const OP_COUNT: &str = "els.length";
const OP_TEXTS: &str = "els.map(el => norm(el.innerText || el.textContent))";
const OP_ROWS: &str =
    "els.map(tr => Array.from(tr.querySelectorAll('td')).map(td => norm(td.innerText || td.textContent)))";

// Radix triggers open on pointerdown, popovers on click: send both.
const OP_CLICK: &str = r#"(() => {
    const el = els.find(visible) || els[0];
    if (!el) return false;
    el.scrollIntoView({ block: 'center' });
    const r = el.getBoundingClientRect();
    const o = { bubbles: true, cancelable: true, view: window, button: 0,
        clientX: r.left + r.width / 2, clientY: r.top + r.height / 2 };
    const p = { ...o, pointerType: 'mouse', isPrimary: true };
    el.dispatchEvent(new PointerEvent('pointerdown', p));
    el.dispatchEvent(new MouseEvent('mousedown', o));
    if (el.focus) el.focus();
    el.dispatchEvent(new PointerEvent('pointerup', p));
    el.dispatchEvent(new MouseEvent('mouseup', o));
    el.click();
    return true;
})()"#;

// The native setter keeps React's value tracker in sync.
const OP_FILL: &str = r#"(() => {
    const el = els.find(visible) || els[0];
    if (!el) return false;
    el.focus();
    const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
    Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, __VALUE__);
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
})()"#;

const NETWORK_PROBE: &str = r#"(() => {
    performance.setResourceTimingBufferSize(100000);
    return JSON.stringify([document.readyState === 'complete', performance.getEntriesByType('resource').length]);
})()"#;

const CAPTURE_STATE: &str = r#"JSON.stringify({
    origin: location.origin,
    cookies: document.cookie,
    local_storage: Object.fromEntries(Object.entries(localStorage)),
})"#;

pub struct ChromePage {
    // Dropping the browser closes the tab
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromePage {
    /// Launch Chrome and open a tab
    pub fn launch(settings: &BrowserSettings) -> E2eResult<Self> {
        info!(
            "Launching browser (headless: {}, size: {}x{})",
            settings.headless, settings.window_width, settings.window_height
        );

        let mut options = LaunchOptions::default_builder()
            .headless(settings.headless)
            .window_size(Some((settings.window_width, settings.window_height)))
            .idle_browser_timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| E2eError::Browser(format!("Invalid launch options: {}", e)))?;
        options.args.push(OsStr::new("--disable-dev-shm-usage"));

        let browser = Browser::new(options)
            .map_err(|e| E2eError::Browser(format!("Failed to launch browser: {}", e)))?;
        let tab = browser
            .new_tab()
            .map_err(|e| E2eError::Browser(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(Duration::from_secs(settings.timeout_seconds));

        info!("Browser launched");
        Ok(Self { _browser: browser, tab })
    }

    fn eval<T: DeserializeOwned>(&self, script: &str) -> E2eResult<T> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| E2eError::Browser(format!("JavaScript evaluation failed: {}", e)))?;
        let raw = result
            .value
            .as_ref()
            .and_then(|v| v.as_str())
            .ok_or_else(|| E2eError::Browser("script returned no value".to_string()))?;
        Ok(serde_json::from_str(raw)?)
    }

    fn on_locator<T: DeserializeOwned>(&self, locator: &Locator, op: &str) -> E2eResult<T> {
        let spec = serde_json::to_string(locator)?;
        let mut script = String::with_capacity(RESOLVER.len() + op.len() + spec.len() + 64);
        script.push_str("(() => {");
        script.push_str(RESOLVER);
        script.push_str("const els = resolve(");
        script.push_str(&spec);
        script.push_str(");\nreturn JSON.stringify(");
        script.push_str(op);
        script.push_str(");\n})()");
        self.eval(&script)
    }

    fn files_in(dir: &Path) -> E2eResult<HashSet<PathBuf>> {
        let mut files = HashSet::new();
        for entry in std::fs::read_dir(dir)? {
            files.insert(entry?.path());
        }
        Ok(files)
    }
}

fn is_partial_download(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("crdownload") | Some("tmp") | Some("part")
    )
}

#[derive(Deserialize)]
struct NetworkSample(bool, u64);

#[async_trait]
impl Page for ChromePage {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        debug!("Navigating to {}", url);
        self.tab
            .navigate_to(url)
            .map_err(|e| E2eError::Browser(format!("Failed to navigate to {}: {}", url, e)))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| E2eError::Browser(format!("Navigation timeout for {}: {}", url, e)))?;
        Ok(())
    }

    async fn current_url(&self) -> E2eResult<String> {
        Ok(self.tab.get_url())
    }

    async fn click(&self, locator: &Locator) -> E2eResult<()> {
        debug!("click {}", locator);
        if !self.on_locator::<bool>(locator, OP_CLICK)? {
            return Err(E2eError::ElementNotFound(locator.describe()));
        }
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> E2eResult<()> {
        debug!("fill {}", locator);
        let op = OP_FILL.replace("__VALUE__", &serde_json::to_string(value)?);
        if !self.on_locator::<bool>(locator, &op)? {
            return Err(E2eError::ElementNotFound(locator.describe()));
        }
        Ok(())
    }

    async fn press(&self, key: &str) -> E2eResult<()> {
        self.tab
            .press_key(key)
            .map_err(|e| E2eError::Browser(format!("Failed to press {}: {}", key, e)))?;
        Ok(())
    }

    async fn is_visible(&self, locator: &Locator) -> E2eResult<bool> {
        self.on_locator(locator, OP_VISIBLE)
    }

    async fn count(&self, locator: &Locator) -> E2eResult<usize> {
        self.on_locator(locator, OP_COUNT)
    }

    async fn texts(&self, locator: &Locator) -> E2eResult<Vec<String>> {
        self.on_locator(locator, OP_TEXTS)
    }

    async fn row_cells(&self, rows: &Locator) -> E2eResult<Vec<RowSnapshot>> {
        self.on_locator(rows, OP_ROWS)
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> E2eResult<bool> {
        let start = Instant::now();
        let mut last_count: Option<u64> = None;
        let mut quiet_since = Instant::now();

        loop {
            let NetworkSample(loaded, count) = self.eval(NETWORK_PROBE)?;
            if loaded && last_count == Some(count) {
                if quiet_since.elapsed() >= NETWORK_QUIET_WINDOW {
                    return Ok(true);
                }
            } else {
                last_count = Some(count);
                quiet_since = Instant::now();
            }

            if start.elapsed() >= timeout {
                return Ok(false);
            }
            sleep(Duration::from_millis(100)).await;
        }
    }

    async fn storage_state(&self) -> E2eResult<StorageState> {
        self.eval(CAPTURE_STATE)
    }

    async fn restore_storage_state(&self, state: &StorageState) -> E2eResult<()> {
        let payload = serde_json::to_string(state)?;
        let script = format!(
            r#"(() => {{
    const state = {};
    for (const part of state.cookies.split(';')) {{
        if (part.trim()) document.cookie = part.trim() + '; path=/';
    }}
    for (const [k, v] of Object.entries(state.local_storage)) localStorage.setItem(k, v);
    return JSON.stringify(true);
}})()"#,
            payload
        );
        let _: bool = self.eval(&script)?;
        debug!("Restored storage state for {}", state.origin);
        Ok(())
    }

    async fn download(&self, trigger: &Locator, dir: &Path, timeout: Duration) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let dir = dir.canonicalize()?;
        self.tab
            .call_method(SetDownloadBehavior {
                behavior: SetDownloadBehaviorBehaviorOption::Allow,
                browser_context_id: None,
                download_path: Some(dir.to_string_lossy().into_owned()),
                events_enabled: None,
            })
            .map_err(|e| E2eError::Browser(format!("Failed to enable downloads: {}", e)))?;

        let before = Self::files_in(&dir)?;
        self.click(trigger).await?;

        let mut finished: Option<PathBuf> = None;
        poll_until("download finished", timeout, Duration::from_millis(250), || {
            let new_file = Self::files_in(&dir).map(|files| {
                files
                    .into_iter()
                    .filter(|p| !before.contains(p) && !is_partial_download(p))
                    .find(|p| std::fs::metadata(p).map(|m| m.len() > 0).unwrap_or(false))
            });
            let done = match new_file {
                Ok(Some(path)) => {
                    finished = Some(path);
                    Ok(true)
                }
                Ok(None) => Ok(false),
                Err(e) => Err(e),
            };
            async move { done }
        })
        .await?;

        let path = finished.ok_or_else(|| E2eError::Timeout("download finished".to_string()))?;
        info!("Downloaded {}", path.display());
        Ok(path)
    }

    async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        let png = self
            .tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| E2eError::Browser(format!("Screenshot failed: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, png)?;
        Ok(())
    }
}
