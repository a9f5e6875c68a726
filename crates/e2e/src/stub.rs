//! In-memory page for exercising the helper layer without a browser
//!
//! [`StubPage`] renders a fixed fixture table and a handful of registered
//! elements. Locators are matched by equality, so a test registers exactly the
//! locators the helper under test will ask for. Loading behaviour (spinner
//! polls, placeholder rows, flaky triggers) is configurable so waits and
//! retries can be driven deterministically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{E2eError, E2eResult};
use crate::filter::FilterControl;
use crate::locator::Locator;
use crate::page::{Page, RowSnapshot, StorageState};
use crate::session;
use crate::sort::{stable_order, Normalizer, SortDirection};
use crate::table::TableRegion;

const STUB_SESSION_COOKIE: &str = "session=stub";

/// What clicking a registered element does
#[derive(Debug, Clone, PartialEq)]
pub enum ClickEffect {
    /// Show `target` once the element has been clicked `clicks_needed` times
    Reveal { target: Locator, clicks_needed: u32 },
    Hide(Locator),
    /// Keep only rows whose filter column contains the value
    ApplyFilter(String),
    ClearFilter,
    Sort { column: usize, direction: SortDirection },
    SetPageSize(usize),
    NextPage,
    /// Delete the first row currently on screen
    RemoveFirstRow,
    Navigate(String),
    /// Submit the login form
    Login,
}

#[derive(Debug, Clone)]
struct Element {
    texts: Vec<String>,
    visible: bool,
    /// Only visible while this other element is visible
    gate: Option<Locator>,
    requires_auth: bool,
}

impl Element {
    fn new(texts: Vec<String>) -> Self {
        Self {
            texts,
            visible: true,
            gate: None,
            requires_auth: false,
        }
    }
}

#[derive(Debug)]
struct StubState {
    url: String,
    rows: Vec<RowSnapshot>,
    filter_column: usize,
    filter: Option<String>,
    search: Option<String>,
    search_box: Option<Locator>,
    page_size: Option<usize>,
    page_index: usize,
    elements: HashMap<Locator, Element>,
    effects: HashMap<Locator, Vec<ClickEffect>>,
    clicks: HashMap<Locator, u32>,
    inputs: HashMap<Locator, String>,
    keys: Vec<String>,
    spinner_polls: u32,
    spinner_remaining: u32,
    placeholder_polls: u32,
    placeholder_remaining: u32,
    table_visible: bool,
    network_idle: bool,
    credentials: Option<(String, String)>,
    authenticated: bool,
    download_content: Vec<u8>,
    goto_count: usize,
}

impl StubState {
    fn reload(&mut self) {
        self.spinner_remaining = self.spinner_polls;
        self.placeholder_remaining = self.placeholder_polls;
    }

    fn matching_rows(&self) -> Vec<RowSnapshot> {
        self.rows
            .iter()
            .filter(|row| match &self.filter {
                Some(f) => row.get(self.filter_column).map(|c| c.contains(f.as_str())).unwrap_or(false),
                None => true,
            })
            .filter(|row| match &self.search {
                Some(q) => {
                    let q = q.to_lowercase();
                    row.iter().any(|c| c.to_lowercase().contains(&q))
                }
                None => true,
            })
            .cloned()
            .collect()
    }

    fn page_rows(&self) -> Vec<RowSnapshot> {
        let rows = self.matching_rows();
        match self.page_size {
            Some(size) if size > 0 => rows.into_iter().skip(self.page_index * size).take(size).collect(),
            _ => rows,
        }
    }

    fn element_visible(&self, locator: &Locator) -> bool {
        match self.elements.get(locator) {
            Some(el) => {
                el.visible
                    && (!el.requires_auth || self.authenticated)
                    && el.gate.as_ref().map(|g| self.element_visible(g)).unwrap_or(true)
            }
            None => false,
        }
    }

    fn apply_effect(&mut self, source: &Locator, effect: ClickEffect) {
        match effect {
            ClickEffect::Reveal { target, clicks_needed } => {
                let clicks = self.clicks.get(source).copied().unwrap_or(0);
                if clicks >= clicks_needed {
                    if let Some(el) = self.elements.get_mut(&target) {
                        el.visible = true;
                    }
                }
            }
            ClickEffect::Hide(target) => {
                if let Some(el) = self.elements.get_mut(&target) {
                    el.visible = false;
                }
            }
            ClickEffect::ApplyFilter(value) => {
                self.filter = Some(value);
                self.page_index = 0;
                self.reload();
            }
            ClickEffect::ClearFilter => {
                self.filter = None;
                self.page_index = 0;
                self.reload();
            }
            ClickEffect::Sort { column, direction } => {
                let normalizer = Normalizer::default();
                let values: Vec<_> = self
                    .rows
                    .iter()
                    .map(|row| normalizer.normalize(row.get(column).map(String::as_str).unwrap_or("")))
                    .collect();
                let mut order = stable_order(&values);
                if direction == SortDirection::Desc {
                    order.reverse();
                }
                self.rows = order.into_iter().map(|i| self.rows[i].clone()).collect();
                self.reload();
            }
            ClickEffect::SetPageSize(size) => {
                self.page_size = Some(size);
                self.page_index = 0;
                self.reload();
            }
            ClickEffect::NextPage => {
                if let Some(size) = self.page_size.filter(|s| *s > 0) {
                    if (self.page_index + 1) * size < self.matching_rows().len() {
                        self.page_index += 1;
                    }
                }
                self.reload();
            }
            ClickEffect::RemoveFirstRow => {
                if let Some(first) = self.page_rows().into_iter().next() {
                    if let Some(pos) = self.rows.iter().position(|r| *r == first) {
                        self.rows.remove(pos);
                    }
                }
                self.reload();
            }
            ClickEffect::Navigate(url) => {
                self.url = url;
                self.reload();
            }
            ClickEffect::Login => {
                let email = self.inputs.get(&session::email_field()).cloned().unwrap_or_default();
                let password = self.inputs.get(&session::password_field()).cloned().unwrap_or_default();
                if let Some((e, p)) = &self.credentials {
                    self.authenticated = *e == email && *p == password;
                }
            }
        }
    }
}

/// Layout locators the stub renders natively
#[derive(Debug, Clone)]
struct Layout {
    table: Locator,
    rows: Locator,
    spinner: Option<Locator>,
    empty_sentinel: String,
}

pub struct StubPage {
    layout: Layout,
    state: Mutex<StubState>,
}

impl StubPage {
    /// A page rendering `rows` inside `region`
    pub fn new(region: &TableRegion, rows: Vec<RowSnapshot>) -> Self {
        Self {
            layout: Layout {
                table: region.table.clone(),
                rows: region.rows.clone(),
                spinner: region.spinner.clone(),
                empty_sentinel: region.empty_sentinel.clone(),
            },
            state: Mutex::new(StubState {
                url: "about:blank".to_string(),
                rows,
                filter_column: 0,
                filter: None,
                search: None,
                search_box: None,
                page_size: None,
                page_index: 0,
                elements: HashMap::new(),
                effects: HashMap::new(),
                clicks: HashMap::new(),
                inputs: HashMap::new(),
                keys: Vec::new(),
                spinner_polls: 0,
                spinner_remaining: 0,
                placeholder_polls: 0,
                placeholder_remaining: 0,
                table_visible: true,
                network_idle: true,
                credentials: None,
                authenticated: false,
                download_content: b"Date,Creator,Store\n".to_vec(),
                goto_count: 0,
            }),
        }
    }

    /// Spinner stays visible for this many polls after every reload
    pub fn with_spinner_polls(mut self, polls: u32) -> Self {
        let state = self.state.get_mut();
        state.spinner_polls = polls;
        state.spinner_remaining = polls;
        self
    }

    /// Rows render as an empty placeholder for this many reads after every reload
    pub fn with_placeholder_polls(mut self, polls: u32) -> Self {
        let state = self.state.get_mut();
        state.placeholder_polls = polls;
        state.placeholder_remaining = polls;
        self
    }

    pub fn with_table_hidden(mut self) -> Self {
        self.state.get_mut().table_visible = false;
        self
    }

    pub fn with_network_busy(mut self) -> Self {
        self.state.get_mut().network_idle = false;
        self
    }

    pub fn with_element(mut self, locator: Locator, text: impl Into<String>) -> Self {
        self.state
            .get_mut()
            .elements
            .insert(locator, Element::new(vec![text.into()]));
        self
    }

    pub fn with_texts(mut self, locator: Locator, texts: Vec<String>) -> Self {
        self.state.get_mut().elements.insert(locator, Element::new(texts));
        self
    }

    /// Register an element that starts hidden
    pub fn with_hidden(mut self, locator: Locator, text: impl Into<String>) -> Self {
        let mut el = Element::new(vec![text.into()]);
        el.visible = false;
        self.state.get_mut().elements.insert(locator, el);
        self
    }

    pub fn with_effect(mut self, locator: Locator, effect: ClickEffect) -> Self {
        self.state.get_mut().effects.entry(locator).or_default().push(effect);
        self
    }

    /// A trigger that reveals `target` only after `clicks_needed` clicks
    pub fn with_flaky_toggle(self, trigger: Locator, target: Locator, clicks_needed: u32) -> Self {
        self.with_element(trigger.clone(), "")
            .with_hidden(target.clone(), "")
            .with_effect(
                trigger,
                ClickEffect::Reveal {
                    target,
                    clicks_needed,
                },
            )
    }

    /// Wire `control` to filter the table on `column`.
    ///
    /// With `role_options` the options are exposed as `option` roles,
    /// otherwise only as plain text inside the popover.
    pub fn with_filter(
        mut self,
        control: &FilterControl,
        column: usize,
        options: &[&str],
        clicks_needed: u32,
        role_options: bool,
    ) -> Self {
        self.state.get_mut().filter_column = column;
        let mut page = self.with_flaky_toggle(control.trigger.clone(), control.popover.clone(), clicks_needed);

        let option_locator = |name: &str| {
            if role_options {
                control.option_by_role(name)
            } else {
                control.option_by_text(name)
            }
        };

        for name in options.iter().copied() {
            let loc = option_locator(name);
            page = page
                .with_gated(loc.clone(), name, control.popover.clone())
                .with_effect(loc.clone(), ClickEffect::ApplyFilter(name.to_string()))
                .with_effect(loc, ClickEffect::Hide(control.popover.clone()));
        }

        let clear = option_locator(&control.clear_option);
        page.with_gated(clear.clone(), &control.clear_option, control.popover.clone())
            .with_effect(clear.clone(), ClickEffect::ClearFilter)
            .with_effect(clear, ClickEffect::Hide(control.popover.clone()))
    }

    fn with_gated(mut self, locator: Locator, text: &str, gate: Locator) -> Self {
        let mut el = Element::new(vec![text.to_string()]);
        el.gate = Some(gate);
        self.state.get_mut().elements.insert(locator, el);
        self
    }

    /// Filling `locator` searches every cell, case-insensitively
    pub fn with_search_box(mut self, locator: Locator) -> Self {
        self.state.get_mut().search_box = Some(locator.clone());
        self.with_element(locator, "")
    }

    /// Accept these credentials on the login form
    pub fn with_login(mut self, email: &str, password: &str) -> Self {
        self.state.get_mut().credentials = Some((email.to_string(), password.to_string()));
        let mut shell = Element::new(vec![String::new()]);
        shell.requires_auth = true;
        self.state.get_mut().elements.insert(session::shell_marker(), shell);
        self.with_element(session::email_field(), "")
            .with_element(session::password_field(), "")
            .with_element(session::login_button(), "Login")
            .with_effect(session::login_button(), ClickEffect::Login)
    }

    pub fn with_download_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.state.get_mut().download_content = content.into();
        self
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.state.lock().authenticated = authenticated;
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.lock().authenticated
    }

    pub fn clicks(&self, locator: &Locator) -> u32 {
        self.state.lock().clicks.get(locator).copied().unwrap_or(0)
    }

    pub fn input_value(&self, locator: &Locator) -> Option<String> {
        self.state.lock().inputs.get(locator).cloned()
    }

    pub fn pressed_keys(&self) -> Vec<String> {
        self.state.lock().keys.clone()
    }

    pub fn goto_count(&self) -> usize {
        self.state.lock().goto_count
    }

    pub fn active_filter(&self) -> Option<String> {
        self.state.lock().filter.clone()
    }

    /// Rows matching the current filter and search, ignoring pagination
    pub fn matching_row_count(&self) -> usize {
        self.state.lock().matching_rows().len()
    }

    fn is_layout(&self, locator: &Locator) -> bool {
        *locator == self.layout.table || *locator == self.layout.rows || Some(locator) == self.layout.spinner.as_ref()
    }

    fn rendered_rows(&self, state: &mut StubState) -> Vec<RowSnapshot> {
        if state.placeholder_remaining > 0 {
            state.placeholder_remaining -= 1;
            return vec![vec![String::new()]];
        }
        let rows = state.page_rows();
        if rows.is_empty() {
            return vec![vec![format!("{}.", self.layout.empty_sentinel)]];
        }
        rows
    }
}

#[async_trait]
impl Page for StubPage {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        let mut state = self.state.lock();
        state.url = url.to_string();
        state.goto_count += 1;
        state.filter = None;
        state.search = None;
        state.page_index = 0;
        state.reload();
        Ok(())
    }

    async fn current_url(&self) -> E2eResult<String> {
        Ok(self.state.lock().url.clone())
    }

    async fn click(&self, locator: &Locator) -> E2eResult<()> {
        let mut state = self.state.lock();
        if !state.element_visible(locator) {
            return Err(E2eError::ElementNotFound(locator.describe()));
        }
        *state.clicks.entry(locator.clone()).or_insert(0) += 1;
        let effects = state.effects.get(locator).cloned().unwrap_or_default();
        for effect in effects {
            state.apply_effect(locator, effect);
        }
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> E2eResult<()> {
        let mut state = self.state.lock();
        if !state.element_visible(locator) {
            return Err(E2eError::ElementNotFound(locator.describe()));
        }
        state.inputs.insert(locator.clone(), value.to_string());
        if state.search_box.as_ref() == Some(locator) {
            state.search = if value.is_empty() { None } else { Some(value.to_string()) };
            state.page_index = 0;
            state.reload();
        }
        Ok(())
    }

    async fn press(&self, key: &str) -> E2eResult<()> {
        self.state.lock().keys.push(key.to_string());
        Ok(())
    }

    async fn is_visible(&self, locator: &Locator) -> E2eResult<bool> {
        let mut state = self.state.lock();
        if Some(locator) == self.layout.spinner.as_ref() {
            if state.spinner_remaining > 0 {
                state.spinner_remaining -= 1;
                return Ok(true);
            }
            return Ok(false);
        }
        if *locator == self.layout.table {
            return Ok(state.table_visible);
        }
        if *locator == self.layout.rows {
            return Ok(state.table_visible);
        }
        Ok(state.element_visible(locator))
    }

    async fn count(&self, locator: &Locator) -> E2eResult<usize> {
        if *locator == self.layout.rows {
            let mut state = self.state.lock();
            return Ok(self.rendered_rows(&mut state).len());
        }
        let state = self.state.lock();
        Ok(match state.elements.get(locator) {
            Some(el) if state.element_visible(locator) => el.texts.len().max(1),
            _ => 0,
        })
    }

    async fn texts(&self, locator: &Locator) -> E2eResult<Vec<String>> {
        if *locator == self.layout.rows {
            let mut state = self.state.lock();
            return Ok(self
                .rendered_rows(&mut state)
                .into_iter()
                .map(|cells| cells.join(" "))
                .collect());
        }
        if self.is_layout(locator) {
            return Ok(Vec::new());
        }
        let state = self.state.lock();
        Ok(match state.elements.get(locator) {
            Some(el) if state.element_visible(locator) => el.texts.clone(),
            _ => Vec::new(),
        })
    }

    async fn row_cells(&self, rows: &Locator) -> E2eResult<Vec<RowSnapshot>> {
        if *rows != self.layout.rows {
            return Err(E2eError::ElementNotFound(rows.describe()));
        }
        let mut state = self.state.lock();
        Ok(self.rendered_rows(&mut state))
    }

    async fn wait_for_network_idle(&self, _timeout: Duration) -> E2eResult<bool> {
        Ok(self.state.lock().network_idle)
    }

    async fn storage_state(&self) -> E2eResult<StorageState> {
        let state = self.state.lock();
        if !state.authenticated {
            return Ok(StorageState::default());
        }
        Ok(StorageState {
            origin: state.url.clone(),
            cookies: STUB_SESSION_COOKIE.to_string(),
            ..Default::default()
        })
    }

    async fn restore_storage_state(&self, storage: &StorageState) -> E2eResult<()> {
        if storage.cookies.contains(STUB_SESSION_COOKIE) {
            self.state.lock().authenticated = true;
        }
        Ok(())
    }

    async fn download(&self, trigger: &Locator, dir: &Path, _timeout: Duration) -> E2eResult<PathBuf> {
        self.click(trigger).await?;
        let content = self.state.lock().download_content.clone();
        std::fs::create_dir_all(dir)?;
        let path = dir.join("export.csv");
        std::fs::write(&path, content)?;
        Ok(path)
    }

    async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, b"stub screenshot")?;
        Ok(())
    }
}

/// Twenty customer rows: five per segment for Champions, Loyal, At Risk and
/// No Sales, with mixed currency, date and phone formats.
pub fn customer_fixture() -> Vec<RowSnapshot> {
    let segments = ["Champions", "Loyal", "At Risk", "No Sales"];
    (0..20)
        .map(|i| {
            vec![
                format!("Customer {:02}", i),
                segments[i % segments.len()].to_string(),
                format!("customer{:02}@example.com", i),
                format!("(555) 010-{:04}", 20 - i),
                format!("{} Main St", 100 + i),
                format!("${},{:03}.00", 1 + i % 3, (i * 37) % 1000),
                format!("Jul {}, 2025", 1 + (i * 7) % 28),
            ]
        })
        .collect()
}
