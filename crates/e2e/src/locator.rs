//! Element locators
//!
//! A [`Locator`] describes how to find elements in the rendered page: by CSS,
//! by ARIA role and accessible name, by visible text, by placeholder or by
//! label. Locators are plain data so suites can declare them in YAML and the
//! stub page can compare them for equality.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Primary matching strategy of a locator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Css(String),
    Role {
        role: String,
        name: Option<String>,
        exact: bool,
    },
    Text {
        text: String,
        exact: bool,
    },
    Placeholder(String),
    Label(String),
}

/// Which of the matched elements a locator resolves to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pick {
    #[default]
    All,
    First,
    Last,
    Nth(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "LocatorDef", into = "LocatorDef")]
pub struct Locator {
    selector: Selector,
    has_text: Option<String>,
    pick: Pick,
    within: Option<Box<Locator>>,
}

impl Locator {
    fn from_selector(selector: Selector) -> Self {
        Self {
            selector,
            has_text: None,
            pick: Pick::All,
            within: None,
        }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::from_selector(Selector::Css(selector.into()))
    }

    pub fn role(role: impl Into<String>) -> Self {
        Self::from_selector(Selector::Role {
            role: role.into(),
            name: None,
            exact: false,
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::from_selector(Selector::Text {
            text: text.into(),
            exact: false,
        })
    }

    pub fn placeholder(placeholder: impl Into<String>) -> Self {
        Self::from_selector(Selector::Placeholder(placeholder.into()))
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self::from_selector(Selector::Label(label.into()))
    }

    /// Set the accessible name for a role locator
    pub fn named(mut self, value: impl Into<String>) -> Self {
        if let Selector::Role { name, .. } = &mut self.selector {
            *name = Some(value.into());
        }
        self
    }

    /// Require an exact (whitespace-normalized) name or text match
    pub fn exact(mut self) -> Self {
        match &mut self.selector {
            Selector::Role { exact, .. } | Selector::Text { exact, .. } => *exact = true,
            _ => {}
        }
        self
    }

    /// Keep only elements whose text contains `text`
    pub fn has_text(mut self, text: impl Into<String>) -> Self {
        self.has_text = Some(text.into());
        self
    }

    pub fn first(mut self) -> Self {
        self.pick = Pick::First;
        self
    }

    pub fn last(mut self) -> Self {
        self.pick = Pick::Last;
        self
    }

    pub fn nth(mut self, index: usize) -> Self {
        self.pick = Pick::Nth(index);
        self
    }

    /// Scope this locator to descendants of `parent`
    pub fn within(mut self, parent: &Locator) -> Self {
        self.within = Some(Box::new(parent.clone()));
        self
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn text_filter(&self) -> Option<&str> {
        self.has_text.as_deref()
    }

    pub fn pick(&self) -> Pick {
        self.pick
    }

    pub fn parent(&self) -> Option<&Locator> {
        self.within.as_deref()
    }

    /// Role and accessible name, when this is a role locator
    pub fn role_and_name(&self) -> Option<(&str, Option<&str>)> {
        match &self.selector {
            Selector::Role { role, name, .. } => Some((role.as_str(), name.as_deref())),
            _ => None,
        }
    }

    /// Human-readable description used in logs and error messages
    pub fn describe(&self) -> String {
        let mut out = match &self.selector {
            Selector::Css(css) => format!("css={}", css),
            Selector::Role { role, name, exact } => match name {
                Some(n) if *exact => format!("role={}[name=\"{}\"]", role, n),
                Some(n) => format!("role={}[name~\"{}\"]", role, n),
                None => format!("role={}", role),
            },
            Selector::Text { text, exact: true } => format!("text=\"{}\"", text),
            Selector::Text { text, exact: false } => format!("text~\"{}\"", text),
            Selector::Placeholder(p) => format!("placeholder=\"{}\"", p),
            Selector::Label(l) => format!("label=\"{}\"", l),
        };
        if let Some(t) = &self.has_text {
            out.push_str(&format!(" >> has_text=\"{}\"", t));
        }
        match self.pick {
            Pick::All => {}
            Pick::First => out.push_str(" >> first"),
            Pick::Last => out.push_str(" >> last"),
            Pick::Nth(n) => out.push_str(&format!(" >> nth={}", n)),
        }
        match &self.within {
            Some(parent) => format!("{} >> {}", parent.describe(), out),
            None => out,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Flat serialized form: exactly one of the strategy keys must be set.
///
/// ```yaml
/// trigger: { role: button, name: RFM, pick: first }
/// rows: { css: "tbody tr" }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LocatorDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    exact: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    has_text: Option<String>,
    #[serde(default, skip_serializing_if = "is_all")]
    pick: Pick,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    within: Option<Box<LocatorDef>>,
}

fn is_all(pick: &Pick) -> bool {
    *pick == Pick::All
}

impl TryFrom<LocatorDef> for Locator {
    type Error = String;

    fn try_from(def: LocatorDef) -> Result<Self, Self::Error> {
        let strategies = [
            def.css.is_some(),
            def.role.is_some(),
            def.text.is_some(),
            def.placeholder.is_some(),
            def.label.is_some(),
        ];
        let count = strategies.iter().filter(|s| **s).count();
        if count != 1 {
            return Err(format!(
                "locator needs exactly one of css/role/text/placeholder/label, got {}",
                count
            ));
        }
        if def.name.is_some() && def.role.is_none() {
            return Err("locator 'name' is only valid together with 'role'".to_string());
        }

        let selector = if let Some(css) = def.css {
            Selector::Css(css)
        } else if let Some(role) = def.role {
            Selector::Role {
                role,
                name: def.name,
                exact: def.exact,
            }
        } else if let Some(text) = def.text {
            Selector::Text {
                text,
                exact: def.exact,
            }
        } else if let Some(p) = def.placeholder {
            Selector::Placeholder(p)
        } else {
            Selector::Label(def.label.unwrap_or_default())
        };

        let within = match def.within {
            Some(parent) => Some(Box::new(Locator::try_from(*parent)?)),
            None => None,
        };

        Ok(Locator {
            selector,
            has_text: def.has_text,
            pick: def.pick,
            within,
        })
    }
}

impl From<Locator> for LocatorDef {
    fn from(loc: Locator) -> Self {
        let mut def = LocatorDef {
            has_text: loc.has_text,
            pick: loc.pick,
            within: loc.within.map(|p| Box::new(LocatorDef::from(*p))),
            ..Default::default()
        };
        match loc.selector {
            Selector::Css(css) => def.css = Some(css),
            Selector::Role { role, name, exact } => {
                def.role = Some(role);
                def.name = name;
                def.exact = exact;
            }
            Selector::Text { text, exact } => {
                def.text = Some(text);
                def.exact = exact;
            }
            Selector::Placeholder(p) => def.placeholder = Some(p),
            Selector::Label(l) => def.label = Some(l),
        }
        def
    }
}
