use serde::{Deserialize, Serialize};
use std::fmt;

/// Default retry budget for a run.
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Pause used by `wait()` when the model gives no duration.
pub const DEFAULT_WAIT_SECS: f64 = 2.0;
/// Longest pause `wait(seconds)` may ask for; longer requests are cut to this.
pub const DEFAULT_MAX_WAIT_SECS: f64 = 60.0;
/// Visible text longer than this is cut before it reaches the model.
pub const ELEMENT_TEXT_MAX_CHARS: usize = 200;
/// Search engine used by the `search` verb; `{query}` is replaced by the encoded text.
pub const DEFAULT_SEARCH_URL: &str = "https://www.google.com/search?q={query}";

/// One element record as produced by the in-page extraction script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawElement {
    pub tag: String,
    pub text: String,
    pub aria_label: String,
    pub placeholder: String,
    pub label: String,
    pub path: String,
}

/// Opaque reference that re-finds an element in the live page (an XPath).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator(String);

impl Locator {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of an element in one perception cycle's element list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub usize);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The descriptive fields of an element, used by suppression rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementField {
    Text,
    AriaLabel,
    Placeholder,
    Label,
}

/// A candidate interactive element that carries at least one descriptive signal.
#[derive(Debug, Clone, PartialEq)]
pub struct PageElement {
    text: String,
    aria_label: String,
    placeholder: String,
    label: String,
    locator: Locator,
}

impl PageElement {
    /// Keeps the element only if it has text, an accessible name, a
    /// placeholder or a label. Anything else is assumed non-actionable.
    pub fn from_raw(raw: RawElement) -> Option<Self> {
        let text = truncate(collapse_whitespace(&raw.text), ELEMENT_TEXT_MAX_CHARS);
        let aria_label = raw.aria_label.trim().to_string();
        let placeholder = raw.placeholder.trim().to_string();
        let label = truncate(collapse_whitespace(&raw.label), ELEMENT_TEXT_MAX_CHARS);

        if text.is_empty() && aria_label.is_empty() && placeholder.is_empty() && label.is_empty() {
            return None;
        }

        Some(Self {
            text,
            aria_label,
            placeholder,
            label,
            locator: Locator::new(raw.path),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn aria_label(&self) -> &str {
        &self.aria_label
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn field(&self, field: ElementField) -> &str {
        match field {
            ElementField::Text => &self.text,
            ElementField::AriaLabel => &self.aria_label,
            ElementField::Placeholder => &self.placeholder,
            ElementField::Label => &self.label,
        }
    }
}

/// What the decision client sees of an element. Empty fields are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    pub id: ElementId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub aria_label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub placeholder: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(s: String, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s
    } else {
        s.chars().take(max_chars).collect()
    }
}
