//! Ephemeral element ids for one perception cycle.
//!
//! An [`ElementIndex`] is built from a single extraction and thrown away at
//! the next one. Ids are positions in that list only: the same number may
//! name a different element (or nothing) after the page changes.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StepError;
use crate::types::{ElementDescriptor, ElementField, ElementId, Locator, PageElement};

/// Drops an element that is known noise on pages whose URL contains
/// `url_contains`, when the given field equals `equals` exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuppressionRule {
    pub name: String,
    pub url_contains: String,
    pub field: ElementField,
    pub equals: String,
}

impl SuppressionRule {
    pub fn new(
        name: impl Into<String>,
        url_contains: impl Into<String>,
        field: ElementField,
        equals: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url_contains: url_contains.into(),
            field,
            equals: equals.into(),
        }
    }

    pub fn drops(&self, element: &PageElement, url: &str) -> bool {
        url.contains(&self.url_contains) && element.field(self.field) == self.equals
    }

    /// Search-results pages repeat the search box and a "Tools" toggle on
    /// every visit; neither helps the model.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(
                "results-page-search-box",
                "https://www.google.com/search",
                ElementField::AriaLabel,
                "Search",
            ),
            Self::new(
                "results-page-tools",
                "https://www.google.com/search",
                ElementField::Text,
                "Tools",
            ),
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct ElementIndex {
    url: String,
    elements: Vec<PageElement>,
}

impl ElementIndex {
    /// Assigns ids `0..n` in extraction order to the elements that no rule
    /// suppresses. Suppression happens first, so ids stay contiguous.
    pub fn build<I>(elements: I, url: &str, rules: &[SuppressionRule]) -> Self
    where
        I: IntoIterator<Item = PageElement>,
    {
        let mut suppressed = 0usize;
        let elements: Vec<PageElement> = elements
            .into_iter()
            .filter(|el| match rules.iter().find(|rule| rule.drops(el, url)) {
                Some(rule) => {
                    debug!(rule = %rule.name, "suppressed element");
                    suppressed += 1;
                    false
                }
                None => true,
            })
            .collect();

        debug!(url, kept = elements.len(), suppressed, "built element index");
        Self {
            url: url.to_string(),
            elements,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, id: ElementId) -> Option<&PageElement> {
        self.elements.get(id.0)
    }

    pub fn resolve(&self, id: ElementId) -> Result<&Locator, StepError> {
        self.get(id)
            .map(PageElement::locator)
            .ok_or(StepError::LocatorResolution {
                id: id.0,
                available: self.elements.len(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (ElementId, &PageElement)> {
        self.elements
            .iter()
            .enumerate()
            .map(|(i, el)| (ElementId(i), el))
    }

    pub fn descriptors(&self) -> Vec<ElementDescriptor> {
        self.iter()
            .map(|(id, el)| ElementDescriptor {
                id,
                text: el.text().to_string(),
                aria_label: el.aria_label().to_string(),
                placeholder: el.placeholder().to_string(),
                label: el.label().to_string(),
            })
            .collect()
    }
}
