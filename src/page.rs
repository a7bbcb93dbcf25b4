use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Locator, RawElement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

/// The live browser page, as seen by the control loop.
///
/// Implementations perform one browser operation per call and report
/// failures through `anyhow`; the loop maps them into its error taxonomy.
/// The loop owns the page exclusively for the duration of a run.
#[async_trait]
pub trait Page: Send {
    async fn current_url(&mut self) -> Result<String>;

    /// Read-only scan for interactive elements, in document order.
    async fn raw_elements(&mut self) -> Result<Vec<RawElement>>;

    async fn navigate(&mut self, url: &str) -> Result<()>;

    async fn click(&mut self, locator: &Locator) -> Result<()>;

    /// Empty the value of an input-like element.
    async fn clear(&mut self, locator: &Locator) -> Result<()>;

    /// Focus the element and type `text` into it.
    async fn type_text(&mut self, locator: &Locator, text: &str) -> Result<()>;

    async fn press_enter(&mut self) -> Result<()>;

    /// Scroll by one viewport height minus a small overlap.
    async fn scroll(&mut self, direction: ScrollDirection) -> Result<()>;

    async fn go_back(&mut self) -> Result<()>;

    /// Block until the document has reached a stable load state.
    async fn wait_for_load(&mut self) -> Result<()>;
}
