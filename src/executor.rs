use std::time::Duration;

use tracing::{info, warn};

use crate::action::Action;
use crate::error::StepError;
use crate::page::{Page, ScrollDirection};
use crate::session::SessionState;
use crate::types::{DEFAULT_MAX_WAIT_SECS, DEFAULT_SEARCH_URL, DEFAULT_WAIT_SECS, Locator};

/// Dispatches resolved actions against the page.
#[derive(Debug, Clone)]
pub struct Executor {
    search_url: String,
    default_wait: Duration,
    max_wait: Duration,
}

impl Default for Executor {
    fn default() -> Self {
        Self {
            search_url: DEFAULT_SEARCH_URL.to_string(),
            default_wait: Duration::from_secs_f64(DEFAULT_WAIT_SECS),
            max_wait: Duration::from_secs_f64(DEFAULT_MAX_WAIT_SECS),
        }
    }
}

impl Executor {
    pub fn new(search_url: impl Into<String>, default_wait: Duration) -> Self {
        Self {
            search_url: search_url.into(),
            default_wait,
            max_wait: Duration::from_secs_f64(DEFAULT_MAX_WAIT_SECS).max(default_wait),
        }
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Results page URL for a search query.
    pub fn search_url(&self, query: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        self.search_url.replace("{query}", &encoded)
    }

    pub async fn execute<P: Page + ?Sized>(
        &self,
        page: &mut P,
        action: &Action<Locator>,
        session: &mut SessionState,
    ) -> Result<(), StepError> {
        info!(action = %action, "executing");
        let verb = action.verb().name();
        let failed = |e: anyhow::Error| StepError::execution(verb, e);

        match action {
            Action::Search { query } => {
                page.navigate(&self.search_url(query)).await.map_err(failed)?;
            }
            Action::Navigate { url } => {
                page.navigate(url).await.map_err(failed)?;
            }
            Action::Click { target } => {
                page.click(target).await.map_err(failed)?;
            }
            Action::Type { target, text } => {
                page.clear(target).await.map_err(failed)?;
                page.type_text(target, text).await.map_err(failed)?;
                page.press_enter().await.map_err(failed)?;
            }
            Action::ScrollUp => {
                page.scroll(ScrollDirection::Up).await.map_err(failed)?;
            }
            Action::ScrollDown => {
                page.scroll(ScrollDirection::Down).await.map_err(failed)?;
            }
            Action::Wait { seconds } => {
                let pause = match seconds {
                    Some(s) => Duration::try_from_secs_f64(*s)
                        .map_err(|e| failed(anyhow::anyhow!("cannot wait {} seconds: {}", s, e)))?,
                    None => self.default_wait,
                };
                if pause > self.max_wait {
                    warn!(requested = ?pause, cap = ?self.max_wait, "wait too long, capping");
                }
                tokio::time::sleep(pause.min(self.max_wait)).await;
            }
            Action::GoBack => {
                page.go_back().await.map_err(failed)?;
            }
            Action::DeclareGoalAchieved => {
                session.mark_goal_achieved();
            }
        }
        Ok(())
    }
}
