#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use browser_pilot::types::{ElementDescriptor, Locator, RawElement};
use browser_pilot::{ActionCommand, DecisionClient, DecisionContext, Page, ScrollDirection, StepError};
use std::collections::{HashMap, HashSet, VecDeque};

pub const START: &str = "about:blank";

pub fn link(text: &str, path: &str) -> RawElement {
    RawElement {
        tag: "a".into(),
        text: text.into(),
        path: path.into(),
        ..Default::default()
    }
}

pub fn input(aria: &str, path: &str) -> RawElement {
    RawElement {
        tag: "input".into(),
        aria_label: aria.into(),
        path: path.into(),
        ..Default::default()
    }
}

pub fn silent(path: &str) -> RawElement {
    RawElement {
        tag: "div".into(),
        path: path.into(),
        ..Default::default()
    }
}

/// In-memory browser: a set of pages keyed by URL, links that navigate on
/// click, and input fields that append typed text to whatever they hold.
#[derive(Default)]
pub struct FakePage {
    pub url: String,
    pub pages: HashMap<String, Vec<RawElement>>,
    pub links: HashMap<String, String>,
    pub fields: HashMap<String, String>,
    pub broken: HashSet<String>,
    pub back_stack: Vec<String>,
    pub calls: Vec<String>,
    pub extractions: usize,
    /// Upcoming extractions that fail as if the page were mid-navigation.
    pub failing_extractions: usize,
    /// Upcoming load waits that time out after the action already ran.
    pub failing_settles: usize,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            url: START.to_string(),
            ..Default::default()
        }
    }

    pub fn with_page(mut self, url: &str, elements: Vec<RawElement>) -> Self {
        self.pages.insert(url.to_string(), elements);
        self
    }

    pub fn with_link(mut self, path: &str, target: &str) -> Self {
        self.links.insert(path.to_string(), target.to_string());
        self
    }

    pub fn clicked(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| c.strip_prefix("click "))
            .collect()
    }

    fn go(&mut self, url: &str) {
        let previous = std::mem::replace(&mut self.url, url.to_string());
        self.back_stack.push(previous);
    }
}

#[async_trait]
impl Page for FakePage {
    async fn current_url(&mut self) -> Result<String> {
        if self.failing_extractions > 0 {
            self.failing_extractions -= 1;
            return Err(anyhow!("execution context was destroyed"));
        }
        Ok(self.url.clone())
    }

    async fn raw_elements(&mut self) -> Result<Vec<RawElement>> {
        self.extractions += 1;
        Ok(self.pages.get(&self.url).cloned().unwrap_or_default())
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.calls.push(format!("navigate {}", url));
        self.go(url);
        Ok(())
    }

    async fn click(&mut self, locator: &Locator) -> Result<()> {
        if self.broken.contains(locator.as_str()) {
            return Err(anyhow!("element is not interactable"));
        }
        self.calls.push(format!("click {}", locator));
        if let Some(target) = self.links.get(locator.as_str()).cloned() {
            self.go(&target);
        }
        Ok(())
    }

    async fn clear(&mut self, locator: &Locator) -> Result<()> {
        self.calls.push(format!("clear {}", locator));
        self.fields.insert(locator.as_str().to_string(), String::new());
        Ok(())
    }

    async fn type_text(&mut self, locator: &Locator, text: &str) -> Result<()> {
        self.calls.push(format!("type {} {}", locator, text));
        self.fields
            .entry(locator.as_str().to_string())
            .or_default()
            .push_str(text);
        Ok(())
    }

    async fn press_enter(&mut self) -> Result<()> {
        self.calls.push("enter".to_string());
        Ok(())
    }

    async fn scroll(&mut self, direction: ScrollDirection) -> Result<()> {
        self.calls.push(format!("scroll {:?}", direction));
        Ok(())
    }

    async fn go_back(&mut self) -> Result<()> {
        self.calls.push("back".to_string());
        if let Some(previous) = self.back_stack.pop() {
            self.url = previous;
        }
        Ok(())
    }

    async fn wait_for_load(&mut self) -> Result<()> {
        self.calls.push("settle".to_string());
        if self.failing_settles > 0 {
            self.failing_settles -= 1;
            return Err(anyhow!("page still loading"));
        }
        Ok(())
    }
}

/// What a decision request carried.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub url: Option<String>,
    pub elements: Option<Vec<ElementDescriptor>>,
    pub error: Option<StepError>,
    pub history_len: usize,
}

/// Decision client that replays canned replies. Replies are raw model text
/// and go through the real reply parser. Once the script runs out every
/// request fails with `exhausted`.
pub struct ScriptedDecision {
    pub goals: VecDeque<Result<String, StepError>>,
    pub replies: VecDeque<Result<String, StepError>>,
    pub exhausted: StepError,
    pub requests: Vec<SeenRequest>,
    pub observations: usize,
    /// Upcoming observation calls that fail in transport.
    pub failing_observations: usize,
}

impl ScriptedDecision {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            goals: VecDeque::new(),
            replies: replies.into_iter().map(|r| Ok(r.into())).collect(),
            exhausted: StepError::parse("script exhausted"),
            requests: Vec::new(),
            observations: 0,
            failing_observations: 0,
        }
    }

    /// Requests made with an element list, i.e. after the first step.
    pub fn decide_requests(&self) -> Vec<&SeenRequest> {
        self.requests.iter().filter(|r| r.elements.is_some()).collect()
    }
}

pub fn reply(action: &str, args: &str) -> String {
    format!(
        r#"{{"thoughts":{{"text":"doing {action}","reasoning":"test"}},"command":{{"action":"{action}","args":{args}}}}}"#
    )
}

pub const GARBAGE: &str = "I am not sure what to do next.";

#[async_trait]
impl DecisionClient for ScriptedDecision {
    async fn final_goal(&mut self, objective: &str) -> Result<String, StepError> {
        self.goals
            .pop_front()
            .unwrap_or_else(|| Ok(format!("reach: {}", objective)))
    }

    async fn next_action(&mut self, ctx: DecisionContext<'_>) -> Result<ActionCommand, StepError> {
        self.requests.push(SeenRequest {
            url: ctx.url.map(String::from),
            elements: ctx.elements.map(<[ElementDescriptor]>::to_vec),
            error: ctx.error.cloned(),
            history_len: ctx.history.len(),
        });
        match self.replies.pop_front() {
            Some(Ok(text)) => ActionCommand::parse_reply(&text),
            Some(Err(e)) => Err(e),
            None => Err(self.exhausted.clone()),
        }
    }

    async fn observe(&mut self, ctx: DecisionContext<'_>) -> Result<String, StepError> {
        if self.failing_observations > 0 {
            self.failing_observations -= 1;
            return Err(StepError::DecisionTransport("observer timed out".into()));
        }
        self.observations += 1;
        Ok(format!(
            "on {} with {} elements",
            ctx.url.unwrap_or("?"),
            ctx.elements.map_or(0, <[ElementDescriptor]>::len)
        ))
    }
}
