use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::action::{ActionCommand, Verb};
use crate::error::StepError;
use crate::session::HistoryEntry;
use crate::types::ElementDescriptor;

/// A message in the conversation sent to the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// One round trip to a chat-completion model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// `json_reply` asks the model to answer with a JSON object only.
    async fn complete(&self, messages: &[ChatMessage], json_reply: bool) -> Result<String>;
}

/// Everything the decision-maker may look at for one request.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    pub objective: &'a str,
    pub final_goal: &'a str,
    pub history: &'a [HistoryEntry],
    pub observation: Option<&'a str>,
    pub url: Option<&'a str>,
    /// `None` for the first step, before anything has been extracted.
    pub elements: Option<&'a [ElementDescriptor]>,
    pub error: Option<&'a StepError>,
}

/// The external decision-maker, as the control loop sees it.
#[async_trait]
pub trait DecisionClient: Send {
    /// Restate the objective as a concrete goal. Called once per run.
    async fn final_goal(&mut self, objective: &str) -> Result<String, StepError>;

    /// Propose an action. Free text in the context is passed through as is.
    async fn next_action(&mut self, ctx: DecisionContext<'_>) -> Result<ActionCommand, StepError>;

    /// Summarize the current page and progress. The result is opaque text.
    async fn observe(&mut self, ctx: DecisionContext<'_>) -> Result<String, StepError>;
}

const GOAL_SYSTEM_PROMPT: &str = r#"You turn a user's request into the concrete goal a browser agent must reach.
Answer with one short paragraph: the goal, what counts as done, and the likely steps to get there. No preamble."#;

const ACTION_SYSTEM_PROMPT: &str = r#"You control a real web browser, one action at a time, to reach a goal.
Pick the single most useful next action and explain it briefly.

Reply with ONE JSON object and nothing else:
{"thoughts": {"text": "<what you will do>", "reasoning": "<why>"},
 "command": {"action": "<action name>", "args": [<arguments>]}}

Rules:
- Use only the listed actions, with exactly the listed arguments.
- Elements are addressed by their integer `id` from the current element list.
- `type` clears the field, enters the text and presses Enter.
- Use `declareGoalAchieved` only once the goal is actually reached.
- If an error is shown, change your approach instead of repeating it."#;

const OBSERVE_SYSTEM_PROMPT: &str = r#"You watch a browser agent work toward a goal.
Given the current page and the actions taken so far, say in a few sentences where the agent is, whether it is getting closer to the goal, and what it should do next."#;

/// Decision client backed by a chat model.
pub struct Brain<M> {
    model: M,
}

impl<M: ChatModel> Brain<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    async fn ask(&self, system: &str, user: String, json_reply: bool) -> Result<String, StepError> {
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];
        let reply = self
            .model
            .complete(&messages, json_reply)
            .await
            .map_err(StepError::transport)?;
        debug!(reply = %reply, "model replied");
        Ok(reply)
    }
}

#[async_trait]
impl<M: ChatModel> DecisionClient for Brain<M> {
    async fn final_goal(&mut self, objective: &str) -> Result<String, StepError> {
        let prompt = format!("User's request: \"{}\"\n\nWhat is the final goal?", objective);
        let goal = self.ask(GOAL_SYSTEM_PROMPT, prompt, false).await?;
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(StepError::parse("the final goal came back empty"));
        }
        Ok(goal.to_string())
    }

    async fn next_action(&mut self, ctx: DecisionContext<'_>) -> Result<ActionCommand, StepError> {
        let reply = self.ask(ACTION_SYSTEM_PROMPT, action_prompt(&ctx), true).await?;
        ActionCommand::parse_reply(&reply).inspect_err(|e| warn!(error = %e, "unusable decision reply"))
    }

    async fn observe(&mut self, ctx: DecisionContext<'_>) -> Result<String, StepError> {
        let reply = self.ask(OBSERVE_SYSTEM_PROMPT, observe_prompt(&ctx), false).await?;
        Ok(reply.trim().to_string())
    }
}

fn render_history(history: &[HistoryEntry]) -> String {
    let actions: Vec<String> = history
        .iter()
        .filter(|entry| matches!(entry, HistoryEntry::Action { .. }))
        .map(|entry| format!("- {}", entry))
        .collect();
    if actions.is_empty() {
        "None.".to_string()
    } else {
        actions.join("\n")
    }
}

fn render_elements(elements: &[ElementDescriptor]) -> String {
    if elements.is_empty() {
        return "(no interactive elements found)".to_string();
    }
    elements
        .iter()
        .map(|el| serde_json::to_string(el).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn action_prompt(ctx: &DecisionContext<'_>) -> String {
    let mut prompt = format!(
        "Objective: \"{}\"\nFinal goal: \"{}\"\n\nActions taken so far (avoid repeating yourself):\n{}\n",
        ctx.objective,
        ctx.final_goal,
        render_history(ctx.history)
    );

    let available: Vec<&str> = Verb::ALL.iter().map(|v| v.signature()).collect();
    prompt.push_str(&format!("\nAvailable actions:\n- {}\n", available.join("\n- ")));

    if let Some(observation) = ctx.observation {
        prompt.push_str(&format!("\nObservation of the current page:\n{}\n", observation));
    }
    if let Some(url) = ctx.url {
        prompt.push_str(&format!("\nCurrent URL: {}\n", url));
    }
    match ctx.elements {
        Some(elements) => prompt.push_str(&format!(
            "\nCurrent page elements (refer to them by id):\n{}\n",
            render_elements(elements)
        )),
        None => prompt.push_str(
            "\nNo page is loaded yet, so there are no elements to click or type into. Start by searching or navigating.\n",
        ),
    }
    if let Some(error) = ctx.error {
        prompt.push_str(&format!("\nERROR from your previous attempt (avoid it):\n{}\n", error));
    }
    prompt.push_str("\nWhat is your next action?");
    prompt
}

fn observe_prompt(ctx: &DecisionContext<'_>) -> String {
    format!(
        "Final goal: \"{}\"\n\nCurrent URL: {}\n\nCurrent page elements:\n{}\n\nActions taken so far:\n{}",
        ctx.final_goal,
        ctx.url.unwrap_or("unknown"),
        render_elements(ctx.elements.unwrap_or_default()),
        render_history(ctx.history)
    )
}

/// OpenAI-compatible chat completions endpoint.
pub struct OpenAiChat {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiChat {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage], json_reply: bool) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });
        if json_reply {
            body["response_format"] = json!({"type": "json_object"});
        }

        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        let status = response.status();
        let json_resp: serde_json::Value = response
            .json()
            .await
            .context("chat API returned a non-JSON body")?;

        if !status.is_success() {
            let err_msg = json_resp["error"]["message"]
                .as_str()
                .unwrap_or("Unknown API error");
            return Err(anyhow!("chat API error ({}): {}", status, err_msg));
        }

        json_resp["choices"][0]["message"]["content"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| anyhow!("no content in chat API response: {}", json_resp))
    }
}
