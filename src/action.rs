//! The closed action vocabulary and decoding of decision replies.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::RangeInclusive;

use crate::error::StepError;
use crate::index::ElementIndex;
use crate::types::{ElementId, Locator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Search,
    Navigate,
    Click,
    Type,
    ScrollUp,
    ScrollDown,
    Wait,
    GoBack,
    DeclareGoalAchieved,
}

impl Verb {
    pub const ALL: [Verb; 9] = [
        Verb::Search,
        Verb::Navigate,
        Verb::Click,
        Verb::Type,
        Verb::ScrollUp,
        Verb::ScrollDown,
        Verb::Wait,
        Verb::GoBack,
        Verb::DeclareGoalAchieved,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Verb::Search => "search",
            Verb::Navigate => "navigate",
            Verb::Click => "click",
            Verb::Type => "type",
            Verb::ScrollUp => "scrollUp",
            Verb::ScrollDown => "scrollDown",
            Verb::Wait => "wait",
            Verb::GoBack => "goBack",
            Verb::DeclareGoalAchieved => "declareGoalAchieved",
        }
    }

    /// Signature shown to the decision client.
    pub fn signature(self) -> &'static str {
        match self {
            Verb::Search => "search(text)",
            Verb::Navigate => "navigate(url)",
            Verb::Click => "click(id)",
            Verb::Type => "type(id, text)",
            Verb::ScrollUp => "scrollUp()",
            Verb::ScrollDown => "scrollDown()",
            Verb::Wait => "wait(seconds?)",
            Verb::GoBack => "goBack()",
            Verb::DeclareGoalAchieved => "declareGoalAchieved()",
        }
    }

    pub fn arity(self) -> RangeInclusive<usize> {
        match self {
            Verb::Search | Verb::Navigate | Verb::Click => 1..=1,
            Verb::Type => 2..=2,
            Verb::Wait => 0..=1,
            Verb::ScrollUp | Verb::ScrollDown | Verb::GoBack | Verb::DeclareGoalAchieved => 0..=0,
        }
    }

    /// Accepts canonical names and the legacy underscore spellings
    /// (`_click`, `_go_to_url`, `_set_goal_achieved`, ...), ignoring case,
    /// `_` and `-`.
    pub fn from_name(name: &str) -> Option<Verb> {
        let key: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        let verb = match key.as_str() {
            "search" | "googlesearch" => Verb::Search,
            "navigate" | "gotourl" | "goto" => Verb::Navigate,
            "click" => Verb::Click,
            "type" => Verb::Type,
            "scrollup" => Verb::ScrollUp,
            "scrolldown" => Verb::ScrollDown,
            "wait" => Verb::Wait,
            "goback" => Verb::GoBack,
            "declaregoalachieved" | "setgoalachieved" => Verb::DeclareGoalAchieved,
            _ => return None,
        };
        Some(verb)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One browser action. `T` is how elements are addressed: by [`ElementId`]
/// as proposed by the decision client, or by [`Locator`] once resolved
/// against the current [`ElementIndex`]. The executor only accepts the latter.
#[derive(Debug, Clone, PartialEq)]
pub enum Action<T = ElementId> {
    Search { query: String },
    Navigate { url: String },
    Click { target: T },
    Type { target: T, text: String },
    ScrollUp,
    ScrollDown,
    Wait { seconds: Option<f64> },
    GoBack,
    DeclareGoalAchieved,
}

impl<T> Action<T> {
    pub fn verb(&self) -> Verb {
        match self {
            Action::Search { .. } => Verb::Search,
            Action::Navigate { .. } => Verb::Navigate,
            Action::Click { .. } => Verb::Click,
            Action::Type { .. } => Verb::Type,
            Action::ScrollUp => Verb::ScrollUp,
            Action::ScrollDown => Verb::ScrollDown,
            Action::Wait { .. } => Verb::Wait,
            Action::GoBack => Verb::GoBack,
            Action::DeclareGoalAchieved => Verb::DeclareGoalAchieved,
        }
    }

    /// Whether the page must settle before the next perception pass.
    pub fn changes_page(&self) -> bool {
        matches!(
            self,
            Action::Search { .. }
                | Action::Navigate { .. }
                | Action::Click { .. }
                | Action::Type { .. }
                | Action::GoBack
        )
    }
}

impl Action<ElementId> {
    /// Swap element ids for locators from `index`. Actions without an
    /// element target pass through unchanged. Without an index (the first
    /// step) any element target is unresolvable.
    pub fn resolve(self, index: Option<&ElementIndex>) -> Result<Action<Locator>, StepError> {
        let locate = |id: ElementId| -> Result<Locator, StepError> {
            match index {
                Some(index) => index.resolve(id).cloned(),
                None => Err(StepError::LocatorResolution { id: id.0, available: 0 }),
            }
        };
        Ok(match self {
            Action::Search { query } => Action::Search { query },
            Action::Navigate { url } => Action::Navigate { url },
            Action::Click { target } => Action::Click {
                target: locate(target)?,
            },
            Action::Type { target, text } => Action::Type {
                target: locate(target)?,
                text,
            },
            Action::ScrollUp => Action::ScrollUp,
            Action::ScrollDown => Action::ScrollDown,
            Action::Wait { seconds } => Action::Wait { seconds },
            Action::GoBack => Action::GoBack,
            Action::DeclareGoalAchieved => Action::DeclareGoalAchieved,
        })
    }
}

impl<T: fmt::Display> fmt::Display for Action<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Search { query } => write!(f, "search({:?})", query),
            Action::Navigate { url } => write!(f, "navigate({:?})", url),
            Action::Click { target } => write!(f, "click({})", target),
            Action::Type { target, text } => write!(f, "type({}, {:?})", target, text),
            Action::Wait { seconds: Some(s) } => write!(f, "wait({})", s),
            Action::Wait { seconds: None } => f.write_str("wait()"),
            other => write!(f, "{}()", other.verb()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thoughts {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reasoning: String,
}

/// A decoded decision: what to do and why.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCommand {
    pub action: Action,
    pub thoughts: Thoughts,
}

#[derive(Deserialize)]
struct Reply {
    #[serde(default)]
    thoughts: Option<Value>,
    command: Option<Call>,
}

#[derive(Deserialize)]
struct Call {
    action: Option<String>,
    #[serde(default)]
    args: Option<Value>,
}

impl ActionCommand {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            thoughts: Thoughts::default(),
        }
    }

    /// Decode a raw decision reply. Prose around the JSON is ignored.
    pub fn parse_reply(reply: &str) -> Result<Self, StepError> {
        let value = first_json_value(reply)?;
        if !value.is_object() {
            return Err(StepError::parse("expected a JSON object with `thoughts` and `command`"));
        }
        let reply: Reply = serde_json::from_value(value)
            .map_err(|e| StepError::parse(format!("malformed reply: {}", e)))?;

        let call = reply
            .command
            .ok_or_else(|| StepError::parse("missing `command`"))?;
        let name = call
            .action
            .ok_or_else(|| StepError::parse("missing `command.action`"))?;
        let args = match call.args {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(args)) => args,
            Some(other) => vec![other],
        };

        Ok(Self {
            action: decode_action(&name, &args)?,
            thoughts: reply.thoughts.map(decode_thoughts).unwrap_or_default(),
        })
    }
}

/// The first complete JSON value starting at the first `{` or `[`;
/// anything after it is discarded.
pub fn first_json_value(reply: &str) -> Result<Value, StepError> {
    let start = reply
        .find(['{', '['])
        .ok_or_else(|| StepError::parse("no JSON object found in the response"))?;
    let mut stream = serde_json::Deserializer::from_str(&reply[start..]).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(StepError::parse(format!("invalid JSON: {}", e))),
        None => Err(StepError::parse("no JSON object found in the response")),
    }
}

fn decode_thoughts(value: Value) -> Thoughts {
    match value {
        Value::String(text) => Thoughts {
            text,
            reasoning: String::new(),
        },
        other => serde_json::from_value(other).unwrap_or_default(),
    }
}

fn decode_action(name: &str, args: &[Value]) -> Result<Action, StepError> {
    let verb = Verb::from_name(name)
        .ok_or_else(|| StepError::dispatch(format!("unknown action `{}`", name)))?;

    let arity = verb.arity();
    if !arity.contains(&args.len()) {
        let expected = if arity.start() == arity.end() {
            arity.start().to_string()
        } else {
            format!("{} to {}", arity.start(), arity.end())
        };
        return Err(StepError::dispatch(format!(
            "`{}` takes {} argument(s), got {}",
            verb.signature(),
            expected,
            args.len()
        )));
    }

    Ok(match verb {
        Verb::Search => Action::Search {
            query: text_arg(verb, &args[0])?,
        },
        Verb::Navigate => Action::Navigate {
            url: text_arg(verb, &args[0])?,
        },
        Verb::Click => Action::Click {
            target: element_id_arg(&args[0])?,
        },
        Verb::Type => Action::Type {
            target: element_id_arg(&args[0])?,
            text: text_arg(verb, &args[1])?,
        },
        Verb::ScrollUp => Action::ScrollUp,
        Verb::ScrollDown => Action::ScrollDown,
        Verb::Wait => Action::Wait {
            seconds: args.first().map(seconds_arg).transpose()?.flatten(),
        },
        Verb::GoBack => Action::GoBack,
        Verb::DeclareGoalAchieved => Action::DeclareGoalAchieved,
    })
}

fn text_arg(verb: Verb, value: &Value) -> Result<String, StepError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(StepError::parse(format!(
            "`{}` expects a text argument, got {}",
            verb, value
        ))),
    }
}

/// Element ids are normally bare integers; a string such as `"id 3"` is
/// accepted when it holds exactly one run of digits.
fn element_id_arg(value: &Value) -> Result<ElementId, StepError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(|id| ElementId(id as usize))
            .ok_or_else(|| StepError::parse(format!("element id must be a non-negative integer, got {}", n))),
        Value::String(s) => {
            let mut runs = s
                .split(|c: char| !c.is_ascii_digit())
                .filter(|run| !run.is_empty());
            match (runs.next(), runs.next()) {
                (Some(digits), None) => digits
                    .parse::<usize>()
                    .map(ElementId)
                    .map_err(|e| StepError::parse(format!("element id {:?} is not usable: {}", s, e))),
                (None, _) => Err(StepError::parse(format!("element id {:?} contains no number", s))),
                (Some(_), Some(_)) => Err(StepError::parse(format!(
                    "element id {:?} is ambiguous, give a single number",
                    s
                ))),
            }
        }
        other => Err(StepError::parse(format!("element id must be an integer, got {}", other))),
    }
}

fn seconds_arg(value: &Value) -> Result<Option<f64>, StepError> {
    let seconds = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match seconds {
        Some(s) if s.is_finite() && s >= 0.0 => Ok(Some(s)),
        _ => Err(StepError::parse(format!(
            "`wait` expects a non-negative number of seconds, got {}",
            value
        ))),
    }
}
