use thiserror::Error;

/// A failed attempt inside the control loop.
///
/// Every variant is recoverable: the loop spends one unit of retry budget and
/// hands the rendered message to the next decision request so the model can
/// correct itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    /// The page could not be read (mid-navigation, detached, script failure).
    #[error("could not read page elements: {0}")]
    Extraction(String),

    /// An element id that does not exist in the current element list.
    #[error("element id {id} does not exist on the current page ({available} elements, valid ids are 0..{available})")]
    LocatorResolution { id: usize, available: usize },

    /// Unknown verb or wrong number of arguments.
    #[error("invalid action: {0}")]
    ActionDispatch(String),

    /// The browser rejected an otherwise well-formed action.
    #[error("action `{action}` failed: {reason}")]
    ActionExecution { action: String, reason: String },

    /// The decision reply was malformed or incomplete.
    #[error("could not understand the response: {0}")]
    DecisionParse(String),

    /// The decision request itself failed (network, API error).
    #[error("decision request failed: {0}")]
    DecisionTransport(String),
}

impl StepError {
    pub fn extraction(err: anyhow::Error) -> Self {
        Self::Extraction(format!("{:#}", err))
    }

    pub fn execution(action: impl Into<String>, err: anyhow::Error) -> Self {
        Self::ActionExecution {
            action: action.into(),
            reason: format!("{:#}", err),
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::DecisionParse(msg.into())
    }

    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::ActionDispatch(msg.into())
    }

    pub fn transport(err: anyhow::Error) -> Self {
        Self::DecisionTransport(format!("{:#}", err))
    }
}

/// The run was aborted because the retry budget reached zero.
#[derive(Debug, Clone, Error)]
#[error("gave up after {budget} consecutive failed attempts; last error: {last_error}")]
pub struct RetriesExhausted {
    pub budget: u32,
    pub last_error: StepError,
}
