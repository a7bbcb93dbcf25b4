//! Objective-driven browser agent.
//!
//! Each cycle reads the page into an [`index::ElementIndex`], asks a
//! [`brain::DecisionClient`] for one [`action::ActionCommand`], runs it
//! through the [`executor::Executor`] and repeats until the decision client
//! declares the goal achieved or the retry budget runs out. See [`agent`].

pub mod action;
pub mod agent;
pub mod brain;
pub mod config;
pub mod dom;
pub mod error;
pub mod events;
pub mod executor;
pub mod hands;
pub mod index;
pub mod page;
pub mod session;
pub mod types;

pub use action::{Action, ActionCommand, Thoughts, Verb};
pub use agent::Agent;
pub use brain::{Brain, ChatMessage, ChatModel, DecisionClient, DecisionContext, OpenAiChat};
pub use error::{RetriesExhausted, StepError};
pub use events::AgentEvent;
pub use index::{ElementIndex, SuppressionRule};
pub use page::{Page, ScrollDirection};
pub use session::{HistoryEntry, RetryBudget, SessionState};
