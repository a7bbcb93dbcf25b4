use std::fmt;

use crate::action::ActionCommand;
use crate::error::StepError;

/// Bounded counter of consecutive failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    max: u32,
    remaining: u32,
}

impl RetryBudget {
    pub fn new(max: u32) -> Self {
        Self {
            max,
            remaining: max,
        }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    pub(crate) fn reset(&mut self) {
        self.remaining = self.max;
    }

    /// Spend one retry. Returns the number left.
    pub(crate) fn spend(&mut self) -> u32 {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEntry {
    Action { step: usize, command: ActionCommand },
    Observation { url: String, text: String },
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryEntry::Action { step, command } => {
                write!(f, "{}. {}", step, command.action)?;
                if !command.thoughts.text.is_empty() {
                    write!(f, " (thought: {})", command.thoughts.text)?;
                }
                Ok(())
            }
            HistoryEntry::Observation { url, text } => write!(f, "observed {}: {}", url, text),
        }
    }
}

/// Everything that survives across perception cycles for one run.
///
/// The objective and final goal are fixed once set, history only grows and
/// the goal flag only ever goes from false to true. Mutation is reserved to
/// the control loop and the executor.
#[derive(Debug, Clone)]
pub struct SessionState {
    objective: String,
    final_goal: Option<String>,
    history: Vec<HistoryEntry>,
    goal_achieved: bool,
    budget: RetryBudget,
    last_error: Option<StepError>,
    steps: usize,
}

impl SessionState {
    pub fn new(objective: impl Into<String>, max_retries: u32) -> Self {
        Self {
            objective: objective.into(),
            final_goal: None,
            history: Vec::new(),
            goal_achieved: false,
            budget: RetryBudget::new(max_retries),
            last_error: None,
            steps: 0,
        }
    }

    pub fn objective(&self) -> &str {
        &self.objective
    }

    /// The derived goal, or the objective itself before it has been derived.
    pub fn final_goal(&self) -> &str {
        self.final_goal.as_deref().unwrap_or(&self.objective)
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// The most recent observation summary, if any.
    pub fn last_observation(&self) -> Option<&str> {
        self.history.iter().rev().find_map(|entry| match entry {
            HistoryEntry::Observation { text, .. } => Some(text.as_str()),
            HistoryEntry::Action { .. } => None,
        })
    }

    pub fn goal_achieved(&self) -> bool {
        self.goal_achieved
    }

    pub fn budget(&self) -> RetryBudget {
        self.budget
    }

    /// Error from the immediately preceding failed attempt.
    pub fn last_error(&self) -> Option<&StepError> {
        self.last_error.as_ref()
    }

    /// Number of actions executed so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub(crate) fn set_final_goal(&mut self, goal: String) {
        if self.final_goal.is_none() {
            self.final_goal = Some(goal);
        }
    }

    pub(crate) fn mark_goal_achieved(&mut self) {
        self.goal_achieved = true;
    }

    pub(crate) fn record_action(&mut self, command: ActionCommand) {
        self.steps += 1;
        self.history.push(HistoryEntry::Action {
            step: self.steps,
            command,
        });
    }

    pub(crate) fn record_observation(&mut self, url: String, text: String) {
        self.history.push(HistoryEntry::Observation { url, text });
    }

    /// Record a failed attempt and spend one retry. Returns the retries left.
    pub(crate) fn record_failure(&mut self, error: StepError) -> u32 {
        self.last_error = Some(error);
        self.budget.spend()
    }

    /// A full attempt succeeded: refill the budget and forget the error.
    pub(crate) fn record_success(&mut self) {
        self.budget.reset();
        self.last_error = None;
    }
}
