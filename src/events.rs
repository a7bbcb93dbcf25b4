use serde::Serialize;

/// Progress of a run, published on a broadcast channel for any listener
/// (terminal output, the web UI).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    Started { objective: String },
    FinalGoal { goal: String },
    Thinking,
    Step { number: usize, description: String, thought: String },
    Observation { url: String, text: String },
    StepError { message: String, retries_left: u32 },
    TaskComplete { summary: String },
    TaskError { message: String },
    Ready,
}

impl AgentEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::Started { .. } => "started",
            AgentEvent::FinalGoal { .. } => "final_goal",
            AgentEvent::Thinking => "thinking",
            AgentEvent::Step { .. } => "step",
            AgentEvent::Observation { .. } => "observation",
            AgentEvent::StepError { .. } => "step_error",
            AgentEvent::TaskComplete { .. } => "task_complete",
            AgentEvent::TaskError { .. } => "task_error",
            AgentEvent::Ready => "ready",
        }
    }
}
