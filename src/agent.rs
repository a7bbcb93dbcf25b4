//! The perceive → decide → execute control loop.
//!
//! ```text
//! INIT ─▶ FIRST_STEP ─▶ EXECUTE ─▶ OBSERVE ─▶ DECIDE ─▶ EXECUTE ─▶ OBSERVE …
//!                                                              └─▶ DONE
//! ```
//!
//! Every failure spends one unit of the session's retry budget and is
//! retried in place, with the error handed to the next decision request.
//! A failed EXECUTE re-reads the page before deciding again, so a retry
//! never resolves ids against the index that just failed. An action that
//! ran but whose page never settled is still recorded in the history. The budget is
//! refilled after each action that executes cleanly; running it down to
//! zero ends the run.

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::action::ActionCommand;
use crate::brain::{DecisionClient, DecisionContext};
use crate::dom;
use crate::error::{RetriesExhausted, StepError};
use crate::events::AgentEvent;
use crate::executor::Executor;
use crate::index::{ElementIndex, SuppressionRule};
use crate::page::Page;
use crate::session::{HistoryEntry, SessionState};

#[derive(Debug)]
enum Phase {
    Init,
    FirstStep,
    Observe,
    /// Re-read the page without asking for an observation.
    Refresh,
    Decide,
    Execute(ActionCommand),
    Done,
}

pub struct Agent<P, D> {
    page: P,
    brain: D,
    executor: Executor,
    rules: Vec<SuppressionRule>,
    events: broadcast::Sender<AgentEvent>,
}

impl<P: Page, D: DecisionClient> Agent<P, D> {
    pub fn new(page: P, brain: D, events: broadcast::Sender<AgentEvent>) -> Self {
        Self {
            page,
            brain,
            executor: Executor::default(),
            rules: SuppressionRule::defaults(),
            events,
        }
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_rules(mut self, rules: Vec<SuppressionRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut P {
        &mut self.page
    }

    pub fn brain(&self) -> &D {
        &self.brain
    }

    /// Drive `session` until its goal is achieved or its retry budget runs out.
    pub async fn run(&mut self, session: &mut SessionState) -> Result<(), RetriesExhausted> {
        info!(objective = session.objective(), "starting run");
        self.emit(AgentEvent::Started {
            objective: session.objective().to_string(),
        });

        let mut index: Option<ElementIndex> = None;
        let mut phase = Phase::Init;

        loop {
            debug!(?phase, retries_left = session.budget().remaining(), "loop");
            phase = match phase {
                Phase::Init => match self.brain.final_goal(session.objective()).await {
                    Ok(goal) => {
                        info!(goal = %goal, "final goal");
                        self.emit(AgentEvent::FinalGoal { goal: goal.clone() });
                        session.set_final_goal(goal);
                        session.record_success();
                        Phase::FirstStep
                    }
                    Err(e) => {
                        self.fail(session, e)?;
                        Phase::Init
                    }
                },

                Phase::FirstStep | Phase::Decide => {
                    let retry = if index.is_none() { Phase::FirstStep } else { Phase::Decide };
                    match self.decide(session, index.as_ref()).await {
                        Ok(command) => Phase::Execute(command),
                        Err(e) => {
                            self.fail(session, e)?;
                            retry
                        }
                    }
                }

                Phase::Execute(command) => {
                    let steps_before = session.steps();
                    match self.execute(session, command, index.as_ref()).await {
                        Ok(()) => {
                            session.record_success();
                            if session.goal_achieved() {
                                Phase::Done
                            } else {
                                Phase::Observe
                            }
                        }
                        Err(e) => {
                            // A settle failure comes after the action already ran.
                            let landed = session.steps() > steps_before;
                            self.fail(session, e)?;
                            if index.is_none() && !landed {
                                Phase::FirstStep
                            } else {
                                Phase::Refresh
                            }
                        }
                    }
                }

                Phase::Observe => match self.perceive().await {
                    Ok(fresh) => {
                        let observed = self.observe(session, &fresh).await;
                        index = Some(fresh);
                        match observed {
                            Ok(()) => Phase::Decide,
                            Err(e) => {
                                self.fail(session, e)?;
                                Phase::Observe
                            }
                        }
                    }
                    Err(e) => {
                        self.fail(session, e)?;
                        Phase::Observe
                    }
                },

                Phase::Refresh => match self.perceive().await {
                    Ok(fresh) => {
                        index = Some(fresh);
                        Phase::Decide
                    }
                    Err(e) => {
                        self.fail(session, e)?;
                        Phase::Refresh
                    }
                },

                Phase::Done => break,
            };
        }

        let summary = session
            .history()
            .iter()
            .rev()
            .find_map(|entry| match entry {
                HistoryEntry::Action { command, .. } if !command.thoughts.text.is_empty() => {
                    Some(command.thoughts.text.clone())
                }
                _ => None,
            })
            .unwrap_or_else(|| session.final_goal().to_string());
        info!(steps = session.steps(), summary = %summary, "goal achieved");
        self.emit(AgentEvent::TaskComplete { summary });
        Ok(())
    }

    async fn decide(
        &mut self,
        session: &SessionState,
        index: Option<&ElementIndex>,
    ) -> Result<ActionCommand, StepError> {
        info!("Asking brain for next step");
        self.emit(AgentEvent::Thinking);

        let descriptors = index.map(ElementIndex::descriptors);
        let ctx = DecisionContext {
            objective: session.objective(),
            final_goal: session.final_goal(),
            history: session.history(),
            observation: session.last_observation(),
            url: index.map(ElementIndex::url),
            elements: descriptors.as_deref(),
            error: session.last_error(),
        };
        let command = self.brain.next_action(ctx).await?;
        info!(action = %command.action, thought = %command.thoughts.text, "brain decided");
        Ok(command)
    }

    async fn execute(
        &mut self,
        session: &mut SessionState,
        command: ActionCommand,
        index: Option<&ElementIndex>,
    ) -> Result<(), StepError> {
        let resolved = command.action.clone().resolve(index)?;
        self.executor.execute(&mut self.page, &resolved, session).await?;

        self.emit(AgentEvent::Step {
            number: session.steps() + 1,
            description: command.action.to_string(),
            thought: command.thoughts.text.clone(),
        });
        session.record_action(command);

        if resolved.changes_page() {
            self.page
                .wait_for_load()
                .await
                .map_err(|e| StepError::execution(resolved.verb().name(), e.context("page did not settle")))?;
        }
        Ok(())
    }

    async fn perceive(&mut self) -> Result<ElementIndex, StepError> {
        let extraction = dom::extract(&mut self.page).await?;
        Ok(ElementIndex::build(
            extraction.elements,
            &extraction.url,
            &self.rules,
        ))
    }

    async fn observe(&mut self, session: &mut SessionState, index: &ElementIndex) -> Result<(), StepError> {
        let descriptors = index.descriptors();
        let ctx = DecisionContext {
            objective: session.objective(),
            final_goal: session.final_goal(),
            history: session.history(),
            observation: session.last_observation(),
            url: Some(index.url()),
            elements: Some(descriptors.as_slice()),
            error: session.last_error(),
        };
        let text = self.brain.observe(ctx).await?;
        info!(url = index.url(), observation = %text, "observed page");
        self.emit(AgentEvent::Observation {
            url: index.url().to_string(),
            text: text.clone(),
        });
        session.record_observation(index.url().to_string(), text);
        Ok(())
    }

    /// Record a failed attempt. Errors out once the budget is gone.
    fn fail(&self, session: &mut SessionState, error: StepError) -> Result<(), RetriesExhausted> {
        let retries_left = session.record_failure(error.clone());
        warn!(error = %error, retries_left, "attempt failed");
        self.emit(AgentEvent::StepError {
            message: error.to_string(),
            retries_left,
        });

        if retries_left == 0 {
            let exhausted = RetriesExhausted {
                budget: session.budget().max(),
                last_error: error,
            };
            warn!(error = %exhausted, "giving up");
            self.emit(AgentEvent::TaskError {
                message: exhausted.to_string(),
            });
            return Err(exhausted);
        }
        Ok(())
    }

    fn emit(&self, event: AgentEvent) {
        // No listeners is fine.
        let _ = self.events.send(event);
    }
}
