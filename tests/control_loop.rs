mod common;

use browser_pilot::{Agent, AgentEvent, HistoryEntry, SessionState, StepError};
use common::{FakePage, GARBAGE, ScriptedDecision, link, input, reply, silent};
use tokio::sync::broadcast;

const RESULTS: &str = "https://www.google.com/search?q=rust+book";
const RBE: &str = "https://doc.rust-lang.org/rust-by-example/";

fn agent(page: FakePage, brain: ScriptedDecision) -> Agent<FakePage, ScriptedDecision> {
    let (events, _) = broadcast::channel(256);
    Agent::new(page, brain, events)
}

/// `(message, retries_left)` for every failed attempt published so far.
fn step_errors(rx: &mut broadcast::Receiver<AgentEvent>) -> Vec<(String, u32)> {
    let mut errors = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let AgentEvent::StepError { message, retries_left } = event {
            errors.push((message, retries_left));
        }
    }
    errors
}

fn two_pages() -> FakePage {
    FakePage::new()
        .with_page(
            "https://a.test/",
            vec![link("one", "A0"), link("two", "A1"), link("three", "A2")],
        )
        .with_link("A2", "https://b.test/")
        .with_page("https://b.test/", vec![link("only", "B0")])
}

#[tokio::test]
async fn search_click_and_declare() {
    let page = FakePage::new()
        .with_page(
            RESULTS,
            vec![
                input("Search", "Q"),
                link("The Rust Programming Language", "R0"),
                silent("D0"),
                link("Tools", "T0"),
                link("Rust by Example", "R1"),
            ],
        )
        .with_link("R1", RBE);
    let brain = ScriptedDecision::new([
        reply("search", r#"["rust book"]"#),
        reply("click", "[1]"),
        reply("declareGoalAchieved", "[]"),
    ]);
    let mut agent = agent(page, brain);
    let mut session = SessionState::new("find rust by example", 5);

    agent.run(&mut session).await.unwrap();

    assert!(session.goal_achieved());
    assert_eq!(session.steps(), 3);
    assert_eq!(session.final_goal(), "reach: find rust by example");
    assert_eq!(agent.page().url, RBE);
    assert_eq!(agent.page().clicked(), vec!["R1"]);

    let requests = &agent.brain().requests;
    assert_eq!(requests.len(), 3);
    assert!(requests[0].elements.is_none());
    assert!(requests[0].url.is_none());

    // Search box, "Tools" and the empty div never get an id.
    let listed = requests[1].elements.as_ref().unwrap();
    let texts: Vec<_> = listed.iter().map(|d| (d.id.0, d.text.as_str())).collect();
    assert_eq!(
        texts,
        vec![(0, "The Rust Programming Language"), (1, "Rust by Example")]
    );
    assert_eq!(requests[1].url.as_deref(), Some(RESULTS));
    assert_eq!(requests[2].url.as_deref(), Some(RBE));
    assert_eq!(agent.brain().observations, 2);
}

#[tokio::test]
async fn always_failing_decisions_exhaust_the_budget() {
    let brain = ScriptedDecision::new([reply("navigate", r#"["https://a.test/"]"#)]);
    let mut agent = agent(two_pages(), brain);
    let mut session = SessionState::new("loop forever", 5);

    let err = agent.run(&mut session).await.unwrap_err();

    assert_eq!(err.budget, 5);
    assert!(matches!(err.last_error, StepError::DecisionParse(_)));
    assert!(!session.goal_achieved());
    assert_eq!(session.budget().remaining(), 0);

    let decides = agent.brain().decide_requests();
    assert_eq!(decides.len(), 5);
    assert!(decides[0].error.is_none());
    assert!(decides[1..].iter().all(|r| r.error.is_some()));
}

#[tokio::test]
async fn budget_refills_after_a_successful_action() {
    // Two failures, one success, then failures until a budget of three runs out.
    let brain = ScriptedDecision::new([
        reply("navigate", r#"["https://a.test/"]"#),
        GARBAGE.to_string(),
        GARBAGE.to_string(),
        reply("scrollDown", "[]"),
    ]);
    let mut agent = agent(two_pages(), brain);
    let mut session = SessionState::new("scroll around", 3);

    let err = agent.run(&mut session).await.unwrap_err();

    assert_eq!(err.budget, 3);
    assert_eq!(session.steps(), 2);
    let failures = agent
        .brain()
        .decide_requests()
        .iter()
        .filter(|r| r.error.is_some())
        .count();
    // Five failures in all: two before the scroll, three after it. Every
    // failure but the last is handed to the following request.
    assert_eq!(agent.brain().decide_requests().len(), 6);
    assert_eq!(failures, 4);
    assert!(agent.page().calls.contains(&"scroll Down".to_string()));
}

#[tokio::test]
async fn ids_from_a_previous_page_are_rejected() {
    let brain = ScriptedDecision::new([
        reply("navigate", r#"["https://a.test/"]"#),
        reply("click", "[2]"),
        // Stale: b.test only has one element.
        reply("click", "[2]"),
        reply("click", "[0]"),
        reply("declareGoalAchieved", "[]"),
    ]);
    let mut agent = agent(two_pages(), brain);
    let mut session = SessionState::new("click through", 5);

    agent.run(&mut session).await.unwrap();

    assert_eq!(agent.page().clicked(), vec!["A2", "B0"]);
    let requests = &agent.brain().requests;
    assert_eq!(requests.len(), 5);
    assert_eq!(
        requests[3].error,
        Some(StepError::LocatorResolution { id: 2, available: 1 })
    );
    assert_eq!(requests[3].elements.as_ref().map(Vec::len), Some(1));
    // Cleared again once the retry succeeded.
    assert!(requests[4].error.is_none());
    assert!(session.last_error().is_none());
}

#[tokio::test]
async fn failed_execution_rereads_the_page_without_observing() {
    let mut page = FakePage::new().with_page(
        "https://a.test/",
        vec![link("broken", "A0"), link("fine", "A1")],
    );
    page.broken.insert("A0".to_string());
    let brain = ScriptedDecision::new([
        reply("navigate", r#"["https://a.test/"]"#),
        reply("click", "[0]"),
        reply("click", "[1]"),
        reply("declareGoalAchieved", "[]"),
    ]);
    let mut agent = agent(page, brain);
    let mut session = SessionState::new("click the fine one", 5);

    agent.run(&mut session).await.unwrap();

    let requests = &agent.brain().requests;
    match &requests[2].error {
        Some(StepError::ActionExecution { action, reason }) => {
            assert_eq!(action, "click");
            assert!(reason.contains("not interactable"), "{}", reason);
        }
        other => panic!("expected an execution error, got {:?}", other),
    }
    assert_eq!(agent.page().clicked(), vec!["A1"]);
    assert_eq!(agent.page().extractions, 3);
    assert_eq!(agent.brain().observations, 2);

    // Only executed actions reach the history.
    let actions = session
        .history()
        .iter()
        .filter(|e| matches!(e, HistoryEntry::Action { .. }))
        .count();
    assert_eq!(actions, 3);
}

#[tokio::test]
async fn extraction_failures_are_retried() {
    let mut page = two_pages();
    page.failing_extractions = 2;
    let brain = ScriptedDecision::new([
        reply("navigate", r#"["https://a.test/"]"#),
        reply("declareGoalAchieved", "[]"),
    ]);
    let (events, mut rx) = broadcast::channel(256);
    let mut agent = Agent::new(page, brain, events);
    let mut session = SessionState::new("read the page", 5);

    agent.run(&mut session).await.unwrap();

    let mut errors = Vec::new();
    let mut completed = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            AgentEvent::StepError { message, retries_left } => errors.push((message, retries_left)),
            AgentEvent::TaskComplete { .. } => completed = true,
            _ => {}
        }
    }
    assert!(completed);
    assert_eq!(errors.len(), 2);
    assert!(errors[0].0.starts_with("could not read page elements"));
    assert_eq!(errors[0].1, 4);
    assert_eq!(errors[1].1, 3);
    assert_eq!(agent.brain().observations, 1);
}

#[tokio::test]
async fn goal_and_first_step_failures_are_retried() {
    let mut brain = ScriptedDecision::new([
        // No page has been read yet, so any element id is out of range.
        reply("click", "[0]"),
        reply("declareGoalAchieved", "[]"),
    ]);
    brain
        .goals
        .push_back(Err(StepError::DecisionTransport("connection reset".into())));
    brain.goals.push_back(Ok("open nothing".into()));
    let mut agent = agent(FakePage::new(), brain);
    let mut session = SessionState::new("do nothing", 5);

    agent.run(&mut session).await.unwrap();

    assert_eq!(session.final_goal(), "open nothing");
    let requests = &agent.brain().requests;
    assert_eq!(requests.len(), 2);
    // The goal failure is settled once the goal is known.
    assert!(requests[0].error.is_none());
    assert!(requests[1].elements.is_none());
    assert_eq!(
        requests[1].error,
        Some(StepError::LocatorResolution { id: 0, available: 0 })
    );
    assert!(agent.page().calls.is_empty());
}

#[tokio::test]
async fn prose_around_the_reply_is_tolerated() {
    let brain = ScriptedDecision::new([
        format!("Sure, here you go:\n{}\nGood luck!", reply("navigate", r#"["https://b.test/"]"#)),
        reply("declareGoalAchieved", "[]"),
    ]);
    let mut agent = agent(two_pages(), brain);
    let mut session = SessionState::new("go to b", 5);

    agent.run(&mut session).await.unwrap();

    assert_eq!(agent.page().url, "https://b.test/");
    assert_eq!(session.budget().remaining(), 5);
}

#[tokio::test]
async fn action_that_ran_before_a_settle_timeout_stays_in_history() {
    let mut page = two_pages();
    page.failing_settles = 1;
    let brain = ScriptedDecision::new([
        reply("navigate", r#"["https://a.test/"]"#),
        reply("click", "[0]"),
        reply("declareGoalAchieved", "[]"),
    ]);
    let (events, mut rx) = broadcast::channel(256);
    let mut agent = Agent::new(page, brain, events);
    let mut session = SessionState::new("open a", 5);

    agent.run(&mut session).await.unwrap();

    assert_eq!(session.steps(), 3);
    assert_eq!(
        agent.page().calls,
        vec!["navigate https://a.test/", "settle", "click A0", "settle"]
    );

    // The loaded page is offered right away, with the navigation in history.
    let requests = &agent.brain().requests;
    assert_eq!(requests[1].elements.as_ref().map(Vec::len), Some(3));
    assert_eq!(requests[1].history_len, 1);
    assert_eq!(
        requests[1].error,
        Some(StepError::ActionExecution {
            action: "navigate".to_string(),
            reason: "page did not settle: page still loading".to_string(),
        })
    );

    let errors = step_errors(&mut rx);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].1, 4);
}

#[tokio::test]
async fn invalid_verbs_spend_budget_and_are_reported_back() {
    let brain = ScriptedDecision::new([
        reply("navigate", r#"["https://a.test/"]"#),
        reply("teleport", "[]"),
        reply("type", "[0]"),
        reply("declareGoalAchieved", "[]"),
    ]);
    let (events, mut rx) = broadcast::channel(256);
    let mut agent = Agent::new(two_pages(), brain, events);
    let mut session = SessionState::new("misbehave", 5);

    agent.run(&mut session).await.unwrap();

    let requests = &agent.brain().requests;
    assert_eq!(requests.len(), 4);
    assert!(
        matches!(&requests[2].error, Some(StepError::ActionDispatch(m)) if m.contains("teleport")),
        "{:?}",
        requests[2].error
    );
    assert!(
        matches!(&requests[3].error, Some(StepError::ActionDispatch(m)) if m.contains("type(id, text)")),
        "{:?}",
        requests[3].error
    );

    let retries: Vec<u32> = step_errors(&mut rx).into_iter().map(|(_, left)| left).collect();
    assert_eq!(retries, vec![4, 3]);
    assert!(agent.page().calls.iter().all(|c| !c.starts_with("type")));
}

#[tokio::test]
async fn observation_failures_are_retried_with_a_fresh_read() {
    let mut brain = ScriptedDecision::new([
        reply("navigate", r#"["https://a.test/"]"#),
        reply("declareGoalAchieved", "[]"),
    ]);
    brain.failing_observations = 2;
    let (events, mut rx) = broadcast::channel(256);
    let mut agent = Agent::new(two_pages(), brain, events);
    let mut session = SessionState::new("look around", 5);

    agent.run(&mut session).await.unwrap();

    assert_eq!(agent.page().extractions, 3);
    assert_eq!(agent.brain().observations, 1);
    assert_eq!(
        agent.brain().requests[1].error,
        Some(StepError::DecisionTransport("observer timed out".into()))
    );

    let errors = step_errors(&mut rx);
    let retries: Vec<u32> = errors.iter().map(|(_, left)| *left).collect();
    assert_eq!(retries, vec![4, 3]);
    assert!(errors[0].0.starts_with("decision request failed"));
}
