use anyhow::{Result, anyhow};
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use browser_pilot::AgentEvent;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub cmd_tx: mpsc::Sender<String>,
    pub event_tx: broadcast::Sender<AgentEvent>,
}

#[derive(Deserialize)]
struct CommandPayload {
    command: String,
}

/// Serve the web UI on the first free port in `port..port + 10`.
/// Returns the objective queue and the event channel the agent publishes on.
pub async fn start_server(port: u16) -> Result<(mpsc::Receiver<String>, broadcast::Sender<AgentEvent>)> {
    // One objective at a time; the UI is disabled while a run is in flight.
    let (cmd_tx, cmd_rx) = mpsc::channel::<String>(1);
    let (event_tx, _) = broadcast::channel::<AgentEvent>(64);

    let state = Arc::new(AppState {
        cmd_tx,
        event_tx: event_tx.clone(),
    });

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/command", post(command_handler))
        .route("/events", get(sse_handler))
        .route("/favicon.ico", get(|| async { StatusCode::NO_CONTENT }))
        .with_state(state);

    let mut bound = None;
    for p in port..port.saturating_add(10) {
        match tokio::net::TcpListener::bind(("127.0.0.1", p)).await {
            Ok(listener) => {
                bound = Some((listener, p));
                break;
            }
            Err(e) => warn!(port = p, error = %e, "port busy"),
        }
    }
    let (listener, port) = bound.ok_or_else(|| {
        anyhow!(
            "could not bind any port in {}..{}; is another agent running?",
            port,
            port.saturating_add(10)
        )
    })?;

    info!("Web UI running at http://localhost:{}", port);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "web UI server stopped");
        }
    });

    Ok((cmd_rx, event_tx))
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn command_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CommandPayload>,
) -> (StatusCode, &'static str) {
    let objective = payload.command.trim().to_string();
    if objective.is_empty() {
        return (StatusCode::BAD_REQUEST, "empty objective");
    }
    info!(objective = %objective, "objective received from web UI");
    match state.cmd_tx.try_send(objective) {
        Ok(()) => (StatusCode::ACCEPTED, "ok"),
        Err(mpsc::error::TrySendError::Full(_)) => (StatusCode::CONFLICT, "agent is busy"),
        Err(mpsc::error::TrySendError::Closed(_)) => (StatusCode::SERVICE_UNAVAILABLE, "agent stopped"),
    }
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let event = result.ok()?;
        Event::default()
            .event(event.name())
            .json_data(&event)
            .ok()
            .map(Ok::<_, Infallible>)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Browser Pilot</title>
<style>
  * { margin: 0; padding: 0; box-sizing: border-box; }
  body { background: #0b0d12; color: #dde; font-family: system-ui, sans-serif;
         height: 100vh; display: flex; flex-direction: column; }
  header { padding: 20px 28px; border-bottom: 1px solid #1c2030; display: flex; gap: 10px; align-items: center; }
  header h1 { font-size: 18px; color: #fff; }
  .dot { width: 8px; height: 8px; border-radius: 50%; background: #22c55e; }
  .dot.busy { background: #f59e0b; }
  main { flex: 1; display: flex; flex-direction: column; max-width: 820px; width: 100%;
         margin: 0 auto; padding: 20px 28px; gap: 14px; overflow: hidden; }
  #log { flex: 1; overflow-y: auto; display: flex; flex-direction: column; gap: 6px; }
  .e { padding: 8px 12px; border-radius: 6px; font-size: 14px; line-height: 1.45; background: #12151d;
       border-left: 3px solid #3b82f6; white-space: pre-wrap; }
  .e.you { border-color: #818cf8; }
  .e.goal { border-color: #a78bfa; }
  .e.obs { border-color: #64748b; color: #aab; }
  .e.step { font-family: ui-monospace, monospace; font-size: 13px; }
  .e.err { border-color: #ef4444; color: #fca5a5; }
  .e.ok { border-color: #22c55e; color: #86efac; }
  form { display: flex; gap: 8px; }
  input { flex: 1; background: #12151d; border: 1px solid #262b3a; border-radius: 6px;
          padding: 11px 14px; color: #fff; font-size: 15px; }
  button { background: #6366f1; color: #fff; border: 0; border-radius: 6px; padding: 11px 20px; font-weight: 600; }
  button:disabled, input:disabled { opacity: .5; }
</style>
</head>
<body>
<header><div class="dot" id="dot"></div><h1>Browser Pilot</h1></header>
<main>
  <div id="log"></div>
  <form id="form">
    <input id="cmd" placeholder="What should the browser do?" autofocus />
    <button id="send">Run</button>
  </form>
</main>
<script>
  const log = document.getElementById('log');
  const cmd = document.getElementById('cmd');
  const send = document.getElementById('send');
  const dot = document.getElementById('dot');

  function add(cls, text) {
    const div = document.createElement('div');
    div.className = 'e ' + cls;
    div.textContent = text;
    log.appendChild(div);
    log.scrollTop = log.scrollHeight;
  }
  function busy(b) {
    cmd.disabled = b; send.disabled = b;
    dot.className = b ? 'dot busy' : 'dot';
    if (!b) cmd.focus();
  }

  document.getElementById('form').addEventListener('submit', async ev => {
    ev.preventDefault();
    const text = cmd.value.trim();
    if (!text) return;
    cmd.value = '';
    add('you', 'You: ' + text);
    busy(true);
    const res = await fetch('/command', {
      method: 'POST',
      headers: {'Content-Type': 'application/json'},
      body: JSON.stringify({command: text}),
    });
    if (!res.ok) { add('err', await res.text()); busy(false); }
  });

  const es = new EventSource('/events');
  const on = (name, fn) => es.addEventListener(name, e => fn(JSON.parse(e.data)));
  on('final_goal', d => add('goal', 'Goal: ' + d.goal));
  on('thinking', () => add('obs', 'Thinking…'));
  on('step', d => add('step', 'Step ' + d.number + ': ' + d.description + (d.thought ? '\n' + d.thought : '')));
  on('observation', d => add('obs', d.url + '\n' + d.text));
  on('step_error', d => add('err', d.message + ' (' + d.retries_left + ' retries left)'));
  on('task_complete', d => { add('ok', 'Done: ' + d.summary); busy(false); });
  on('task_error', d => { add('err', 'Failed: ' + d.message); busy(false); });
  on('ready', () => busy(false));
</script>
</body>
</html>
"##;
