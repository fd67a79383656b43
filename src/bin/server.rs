use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use knowledge_snake_server::engine::EngineOptions;
use knowledge_snake_server::leaderboard::{
    parse_submission, LeaderboardStore, LeaderboardSubmission,
};
use knowledge_snake_server::publisher::{publish_run, AtomClient, PublishError, PublishOutcome};
use knowledge_snake_server::server_protocol::{parse_client_message, ParsedClientMessage};
use knowledge_snake_server::session::{RunController, TickOutcome};
use knowledge_snake_server::types::{BoundaryMode, RunPhase, RunSummary, Theme};
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Chain used when a publish request does not name one (Base Sepolia).
const DEFAULT_CHAIN_ID: i64 = 84_532;

type SharedState = Arc<Mutex<ServerState>>;
type AtomHandle = Arc<Mutex<Box<dyn AtomClient + Send>>>;

struct ClientContext {
    tx: mpsc::Sender<String>,
    session: RunController,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

struct ServerState {
    clients: HashMap<String, ClientContext>,
    leaderboard: LeaderboardStore,
    atom_client: Option<AtomHandle>,
}

impl ServerState {
    fn new(atom_client: Option<Box<dyn AtomClient + Send>>) -> Self {
        Self {
            clients: HashMap::new(),
            leaderboard: LeaderboardStore::new(),
            atom_client: atom_client.map(|client| Arc::new(Mutex::new(client))),
        }
    }
}

#[tokio::main]
async fn main() {
    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let state = Arc::new(Mutex::new(ServerState::new(None)));
    println!("[publisher] no atom client configured; publish requests will report a failure");

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/api/leaderboard",
            get(leaderboard_get_handler).post(leaderboard_post_handler),
        )
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        println!(
            "[server] static file root: {}",
            static_dir.to_string_lossy()
        );
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        eprintln!("[server] static file root not found. run the web build to generate dist/client.");
        app
    };

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind server socket");

    println!("[server] listening on :{port}");
    axum::serve(listener, app)
        .await
        .expect("server runtime failed");
}

fn resolve_static_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var("STATIC_DIR") {
        let path = PathBuf::from(raw);
        if path.join("index.html").is_file() {
            return Some(path);
        }
    }

    let candidates = [PathBuf::from("dist/client"), PathBuf::from("web/dist")];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn leaderboard_get_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let guard = state.lock().await;
    Json(guard.leaderboard.top())
}

enum LeaderboardPost {
    BadRequest,
    InvalidPayload,
    Accepted(LeaderboardSubmission),
}

/// Sorts a raw POST body into the reply it earns: bodies that are not
/// JSON and payloads missing a required field get distinct 400s.
fn classify_leaderboard_post(body: &str) -> LeaderboardPost {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return LeaderboardPost::BadRequest;
    };
    match parse_submission(&value) {
        Some(submission) => LeaderboardPost::Accepted(submission),
        None => LeaderboardPost::InvalidPayload,
    }
}

async fn leaderboard_post_handler(
    State(state): State<SharedState>,
    body: String,
) -> impl IntoResponse {
    let submission = match classify_leaderboard_post(&body) {
        LeaderboardPost::BadRequest => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "bad request" })),
            );
        }
        LeaderboardPost::InvalidPayload => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid payload" })),
            );
        }
        LeaderboardPost::Accepted(submission) => submission,
    };

    let mut guard = state.lock().await;
    let entry = guard.leaderboard.append(submission);
    println!(
        "[leaderboard] stored entry for {} (score {})",
        entry.address, entry.score
    );
    (StatusCode::OK, Json(json!({ "ok": true })))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<String>(256);

    {
        let mut guard = state.lock().await;
        guard.clients.insert(
            client_id.clone(),
            ClientContext {
                tx: tx.clone(),
                session: RunController::new(),
            },
        );
        send_to_client(
            &mut guard,
            &client_id,
            &json!({
                "type": "welcome",
                "clientId": client_id,
            }),
            QueuePolicy::DisconnectOnFull,
        );
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(state.clone(), &client_id, raw.to_string()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_client_message(state.clone(), &client_id, text).await;
                } else {
                    send_error_to_client(&state, &client_id, "invalid utf8 message").await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    {
        let mut guard = state.lock().await;
        guard.clients.remove(&client_id);
    }
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(state: SharedState, client_id: &str, raw: String) {
    let Some(message) = parse_client_message(&raw) else {
        send_error_to_client(&state, client_id, "invalid message").await;
        return;
    };

    match message {
        ParsedClientMessage::StartRun {
            theme,
            boundary,
            seed,
        } => {
            handle_start_run(state, client_id, theme, boundary, seed).await;
        }
        ParsedClientMessage::Input { dir } => {
            let mut guard = state.lock().await;
            if let Some(client) = guard.clients.get_mut(client_id) {
                client.session.queue_direction(dir);
            }
        }
        ParsedClientMessage::Publish { address, chain_id } => {
            handle_publish(state, client_id, address, chain_id).await;
        }
        ParsedClientMessage::Ping { t } => {
            let mut guard = state.lock().await;
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "pong",
                    "t": t,
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
    }
}

async fn handle_start_run(
    state: SharedState,
    client_id: &str,
    theme: Option<Theme>,
    boundary: Option<BoundaryMode>,
    seed: Option<u32>,
) {
    let options = EngineOptions {
        theme: theme.unwrap_or(Theme::Crypto),
        boundary: boundary.unwrap_or(BoundaryMode::Wrap),
        seed: seed.unwrap_or_else(|| rand::rng().random::<u32>()),
    };

    let run_seq = {
        let mut guard = state.lock().await;
        let Some(client) = guard.clients.get_mut(client_id) else {
            return;
        };
        let started = client.session.start(options);
        println!(
            "[server] {client_id} started run {} ({}, {:?}, seed {})",
            started.run_seq,
            started.config.theme.label(),
            started.config.boundary,
            started.config.seed
        );
        send_to_client(
            &mut guard,
            client_id,
            &json!({
                "type": "run_init",
                "config": started.config,
                "snapshot": started.snapshot,
            }),
            QueuePolicy::DisconnectOnFull,
        );
        started.run_seq
    };

    spawn_run_scheduler(state, client_id.to_string(), run_seq);
}

/// One scheduler task per run. The task re-reads the current speed before
/// every sleep so level-ups take effect on the next interval, and exits as
/// soon as the client disconnects or a newer run bumps the sequence.
fn spawn_run_scheduler(state: SharedState, client_id: String, run_seq: u64) {
    tokio::spawn(async move {
        loop {
            let speed_ms = {
                let guard = state.lock().await;
                let Some(client) = guard.clients.get(&client_id) else {
                    break;
                };
                if client.session.run_seq() != run_seq
                    || client.session.phase() != RunPhase::Running
                {
                    break;
                }
                match client.session.speed_ms() {
                    Some(speed) => speed,
                    None => break,
                }
            };

            tokio::time::sleep(Duration::from_millis(speed_ms)).await;

            let mut guard = state.lock().await;
            let Some(client) = guard.clients.get_mut(&client_id) else {
                break;
            };
            if client.session.run_seq() != run_seq {
                break;
            }

            let outcome = client.session.tick();
            if matches!(outcome, TickOutcome::Halted) {
                break;
            }
            let snapshot = client.session.snapshot(true);

            if let Some(snapshot) = snapshot {
                send_to_client(
                    &mut guard,
                    &client_id,
                    &json!({
                        "type": "state",
                        "snapshot": snapshot,
                    }),
                    QueuePolicy::DropOnFull,
                );
            }

            if let TickOutcome::Finished(summary) = outcome {
                println!(
                    "[server] {client_id} finished run {run_seq}: {:?}, score {}, {} words",
                    summary.reason,
                    summary.score,
                    summary.word_count
                );
                send_to_client(
                    &mut guard,
                    &client_id,
                    &json!({
                        "type": "run_over",
                        "summary": summary,
                    }),
                    QueuePolicy::DisconnectOnFull,
                );
                break;
            }
        }
    });
}

async fn handle_publish(
    state: SharedState,
    client_id: &str,
    address: Option<String>,
    chain_id: Option<i64>,
) {
    let chain_id = chain_id.unwrap_or(DEFAULT_CHAIN_ID);

    // Chain calls run without the state lock held; only the summary and
    // the atom handle are taken under it.
    let (summary, atom_client) = {
        let mut guard = state.lock().await;
        let summary = guard
            .clients
            .get(client_id)
            .and_then(|client| client.session.last_summary().cloned());
        let Some(summary) = summary else {
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "publish_result",
                    "ok": false,
                    "message": "no finished run to publish",
                }),
                QueuePolicy::DisconnectOnFull,
            );
            return;
        };
        (summary, guard.atom_client.clone())
    };

    let result = publish_summary(atom_client, &summary, address.as_deref(), chain_id).await;

    let mut guard = state.lock().await;
    match result {
        Ok(outcome) => {
            println!(
                "[publisher] {client_id} published score {} ({} confirmations)",
                summary.score,
                outcome.confirmations.len()
            );
            // Leaderboard write is best-effort and never demotes the
            // publish result.
            if let Some(submission) = submission_after_publish(
                &summary,
                address.as_deref(),
                chain_id,
                &outcome.triple_tx_hash,
            ) {
                let entry = guard.leaderboard.append(submission);
                println!(
                    "[leaderboard] recorded published run for {} (score {})",
                    entry.address, entry.score
                );
            }
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "publish_result",
                    "ok": true,
                    "confirmations": outcome.confirmations,
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
        Err(error) => {
            eprintln!("[publisher] publish failed for {client_id}: {error}");
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "publish_result",
                    "ok": false,
                    "message": error.to_string(),
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
    }
}

/// Runs the four-step publish against the configured atom client, taking
/// only that client's lock. Reports a failure when no client is wired up.
async fn publish_summary(
    atom_client: Option<AtomHandle>,
    summary: &RunSummary,
    address: Option<&str>,
    chain_id: i64,
) -> Result<PublishOutcome, PublishError> {
    let Some(handle) = atom_client else {
        return Err(PublishError::NotConfigured);
    };
    let mut chain = handle.lock().await;
    publish_run(chain.as_mut(), summary, address, chain_id)
}

/// Builds the leaderboard row mirrored after an on-chain publish. Runs
/// published without a wallet address stay off the board.
fn submission_after_publish(
    summary: &RunSummary,
    address: Option<&str>,
    chain_id: i64,
    tx_hash: &str,
) -> Option<LeaderboardSubmission> {
    let address = address?.trim();
    if address.is_empty() {
        return None;
    }
    Some(LeaderboardSubmission {
        address: address.to_string(),
        score: summary.score,
        theme: summary.theme.label().to_string(),
        words: summary.word_count as i32,
        chain_id,
        tx_hash: tx_hash.to_string(),
    })
}

fn send_to_client(state: &mut ServerState, client_id: &str, message: &Value, policy: QueuePolicy) {
    let send_failed = if let Some(client) = state.clients.get(client_id) {
        client.tx.try_send(message.to_string()).is_err()
    } else {
        false
    };
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        state.clients.remove(client_id);
    }
}

async fn send_error_to_client(state: &SharedState, client_id: &str, message: &str) {
    let mut guard = state.lock().await;
    send_to_client(
        &mut guard,
        client_id,
        &json!({
            "type": "error",
            "message": message,
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}
