use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use interactive_book::book::{InteractiveBook, StatusBarView};
use interactive_book::config::BookConfig;
use interactive_book::content::ScriptedContentFactory;
use interactive_book::events::{BookEvent, EventLog};
use interactive_book::location::{MemoryAddressBar, SharedAddressBar};
use interactive_book::navigation::{NavState, NavigationOutcome};
use interactive_book::progress::ChapterStatus;
use interactive_book::script::{self, Action};
use interactive_book::snapshot::{LocalFsSnapshotStore, MemorySnapshotStore, SnapshotStore};
use interactive_book::xapi::XapiReport;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct HostArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Where session snapshots are written.
    #[arg(long, default_value = "workspace-host")]
    data_dir: PathBuf,

    /// Keep snapshots in memory only.
    #[arg(long)]
    ephemeral: bool,

    /// Page URL used when a session does not name one.
    #[arg(long, default_value = "https://localhost/book")]
    page_url: String,
}

struct Session {
    book: InteractiveBook,
    page: SharedAddressBar,
    log: EventLog,
    pumping: bool,
    wake: Arc<Notify>,
    clock_synced_at: Instant,
}

impl Session {
    fn new(book: InteractiveBook, page: SharedAddressBar, log: EventLog) -> Self {
        Self {
            book,
            page,
            log,
            pumping: false,
            wake: Arc::new(Notify::new()),
            clock_synced_at: Instant::now(),
        }
    }

    /// Moves the book's clock forward by the wall time since the last sync.
    fn catch_up(&mut self) {
        let elapsed = self.clock_synced_at.elapsed();
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if elapsed_ms > 0 {
            self.clock_synced_at += Duration::from_millis(elapsed_ms);
            self.book.advance_clock(elapsed_ms);
        }
    }
}

#[derive(Clone)]
struct AppState {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    store: Arc<dyn SnapshotStore>,
    page_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    book: BookConfig,
    #[serde(default)]
    url: Option<String>,
    /// Resume a previous session's stored progress.
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BookView {
    session_id: String,
    url: String,
    active_chapter: usize,
    nav_state: NavState,
    status_bar: StatusBarView,
    statuses: Vec<Option<ChapterStatus>>,
    cover_shown: bool,
    completed: bool,
    answer_given: bool,
    score: u32,
    max_score: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<NavigationOutcome>,
    events: Vec<BookEvent>,
    book: BookView,
}

type ApiError = (StatusCode, String);

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    interactive_book::logging::init_with_default("info,tower_http=debug")?;

    let args = HostArgs::parse();
    tracing::info!(?args, "starting interactive-book-host");

    let store: Arc<dyn SnapshotStore> = if args.ephemeral {
        tracing::info!("using in-memory snapshot store");
        Arc::new(MemorySnapshotStore::new())
    } else {
        tracing::info!(data_dir = %args.data_dir.display(), "using local filesystem snapshot store");
        Arc::new(LocalFsSnapshotStore::new(args.data_dir.clone()))
    };
    let state = AppState {
        sessions: Arc::new(Mutex::new(HashMap::new())),
        store,
        page_url: args.page_url,
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/sessions", post(create_session))
        .route("/sessions/:session_id", get(get_session).delete(delete_session))
        .route("/sessions/:session_id/actions", post(apply_action))
        .route("/sessions/:session_id/events", get(drain_events))
        .route("/sessions/:session_id/xapi", get(get_xapi))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<BookView>, ApiError> {
    req.book
        .validate()
        .map_err(|err| (StatusCode::BAD_REQUEST, format!("invalid book: {err:#}")))?;

    let session_id = match req.session_id.as_deref().map(str::trim) {
        Some(raw) => uuid::Uuid::parse_str(raw)
            .map_err(|err| (StatusCode::BAD_REQUEST, format!("invalid session id: {err}")))?
            .to_string(),
        None => uuid::Uuid::new_v4().to_string(),
    };
    let url = req.url.unwrap_or_else(|| state.page_url.clone());
    let page = SharedAddressBar::new(
        MemoryAddressBar::parse(&url).map_err(|err| (StatusCode::BAD_REQUEST, format!("{err:#}")))?,
    );

    let mut book = InteractiveBook::new(req.book, Box::new(page.clone()), &ScriptedContentFactory);
    let log = book.record_events();
    book.attach();
    let snapshot = state.store.get(&session_id).await.map_err(internal)?;
    if let Some(snapshot) = &snapshot {
        tracing::info!(session_id = %session_id, "resuming session");
        book.restore(snapshot);
    }

    let body = view(&session_id, &book);
    state
        .sessions
        .lock()
        .await
        .insert(session_id.clone(), Session::new(book, page, log));
    spawn_pump(state, session_id);
    Ok(Json(body))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<BookView>, ApiError> {
    let sessions = state.sessions.lock().await;
    let session = sessions.get(&session_id).ok_or_else(not_found)?;
    Ok(Json(view(&session_id, &session.book)))
}

async fn apply_action(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(action): Json<Action>,
) -> Result<Json<ActionResponse>, ApiError> {
    let (response, snapshot) = {
        let mut sessions = state.sessions.lock().await;
        let session = sessions.get_mut(&session_id).ok_or_else(not_found)?;
        session.catch_up();
        let outcome = script::apply(&mut session.book, &session.page, &action)
            .map_err(|err| (StatusCode::BAD_REQUEST, format!("{err:#}")))?;
        let response = ActionResponse {
            outcome,
            events: session.log.drain(),
            book: view(&session_id, &session.book),
        };
        (response, session.book.snapshot())
    };

    state
        .store
        .put(&session_id, &snapshot)
        .await
        .map_err(internal)?;
    spawn_pump(state, session_id);
    Ok(Json(response))
}

async fn drain_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<BookEvent>>, ApiError> {
    let sessions = state.sessions.lock().await;
    let session = sessions.get(&session_id).ok_or_else(not_found)?;
    Ok(Json(session.log.drain()))
}

async fn get_xapi(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<XapiReport>, ApiError> {
    let sessions = state.sessions.lock().await;
    let session = sessions.get(&session_id).ok_or_else(not_found)?;
    Ok(Json(session.book.xapi_data()))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let mut session = state
        .sessions
        .lock()
        .await
        .remove(&session_id)
        .ok_or_else(not_found)?;
    session.book.destroy();
    tracing::info!(session_id = %session_id, "session closed");
    Ok(StatusCode::NO_CONTENT)
}

/// Runs the session's pending timers in real time. At most one pump per
/// session; a running pump is woken instead so it picks up earlier timers.
fn spawn_pump(state: AppState, session_id: String) {
    tokio::spawn(async move {
        let wake = {
            let mut sessions = state.sessions.lock().await;
            let Some(session) = sessions.get_mut(&session_id) else {
                return;
            };
            if session.pumping {
                session.wake.notify_one();
                return;
            }
            session.pumping = true;
            session.wake.clone()
        };

        loop {
            let delay = {
                let mut sessions = state.sessions.lock().await;
                let Some(session) = sessions.get_mut(&session_id) else {
                    return;
                };
                session.catch_up();
                let Some(delay) = session.book.next_timer_delay_ms() else {
                    session.pumping = false;
                    return;
                };
                delay
            };

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                _ = wake.notified() => {}
            }
        }
    });
}

fn view(session_id: &str, book: &InteractiveBook) -> BookView {
    BookView {
        session_id: session_id.to_owned(),
        url: book.current_url().to_string(),
        active_chapter: book.active_chapter(),
        nav_state: book.nav_state(),
        status_bar: book.status_bar(),
        statuses: (0..book.chapters().len())
            .map(|i| book.chapter_status(i))
            .collect(),
        cover_shown: book.cover_shown(),
        completed: book.is_completed(),
        answer_given: book.answer_given(),
        score: book.score(),
        max_score: book.max_score(),
    }
}

fn not_found() -> ApiError {
    (StatusCode::NOT_FOUND, "session not found".to_owned())
}

fn internal(err: anyhow::Error) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}
