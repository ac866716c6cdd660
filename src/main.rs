use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use plinko_wager_engine::app::AppState;
use plinko_wager_engine::config::RuntimeConfig;
use plinko_wager_engine::snapshot::FixedSnapshotProvider;
use plinko_wager_engine::store::redis_store::RedisStateStore;
use plinko_wager_engine::store::StateStore;
use plinko_wager_engine::transport::RoomEvent;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone)]
struct WsState {
    broadcaster: Arc<plinko_wager_engine::transport::BroadcastRoomBroadcaster>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = RuntimeConfig::from_env()?;
    info!(markets = ?config.markets, "starting plinko wagering engine");

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
    let store: Arc<dyn StateStore> = Arc::new(RedisStateStore::new(&redis_url)?);

    // Market-data ingestion is an external collaborator (out of scope); this
    // binary wires an empty provider so the process still boots and the
    // circuit breaker correctly reports every market unhealthy until a real
    // ingestion adapter is plugged in.
    let snapshot_provider = FixedSnapshotProvider::new();

    let session_secret =
        std::env::var("SESSION_JWT_SECRET").unwrap_or_else(|_| "dev-only-insecure-secret".to_string());
    if session_secret == "dev-only-insecure-secret" {
        warn!("SESSION_JWT_SECRET not set; using an insecure development default");
    }

    let app_state = AppState::build(&config, store, snapshot_provider, session_secret)?;
    info!(markets = ?app_state.market_names(), "market loops running");

    let ws_state = WsState {
        broadcaster: Arc::clone(&app_state.broadcaster),
    };

    let router = Router::new()
        .route("/healthz", get(health))
        .route("/ws/:market", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(ws_state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    info!("listening on 0.0.0.0:8080");

    axum::serve(listener, router).await?;

    app_state.shutdown().await;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

/// Demonstration subscriber: attaches to one market's broadcast room and
/// forwards every event as JSON text frames. A real realtime transport
/// (session auth, bet/cancel message handling) is a separate concern;
/// this exists only to show where one would attach.
async fn ws_handler(
    ws: WebSocketUpgrade,
    axum::extract::Path(market): axum::extract::Path<String>,
    State(state): State<WsState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, market))
}

async fn handle_socket(mut socket: WebSocket, state: WsState, market: String) {
    let mut rx = state.broadcaster.subscribe(&market);
    loop {
        tokio::select! {
            event = rx.recv() => {
                let event: RoomEvent = match event {
                    Ok(event) => event,
                    Err(_) => break,
                };
                let msg = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                if socket.send(Message::Text(msg)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plinko_wager_engine=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
