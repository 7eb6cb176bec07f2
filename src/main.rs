use axum::{routing::get, Json, Router};
use pairwire::config::ServerConfig;
use pairwire::event::{EventFanout, LocalFanout, RedisFanout, RoomBus};
use pairwire::room::reaper::start_reaper;
use pairwire::room::redis_store::RedisPresenceStore;
use pairwire::room::{active_rooms, InMemoryPresenceStore, PresenceStore, RoomHasher};
use pairwire::shared::AppState;
use pairwire::websockets::{websocket_handler, MembershipIndex};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pairwire=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pairwire presence server");

    let config = ServerConfig::from_env();
    let process_id = Uuid::new_v4().to_string();

    let hasher = Arc::new(RoomHasher::new(
        config.room_hash_secret.clone(),
        config.dev_passthrough_hashing,
    ));
    let bus = RoomBus::new();
    let membership = Arc::new(MembershipIndex::new());

    // Pick the presence backend. With Redis every process shares one
    // store and mirrors its room events to the others; without it the
    // server runs single-process.
    let (store, fanout): (Arc<dyn PresenceStore>, Arc<dyn EventFanout>) = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str()).expect("Invalid REDIS_URL");
            let store = RedisPresenceStore::connect(client.clone())
                .await
                .expect("Failed to connect to Redis presence store");
            let fanout = RedisFanout::connect(client.clone(), process_id.clone())
                .await
                .expect("Failed to open Redis fan-out connection");
            RedisFanout::spawn_subscriber(
                client,
                process_id.clone(),
                bus.clone(),
                Arc::clone(&membership),
            );
            info!(process_id = %process_id, "Connected to Redis presence store");
            (Arc::new(store), Arc::new(fanout))
        }
        None => {
            warn!("REDIS_URL not set, using in-memory presence store (single process only)");
            (Arc::new(InMemoryPresenceStore::new()), Arc::new(LocalFanout))
        }
    };

    tokio::spawn(start_reaper(
        Arc::clone(&store),
        Arc::clone(&fanout),
        Arc::clone(&membership),
        config.reaper,
    ));

    let app_state = AppState::new(store, hasher, bus, fanout, membership, config.heartbeat);

    let app = Router::new()
        .route("/", get(|| async { Json(json!({ "ready": true })) }))
        .route("/active", get(active_rooms))
        .route("/ws", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .unwrap();
    info!(port = config.port, "Server listening");
    axum::serve(listener, app).await.unwrap();
}
