use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use kindred_api::bridge::{ChatNotifyConfig, spawn_chat_bridge};
use kindred_api::{AppStateInner, router};
use kindred_gateway::hub::NotificationHub;
use kindred_gateway::registry::RoomRegistry;
use kindred_push::{DisabledPush, FcmClient, PushGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kindred=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("KINDRED_DB_PATH").unwrap_or_else(|_| "kindred.db".into());
    let host = std::env::var("KINDRED_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("KINDRED_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    let mut notify_config = ChatNotifyConfig::default();
    if let Ok(title) = std::env::var("KINDRED_CHAT_NOTIFY_TITLE") {
        notify_config.title = title;
    }
    notify_config.room_tag = std::env::var("KINDRED_CHAT_NOTIFY_ROOM").ok();

    // Init database
    let db = Arc::new(kindred_db::Database::open(&PathBuf::from(&db_path))?);

    // Push gateway: FCM when credentials are present, no-op otherwise
    let push: Arc<dyn PushGateway> = match FcmClient::from_env() {
        Some(client) => {
            info!("FCM push gateway configured");
            client
        }
        None => {
            info!("FCM credentials not configured, push delivery disabled");
            Arc::new(DisabledPush)
        }
    };

    // Actors and the chat -> notification bridge
    let hub = NotificationHub::spawn();
    let (bridge_tx, bridge_rx) = mpsc::unbounded_channel();
    let rooms = RoomRegistry::new(db.clone(), bridge_tx);

    let state = Arc::new(AppStateInner {
        db,
        hub,
        push,
        rooms,
    });
    spawn_chat_bridge(state.clone(), bridge_rx, notify_config);

    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Kindred server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
