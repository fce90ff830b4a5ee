//! Read-only HTTP status API for fleet monitoring.

use crate::core::StatusSnapshot;
use axum::{extract::State, response::Json, routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    status: Arc<RwLock<StatusSnapshot>>,
}

pub fn start_server(
    bind_address: String,
    port: u16,
    status: Arc<RwLock<StatusSnapshot>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = Router::new()
            .route("/api/state", get(get_state))
            .with_state(HttpState { status });

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind status server to {}: {}", addr, e);
                return;
            }
        };

        info!("Status API listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("Status server error: {}", e);
        }
    })
}

async fn get_state(State(state): State<HttpState>) -> Json<StatusSnapshot> {
    Json(state.status.read().await.clone())
}
