pub mod app_state;
pub mod config;
pub mod routes;
pub mod transcode;

use axum::extract::Extension;
use axum::routing::post;
use axum::Router;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::net::TcpListener;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tracing::info;

//
// Re-export
//
pub use app_state::AppState;
pub use config::Config;
pub use transcode::{
    run_transcode, OutputTarget, TranscodeError, TranscodeRequest, DEFAULT_CHANNELS,
    DEFAULT_SAMPLE_RATE, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE,
};

pub async fn run(config: Config) {
    // Ensure we're in a proper async context by yielding once
    tokio::task::yield_now().await;

    let workspace_path =
        PathBuf::from_str(&config.workspace).expect("Failed to parse workspace dir");
    let state = AppState::new(&workspace_path)
        .await
        .expect("Failed to create app state");

    // CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/transcode", post(routes::transcode))
        .layer(cors)
        .layer(Extension(state));

    let addr = format!("0.0.0.0:{}", config.listen_on_port);
    info!("Listening on {addr}");
    axum::serve(
        TcpListener::bind(&addr).await.expect("Failed to bind"),
        app,
    )
    .await
    .expect("Server error");
}
