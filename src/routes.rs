use crate::transcode::{self, TranscodeError, TranscodeRequest};
use crate::AppState;
use axum::body::Body;
use axum::extract::{Extension, Query};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub(crate) struct TranscodeParams {
    pub(crate) source: String,
    pub(crate) target: String,
    pub(crate) channels: Option<i32>,
    pub(crate) sample_rate: Option<i32>,
}

/// Error reply body. Success responses carry the transcoded bytes instead.
#[derive(Serialize, Deserialize)]
pub(crate) struct TranscodeReply {
    pub(crate) success: bool,
    pub(crate) status: u16,
    pub(crate) message: String,
}

fn status_for(error: &TranscodeError) -> StatusCode {
    match error {
        TranscodeError::UnsupportedTarget(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        TranscodeError::OpenInput { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(TranscodeReply {
            success: false,
            status: status.as_u16(),
            message,
        }),
    )
        .into_response()
}

#[axum::debug_handler]
pub(crate) async fn transcode(
    Extension(state): Extension<AppState>,
    Query(params): Query<TranscodeParams>,
) -> Response {
    let request = match TranscodeRequest::new(
        &params.source,
        &params.target,
        params.channels,
        params.sample_rate,
    ) {
        Ok(request) => request,
        Err(error) => return error_reply(status_for(&error), error.to_string()),
    };

    let output_path = state.scratch_path(request.target.extension());
    let content_type = request.target.content_type();
    info!(source = %request.source, output = ?output_path, "Accepted transcode request");

    // The pipeline is synchronous native code, keep it off the async runtime.
    let worker_request = request.clone();
    let worker_path = output_path.clone();
    let outcome =
        tokio::task::spawn_blocking(move || transcode::run_transcode(&worker_request, &worker_path))
            .await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(join_error) => {
            error!(%join_error, "Transcode worker panicked");
            let _ = tokio::fs::remove_file(&output_path).await;
            return error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "transcode worker failed".into(),
            );
        }
    };
    if let Err(error) = outcome {
        error!(%error, source = %request.source, "Transcode failed");
        let _ = tokio::fs::remove_file(&output_path).await;
        return error_reply(status_for(&error), error.to_string());
    }

    // Open then unlink, so the scratch file is reclaimed once the response
    // body has been streamed out.
    let file = match tokio::fs::File::open(&output_path).await {
        Ok(file) => file,
        Err(error) => {
            error!(%error, output = ?output_path, "Failed to open transcoded output");
            let _ = tokio::fs::remove_file(&output_path).await;
            return error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to read transcoded output".into(),
            );
        }
    };
    let _ = tokio::fs::remove_file(&output_path).await;

    (
        [(header::CONTENT_TYPE, content_type)],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}
