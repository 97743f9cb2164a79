//! HTTP interface under `/api/acars`.
//!
//! JSON responses share one envelope: `status` 0 on success and 500 on
//! failure, an optional `message` and the payload in `data`. Failures are
//! still sent with HTTP 200, the web client only reads the envelope.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::{
    database::Database,
    dataset::DatasetLookup,
    errors::AcarsRecorderError,
    export::{self, ExportFormat, ExportOptions},
    filter::MessageFilter,
    query::{self, GetMessagesRequest, MessagePage},
    statistics::{self, Statistics},
};

/// CSV chunks buffered ahead of the client
const EXPORT_CHANNEL_CAPACITY: usize = 4;

pub const STATUS_SUCCESS: u16 = 0;
pub const STATUS_ERROR: u16 = 500;

pub struct AppState {
    pub db: Database,
    pub dataset: Box<dyn DatasetLookup>,
    pub export: ExportOptions,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: STATUS_SUCCESS,
            message: None,
            data: Some(data),
        }
    }
}

/// Request failure rendered as an error envelope
#[derive(Debug)]
pub struct ApiError(pub AcarsRecorderError);

impl From<AcarsRecorderError> for ApiError {
    fn from(err: AcarsRecorderError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self.0 {
            AcarsRecorderError::InvalidRequest(_) => warn!("Rejected request: {}", self.0),
            other => error!("Request failed: {:?}", other),
        }
        let body: ApiResponse<()> = ApiResponse {
            status: STATUS_ERROR,
            message: Some(self.0.to_string()),
            data: None,
        };
        Json(body).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/acars/get_statistics", get(get_statistics))
        .route("/api/acars/get_messages", post(get_messages))
        .route("/api/acars/export_messages", post(export_messages))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsParams {
    pub start_s: f64,
    pub end_s: f64,
}

#[derive(Debug, Serialize)]
pub struct StatisticsData {
    pub filters: Statistics,
}

/// GET /api/acars/get_statistics
pub async fn get_statistics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatisticsParams>,
) -> Result<Json<ApiResponse<StatisticsData>>, ApiError> {
    MessageFilter::time_range(params.start_s, params.end_s).validate()?;
    let filters = statistics::get_statistics(&state.db, params.start_s, params.end_s).await?;
    Ok(Json(ApiResponse::success(StatisticsData { filters })))
}

/// POST /api/acars/get_messages
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GetMessagesRequest>,
) -> Result<Json<ApiResponse<MessagePage>>, ApiError> {
    let page = query::get_messages(&state.db, state.dataset.as_ref(), &request).await?;
    Ok(Json(ApiResponse::success(page)))
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    #[serde(flatten)]
    pub filter: MessageFilter,
    #[serde(default)]
    pub format: ExportFormat,
}

/// POST /api/acars/export_messages
pub async fn export_messages(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExportRequest>,
) -> Result<Response, ApiError> {
    request.filter.validate()?;
    let predicate = request.filter.compile();
    let file_name = export::file_name(&request.filter, request.format, &state.export);
    info!("Export of {} requested", file_name);

    let body = match request.format {
        ExportFormat::Csv => {
            let (tx, rx) = mpsc::channel::<String>(EXPORT_CHANNEL_CAPACITY);
            let db = state.db.clone();
            let options = state.export.clone();
            tokio::spawn(async move {
                match export::stream_csv(&db, &predicate, &options, tx).await {
                    Ok(_) => {}
                    Err(AcarsRecorderError::StreamInterrupted) => {
                        info!("CSV export cancelled by client")
                    }
                    Err(e) => error!("CSV export failed: {:?}", e),
                }
            });

            let chunks = futures::stream::unfold(rx, |mut rx| async move {
                rx.recv()
                    .await
                    .map(|chunk| (Ok::<_, Infallible>(chunk), rx))
            });
            Body::from_stream(chunks)
        }
        ExportFormat::Xlsx => {
            Body::from(export::build_xlsx(&state.db, &predicate, &state.export).await?)
        }
    };

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name))
        .map_err(|e| AcarsRecorderError::InvalidRequest(e.to_string()))?;
    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(request.format.content_type()),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
