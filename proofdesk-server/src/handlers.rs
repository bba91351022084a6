//! HTTP handlers for the review API.
//!
//! Every handler resolves the caller from the `X-User` header and hands
//! the request to the `ReviewService`. Errors leave through `ApiError`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Multipart, Path, Query, State},
    http::{header, request::Parts},
    response::{IntoResponse, Response},
    Form, Json,
};
use proofdesk_core::{ArtNr, ExportFormat, IngestSummary, ProductRecord, ReviewError, ReviewStatus};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::repository::RecordFilter;
use crate::AppState;

/// Header carrying the caller's identity. It is trusted as given.
pub const USER_HEADER: &str = "x-user";

/// Identity used when no `X-User` header is sent.
pub const DEFAULT_ACTOR: &str = "unknown@local";

/// Name of the multipart field holding the uploaded document.
const UPLOAD_FIELD: &str = "file";

/// The identity a request acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_ACTOR);
        Ok(Actor(actor.to_string()))
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: String,
}

/// Handler: GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "proofdesk",
        version: crate::get_server_version(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Review status to show. Absent means `pending`, empty means all.
    pub status: Option<String>,
    /// Substring of the article number or name.
    pub q: Option<String>,
}

impl ListQuery {
    pub fn into_filter(self) -> Result<RecordFilter, ReviewError> {
        let status = match self.status.as_deref().map(str::trim) {
            None => Some(ReviewStatus::Pending),
            Some("") => None,
            Some(s) => Some(s.parse::<ReviewStatus>()?),
        };
        let filter = RecordFilter { status, text: None };
        Ok(match self.q {
            Some(q) => filter.text(q),
            None => filter,
        })
    }
}

/// Handler: GET /products
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ProductRecord>>, ApiError> {
    let filter = query.into_filter()?;
    let records = state.service.list(&filter).await?;
    Ok(Json(records))
}

/// Handler: POST /upload
///
/// Expects a multipart form with the document in the `file` field.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    mut multipart: Multipart,
) -> Result<Json<IngestSummary>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ReviewError::Validation(format!("malformed upload: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ReviewError::Validation(format!("unreadable upload: {}", e)))?;
        info!(
            "Received upload {} ({} bytes) from {}",
            file_name,
            bytes.len(),
            actor
        );

        let summary = state
            .service
            .ingest_document(&file_name, &bytes, &actor)
            .await?;
        return Ok(Json(summary));
    }

    Err(ReviewError::Validation(format!("missing '{}' field", UPLOAD_FIELD)).into())
}

/// Handler: GET /products/:art_nr
///
/// Viewing a record claims or renews its lock.
pub async fn open_product(
    State(state): State<Arc<AppState>>,
    Path(art_nr): Path<String>,
    Actor(actor): Actor,
) -> Result<Json<ProductRecord>, ApiError> {
    let record = state
        .service
        .acquire_or_renew_lock(&ArtNr::from(art_nr), &actor)
        .await?;
    Ok(Json(record))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SaveForm {
    pub prompt_additions: String,
    pub final_description: String,
}

/// Handler: POST /products/:art_nr/save
pub async fn save_product(
    State(state): State<Arc<AppState>>,
    Path(art_nr): Path<String>,
    Actor(actor): Actor,
    Form(form): Form<SaveForm>,
) -> Result<Json<ProductRecord>, ApiError> {
    let record = state
        .service
        .save(
            &ArtNr::from(art_nr),
            &actor,
            form.prompt_additions,
            form.final_description,
        )
        .await?;
    Ok(Json(record))
}

/// Handler: POST /products/:art_nr/generate
pub async fn generate_description(
    State(state): State<Arc<AppState>>,
    Path(art_nr): Path<String>,
    Actor(actor): Actor,
) -> Result<Json<ProductRecord>, ApiError> {
    let record = state
        .service
        .generate(&ArtNr::from(art_nr), &actor)
        .await?;
    Ok(Json(record))
}

/// Handler: POST /products/:art_nr/approve
pub async fn approve_product(
    State(state): State<Arc<AppState>>,
    Path(art_nr): Path<String>,
    Actor(actor): Actor,
) -> Result<Json<ProductRecord>, ApiError> {
    let record = state.service.approve(&ArtNr::from(art_nr), &actor).await?;
    Ok(Json(record))
}

/// Handler: POST /products/:art_nr/reject
pub async fn reject_product(
    State(state): State<Arc<AppState>>,
    Path(art_nr): Path<String>,
    Actor(actor): Actor,
) -> Result<Json<ProductRecord>, ApiError> {
    let record = state.service.reject(&ArtNr::from(art_nr), &actor).await?;
    Ok(Json(record))
}

async fn export(state: &AppState, format: ExportFormat) -> Result<Response, ApiError> {
    let bytes = state.service.export(format).await?;
    let disposition = format!("attachment; filename=\"{}\"", format.file_name());
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// Handler: GET /export.csv
pub async fn export_csv(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    export(&state, ExportFormat::Csv).await
}

/// Handler: GET /export.xlsx
pub async fn export_xlsx(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    export(&state, ExportFormat::Xlsx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn actor_for(request: Request<()>) -> Actor {
        let (mut parts, _) = request.into_parts();
        Actor::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_actor_from_header() {
        let request = Request::builder()
            .header("X-User", " alice@example.com ")
            .body(())
            .unwrap();
        assert_eq!(actor_for(request).await, Actor("alice@example.com".into()));
    }

    #[tokio::test]
    async fn test_actor_defaults_when_missing_or_blank() {
        let missing = Request::builder().body(()).unwrap();
        assert_eq!(actor_for(missing).await, Actor(DEFAULT_ACTOR.into()));

        let blank = Request::builder().header("X-User", "  ").body(()).unwrap();
        assert_eq!(actor_for(blank).await, Actor(DEFAULT_ACTOR.into()));
    }

    #[test]
    fn test_list_query_defaults_to_pending() {
        let filter = ListQuery::default().into_filter().unwrap();
        assert_eq!(filter.status, Some(ReviewStatus::Pending));
        assert_eq!(filter.text, None);
    }

    #[test]
    fn test_list_query_empty_status_means_all() {
        let filter = ListQuery {
            status: Some(String::new()),
            q: Some("farbe".to_string()),
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.status, None);
        assert_eq!(filter.text.as_deref(), Some("farbe"));
    }

    #[test]
    fn test_list_query_rejects_unknown_status() {
        let err = ListQuery {
            status: Some("archived".to_string()),
            q: None,
        }
        .into_filter()
        .unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)));
    }
}
