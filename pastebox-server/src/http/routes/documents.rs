//! Document endpoints
//!
//! - `POST /api` stores a document under a caller-supplied key
//! - `GET /api/list` pages through live public documents
//! - `GET /api/{key}` returns a document as JSON
//! - `GET /raw/{key}` returns just the text

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::http::error::ApiError;
use crate::http::extractors::{ApiJson, ValidKey};
use crate::http::server::AppState;
use crate::models::{
    Document, Expiry, NewDocument, Paginated, Pagination, PaginationParams, PutOptions,
};
use crate::store::now_unix;

/// Create document request
#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub key: String,
    #[serde(flatten)]
    pub document: NewDocument,
    /// Absolute expiration, Unix seconds
    pub expiration: Option<i64>,
    /// Store without expiration; wins over `expiration`
    #[serde(default)]
    pub never_expires: bool,
}

impl CreateDocumentRequest {
    fn options(&self) -> PutOptions {
        if self.never_expires {
            PutOptions::expiring(Expiry::Never)
        } else {
            self.expiration
                .map(|ts| PutOptions::expiring(Expiry::At(ts)))
                .unwrap_or_default()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub key: String,
    pub expiration: Option<i64>,
}

/// Document response
#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub key: String,
    pub text: String,
    pub public: bool,
    pub name: String,
    pub title: String,
    pub expiration: Option<i64>,
    pub expires_at: Option<String>,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        let expires_at = doc.expires_at().map(|dt| dt.to_rfc3339());
        Self {
            key: doc.key,
            text: doc.text,
            public: doc.public,
            name: doc.name,
            title: doc.title,
            expiration: doc.expiration,
            expires_at,
        }
    }
}

/// POST /api - store a document
async fn create_document(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    // Pin the expiration first so the response reports exactly what was stored
    let expiration = state.store.resolve_expiration(req.options(), now_unix());
    let options = PutOptions::expiring(expiration.map_or(Expiry::Never, Expiry::At));

    state.store.put(&req.key, &req.document, options).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            key: req.key,
            expiration,
        }),
    ))
}

/// GET /api/list - live public documents
async fn list_public(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<DocumentResponse>>, ApiError> {
    let page = state.store.list_public(Pagination::from(params)).await?;

    Ok(Json(Paginated {
        items: page.items.into_iter().map(DocumentResponse::from).collect(),
        total: page.total,
        page: page.page,
        per_page: page.per_page,
    }))
}

async fn find(state: &AppState, key: &str) -> Result<Document, ApiError> {
    state
        .store
        .get(key)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            resource: "document",
            id: key.to_string(),
        })
}

/// GET /api/{key} - get a single document
async fn get_document(
    State(state): State<Arc<AppState>>,
    ValidKey(key): ValidKey,
) -> Result<Json<DocumentResponse>, ApiError> {
    let doc = find(&state, key.as_str()).await?;
    Ok(Json(DocumentResponse::from(doc)))
}

/// GET /raw/{key} - document text only
async fn get_raw(
    State(state): State<Arc<AppState>>,
    ValidKey(key): ValidKey,
) -> Result<impl IntoResponse, ApiError> {
    let doc = find(&state, key.as_str()).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], doc.text))
}

/// Document routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api", post(create_document))
        .route("/api/list", get(list_public))
        .route("/api/{key}", get(get_document))
        .route("/raw/{key}", get(get_raw))
}
