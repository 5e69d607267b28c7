//! JSON HTTP surface over the content service
//!
//! Every route is scoped by the `X-Principal-Id` header supplied by the
//! authenticating proxy in front of the server.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use storyvault_core::{ContentError, ContentService, NewProject, PrincipalId, ProjectId, SaveRequest};
use tracing::{debug, error};

pub const PRINCIPAL_HEADER: &str = "x-principal-id";

/// API errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Content(#[from] ContentError),

    #[error("Missing or invalid X-Principal-Id header")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("No route for {0}")]
    NotFound(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Content(e) => match e {
                ContentError::NotFoundOrForbidden(_)
                | ContentError::VersionNotFound { .. }
                | ContentError::NoContentToVersion(_)
                | ContentError::NoActiveRevision(_) => StatusCode::NOT_FOUND,
                ContentError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                ContentError::StoreUnavailable(_)
                | ContentError::ConcurrencyViolation { .. }
                | ContentError::WriterClosed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

/// Routes of the content API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    CreateProject,
    ActiveContent(ProjectId),
    SaveContent(ProjectId),
    AutoSave(ProjectId),
    CreateVersion(ProjectId),
    ListVersions(ProjectId),
    RestoreVersion(ProjectId, u32),
    Backup(ProjectId),
    Stats(ProjectId),
}

impl Route {
    pub fn parse(method: &Method, path: &str) -> Option<Route> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if parts.first() != Some(&"projects") {
            return None;
        }
        if parts.len() == 1 {
            return (*method == Method::POST).then_some(Route::CreateProject);
        }
        let project: ProjectId = parts[1].parse().ok()?;

        let route = match (method.as_str(), &parts[2..]) {
            ("GET", ["content"]) => Route::ActiveContent(project),
            ("PUT", ["content"]) => Route::SaveContent(project),
            ("POST", ["auto-save"]) => Route::AutoSave(project),
            ("POST", ["content", "version"]) => Route::CreateVersion(project),
            ("GET", ["content", "versions"]) => Route::ListVersions(project),
            ("POST", ["content", "restore", version]) => {
                Route::RestoreVersion(project, version.parse().ok()?)
            }
            ("GET", ["content", "backup"]) => Route::Backup(project),
            ("GET", ["stats"]) => Route::Stats(project),
            _ => return None,
        };
        Some(route)
    }
}

#[derive(Debug, Deserialize)]
struct CreateProjectRequest {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    genre: Option<String>,
    #[serde(default)]
    target_word_count: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AutoSaveRequest {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct AutoSaveResponse {
    scheduled: bool,
}

/// 413 for an exceeded size limit, 400 for any other body read failure
fn body_error(err: Box<dyn std::error::Error + Send + Sync>, limit: usize) -> ApiError {
    if err.downcast_ref::<LengthLimitError>().is_some() {
        ApiError::PayloadTooLarge(limit)
    } else {
        ApiError::InvalidRequest(format!("Failed to read request body: {}", err))
    }
}

pub struct ApiHandler {
    service: Arc<ContentService>,
    max_body_size: usize,
}

impl ApiHandler {
    pub fn new(service: Arc<ContentService>, max_body_size: usize) -> Self {
        Self { service, max_body_size }
    }

    pub async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        let (parts, body) = req.into_parts();
        let body = match Limited::new(body, self.max_body_size).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                debug!("Rejected request body: {}", e);
                return error_response(&body_error(e, self.max_body_size));
            }
        };
        self.respond(&parts.method, parts.uri.path(), &parts.headers, body).await
    }

    /// Route an already-buffered request.
    pub async fn respond(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Response<Full<Bytes>> {
        let result = match Route::parse(method, path) {
            Some(route) => match principal(headers) {
                Some(principal) => self.dispatch(route, principal, &body).await,
                None => Err(ApiError::Unauthorized),
            },
            None => Err(ApiError::NotFound(format!("{} {}", method, path))),
        };
        match result {
            Ok(response) => response,
            Err(e) => {
                if e.status().is_server_error() {
                    error!("{} {} failed: {}", method, path, e);
                }
                error_response(&e)
            }
        }
    }

    async fn dispatch(
        &self,
        route: Route,
        principal: PrincipalId,
        body: &[u8],
    ) -> Result<Response<Full<Bytes>>, ApiError> {
        let service = &self.service;
        let response = match route {
            Route::CreateProject => {
                let request: CreateProjectRequest = parse_json(body)?;
                let project = service
                    .create_project(NewProject {
                        owner: principal,
                        title: request.title,
                        description: request.description,
                        genre: request.genre,
                        target_word_count: request.target_word_count,
                    })
                    .await?;
                json_response(StatusCode::CREATED, &project)
            }
            Route::ActiveContent(project) => {
                json_response(StatusCode::OK, &service.get_active_content(principal, project).await?)
            }
            Route::SaveContent(project) => {
                let request: SaveRequest = parse_json_or_default(body)?;
                json_response(StatusCode::OK, &service.save_content(principal, project, request).await?)
            }
            Route::AutoSave(project) => {
                let request: AutoSaveRequest = parse_json_or_default(body)?;
                let scheduled = service.schedule_auto_save(principal, project, request.content).await?;
                json_response(StatusCode::ACCEPTED, &AutoSaveResponse { scheduled })
            }
            Route::CreateVersion(project) => json_response(
                StatusCode::CREATED,
                &service.create_version_snapshot(principal, project).await?,
            ),
            Route::ListVersions(project) => {
                json_response(StatusCode::OK, &service.list_versions(principal, project).await?)
            }
            Route::RestoreVersion(project, version) => json_response(
                StatusCode::OK,
                &service.restore_version(principal, project, version).await?,
            ),
            Route::Backup(project) => {
                let backup = service.export_backup(principal, project).await?;
                let mut response = json_response(StatusCode::OK, &backup);
                let disposition = format!("attachment; filename=\"project-{}-backup.json\"", project);
                if let Ok(value) = HeaderValue::from_str(&disposition) {
                    response.headers_mut().insert(CONTENT_DISPOSITION, value);
                }
                response
            }
            Route::Stats(project) => {
                json_response(StatusCode::OK, &service.project_stats(principal, project).await?)
            }
        };
        Ok(response)
    }
}

fn principal(headers: &HeaderMap) -> Option<PrincipalId> {
    headers.get(PRINCIPAL_HEADER)?.to_str().ok()?.trim().parse().ok()
}

fn parse_json<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidRequest(format!("Invalid JSON: {}", e)))
}

/// Empty bodies are accepted as `{}`.
fn parse_json_or_default<T: for<'de> Deserialize<'de> + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_json(body)
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(payload) => with_json_body(status, payload),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            with_json_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Failed to serialize response" }).to_string().into_bytes(),
            )
        }
    }
}

fn error_response(err: &ApiError) -> Response<Full<Bytes>> {
    with_json_body(err.status(), json!({ "error": err.to_string() }).to_string().into_bytes())
}

fn with_json_body(status: StatusCode, payload: Vec<u8>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(payload)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use storyvault_core::{MemoryStore, VaultConfig};

    fn handler() -> ApiHandler {
        let store = Arc::new(MemoryStore::new());
        let service = ContentService::new(store.clone(), store, VaultConfig::default());
        ApiHandler::new(Arc::new(service), 1024)
    }

    fn headers(principal: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(PRINCIPAL_HEADER, HeaderValue::from_str(principal).unwrap());
        headers
    }

    async fn call(
        handler: &ApiHandler,
        method: Method,
        path: &str,
        principal: &str,
        body: &str,
    ) -> (StatusCode, Value) {
        let response = handler
            .respond(&method, path, &headers(principal), Bytes::from(body.to_string()))
            .await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_body_errors_are_classified() {
        let oversized = Limited::new(Full::new(Bytes::from(vec![0u8; 16])), 4)
            .collect()
            .await
            .unwrap_err();
        assert_eq!(body_error(oversized, 4).status(), StatusCode::PAYLOAD_TOO_LARGE);

        let reset = Box::new(std::io::Error::other("connection reset"));
        let err = body_error(reset, 4);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }

    #[test]
    fn test_route_parsing() {
        assert_eq!(Route::parse(&Method::POST, "/projects"), Some(Route::CreateProject));
        assert_eq!(Route::parse(&Method::GET, "/projects/3/content"), Some(Route::ActiveContent(3)));
        assert_eq!(Route::parse(&Method::PUT, "/projects/3/content/"), Some(Route::SaveContent(3)));
        assert_eq!(
            Route::parse(&Method::POST, "/projects/3/content/restore/2"),
            Some(Route::RestoreVersion(3, 2))
        );
        assert_eq!(Route::parse(&Method::POST, "/projects/3/content/restore/x"), None);
        assert_eq!(Route::parse(&Method::DELETE, "/projects/3/content"), None);
        assert_eq!(Route::parse(&Method::GET, "/projects/abc/content"), None);
        assert_eq!(Route::parse(&Method::GET, "/health"), None);
    }

    #[tokio::test]
    async fn test_save_snapshot_restore_flow() {
        let handler = handler();
        let (status, project) = call(&handler, Method::POST, "/projects", "5", r#"{"title":"Saga"}"#).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = project["id"].as_i64().unwrap();
        let base = format!("/projects/{}", id);

        let (status, active) = call(&handler, Method::GET, &format!("{}/content", base), "5", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(active["version"], 1);
        assert_eq!(active["save_reason"], "initial_creation");

        let (status, saved) = call(
            &handler,
            Method::PUT,
            &format!("{}/content", base),
            "5",
            r#"{"content":"Once upon","content_type":"plain_text"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["content"], "Once upon");
        assert_eq!(saved["content_type"], "plain_text");

        let (status, snapshot) = call(&handler, Method::POST, &format!("{}/content/version", base), "5", "").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(snapshot["version"], 2);

        let (status, restored) =
            call(&handler, Method::POST, &format!("{}/content/restore/1", base), "5", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(restored["version"], 3);
        assert_eq!(restored["save_reason"], "version_restore");

        let (_, versions) = call(&handler, Method::GET, &format!("{}/content/versions", base), "5", "").await;
        assert_eq!(versions.as_array().unwrap().len(), 3);

        let (status, stats) = call(&handler, Method::GET, &format!("{}/stats", base), "5", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["word_count"], 2);
    }

    #[tokio::test]
    async fn test_auto_save_reports_scheduling() {
        let handler = handler();
        let (_, project) = call(&handler, Method::POST, "/projects", "5", r#"{"title":"Draft"}"#).await;
        let path = format!("/projects/{}/auto-save", project["id"]);

        let (status, body) = call(&handler, Method::POST, &path, "5", r#"{"content":"typing"}"#).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["scheduled"], true);

        let (status, body) = call(&handler, Method::POST, &path, "5", "").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["scheduled"], false);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let handler = handler();
        let (_, project) = call(&handler, Method::POST, "/projects", "5", r#"{"title":"Secret"}"#).await;
        let base = format!("/projects/{}", project["id"]);

        let (status, body) = call(&handler, Method::GET, &format!("{}/content", base), "6", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("not found"));

        let (status, _) = call(&handler, Method::POST, &format!("{}/content/restore/9", base), "5", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&handler, Method::PUT, &format!("{}/content", base), "5", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &handler,
            Method::PUT,
            &format!("{}/content", base),
            "5",
            r#"{"content_type":"docx"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&handler, Method::GET, &format!("{}/content", base), "nobody", "").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&handler, Method::GET, "/nowhere", "5", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_content_error_status_mapping() {
        let cases = [
            (ContentError::NoContentToVersion(1), StatusCode::NOT_FOUND),
            (ContentError::NoActiveRevision(1), StatusCode::NOT_FOUND),
            (ContentError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (ContentError::StoreUnavailable("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ContentError::WriterClosed(1), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ContentError::ConcurrencyViolation { project: 1, active: 2 },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }
}
