//! Router configuration for the HTTP API.

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::dto::{FileListResponse, FileResponse, StorageMetadataResponse, UploadForm};
use super::error::{ErrorBody, ErrorCode, ErrorDetail};
use super::handlers::{
    delete_file, download_file, get_file, get_storage_metadata, list_files, upload_file, AppState,
};
use super::middleware::create_cors_layer;

/// Room left in the request body for multipart framing around the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// OpenAPI document for the HTTP API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "dedupvault API",
        description = "Deduplicated file storage with storage accounting"
    ),
    servers((url = "/api")),
    paths(
        super::handlers::file::list_files,
        super::handlers::file::upload_file,
        super::handlers::file::get_file,
        super::handlers::file::download_file,
        super::handlers::file::delete_file,
        super::handlers::metadata::get_storage_metadata,
    ),
    components(schemas(
        FileResponse,
        FileListResponse,
        StorageMetadataResponse,
        UploadForm,
        ErrorBody,
        ErrorDetail,
        ErrorCode,
    )),
    tags(
        (name = "files", description = "Upload, list, download and delete files"),
        (name = "storage", description = "Deduplication statistics")
    )
)]
pub struct ApiDoc;

/// Create the main API router.
pub fn create_router(app_state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let body_limit = usize::try_from(app_state.files.max_file_size())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let file_routes = Router::new()
        .route("/files", get(list_files).post(upload_file))
        .route("/files/:id", get(get_file).delete(delete_file))
        .route("/files/:id/download", get(download_file));

    let api_routes = Router::new()
        .merge(file_routes)
        .route("/storage-metadata", get(get_storage_metadata));

    Router::new()
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins))
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Create the Swagger UI router serving the OpenAPI document.
pub fn create_swagger_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_health_router() {
        let _router = create_health_router();
    }

    #[test]
    fn test_openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().cloned().collect();
        for path in [
            "/files",
            "/files/{id}",
            "/files/{id}/download",
            "/storage-metadata",
        ] {
            assert!(paths.iter().any(|p| p == path), "missing {path}");
        }
    }

    #[test]
    fn test_openapi_describes_multipart_upload() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let content = &doc["paths"]["/files"]["post"]["requestBody"]["content"];
        let schema = &content["multipart/form-data"]["schema"];
        assert_eq!(schema["$ref"], "#/components/schemas/UploadForm");
        assert_eq!(
            doc["components"]["schemas"]["UploadForm"]["properties"]["file"]["format"],
            "binary"
        );
    }

    #[test]
    fn test_create_swagger_router() {
        let _router = create_swagger_router();
    }
}
