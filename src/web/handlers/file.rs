//! File handlers for the dedupvault HTTP API.

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use std::sync::Arc;

use crate::file::UploadRequest;
use crate::web::dto::{
    sanitize_filename, FileListResponse, FileResponse, ListFilesQuery, UploadForm, ValidatedQuery,
};
use crate::web::error::{ApiError, ErrorBody};
use crate::web::handlers::AppState;

/// Multipart field carrying the upload.
const FILE_FIELD: &str = "file";

/// Generate a safe Content-Disposition header value for file downloads.
///
/// This function sanitizes the filename to prevent header injection attacks
/// and uses RFC 5987 encoding for non-ASCII filenames.
fn content_disposition_header(filename: &str) -> String {
    // ASCII fallback for the basic filename parameter
    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() => c,
            _ => '_',
        })
        .collect();

    if filename.is_ascii() && !filename.chars().any(|c| c.is_control() || c == '"' || c == '\\') {
        return format!("attachment; filename=\"{}\"", filename);
    }

    let encoded = urlencoding::encode(filename);

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    )
}

/// GET /api/files - List file references.
#[utoipa::path(
    get,
    path = "/files",
    tag = "files",
    params(ListFilesQuery),
    responses(
        (status = 200, description = "One page of file references, newest first", body = FileListResponse),
        (status = 400, description = "Malformed query", body = ErrorBody),
        (status = 422, description = "Invalid filter", body = ErrorBody)
    )
)]
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    ValidatedQuery(query): ValidatedQuery<ListFilesQuery>,
) -> Result<Json<FileListResponse>, ApiError> {
    let filter = query.into_filter(state.default_page_size, state.max_page_size)?;
    let page = state.accounting.list_references(&filter).await?;

    Ok(Json(page.into()))
}

/// POST /api/files - Upload a file.
///
/// Request body: multipart/form-data with a "file" field.
#[utoipa::path(
    post,
    path = "/files",
    tag = "files",
    request_body(
        content = UploadForm,
        content_type = "multipart/form-data",
        description = "Form with a `file` field"
    ),
    responses(
        (status = 201, description = "New content stored", body = FileResponse),
        (status = 200, description = "Content already stored; new reference created", body = FileResponse),
        (status = 400, description = "Missing file, file too large or type not allowed", body = ErrorBody),
        (status = 409, description = "Hash collision", body = ErrorBody)
    )
)]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FileResponse>), ApiError> {
    let mut upload: Option<UploadRequest> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!("Failed to read multipart field: {}", e);
        ApiError::bad_request("Invalid multipart data")
    })? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(sanitize_filename)
            .unwrap_or_default();
        let content_type = field.content_type().map(str::to_string);
        let content = field.bytes().await.map_err(|e| {
            tracing::warn!("Failed to read file content: {}", e);
            ApiError::bad_request(format!(
                "Failed to read file (max {} bytes)",
                state.files.max_file_size()
            ))
        })?;

        let mut request = UploadRequest::new(filename, content.to_vec());
        if let Some(content_type) = content_type {
            request = request.with_content_type(content_type);
        }
        upload = Some(request);
    }

    let upload = upload.ok_or_else(|| ApiError::bad_request("No file provided"))?;

    let outcome = state
        .files
        .upload(upload)
        .await
        .map_err(ApiError::from_upload_error)?;

    let status = if outcome.deduplicated {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((status, Json(outcome.reference.into())))
}

/// GET /api/files/:id - Get file metadata.
#[utoipa::path(
    get,
    path = "/files/{id}",
    tag = "files",
    params(
        ("id" = String, Path, description = "File reference ID")
    ),
    responses(
        (status = 200, description = "File metadata", body = FileResponse),
        (status = 404, description = "File not found", body = ErrorBody)
    )
)]
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<FileResponse>, ApiError> {
    let reference = state.accounting.get_reference(&id).await?;
    Ok(Json(reference.into()))
}

/// GET /api/files/:id/download - Download file content.
#[utoipa::path(
    get,
    path = "/files/{id}/download",
    tag = "files",
    params(
        ("id" = String, Path, description = "File reference ID")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 404, description = "File not found", body = ErrorBody)
    )
)]
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response<Body>, ApiError> {
    let download = state.files.download(&id).await?;
    let reference = download.reference;

    let content_type = if reference.file_type.is_empty() {
        mime_guess::from_path(&reference.original_filename)
            .first_or_octet_stream()
            .to_string()
    } else {
        reference.file_type.clone()
    };

    let response = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(&reference.original_filename),
        )
        .header(header::CONTENT_LENGTH, download.content.len())
        .body(Body::from(download.content))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })?;

    Ok(response)
}

/// DELETE /api/files/:id - Delete a file reference.
#[utoipa::path(
    delete,
    path = "/files/{id}",
    tag = "files",
    params(
        ("id" = String, Path, description = "File reference ID")
    ),
    responses(
        (status = 204, description = "File deleted"),
        (status = 404, description = "File not found", body = ErrorBody)
    )
)]
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.files.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
