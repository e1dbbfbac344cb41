// Image upload handler

use axum::{
    extract::{Extension, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use crate::{
    app::AppState, middleware::AuthenticatedUser, services::upload::UploadResponse,
    utils::service_error::ServiceError,
};

pub const FILE_FIELD: &str = "file";

/// Reads the first `file` field of a multipart body
#[utoipa::path(
    post,
    path = "/v1/uploads",
    tag = "Uploads",
    operation_id = "uploadImage",
    request_body(content = String, description = "Multipart form with a `file` field (JPEG, PNG or WebP)", content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Image stored", body = UploadResponse),
        (status = 400, description = "Bad request - missing file, unsupported type, or too large"),
        (status = 401, description = "Unauthorized - invalid or missing token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthenticatedUser>,
    mut multipart: Multipart,
) -> Response {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("Malformed multipart body: {}", e);
                return ServiceError::ValidationError(e.body_text()).into_response();
            },
        };

        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return ServiceError::ValidationError(e.body_text()).into_response(),
        };

        return match state
            .upload_service
            .store_image(auth_user.user_id, content_type.as_deref(), &bytes)
            .await
        {
            Ok(uploaded) => (StatusCode::CREATED, Json(uploaded)).into_response(),
            Err(e) => e.into_response(),
        };
    }

    ServiceError::ValidationError("Missing file field".to_string()).into_response()
}
