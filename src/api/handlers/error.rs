use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::{error, warn};

use super::types::ErrorBody;
use crate::stacks::{ErrorKind, StackError};

/// Wraps a [`StackError`] so handlers can return it directly.
#[derive(Debug)]
pub struct ApiError(pub StackError);

impl From<StackError> for ApiError {
    fn from(err: StackError) -> Self {
        Self(err)
    }
}

const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidSpec => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::ProviderError | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    /// Internal failures are logged server-side and surfaced without detail.
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let message = match kind {
            ErrorKind::Internal => {
                error!("Internal error: {}", self.0);
                "internal error".to_string()
            }
            ErrorKind::ProviderError => {
                warn!("Engine error: {}", self.0);
                self.0.to_string()
            }
            _ => self.0.to_string(),
        };

        let fields = self.0.fields();
        let body = ErrorBody {
            error: kind,
            message,
            fields: (!fields.is_empty()).then(|| fields.to_vec()),
        };

        (status_for(kind), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::{FieldError, ProjectName, SiteName, StackHandle};
    use anyhow::Result;
    use axum::body::to_bytes;

    fn handle() -> Result<StackHandle> {
        Ok(StackHandle::new(
            ProjectName::parse("acme").map_err(anyhow::Error::msg)?,
            SiteName::parse("blog").map_err(anyhow::Error::msg)?,
        ))
    }

    async fn body_json(response: Response) -> Result<serde_json::Value> {
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    #[tokio::test]
    async fn conflict_maps_to_409() -> Result<()> {
        let response = ApiError(StackError::conflict(&handle()?)).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await?;
        assert_eq!(body["error"], "conflict");
        assert!(body.get("fields").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn invalid_spec_lists_fields() -> Result<()> {
        let response = ApiError(StackError::InvalidSpec(vec![FieldError::new(
            "content",
            "is required",
        )]))
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await?;
        assert_eq!(body["error"], "invalid_spec");
        assert_eq!(body["fields"][0]["field"], "content");
        Ok(())
    }

    #[tokio::test]
    async fn storage_detail_is_not_leaked() -> Result<()> {
        let response =
            ApiError(StackError::storage("password authentication failed")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await?;
        assert_eq!(body["error"], "internal");
        assert_eq!(body["message"], "internal error");
        Ok(())
    }

    #[tokio::test]
    async fn provider_detail_is_verbatim() -> Result<()> {
        let response = ApiError(StackError::Provider("quota exceeded".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await?;
        assert_eq!(body["error"], "provider_error");
        assert_eq!(body["message"], "quota exceeded");
        Ok(())
    }
}
