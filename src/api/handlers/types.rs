//! Request and response payloads for the sites API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::stacks::{ErrorKind, FieldError, SiteContent, SiteSpec};

#[derive(ToSchema, Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateSiteRequest {
    pub project: String,
    pub site: String,
    /// HTML for the index document.
    pub content: String,
    /// HTML for the error document.
    pub content404: String,
    /// Azure region, defaults to the server's configured location.
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub index_document: Option<String>,
    #[serde(default)]
    pub error_document: Option<String>,
}

impl From<CreateSiteRequest> for SiteSpec {
    fn from(request: CreateSiteRequest) -> Self {
        Self {
            project: request.project,
            site: request.site,
            content: request.content,
            content404: request.content404,
            location: request.location,
            subscription_id: request.subscription_id,
            index_document: request.index_document,
            error_document: request.error_document,
        }
    }
}

#[derive(ToSchema, Deserialize, Serialize, Debug, Clone)]
pub struct UpdateSiteRequest {
    pub content: String,
    pub content404: String,
}

impl From<UpdateSiteRequest> for SiteContent {
    fn from(request: UpdateSiteRequest) -> Self {
        Self {
            content: request.content,
            content404: request.content404,
        }
    }
}

/// Body of every error response.
#[derive(ToSchema, Serialize, Debug)]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
}
