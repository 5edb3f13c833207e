//! Site lifecycle handlers.
//!
//! Thin wrappers over [`SiteService`]. Every failure goes through
//! [`ApiError`] so the status code and body follow the error kind.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    error::ApiError,
    types::{CreateSiteRequest, ErrorBody, UpdateSiteRequest},
};
use crate::stacks::{LifecycleOperation, Site, SiteService, SiteSpec};

#[utoipa::path(
    post,
    path = "/v1/sites",
    request_body = CreateSiteRequest,
    responses(
        (status = 201, description = "Site provisioned.", body = Site),
        (status = 400, description = "Invalid site specification.", body = ErrorBody),
        (status = 409, description = "Site already exists or has an operation in progress.", body = ErrorBody),
        (status = 500, description = "Engine or storage failure.", body = ErrorBody),
    ),
    tag = "sites"
)]
/// Provision a new static site and return it once its endpoint is live.
pub async fn create_site(
    service: Extension<Arc<SiteService>>,
    Json(payload): Json<CreateSiteRequest>,
) -> impl IntoResponse {
    let spec = SiteSpec::from(payload);

    match service.create_site(&spec).await {
        Ok(deployment) => {
            info!(changes = %deployment.changes, "site created");
            (StatusCode::CREATED, Json(Site::from(&deployment.record))).into_response()
        }
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/sites/{project}",
    params(("project" = String, Path, description = "Project name")),
    responses(
        (status = 200, description = "Sites of the project.", body = [Site]),
        (status = 404, description = "Project not found.", body = ErrorBody),
    ),
    tag = "sites"
)]
/// List the sites of a project.
pub async fn list_sites(
    Path(project): Path<String>,
    service: Extension<Arc<SiteService>>,
) -> impl IntoResponse {
    match service.list_sites(&project).await {
        Ok(sites) => (StatusCode::OK, Json(sites)).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/sites/{project}/{site}",
    params(
        ("project" = String, Path, description = "Project name"),
        ("site" = String, Path, description = "Site name"),
    ),
    responses(
        (status = 200, description = "Site detail.", body = Site),
        (status = 404, description = "Site not found.", body = ErrorBody),
        (status = 409, description = "Operation in progress.", body = ErrorBody),
    ),
    tag = "sites"
)]
/// Fetch a site with the endpoint of its latest successful deployment.
pub async fn get_site(
    Path((project, site)): Path<(String, String)>,
    service: Extension<Arc<SiteService>>,
) -> impl IntoResponse {
    match service.get_site(&project, &site).await {
        Ok(site) => (StatusCode::OK, Json(site)).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/v1/sites/{project}/{site}",
    params(
        ("project" = String, Path, description = "Project name"),
        ("site" = String, Path, description = "Site name"),
    ),
    request_body = UpdateSiteRequest,
    responses(
        (status = 200, description = "Site updated.", body = Site),
        (status = 400, description = "Invalid content.", body = ErrorBody),
        (status = 404, description = "Site not found.", body = ErrorBody),
        (status = 409, description = "Operation in progress.", body = ErrorBody),
        (status = 500, description = "Engine or storage failure.", body = ErrorBody),
    ),
    tag = "sites"
)]
/// Replace the page content of a site. Other settings are kept.
pub async fn update_site(
    Path((project, site)): Path<(String, String)>,
    service: Extension<Arc<SiteService>>,
    Json(payload): Json<UpdateSiteRequest>,
) -> impl IntoResponse {
    match service.update_site(&project, &site, payload.into()).await {
        Ok(deployment) => {
            info!(changes = %deployment.changes, "site updated");
            (StatusCode::OK, Json(Site::from(&deployment.record))).into_response()
        }
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/sites/{project}/{site}",
    params(
        ("project" = String, Path, description = "Project name"),
        ("site" = String, Path, description = "Site name"),
    ),
    responses(
        (status = 204, description = "Site destroyed."),
        (status = 404, description = "Site not found.", body = ErrorBody),
        (status = 409, description = "Operation in progress.", body = ErrorBody),
        (status = 500, description = "Engine or storage failure.", body = ErrorBody),
    ),
    tag = "sites"
)]
/// Tear down every resource of a site.
pub async fn delete_site(
    Path((project, site)): Path<(String, String)>,
    service: Extension<Arc<SiteService>>,
) -> impl IntoResponse {
    match service.delete_site(&project, &site).await {
        Ok(()) => {
            debug!("site {project}/{site} destroyed");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/sites/{project}/{site}/refresh",
    params(
        ("project" = String, Path, description = "Project name"),
        ("site" = String, Path, description = "Site name"),
    ),
    responses(
        (status = 200, description = "Outputs re-synced from the engine.", body = Site),
        (status = 404, description = "Site not found.", body = ErrorBody),
        (status = 409, description = "Operation in progress.", body = ErrorBody),
        (status = 500, description = "Engine or storage failure.", body = ErrorBody),
    ),
    tag = "sites"
)]
/// Re-read the real state of a site's resources.
pub async fn refresh_site(
    Path((project, site)): Path<(String, String)>,
    service: Extension<Arc<SiteService>>,
) -> impl IntoResponse {
    match service.refresh_site(&project, &site).await {
        Ok(site) => (StatusCode::OK, Json(site)).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/sites/{project}/{site}/operations",
    params(
        ("project" = String, Path, description = "Project name"),
        ("site" = String, Path, description = "Site name"),
    ),
    responses(
        (status = 200, description = "Recent operations, oldest first.", body = [LifecycleOperation]),
        (status = 400, description = "Malformed names.", body = ErrorBody),
    ),
    tag = "sites"
)]
/// Recent lifecycle operations on a site and how they ended.
pub async fn site_operations(
    Path((project, site)): Path<(String, String)>,
    service: Extension<Arc<SiteService>>,
) -> impl IntoResponse {
    match service.site_operations(&project, &site) {
        Ok(operations) => (StatusCode::OK, Json(operations)).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}
