//! Current-user route. Only reached after the authentication gate let the
//! request through.

use axum::{
    Json,
    extract::Request,
    http::{Method, header},
    response::{IntoResponse, Response},
};

use super::{AccountResponse, RouteError};
use crate::auth::Unauthorized;
use crate::context::RequestContext;

pub(super) fn handle(ctx: &RequestContext, request: Request) -> Result<Response, RouteError> {
    if request.method() != Method::GET {
        return Err(RouteError::MethodNotAllowed("GET"));
    }
    let Some(ref principal) = ctx.principal else {
        return Ok(Unauthorized.into_response());
    };

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache, no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(AccountResponse {
            account: &principal.account,
        }),
    )
        .into_response())
}
