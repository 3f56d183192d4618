use axum::{http::StatusCode, response::Response};

use super::PageView;
use crate::{auth::Authentication, csrf::CsrfToken, session::Session};

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Landing page", body = PageView)
    ),
    tag = "pages"
)]
pub async fn home(session: Session, csrf: CsrfToken, auth: Authentication) -> Response {
    PageView::new(&session, csrf, auth).render(StatusCode::OK)
}

#[utoipa::path(
    get,
    path = "/ping",
    responses(
        (status = 200, description = "Process is up", body = String, content_type = "text/plain")
    ),
    tag = "health"
)]
pub async fn ping() -> &'static str {
    "OK"
}
