pub mod forms;
pub mod health;
pub mod root;
pub mod user;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use self::forms::FormView;
use crate::{
    auth::{Authentication, users::User},
    csrf::CsrfToken,
    session::{FLASH, Session},
};

/// Account details shown on the profile page.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileView {
    pub name: String,
    pub email: String,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for ProfileView {
    fn from(user: User) -> Self {
        Self {
            name: user.name,
            email: user.email,
            roles: user.roles,
            created_at: user.created_at,
        }
    }
}

/// Data every rendered page receives.
#[derive(Debug, Serialize, ToSchema)]
pub struct PageView {
    pub csrf_token: String,
    pub flash: Option<String>,
    pub is_authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<FormView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<ProfileView>,
}

impl PageView {
    /// Consumes the pending flash message.
    pub(crate) fn new(session: &Session, csrf: CsrfToken, auth: Authentication) -> Self {
        Self {
            csrf_token: csrf.0,
            flash: session.pop_string(FLASH),
            is_authenticated: auth.is_authenticated(),
            form: None,
            user: None,
        }
    }

    #[must_use]
    pub(crate) fn with_form(mut self, form: FormView) -> Self {
        self.form = Some(form);
        self
    }

    #[must_use]
    pub(crate) fn with_user(mut self, user: ProfileView) -> Self {
        self.user = Some(user);
        self
    }

    pub(crate) fn render(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}
