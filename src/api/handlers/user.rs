//! Signup, login, logout, profile and password change.
//!
//! Handlers stay thin: they validate the form, call the credential store and
//! translate its typed errors into field messages. Anything unexpected is
//! returned as [`ApiError`] and rendered generically.

use axum::{
    extract::{Extension, Form as FormBody},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc};
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::{
    PageView,
    forms::{Form, GENERIC},
};
use crate::{
    api::ApiError,
    auth::{
        AuthError, Authentication, safe_redirect_path,
        users::{NewUser, UserStore},
    },
    csrf::{self, CsrfToken},
    session::{AUTHENTICATED_USER_ID, FLASH, REDIRECT_PATH_AFTER_LOGIN, Session},
};

const MAX_FIELD_LENGTH: usize = 255;
const MIN_PASSWORD_LENGTH: usize = 10;
const LANDING_PATH: &str = "/";

type Users = Extension<Arc<dyn UserStore>>;
type Fields = FormBody<HashMap<String, String>>;

/// `POST /user/signup` body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SignupFields {
    pub name: String,
    pub email: String,
    pub password: String,
    pub csrf_token: String,
}

/// `POST /user/login` body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginFields {
    pub email: String,
    pub password: String,
    pub csrf_token: String,
}

/// `POST /user/logout` body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LogoutFields {
    pub csrf_token: String,
}

/// `POST /user/change-password` body.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordFields {
    pub current_password: String,
    pub new_password: String,
    pub new_password_confirmation: String,
    #[serde(rename = "csrf_token")]
    pub csrf_token: String,
}

fn empty_form(session: &Session, csrf: CsrfToken, auth: Authentication) -> Response {
    PageView::new(session, csrf, auth)
        .with_form(Form::default().view(&[]))
        .render(StatusCode::OK)
}

fn invalid_form(
    session: &Session,
    csrf: CsrfToken,
    auth: Authentication,
    form: &Form,
    visible: &[&str],
) -> Response {
    PageView::new(session, csrf, auth)
        .with_form(form.view(visible))
        .render(StatusCode::UNPROCESSABLE_ENTITY)
}

#[utoipa::path(
    get,
    path = "/user/signup",
    responses((status = 200, description = "Empty signup form", body = PageView)),
    tag = "user"
)]
pub async fn signup_form(session: Session, csrf: CsrfToken, auth: Authentication) -> Response {
    empty_form(&session, csrf, auth)
}

#[utoipa::path(
    post,
    path = "/user/signup",
    request_body(content = SignupFields, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Account created, redirect to login"),
        (status = 400, description = "CSRF token missing or incorrect"),
        (status = 422, description = "Validation failed or email already in use", body = PageView)
    ),
    tag = "user"
)]
#[instrument(skip_all)]
pub async fn signup(
    Extension(users): Users,
    session: Session,
    csrf: CsrfToken,
    auth: Authentication,
    FormBody(fields): Fields,
) -> Result<Response, ApiError> {
    const VISIBLE: &[&str] = &["name", "email"];

    let mut form = Form::new(fields);
    form.required(&["name", "email", "password"]);
    form.max_length("name", MAX_FIELD_LENGTH);
    form.max_length("email", MAX_FIELD_LENGTH);
    form.email("email");
    form.min_length("password", MIN_PASSWORD_LENGTH);

    if !form.is_valid() {
        return Ok(invalid_form(&session, csrf, auth, &form, VISIBLE));
    }

    let new_user = NewUser::new(form.get("name"), form.get("email"), form.get("password"));
    let result = users.create(new_user, Utc::now()).await;
    match result {
        Ok(user) => {
            info!(user_id = %user.id, "user signed up");
            session.put(FLASH, "Your signup was successful. Please log in.")?;
            Ok(Redirect::to("/user/login").into_response())
        }
        Err(AuthError::DuplicateEmail) => {
            form.add_error("email", "Address is already in use");
            Ok(invalid_form(&session, csrf, auth, &form, VISIBLE))
        }
        Err(err) => Err(err.into()),
    }
}

#[utoipa::path(
    get,
    path = "/user/login",
    responses((status = 200, description = "Empty login form", body = PageView)),
    tag = "user"
)]
pub async fn login_form(session: Session, csrf: CsrfToken, auth: Authentication) -> Response {
    empty_form(&session, csrf, auth)
}

#[utoipa::path(
    post,
    path = "/user/login",
    request_body(content = LoginFields, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Logged in, redirect to the remembered page or home"),
        (status = 400, description = "CSRF token missing or incorrect"),
        (status = 422, description = "Credentials rejected", body = PageView)
    ),
    tag = "user"
)]
#[instrument(skip_all)]
pub async fn login(
    Extension(users): Users,
    session: Session,
    csrf: CsrfToken,
    auth: Authentication,
    FormBody(fields): Fields,
) -> Result<Response, ApiError> {
    const VISIBLE: &[&str] = &["email"];

    let mut form = Form::new(fields);
    form.required(&["email", "password"]);
    if !form.is_valid() {
        return Ok(invalid_form(&session, csrf, auth, &form, VISIBLE));
    }

    let result = users
        .authenticate(Utc::now(), form.get("email"), form.get("password"))
        .await;
    let claims = match result {
        Ok(claims) => claims,
        Err(AuthError::AuthenticationFailure) => {
            form.add_error(GENERIC, "Email or Password is incorrect");
            return Ok(invalid_form(&session, csrf, auth, &form, VISIBLE));
        }
        Err(err) => return Err(err.into()),
    };

    // New privilege level: new session token and new CSRF token.
    session.renew_token();
    csrf::regenerate(&session)?;
    session.put(AUTHENTICATED_USER_ID, claims.subject.to_string())?;
    info!(user_id = %claims.subject, "user logged in");

    let target = session
        .pop_string(REDIRECT_PATH_AFTER_LOGIN)
        .filter(|path| safe_redirect_path(path).is_some())
        .unwrap_or_else(|| LANDING_PATH.to_string());
    Ok(Redirect::to(&target).into_response())
}

#[utoipa::path(
    post,
    path = "/user/logout",
    request_body(content = LogoutFields, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Logged out, redirect home"),
        (status = 400, description = "CSRF token missing or incorrect")
    ),
    tag = "user"
)]
pub async fn logout(session: Session) -> Result<Response, ApiError> {
    session.remove(AUTHENTICATED_USER_ID);
    session.renew_token();
    session.put(FLASH, "You've been logged out successfully!")?;
    Ok(Redirect::to(LANDING_PATH).into_response())
}

#[utoipa::path(
    get,
    path = "/user/profile",
    responses(
        (status = 200, description = "Current user's profile", body = PageView),
        (status = 303, description = "Not logged in, redirect to login")
    ),
    tag = "user"
)]
pub async fn profile(
    Extension(users): Users,
    session: Session,
    csrf: CsrfToken,
    auth: Authentication,
) -> Result<Response, ApiError> {
    let id = auth.user_id().ok_or(AuthError::NotFound)?;
    let user = users.query_by_id(&id.to_string()).await?;
    Ok(PageView::new(&session, csrf, auth)
        .with_user(user.into())
        .render(StatusCode::OK))
}

#[utoipa::path(
    get,
    path = "/user/change-password",
    responses(
        (status = 200, description = "Empty password change form", body = PageView),
        (status = 303, description = "Not logged in, redirect to login")
    ),
    tag = "user"
)]
pub async fn change_password_form(
    session: Session,
    csrf: CsrfToken,
    auth: Authentication,
) -> Response {
    empty_form(&session, csrf, auth)
}

#[utoipa::path(
    post,
    path = "/user/change-password",
    request_body(content = ChangePasswordFields, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Password changed, redirect to profile"),
        (status = 400, description = "CSRF token missing or incorrect"),
        (status = 422, description = "Validation failed or current password incorrect", body = PageView)
    ),
    tag = "user"
)]
#[instrument(skip_all)]
pub async fn change_password(
    Extension(users): Users,
    session: Session,
    csrf: CsrfToken,
    auth: Authentication,
    FormBody(fields): Fields,
) -> Result<Response, ApiError> {
    let mut form = Form::new(fields);
    form.required(&["currentPassword", "newPassword", "newPasswordConfirmation"]);
    form.min_length("newPassword", MIN_PASSWORD_LENGTH);
    form.min_length("newPasswordConfirmation", MIN_PASSWORD_LENGTH);
    if form.get("newPassword") != form.get("newPasswordConfirmation") {
        form.add_error("newPasswordConfirmation", "Passwords do not match");
    }
    if !form.get("newPassword").is_empty() && form.get("currentPassword") == form.get("newPassword")
    {
        form.add_error("newPassword", "Your new password must not match your previous");
    }
    if !form.is_valid() {
        return Ok(invalid_form(&session, csrf, auth, &form, &[]));
    }

    let id = auth.user_id().ok_or(AuthError::NotFound)?;
    let result = users
        .change_password(
            &id.to_string(),
            form.get("currentPassword"),
            form.get("newPassword"),
        )
        .await;
    match result {
        Ok(()) => {
            info!(user_id = %id, "password changed");
            session.put(FLASH, "Your password has been updated!")?;
            Ok(Redirect::to("/user/profile").into_response())
        }
        Err(AuthError::InvalidCredentials) => {
            form.add_error("currentPassword", "Current password is incorrect");
            Ok(invalid_form(&session, csrf, auth, &form, &[]))
        }
        Err(err) => Err(err.into()),
    }
}
