use super::handlers::{health, root, user};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Liveness checks; served outside the session pipeline.
pub(crate) fn health_routes() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(root::ping))
        .routes(routes!(health::health))
}

/// Pages open to anonymous visitors.
pub(crate) fn public_routes() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(root::home))
        .routes(routes!(user::signup_form, user::signup))
        .routes(routes!(user::login_form, user::login))
}

/// Pages behind the authentication gate.
pub(crate) fn protected_routes() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(user::logout))
        .routes(routes!(user::profile))
        .routes(routes!(user::change_password_form, user::change_password))
}

/// Every documented route, used to generate the `OpenAPI` document.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .merge(health_routes())
        .merge(public_routes())
        .merge(protected_routes());

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Liveness and dependency checks".to_string());

    let mut pages_tag = Tag::new("pages");
    pages_tag.description = Some("Rendered pages".to_string());

    let mut user_tag = Tag::new("user");
    user_tag.description = Some("Signup, login and account management".to_string());

    router.get_openapi_mut().tags = Some(vec![health_tag, pages_tag, user_tag]);

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = optional_str(env!("CARGO_PKG_LICENSE")).map(|identifier| {
        let mut license = License::new(identifier);
        license.identifier = Some(identifier.to_string());
        license
    });

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    let primary = env!("CARGO_PKG_AUTHORS").split(':').next().map(str::trim)?;
    let (name, email) = match primary.split_once('<') {
        Some((name, email)) => (name.trim(), email.trim_end_matches('>').trim()),
        None => (primary, ""),
    };
    if name.is_empty() && email.is_empty() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = optional_str(name).map(str::to_string);
    contact.email = optional_str(email).map(str::to_string);
    Some(contact)
}

fn optional_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
