use utoipa::openapi::{Contact, InfoBuilder, License};
use utoipa::OpenApi;

use super::handlers::{
    admin, error::ErrorBody, health, injection, login, members, root, session, signup,
};
use crate::auth::{Role, UserSummary};

#[derive(OpenApi)]
#[openapi(
    paths(
        root::root,
        health::health,
        signup::signup,
        login::login,
        session::logout,
        members::members,
        admin::list_users,
        admin::change_role,
        injection::nosql_injection,
    ),
    components(schemas(
        ErrorBody,
        health::Health,
        root::RootResponse,
        signup::SignupForm,
        login::LoginForm,
        members::MembersResponse,
        admin::UsersResponse,
        admin::RoleChangeForm,
        injection::LookupResponse,
        UserSummary,
        Role,
    )),
    tags(
        (name = "memberauth", description = "Members area and diagnostics"),
        (name = "auth", description = "Signup, login and logout"),
        (name = "admin", description = "User and role management"),
        (name = "health", description = "Service health")
    )
)]
struct ApiDoc;

/// The `OpenAPI` document, with info taken from Cargo metadata.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();

    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();
    info.contact = cargo_contact();
    info.license = cargo_license();
    doc.info = info;

    doc
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let primary = env!("CARGO_PKG_AUTHORS").split(';').next().map(str::trim)?;
    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    Some(value.trim()).filter(|value| !value.is_empty())
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|value| !value.is_empty())
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.split_once('<') {
        Some((name, email)) => (non_empty(name), non_empty(email.trim_end_matches('>'))),
        None => (non_empty(author), None),
    }
}
