use crate::error::AccessError;
use crate::session::{Role, User};

pub const LOGIN_ROUTE: &str = "/login";

pub fn role_route(role: Role) -> &'static str {
    match role {
        Role::Student => "/student",
        Role::Secretary => "/secretary",
        Role::Advisor => "/advisor",
        Role::DeansOffice => "/deansoffice",
    }
}

/// Landing page for the current user; anonymous users go to the login page.
pub fn dashboard_route(user: Option<&User>) -> &'static str {
    user.map(|user| role_route(user.role)).unwrap_or(LOGIN_ROUTE)
}

pub fn require_role(user: Option<&User>, required: Role) -> Result<&User, AccessError> {
    match user {
        None => Err(AccessError::Unauthenticated),
        Some(user) if user.role == required => Ok(user),
        Some(_) => Err(AccessError::Forbidden {
            required: required.as_str(),
        }),
    }
}
