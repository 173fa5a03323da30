//! Page controllers. Each page runs the route guard before any request and
//! shows read failures in place instead of failing the visit.

pub mod admin;
pub mod auth;
pub mod doctor;
pub mod guard;
pub mod patient;

use tracing::warn;

pub use crate::sync::Loadable;
use crate::services::portal::ApiError;
pub use guard::{guard, guard_signed_out, ActionError, Page, Redirect, RedirectReason, Visitor};

pub(crate) fn loadable<T>(what: &'static str, result: Result<T, ApiError>) -> Loadable<T> {
    match result {
        Ok(value) => Loadable::Loaded(value),
        Err(err) => {
            warn!(what, error = %err, "read failed");
            Loadable::Failed(err.user_message())
        }
    }
}

/// Local check that every named field has content.
pub(crate) fn require_filled(fields: &[&str], message: &str) -> Result<(), ActionError> {
    if fields.iter().any(|field| field.trim().is_empty()) {
        return Err(ActionError::Invalid(message.to_string()));
    }
    Ok(())
}
