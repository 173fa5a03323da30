use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::services::portal::ApiError;
use crate::session::{Claims, Session, TokenStoreError, UserRole};

pub const AUTH_PATH: &str = "/auth";
pub const HOME_PATH: &str = "/";

/// Every role-protected page of the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    AdminPanel,
    AdminDoctors,
    AddDoctor,
    CreateAdmin,
    AdminBooking,
    DoctorDashboard,
    PatientDashboard,
    PatientAppointments,
    BookAppointment,
    MedicalProfile,
    CompleteProfile,
    UpdateProfile,
    AiAssistant,
}

impl Page {
    pub const ALL: [Page; 13] = [
        Page::AdminPanel,
        Page::AdminDoctors,
        Page::AddDoctor,
        Page::CreateAdmin,
        Page::AdminBooking,
        Page::DoctorDashboard,
        Page::PatientDashboard,
        Page::PatientAppointments,
        Page::BookAppointment,
        Page::MedicalProfile,
        Page::CompleteProfile,
        Page::UpdateProfile,
        Page::AiAssistant,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Page::AdminPanel => "/admin",
            Page::AdminDoctors => "/admin/doctors",
            Page::AddDoctor => "/admin/add-doctor",
            Page::CreateAdmin => "/admin/create-admin",
            Page::AdminBooking => "/admin/book",
            Page::DoctorDashboard => "/doctor/dashboard",
            Page::PatientDashboard => "/patient/dashboard",
            Page::PatientAppointments => "/patient/appointments",
            Page::BookAppointment => "/patient/book",
            Page::MedicalProfile => "/patient/medical-profile",
            Page::CompleteProfile => "/patient/complete-profile",
            Page::UpdateProfile => "/patient/update-profile",
            Page::AiAssistant => "/patient/ai",
        }
    }

    pub fn required_role(self) -> UserRole {
        match self {
            Page::AdminPanel
            | Page::AdminDoctors
            | Page::AddDoctor
            | Page::CreateAdmin
            | Page::AdminBooking => UserRole::Admin,
            Page::DoctorDashboard => UserRole::Doctor,
            _ => UserRole::Patient,
        }
    }

    /// Where a signed-in visitor with the wrong role is sent.
    pub fn mismatch_redirect(self) -> &'static str {
        match self {
            Page::CompleteProfile => AUTH_PATH,
            _ => HOME_PATH,
        }
    }

    pub fn from_path(path: &str) -> Option<Page> {
        let path = path.trim_end_matches('/');
        Page::ALL.into_iter().find(|page| page.path() == path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectReason {
    NoToken,
    UndecodableToken,
    Expired,
    RoleMismatch,
    MissingUserId,
    AlreadySignedIn,
}

/// A page visit that ended before rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("redirect to {to} ({reason:?})")]
pub struct Redirect {
    pub to: &'static str,
    pub reason: RedirectReason,
}

impl Redirect {
    fn to_auth(reason: RedirectReason) -> Self {
        Redirect {
            to: AUTH_PATH,
            reason,
        }
    }
}

/// A visitor the guard let through.
#[derive(Debug, Clone, PartialEq)]
pub struct Visitor {
    pub user_id: String,
    pub role: UserRole,
    pub claims: Claims,
}

pub fn guard(session: &Session, page: Page) -> Result<Visitor, Redirect> {
    guard_at(session, page, Utc::now().timestamp())
}

/// Checks the stored token against `page` at time `now_secs`.
///
/// An unreadable or expired token is removed; a role mismatch leaves it in
/// place.
pub fn guard_at(session: &Session, page: Page, now_secs: i64) -> Result<Visitor, Redirect> {
    if session.get_token().is_none() {
        debug!(page = page.path(), "no session token");
        return Err(Redirect::to_auth(RedirectReason::NoToken));
    }

    let Some(claims) = session.claims() else {
        info!(page = page.path(), "clearing undecodable session token");
        session.clear();
        return Err(Redirect::to_auth(RedirectReason::UndecodableToken));
    };

    // only a past `exp` redirects; a token without one is let through
    if claims.exp.is_some_and(|exp| exp < now_secs) {
        info!(page = page.path(), exp = ?claims.exp, "clearing expired session token");
        session.clear();
        return Err(Redirect::to_auth(RedirectReason::Expired));
    }

    let required = page.required_role();
    if claims.user_role() != Some(required) {
        debug!(
            page = page.path(),
            role = ?claims.role,
            required = required.as_str(),
            "role mismatch"
        );
        return Err(Redirect {
            to: page.mismatch_redirect(),
            reason: RedirectReason::RoleMismatch,
        });
    }

    let user_id = match page {
        Page::DoctorDashboard => claims.principal_id().map(str::to_string),
        _ => claims.user_id.clone(),
    };
    let Some(user_id) = user_id else {
        debug!(page = page.path(), "token carries no user id");
        return Err(Redirect::to_auth(RedirectReason::MissingUserId));
    };

    Ok(Visitor {
        user_id,
        role: required,
        claims,
    })
}

/// The sign-in page and other signed-out pages send existing sessions home.
pub fn guard_signed_out(session: &Session) -> Result<(), Redirect> {
    match session.get_token() {
        Some(_) => Err(Redirect {
            to: HOME_PATH,
            reason: RedirectReason::AlreadySignedIn,
        }),
        None => Ok(()),
    }
}

/// Failure of a user action on a page.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Redirect(#[from] Redirect),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] TokenStoreError),
    /// Rejected locally before any request was made.
    #[error("{0}")]
    Invalid(String),
}

impl ActionError {
    pub fn user_message(&self) -> String {
        match self {
            ActionError::Redirect(redirect) => format!("redirecting to {}", redirect.to),
            ActionError::Api(err) => err.user_message(),
            ActionError::Storage(err) => err.to_string(),
            ActionError::Invalid(message) => message.clone(),
        }
    }
}
