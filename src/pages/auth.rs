use std::collections::HashMap;

use tracing::{info, warn};

use super::guard::{AUTH_PATH, HOME_PATH};
use super::{guard_signed_out, require_filled, ActionError};
use crate::models::auth::{
    LoginRequest, RegisterPatientRequest, ResetPasswordEmailRequest, ResetPasswordRequest,
};
use crate::session::Session;
use crate::state::AppState;

pub const RESET_LINK_SENT: &str = "تم إرسال رابط إعادة تعيين كلمة المرور إلى بريدك الإلكتروني";
pub const PASSWORD_RESET_DONE: &str = "تم إعادة تعيين كلمة المرور بنجاح";
const INVALID_RESET_LINK: &str = "رابط إعادة تعيين كلمة المرور غير صالح";
const PASSWORDS_DIFFER: &str = "كلمات المرور غير متطابقة";

/// Signs in, stores the token, and returns the landing page for the token's
/// role. Tokens without a recognised role land on `/`.
pub async fn login(state: &AppState, email: &str, password: &str) -> Result<&'static str, ActionError> {
    guard_signed_out(&state.session)?;
    let req = LoginRequest {
        email: email.trim().to_string(),
        password: password.to_string(),
    };
    let token = state.api.login(&req).await?;
    state.session.store(&token)?;

    let landing = state
        .session
        .claims()
        .and_then(|claims| claims.user_role())
        .map(|role| role.home())
        .unwrap_or(HOME_PATH);
    info!(email = %req.email, %landing, "signed in");
    Ok(landing)
}

/// Registers a patient account. A token in the reply is kept, and the page
/// switches back to the sign-in form either way.
pub async fn register_patient(
    state: &AppState,
    req: &RegisterPatientRequest,
) -> Result<(), ActionError> {
    guard_signed_out(&state.session)?;
    require_filled(
        &[&req.full_name, &req.email, &req.password],
        "يرجى إدخال الاسم والبريد الإلكتروني وكلمة المرور.",
    )?;
    if let Some(token) = state.api.register_patient(req).await? {
        state.session.store(&token)?;
    }
    info!(email = %req.email, "patient registered");
    Ok(())
}

pub fn sign_out(session: &Session) -> &'static str {
    session.clear();
    info!("signed out");
    AUTH_PATH
}

pub async fn forgot_password(state: &AppState, email: &str) -> Result<&'static str, ActionError> {
    guard_signed_out(&state.session)?;
    let req = ResetPasswordEmailRequest {
        email: email.trim().to_string(),
    };
    state.api.request_password_reset(&req).await?;
    Ok(RESET_LINK_SENT)
}

/// Query parameters of an emailed link, percent-decoded. Pairs that do not
/// decode are dropped.
pub fn link_params(link: &str) -> HashMap<String, String> {
    let query = link.split_once('?').map(|(_, query)| query).unwrap_or(link);
    let query = query.split('#').next().unwrap_or_default();
    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = urlencoding::decode(&key.replace('+', " ")).ok()?.into_owned();
            let value = urlencoding::decode(&value.replace('+', " ")).ok()?.into_owned();
            Some((key, value))
        })
        .collect()
}

/// Completes a reset from the emailed link.
pub async fn reset_password(
    state: &AppState,
    link: &str,
    new_password: &str,
    confirm_password: &str,
) -> Result<&'static str, ActionError> {
    guard_signed_out(&state.session)?;
    let params = link_params(link);
    let (Some(token), Some(email)) = (params.get("token"), params.get("email")) else {
        return Err(ActionError::Invalid(INVALID_RESET_LINK.into()));
    };
    if new_password != confirm_password {
        return Err(ActionError::Invalid(PASSWORDS_DIFFER.into()));
    }

    let req = ResetPasswordRequest {
        email: email.clone(),
        new_password: new_password.to_string(),
        reset_password_token: token.clone(),
    };
    state.api.reset_password(&req).await?;
    info!(%email, "password reset");
    Ok(PASSWORD_RESET_DONE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailConfirmation {
    Confirmed,
    Failed,
}

/// Confirms an address from the emailed link. Any failure, including a link
/// without both parameters, shows the same error view.
pub async fn confirm_email(state: &AppState, link: &str) -> Result<EmailConfirmation, ActionError> {
    guard_signed_out(&state.session)?;
    let params = link_params(link);
    let (Some(user_id), Some(token)) = (params.get("userId"), params.get("token")) else {
        return Ok(EmailConfirmation::Failed);
    };
    match state.api.confirm_email(user_id, token).await {
        Ok(()) => Ok(EmailConfirmation::Confirmed),
        Err(err) => {
            warn!(%user_id, error = %err, "email confirmation failed");
            Ok(EmailConfirmation::Failed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::RedirectReason;
    use crate::services::portal::mock_portal::MockPortal;
    use crate::session::test_tokens::token_for;
    use crate::state::test_support::state_with;
    use std::sync::Arc;

    fn signed_out(api: Arc<MockPortal>) -> AppState {
        state_with(api, None)
    }

    #[tokio::test]
    async fn login_lands_on_role_home() {
        for (role, home) in [
            ("Patient", "/patient/dashboard"),
            ("Admin", "/admin"),
            ("Doctor", "/doctor/dashboard"),
            ("Nurse", "/"),
        ] {
            let api = Arc::new(MockPortal::default());
            *api.login_token.lock().unwrap() = Some(token_for("u1", role, 3600));
            let state = signed_out(api);

            assert_eq!(login(&state, "a@b.c", "pw").await.unwrap(), home);
            assert!(state.session.get_token().is_some());
        }
    }

    #[tokio::test]
    async fn rejected_login_keeps_session_empty() {
        let state = signed_out(Arc::new(MockPortal::default()));
        let err = login(&state, "a@b.c", "wrong").await.unwrap_err();
        assert_eq!(err.user_message(), "Invalid credentials");
        assert_eq!(state.session.get_token(), None);
    }

    #[tokio::test]
    async fn signed_in_visitor_is_sent_home() {
        let api = Arc::new(MockPortal::default());
        let state = state_with(api.clone(), Some(token_for("p1", "Patient", 3600)));

        match login(&state, "a@b.c", "pw").await.unwrap_err() {
            ActionError::Redirect(redirect) => {
                assert_eq!(redirect.to, "/");
                assert_eq!(redirect.reason, RedirectReason::AlreadySignedIn);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(api.calls("login"), 0);
    }

    #[tokio::test]
    async fn register_stores_returned_token() {
        let api = Arc::new(MockPortal::default());
        *api.login_token.lock().unwrap() = Some(token_for("p9", "Patient", 3600));
        let state = signed_out(api);
        let req = RegisterPatientRequest {
            full_name: "Laila".into(),
            email: "l@x.io".into(),
            password: "pw".into(),
            gender: "Female".into(),
            phone_number: "0100".into(),
            date_of_birth: "1990-04-02".into(),
        };

        register_patient(&state, &req).await.unwrap();
        assert_eq!(state.session.get_user_id().as_deref(), Some("p9"));
    }

    #[test]
    fn sign_out_clears_and_goes_to_auth() {
        let state = state_with(
            Arc::new(MockPortal::default()),
            Some(token_for("p1", "Patient", 3600)),
        );
        assert_eq!(sign_out(&state.session), "/auth");
        assert_eq!(state.session.get_token(), None);
    }

    #[test]
    fn link_params_decode() {
        let params = link_params("https://medscan.app/reset-password?email=a%40b.io&token=CfDJ8%2Bx%3D%3D#top");
        assert_eq!(params["email"], "a@b.io");
        assert_eq!(params["token"], "CfDJ8+x==");
    }

    #[tokio::test]
    async fn reset_checks_link_and_confirmation_locally() {
        let api = Arc::new(MockPortal::default());
        let state = signed_out(api.clone());

        let err = reset_password(&state, "/reset-password?email=a%40b.io", "pw", "pw")
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), INVALID_RESET_LINK);

        let link = "/reset-password?email=a%40b.io&token=t";
        let err = reset_password(&state, link, "pw", "other").await.unwrap_err();
        assert_eq!(err.user_message(), PASSWORDS_DIFFER);
        assert_eq!(api.calls("reset_password"), 0);

        assert_eq!(
            reset_password(&state, link, "pw", "pw").await.unwrap(),
            PASSWORD_RESET_DONE
        );
    }

    #[tokio::test]
    async fn forgot_password_surfaces_server_refusal() {
        let api = Arc::new(MockPortal::default());
        let state = signed_out(api.clone());
        assert_eq!(forgot_password(&state, " a@b.io ").await.unwrap(), RESET_LINK_SENT);

        *api.fail_writes.lock().unwrap() = true;
        let err = forgot_password(&state, "a@b.io").await.unwrap_err();
        assert_eq!(err.user_message(), "write refused");
    }

    #[tokio::test]
    async fn confirm_email_needs_both_params() {
        let api = Arc::new(MockPortal::default());
        let state = signed_out(api.clone());

        assert_eq!(
            confirm_email(&state, "/confirm-email?userId=u1").await.unwrap(),
            EmailConfirmation::Failed
        );
        assert_eq!(api.calls("confirm_email"), 0);

        assert_eq!(
            confirm_email(&state, "/confirm-email?userId=u1&token=t").await.unwrap(),
            EmailConfirmation::Confirmed
        );

        *api.fail_writes.lock().unwrap() = true;
        assert_eq!(
            confirm_email(&state, "/confirm-email?userId=u1&token=t").await.unwrap(),
            EmailConfirmation::Failed
        );
    }
}
