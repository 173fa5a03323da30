use super::{guard, loadable, Loadable, Page, Redirect};
use crate::models::doctor::DoctorOverview;
use crate::session::Session;
use crate::state::AppState;

use super::guard::AUTH_PATH;

#[derive(Debug, Clone, PartialEq)]
pub struct DoctorDashboard {
    pub doctor_id: String,
    pub overview: Loadable<DoctorOverview>,
}

pub async fn load_doctor_dashboard(state: &AppState) -> Result<DoctorDashboard, Redirect> {
    let visitor = guard(&state.session, Page::DoctorDashboard)?;
    let overview = state.api.doctor_overview(&visitor.user_id).await;
    Ok(DoctorDashboard {
        overview: loadable("doctor_overview", overview),
        doctor_id: visitor.user_id,
    })
}

/// Sign-out from the dashboard header.
pub fn sign_out(session: &Session) -> &'static str {
    session.clear();
    AUTH_PATH
}
