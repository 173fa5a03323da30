use chrono::NaiveDateTime;
use tracing::info;

use super::{guard, loadable, require_filled, ActionError, Loadable, Page, Redirect};
use crate::models::appointment::{Appointment, BookAppointmentRequest};
use crate::models::doctor::Doctor;
use crate::models::profile::{CreateProfileRequest, PatientProfile, UpdateProfileRequest};
use crate::services::ai::{AiError, Diagnosis, ScanImage};
use crate::state::AppState;

/// Tiles on the patient home page, in display order.
pub const DASHBOARD_LINKS: [(&str, &str); 4] = [
    ("الملف الطبي", "/patient/medical-profile"),
    ("مواعيدي", "/patient/appointments"),
    ("حجز موعد", "/patient/book"),
    ("المساعد الذكي", "/patient/ai"),
];

pub fn load_patient_dashboard(state: &AppState) -> Result<[(&'static str, &'static str); 4], Redirect> {
    guard(&state.session, Page::PatientDashboard)?;
    Ok(DASHBOARD_LINKS)
}

pub async fn load_appointments(state: &AppState) -> Result<Loadable<Vec<Appointment>>, Redirect> {
    let visitor = guard(&state.session, Page::PatientAppointments)?;
    Ok(loadable(
        "patient_appointments",
        state.api.patient_appointments(&visitor.user_id).await,
    ))
}

/// Cancels one appointment and re-fetches the whole list. The list is only
/// re-fetched when the cancel went through.
pub async fn cancel_appointment(
    state: &AppState,
    appointment_id: &str,
) -> Result<Loadable<Vec<Appointment>>, ActionError> {
    let visitor = guard(&state.session, Page::PatientAppointments)?;
    state.api.cancel_appointment(appointment_id).await?;
    info!(%appointment_id, "appointment cancelled");
    Ok(loadable(
        "patient_appointments",
        state.api.patient_appointments(&visitor.user_id).await,
    ))
}

pub async fn load_booking(state: &AppState) -> Result<Loadable<Vec<Doctor>>, Redirect> {
    guard(&state.session, Page::BookAppointment)?;
    Ok(loadable("bookable_doctors", state.api.bookable_doctors().await))
}

pub async fn book_appointment(
    state: &AppState,
    doctor_id: &str,
    at: Option<NaiveDateTime>,
    reason: &str,
) -> Result<(), ActionError> {
    let visitor = guard(&state.session, Page::BookAppointment)?;
    let message = "يرجى اختيار طبيب ووقت وكتابة سبب الحجز.";
    require_filled(&[doctor_id, reason], message)?;
    let at = at.ok_or_else(|| ActionError::Invalid(message.into()))?;

    let req = BookAppointmentRequest::for_patient(&visitor.user_id, doctor_id, at, reason);
    state.api.book_appointment(&req).await?;
    info!(%doctor_id, date = %req.date, "appointment booked");
    Ok(())
}

pub async fn load_medical_profile(state: &AppState) -> Result<Loadable<PatientProfile>, Redirect> {
    let visitor = guard(&state.session, Page::MedicalProfile)?;
    Ok(loadable(
        "patient_profile",
        state.api.patient_profile(&visitor.user_id).await,
    ))
}

/// Submits the first-time medical history. Returns where to go next.
pub async fn complete_profile(
    state: &AppState,
    chronic_diseases: &[String],
    current_medication: &[String],
    allergies: &[String],
) -> Result<&'static str, ActionError> {
    let visitor = guard(&state.session, Page::CompleteProfile)?;
    let req = CreateProfileRequest::new(
        &visitor.user_id,
        chronic_diseases,
        current_medication,
        allergies,
    );
    state.api.create_profile(&req).await?;
    info!(patient_id = %visitor.user_id, "profile completed");
    Ok(Page::PatientDashboard.path())
}

/// Prefilled edit form for the contact details.
pub async fn load_update_profile(
    state: &AppState,
) -> Result<Loadable<UpdateProfileRequest>, Redirect> {
    let visitor = guard(&state.session, Page::UpdateProfile)?;
    let profile = state.api.patient_profile(&visitor.user_id).await;
    Ok(loadable(
        "patient_profile",
        profile.map(|profile| UpdateProfileRequest::from_profile(&visitor.user_id, &profile)),
    ))
}

pub async fn update_profile(
    state: &AppState,
    form: &UpdateProfileRequest,
) -> Result<&'static str, ActionError> {
    let visitor = guard(&state.session, Page::UpdateProfile)?;
    let req = UpdateProfileRequest {
        id: visitor.user_id,
        ..form.clone()
    };
    state.api.update_profile(&req).await?;
    Ok(Page::PatientDashboard.path())
}

/// Image analysis from the assistant page. The skin model takes no patient
/// id, so none is sent.
pub async fn analyze_scan(
    state: &AppState,
    image: ScanImage,
) -> Result<Result<Diagnosis, AiError>, Redirect> {
    guard(&state.session, Page::AiAssistant)?;
    Ok(state.ai.diagnose(image, None).await)
}

pub async fn ask_assistant(
    state: &AppState,
    message: &str,
) -> Result<Result<serde_json::Value, AiError>, Redirect> {
    guard(&state.session, Page::AiAssistant)?;
    let role = state.session.get_user_role().to_lowercase();
    Ok(state.ai.chat(message, &role).await)
}
