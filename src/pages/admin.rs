use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use super::{guard, loadable, require_filled, ActionError, Loadable, Page, Redirect};
use crate::models::appointment::BookAppointmentRequest;
use crate::models::auth::RegisterAdminRequest;
use crate::models::doctor::{Doctor, RegisterDoctorRequest};
use crate::services::hub::{Subscription, APPOINTMENT_CANCELLED, APPOINTMENT_CREATED};
use crate::services::portal::{ApiError, PortalApi};
use crate::state::AppState;
use crate::sync::LiveResource;

#[derive(Debug, Clone, PartialEq)]
pub struct AdminCounts {
    pub appointments: Loadable<u64>,
    pub today_appointments: Loadable<u64>,
    pub doctors: Loadable<u64>,
    pub patients: Loadable<u64>,
}

/// One-shot view of the dashboard counters, fetched concurrently.
pub async fn load_admin_panel(state: &AppState) -> Result<AdminCounts, Redirect> {
    guard(&state.session, Page::AdminPanel)?;
    let api = &state.api;
    let (appointments, today, doctors, patients) = tokio::join!(
        api.appointments_count(),
        api.today_appointments_count(),
        api.doctors_count(),
        api.patients_count(),
    );
    Ok(AdminCounts {
        appointments: loadable("appointments_count", appointments),
        today_appointments: loadable("today_appointments_count", today),
        doctors: loadable("doctors_count", doctors),
        patients: loadable("patients_count", patients),
    })
}

/// A mounted admin panel. Appointment counters re-fetch on hub pushes until
/// the panel is dropped.
pub struct AdminPanel {
    pub appointments: LiveResource<u64>,
    pub today_appointments: LiveResource<u64>,
    pub doctors: LiveResource<u64>,
    pub patients: LiveResource<u64>,
    _subscriptions: Vec<Subscription>,
}

fn live_count<F, Fut>(name: &'static str, api: &Arc<dyn PortalApi>, fetch: F) -> LiveResource<u64>
where
    F: Fn(Arc<dyn PortalApi>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<u64, ApiError>> + Send + 'static,
{
    let api = api.clone();
    LiveResource::new(name, move || fetch(api.clone()))
}

impl AdminPanel {
    pub async fn mount(state: &AppState) -> Result<Self, Redirect> {
        guard(&state.session, Page::AdminPanel)?;
        let api = &state.api;
        let panel_events = [APPOINTMENT_CREATED, APPOINTMENT_CANCELLED];

        let appointments = live_count("appointments_count", api, |api| async move {
            api.appointments_count().await
        });
        let today_appointments = live_count("today_appointments_count", api, |api| async move {
            api.today_appointments_count().await
        });
        let doctors = live_count("doctors_count", api, |api| async move {
            api.doctors_count().await
        });
        let patients = live_count("patients_count", api, |api| async move {
            api.patients_count().await
        });

        let mut subscriptions = appointments.refresh_on(&state.hub, &panel_events);
        subscriptions.extend(today_appointments.refresh_on(&state.hub, &panel_events));

        let panel = AdminPanel {
            appointments,
            today_appointments,
            doctors,
            patients,
            _subscriptions: subscriptions,
        };
        panel.refresh().await;

        if let Err(err) = state.hub.start_connection().await {
            warn!(error = %err, "live updates unavailable, retrying in background");
        }
        Ok(panel)
    }

    /// Re-fetches every counter, e.g. after a doctor was toggled.
    pub async fn refresh(&self) {
        tokio::join!(
            self.appointments.refresh(),
            self.today_appointments.refresh(),
            self.doctors.refresh(),
            self.patients.refresh(),
        );
    }

    pub fn counts(&self) -> AdminCounts {
        AdminCounts {
            appointments: self.appointments.get(),
            today_appointments: self.today_appointments.get(),
            doctors: self.doctors.get(),
            patients: self.patients.get(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DoctorFilter {
    #[default]
    All,
    Active,
}

impl DoctorFilter {
    fn active_only(self) -> bool {
        self == DoctorFilter::Active
    }
}

pub async fn load_doctors(
    state: &AppState,
    filter: DoctorFilter,
) -> Result<Loadable<Vec<Doctor>>, Redirect> {
    guard(&state.session, Page::AdminDoctors)?;
    Ok(loadable("doctors", state.api.doctors(filter.active_only()).await))
}

/// Deactivates an active doctor or restores an inactive one, then reloads
/// the list. A failed toggle leaves the list as it was.
pub async fn toggle_doctor(
    state: &AppState,
    doctor: &Doctor,
    filter: DoctorFilter,
) -> Result<Loadable<Vec<Doctor>>, ActionError> {
    guard(&state.session, Page::AdminDoctors)?;
    let activate = !doctor.is_active;
    state.api.set_doctor_active(&doctor.id, activate).await?;
    info!(doctor_id = %doctor.id, active = activate, "doctor status changed");
    Ok(loadable("doctors", state.api.doctors(filter.active_only()).await))
}

pub async fn add_doctor(state: &AppState, req: &RegisterDoctorRequest) -> Result<(), ActionError> {
    guard(&state.session, Page::AddDoctor)?;
    require_filled(
        &[&req.full_name, &req.email, &req.password],
        "يرجى ملء الحقول المطلوبة.",
    )?;
    state.api.register_doctor(req).await?;
    info!(email = %req.email, "doctor registered");
    Ok(())
}

pub async fn create_admin(
    state: &AppState,
    req: &RegisterAdminRequest,
    confirm_password: &str,
) -> Result<(), ActionError> {
    guard(&state.session, Page::CreateAdmin)?;
    require_filled(&[&req.user_name, &req.email, &req.password], "جميع الحقول مطلوبة")?;
    if req.password != confirm_password {
        return Err(ActionError::Invalid("كلمتا المرور غير متطابقتين".into()));
    }
    state.api.register_admin(req).await?;
    info!(user_name = %req.user_name, "admin account created");
    Ok(())
}

/// Doctors offered on the admin booking form.
pub async fn load_admin_booking(state: &AppState) -> Result<Loadable<Vec<Doctor>>, Redirect> {
    guard(&state.session, Page::AdminBooking)?;
    Ok(loadable("bookable_doctors", state.api.bookable_doctors().await))
}

/// Books a walk-in patient by name.
pub async fn book_walk_in(
    state: &AppState,
    patient_name: &str,
    doctor_id: &str,
    at: Option<NaiveDateTime>,
    reason: &str,
) -> Result<(), ActionError> {
    guard(&state.session, Page::AdminBooking)?;
    let message = "يرجى إدخال اسم المريض واختيار الطبيب والوقت وكتابة السبب.";
    require_filled(&[patient_name, doctor_id, reason], message)?;
    let at = at.ok_or_else(|| ActionError::Invalid(message.into()))?;

    let req = BookAppointmentRequest::for_walk_in(patient_name.trim(), doctor_id, at, reason);
    state.api.book_appointment(&req).await?;
    info!(%doctor_id, date = %req.date, "walk-in appointment booked");
    Ok(())
}
