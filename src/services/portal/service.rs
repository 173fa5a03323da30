use async_trait::async_trait;

use super::errors::ApiError;
use crate::models::{
    appointment::{Appointment, BookAppointmentRequest},
    auth::{
        LoginRequest, RegisterAdminRequest, RegisterPatientRequest, ResetPasswordEmailRequest,
        ResetPasswordRequest,
    },
    doctor::{Doctor, DoctorOverview, RegisterDoctorRequest},
    profile::{CreateProfileRequest, PatientProfile, UpdateProfileRequest},
};

/// The portal's REST surface. Authenticated calls read the bearer token from
/// the session at call time.
#[async_trait]
pub trait PortalApi: Send + Sync {
    // authentication
    async fn login(&self, req: &LoginRequest) -> Result<String, ApiError>;
    /// Token issued for the new account, if the server returned one.
    async fn register_patient(&self, req: &RegisterPatientRequest)
        -> Result<Option<String>, ApiError>;
    async fn register_doctor(&self, req: &RegisterDoctorRequest) -> Result<(), ApiError>;
    async fn register_admin(&self, req: &RegisterAdminRequest) -> Result<(), ApiError>;
    async fn request_password_reset(&self, req: &ResetPasswordEmailRequest)
        -> Result<(), ApiError>;
    async fn reset_password(&self, req: &ResetPasswordRequest) -> Result<(), ApiError>;
    async fn confirm_email(&self, user_id: &str, token: &str) -> Result<(), ApiError>;

    // appointments
    async fn patient_appointments(&self, patient_id: &str) -> Result<Vec<Appointment>, ApiError>;
    async fn cancel_appointment(&self, appointment_id: &str) -> Result<(), ApiError>;
    async fn bookable_doctors(&self) -> Result<Vec<Doctor>, ApiError>;
    async fn book_appointment(&self, req: &BookAppointmentRequest) -> Result<(), ApiError>;
    async fn appointments_count(&self) -> Result<u64, ApiError>;
    async fn today_appointments_count(&self) -> Result<u64, ApiError>;

    // doctors
    async fn doctors(&self, active_only: bool) -> Result<Vec<Doctor>, ApiError>;
    /// Deactivates (`active == false`) or restores a doctor.
    async fn set_doctor_active(&self, doctor_id: &str, active: bool) -> Result<(), ApiError>;
    async fn doctor_overview(&self, doctor_id: &str) -> Result<DoctorOverview, ApiError>;
    async fn doctors_count(&self) -> Result<u64, ApiError>;

    // patients
    async fn patient_profile(&self, patient_id: &str) -> Result<PatientProfile, ApiError>;
    async fn create_profile(&self, req: &CreateProfileRequest) -> Result<(), ApiError>;
    async fn update_profile(&self, req: &UpdateProfileRequest) -> Result<(), ApiError>;
    async fn patients_count(&self) -> Result<u64, ApiError>;
}
