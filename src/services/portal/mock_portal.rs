use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{errors::ApiError, service::PortalApi};
use crate::models::{
    appointment::{Appointment, BookAppointmentRequest},
    auth::{
        LoginRequest, RegisterAdminRequest, RegisterPatientRequest, ResetPasswordEmailRequest,
        ResetPasswordRequest,
    },
    doctor::{Doctor, DoctorOverview, RegisterDoctorRequest},
    profile::{CreateProfileRequest, PatientProfile, UpdateProfileRequest},
};

/// In-memory portal backend for controller tests. Holds server truth and
/// records calls.
#[derive(Default)]
pub struct MockPortal {
    pub login_token: Mutex<Option<String>>,
    pub appointments: Mutex<Vec<Appointment>>,
    pub doctors: Mutex<Vec<Doctor>>,
    pub profile: Mutex<Option<PatientProfile>>,
    pub overview: Mutex<Option<DoctorOverview>>,
    pub appointments_total: Mutex<u64>,
    pub fail_reads: Mutex<bool>,
    pub fail_writes: Mutex<bool>,
    /// Artificial latency per successive `appointments_count` call.
    pub count_delays: Mutex<Vec<Duration>>,
    pub calls: Mutex<HashMap<&'static str, usize>>,
}

impl MockPortal {
    pub fn with_appointments(appointments: Vec<Appointment>) -> Self {
        let mock = Self::default();
        *mock.appointments.lock().unwrap() = appointments;
        mock
    }

    pub fn calls(&self, name: &'static str) -> usize {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    fn record(&self, name: &'static str) {
        *self.calls.lock().unwrap().entry(name).or_default() += 1;
    }

    fn read_guard(&self, endpoint: &'static str) -> Result<(), ApiError> {
        if *self.fail_reads.lock().unwrap() {
            Err(ApiError::Status {
                endpoint,
                status: 500,
            })
        } else {
            Ok(())
        }
    }

    fn write_guard(&self, endpoint: &'static str) -> Result<(), ApiError> {
        if *self.fail_writes.lock().unwrap() {
            Err(ApiError::Rejected {
                endpoint,
                message: "write refused".into(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PortalApi for MockPortal {
    async fn login(&self, _req: &LoginRequest) -> Result<String, ApiError> {
        self.record("login");
        self.login_token
            .lock()
            .unwrap()
            .clone()
            .ok_or(ApiError::Rejected {
                endpoint: "authentication/Login",
                message: "Invalid credentials".into(),
            })
    }

    async fn register_patient(
        &self,
        _req: &RegisterPatientRequest,
    ) -> Result<Option<String>, ApiError> {
        self.record("register_patient");
        self.write_guard("authentication/RegisterPatient")?;
        Ok(self.login_token.lock().unwrap().clone())
    }

    async fn register_doctor(&self, _req: &RegisterDoctorRequest) -> Result<(), ApiError> {
        self.record("register_doctor");
        self.write_guard("authentication/RegisterDoctor")
    }

    async fn register_admin(&self, _req: &RegisterAdminRequest) -> Result<(), ApiError> {
        self.record("register_admin");
        self.write_guard("authentication/RegisterAdmin")
    }

    async fn request_password_reset(
        &self,
        _req: &ResetPasswordEmailRequest,
    ) -> Result<(), ApiError> {
        self.record("request_password_reset");
        self.write_guard("authentication/ResetPasswordEmail")
    }

    async fn reset_password(&self, _req: &ResetPasswordRequest) -> Result<(), ApiError> {
        self.record("reset_password");
        self.write_guard("authentication/ResetPassword")
    }

    async fn confirm_email(&self, _user_id: &str, _token: &str) -> Result<(), ApiError> {
        self.record("confirm_email");
        self.write_guard("authentication/ConfirmEmail")
    }

    async fn patient_appointments(&self, _patient_id: &str) -> Result<Vec<Appointment>, ApiError> {
        self.record("patient_appointments");
        self.read_guard("appointment/GetPatientAppointments")?;
        Ok(self.appointments.lock().unwrap().clone())
    }

    async fn cancel_appointment(&self, appointment_id: &str) -> Result<(), ApiError> {
        self.record("cancel_appointment");
        self.write_guard("appointment/Cancel")?;
        let mut appointments = self.appointments.lock().unwrap();
        match appointments
            .iter_mut()
            .find(|a| a.appointment_id == appointment_id)
        {
            Some(appointment) => {
                appointment.status = Some("Cancelled".into());
                Ok(())
            }
            None => Err(ApiError::Status {
                endpoint: "appointment/Cancel",
                status: 404,
            }),
        }
    }

    async fn bookable_doctors(&self) -> Result<Vec<Doctor>, ApiError> {
        self.record("bookable_doctors");
        self.read_guard("appointment/GetDoctors")?;
        Ok(self
            .doctors
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.is_active)
            .cloned()
            .collect())
    }

    async fn book_appointment(&self, req: &BookAppointmentRequest) -> Result<(), ApiError> {
        self.record("book_appointment");
        self.write_guard("appointment/MakeAppointment")?;
        let mut appointments = self.appointments.lock().unwrap();
        let id = format!("a{}", appointments.len() + 1);
        appointments.push(Appointment {
            appointment_id: id,
            patient_name: req.patient_name.clone(),
            doctor_name: Some(req.doctor_id.clone()),
            date: req.date.clone(),
            reason: Some(req.reason.clone()),
            status: Some("Pending".into()),
        });
        *self.appointments_total.lock().unwrap() += 1;
        Ok(())
    }

    async fn appointments_count(&self) -> Result<u64, ApiError> {
        self.record("appointments_count");
        self.read_guard("appointment/GetAppointmentsCount")?;
        // Snapshot before the delay so a slow call returns an older truth.
        let value = *self.appointments_total.lock().unwrap();
        let delay = {
            let mut delays = self.count_delays.lock().unwrap();
            if delays.is_empty() {
                None
            } else {
                Some(delays.remove(0))
            }
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(value)
    }

    async fn today_appointments_count(&self) -> Result<u64, ApiError> {
        self.record("today_appointments_count");
        self.read_guard("appointment/GetTodayAppointmentsCount")?;
        Ok(0)
    }

    async fn doctors(&self, active_only: bool) -> Result<Vec<Doctor>, ApiError> {
        self.record("doctors");
        self.read_guard("doctor/GetAll")?;
        Ok(self
            .doctors
            .lock()
            .unwrap()
            .iter()
            .filter(|d| !active_only || d.is_active)
            .cloned()
            .collect())
    }

    async fn set_doctor_active(&self, doctor_id: &str, active: bool) -> Result<(), ApiError> {
        self.record("set_doctor_active");
        self.write_guard("doctor/DeleteDoctor")?;
        if let Some(doctor) = self
            .doctors
            .lock()
            .unwrap()
            .iter_mut()
            .find(|d| d.id == doctor_id)
        {
            doctor.is_active = active;
        }
        Ok(())
    }

    async fn doctor_overview(&self, _doctor_id: &str) -> Result<DoctorOverview, ApiError> {
        self.record("doctor_overview");
        self.read_guard("doctor/GetInfoAndAppointments")?;
        self.overview.lock().unwrap().clone().ok_or(ApiError::Rejected {
            endpoint: "doctor/GetInfoAndAppointments",
            message: "not found".into(),
        })
    }

    async fn doctors_count(&self) -> Result<u64, ApiError> {
        self.record("doctors_count");
        self.read_guard("doctor/GetDoctorsCount")?;
        Ok(self.doctors.lock().unwrap().len() as u64)
    }

    async fn patient_profile(&self, _patient_id: &str) -> Result<PatientProfile, ApiError> {
        self.record("patient_profile");
        self.read_guard("patient/GetProfile")?;
        self.profile.lock().unwrap().clone().ok_or(ApiError::Rejected {
            endpoint: "patient/GetProfile",
            message: "no profile".into(),
        })
    }

    async fn create_profile(&self, _req: &CreateProfileRequest) -> Result<(), ApiError> {
        self.record("create_profile");
        self.write_guard("patient/CreateProfile")
    }

    async fn update_profile(&self, _req: &UpdateProfileRequest) -> Result<(), ApiError> {
        self.record("update_profile");
        self.write_guard("patient/UpdateProfile")
    }

    async fn patients_count(&self) -> Result<u64, ApiError> {
        self.record("patients_count");
        self.read_guard("patient/GetPatientsCount")?;
        Ok(0)
    }
}
