use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{errors::ApiError, service::PortalApi};
use crate::config::Config;
use crate::models::{
    appointment::{Appointment, BookAppointmentRequest, CancelAppointmentRequest},
    auth::{
        LoginRequest, RegisterAdminRequest, RegisterPatientRequest, ResetPasswordEmailRequest,
        ResetPasswordRequest,
    },
    doctor::{Doctor, DoctorIdRequest, DoctorOverview, RegisterDoctorRequest},
    profile::{CreateProfileRequest, PatientIdRequest, PatientProfile, UpdateProfileRequest},
};
use crate::responses::ApiEnvelope;
use crate::session::Session;

/// Count endpoints answer either `{ "count": n }` or a bare number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CountPayload {
    Wrapped { count: u64 },
    Bare(u64),
}

impl CountPayload {
    fn value(&self) -> u64 {
        match self {
            CountPayload::Wrapped { count } | CountPayload::Bare(count) => *count,
        }
    }
}

pub struct PortalClient {
    client: Client,
    config: Arc<Config>,
    session: Session,
}

impl PortalClient {
    pub fn new(client: Client, config: Arc<Config>, session: Session) -> Self {
        Self {
            client,
            config,
            session,
        }
    }

    fn public(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.config.endpoint(path))
            .header(ACCEPT, "*/*")
    }

    fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let token = self.session.get_token().ok_or(ApiError::MissingSession)?;
        Ok(self.public(method, path).bearer_auth(token))
    }

    async fn send(
        &self,
        endpoint: &'static str,
        req: RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        req.send().await.map_err(|source| {
            warn!(endpoint, error = %source, "Portal request failed");
            ApiError::Transport { endpoint, source }
        })
    }

    async fn envelope<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        req: RequestBuilder,
    ) -> Result<ApiEnvelope<T>, ApiError> {
        let res = self.send(endpoint, req).await?;
        let status = res.status();
        let body = res
            .bytes()
            .await
            .map_err(|source| ApiError::Transport { endpoint, source })?;

        match serde_json::from_slice::<ApiEnvelope<T>>(&body) {
            Ok(envelope) => {
                debug!(endpoint, status = status.as_u16(), succeeded = envelope.succeeded, "Portal response");
                Ok(envelope)
            }
            Err(err) if status.is_success() => Err(ApiError::Decode {
                endpoint,
                detail: err.to_string(),
            }),
            Err(_) => Err(ApiError::Status {
                endpoint,
                status: status.as_u16(),
            }),
        }
    }

    /// Payload of a `succeeded` envelope.
    async fn data<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        req: RequestBuilder,
    ) -> Result<T, ApiError> {
        let envelope = self.envelope::<T>(endpoint, req).await?;
        if !envelope.succeeded {
            return Err(ApiError::Rejected {
                endpoint,
                message: envelope.describe(),
            });
        }
        envelope.data.ok_or_else(|| ApiError::Decode {
            endpoint,
            detail: "envelope carried no data".to_string(),
        })
    }

    async fn succeeded(&self, endpoint: &'static str, req: RequestBuilder) -> Result<(), ApiError> {
        let envelope = self.envelope::<Value>(endpoint, req).await?;
        if envelope.succeeded {
            Ok(())
        } else {
            Err(ApiError::Rejected {
                endpoint,
                message: envelope.describe(),
            })
        }
    }

    /// For endpoints whose success is signalled by the HTTP status alone.
    async fn status_ok(&self, endpoint: &'static str, req: RequestBuilder) -> Result<(), ApiError> {
        let res = self.send(endpoint, req).await?;
        let status = res.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ApiError::Status {
                endpoint,
                status: status.as_u16(),
            })
        }
    }

    async fn count(&self, endpoint: &'static str, req: RequestBuilder) -> Result<u64, ApiError> {
        self.data::<CountPayload>(endpoint, req)
            .await
            .map(|payload| payload.value())
    }
}

#[async_trait]
impl PortalApi for PortalClient {
    async fn login(&self, req: &LoginRequest) -> Result<String, ApiError> {
        let endpoint = "authentication/Login";
        self.data(endpoint, self.public(Method::POST, endpoint).json(req))
            .await
    }

    async fn register_patient(
        &self,
        req: &RegisterPatientRequest,
    ) -> Result<Option<String>, ApiError> {
        let endpoint = "authentication/RegisterPatient";
        let envelope = self
            .envelope::<String>(endpoint, self.public(Method::POST, endpoint).json(req))
            .await?;
        if envelope.succeeded {
            Ok(envelope.data)
        } else {
            Err(ApiError::Rejected {
                endpoint,
                message: envelope.describe(),
            })
        }
    }

    async fn register_doctor(&self, req: &RegisterDoctorRequest) -> Result<(), ApiError> {
        let endpoint = "authentication/RegisterDoctor";
        self.succeeded(endpoint, self.authed(Method::POST, endpoint)?.json(req))
            .await
    }

    async fn register_admin(&self, req: &RegisterAdminRequest) -> Result<(), ApiError> {
        let endpoint = "authentication/RegisterAdmin";
        self.succeeded(endpoint, self.authed(Method::POST, endpoint)?.json(req))
            .await
    }

    async fn request_password_reset(
        &self,
        req: &ResetPasswordEmailRequest,
    ) -> Result<(), ApiError> {
        let endpoint = "authentication/ResetPasswordEmail";
        self.succeeded(endpoint, self.public(Method::POST, endpoint).json(req))
            .await
    }

    async fn reset_password(&self, req: &ResetPasswordRequest) -> Result<(), ApiError> {
        let endpoint = "authentication/ResetPassword";
        self.succeeded(endpoint, self.public(Method::POST, endpoint).json(req))
            .await
    }

    async fn confirm_email(&self, user_id: &str, token: &str) -> Result<(), ApiError> {
        let endpoint = "authentication/ConfirmEmail";
        let req = self
            .public(Method::GET, endpoint)
            .query(&[("UserId", user_id), ("Token", token)]);
        self.succeeded(endpoint, req).await
    }

    async fn patient_appointments(&self, patient_id: &str) -> Result<Vec<Appointment>, ApiError> {
        let endpoint = "appointment/GetPatientAppointments";
        let req = self
            .authed(Method::GET, endpoint)?
            .query(&[("PatientId", patient_id)]);
        self.data(endpoint, req).await
    }

    async fn cancel_appointment(&self, appointment_id: &str) -> Result<(), ApiError> {
        let endpoint = "appointment/Cancel";
        let body = CancelAppointmentRequest {
            appointment_id: appointment_id.to_string(),
        };
        self.status_ok(endpoint, self.authed(Method::PUT, endpoint)?.json(&body))
            .await
    }

    async fn bookable_doctors(&self) -> Result<Vec<Doctor>, ApiError> {
        let endpoint = "appointment/GetDoctors";
        self.data(endpoint, self.authed(Method::GET, endpoint)?).await
    }

    async fn book_appointment(&self, req: &BookAppointmentRequest) -> Result<(), ApiError> {
        let endpoint = "appointment/MakeAppointment";
        self.status_ok(endpoint, self.authed(Method::POST, endpoint)?.json(req))
            .await
    }

    async fn appointments_count(&self) -> Result<u64, ApiError> {
        let endpoint = "appointment/GetAppointmentsCount";
        self.count(endpoint, self.authed(Method::GET, endpoint)?).await
    }

    async fn today_appointments_count(&self) -> Result<u64, ApiError> {
        let endpoint = "appointment/GetTodayAppointmentsCount";
        self.count(endpoint, self.authed(Method::GET, endpoint)?).await
    }

    async fn doctors(&self, active_only: bool) -> Result<Vec<Doctor>, ApiError> {
        let endpoint = if active_only {
            "doctor/GetActive"
        } else {
            "doctor/GetAll"
        };
        let envelope = self
            .envelope::<Vec<Doctor>>(endpoint, self.authed(Method::GET, endpoint)?)
            .await?;
        if !envelope.succeeded {
            return Err(ApiError::Rejected {
                endpoint,
                message: envelope.describe(),
            });
        }
        Ok(envelope.data.unwrap_or_default())
    }

    async fn set_doctor_active(&self, doctor_id: &str, active: bool) -> Result<(), ApiError> {
        let endpoint = if active {
            "doctor/RestoreDoctor"
        } else {
            "doctor/DeleteDoctor"
        };
        let body = DoctorIdRequest::new(doctor_id);
        self.succeeded(endpoint, self.authed(Method::POST, endpoint)?.json(&body))
            .await
    }

    async fn doctor_overview(&self, doctor_id: &str) -> Result<DoctorOverview, ApiError> {
        let endpoint = "doctor/GetInfoAndAppointments";
        let req = self
            .authed(Method::GET, endpoint)?
            .query(&[("DoctorId", doctor_id)]);
        self.data(endpoint, req).await
    }

    async fn doctors_count(&self) -> Result<u64, ApiError> {
        let endpoint = "doctor/GetDoctorsCount";
        self.count(endpoint, self.authed(Method::GET, endpoint)?).await
    }

    async fn patient_profile(&self, patient_id: &str) -> Result<PatientProfile, ApiError> {
        let endpoint = "patient/GetProfile";
        let body = PatientIdRequest {
            patient_id: patient_id.to_string(),
        };
        self.data(endpoint, self.authed(Method::POST, endpoint)?.json(&body))
            .await
    }

    async fn create_profile(&self, req: &CreateProfileRequest) -> Result<(), ApiError> {
        let endpoint = "patient/CreateProfile";
        let res = self
            .send(endpoint, self.authed(Method::POST, endpoint)?.json(req))
            .await?;
        if res.status().is_success() {
            return Ok(());
        }
        let status = res.status().as_u16();
        let message = res
            .json::<ApiEnvelope<Value>>()
            .await
            .ok()
            .map(|envelope| envelope.describe())
            .filter(|m| !m.is_empty());
        match message {
            Some(message) => Err(ApiError::Rejected { endpoint, message }),
            None => Err(ApiError::Status { endpoint, status }),
        }
    }

    async fn update_profile(&self, req: &UpdateProfileRequest) -> Result<(), ApiError> {
        let endpoint = "patient/UpdateProfile";
        let res = self
            .send(endpoint, self.authed(Method::PUT, endpoint)?.json(req))
            .await?;
        if res.status().is_success() {
            return Ok(());
        }
        let status = res.status().as_u16();
        match res.json::<ApiEnvelope<Value>>().await {
            Ok(envelope) if envelope.succeeded => Ok(()),
            Ok(envelope) => Err(ApiError::Rejected {
                endpoint,
                message: envelope.describe(),
            }),
            Err(_) => Err(ApiError::Status { endpoint, status }),
        }
    }

    async fn patients_count(&self) -> Result<u64, ApiError> {
        let endpoint = "patient/GetPatientsCount";
        self.count(endpoint, self.public(Method::GET, endpoint)).await
    }
}
