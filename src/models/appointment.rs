use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

const LOCAL_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub appointment_id: String,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub doctor_name: Option<String>,
    /// ISO-8601 local or UTC timestamp as sent by the server.
    pub date: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

/// Booking body. Patients book for themselves by id; the admin desk books
/// walk-ins by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookAppointmentRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    pub doctor_id: String,
    /// Local wall-clock time, `YYYY-MM-DDTHH:MM:SS`, no offset.
    pub date: String,
    pub reason: String,
    pub status: AppointmentStatus,
}

impl BookAppointmentRequest {
    pub fn for_patient(
        patient_id: impl Into<String>,
        doctor_id: impl Into<String>,
        at: NaiveDateTime,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            patient_id: Some(patient_id.into()),
            patient_name: None,
            doctor_id: doctor_id.into(),
            date: at.format(LOCAL_DATE_FORMAT).to_string(),
            reason: reason.into(),
            status: AppointmentStatus::Pending,
        }
    }

    pub fn for_walk_in(
        patient_name: impl Into<String>,
        doctor_id: impl Into<String>,
        at: NaiveDateTime,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            patient_id: None,
            patient_name: Some(patient_name.into()),
            ..Self::for_patient(String::new(), doctor_id, at, reason)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAppointmentRequest {
    pub appointment_id: String,
}
