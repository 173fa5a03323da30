use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Body of the deactivate/restore calls. The server has accepted both casings
/// over time, so both are sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoctorIdRequest {
    #[serde(rename = "doctorId")]
    pub doctor_id: String,
    #[serde(rename = "DoctorId")]
    pub doctor_id_pascal: String,
}

impl DoctorIdRequest {
    pub fn new(doctor_id: impl Into<String>) -> Self {
        let doctor_id = doctor_id.into();
        Self {
            doctor_id_pascal: doctor_id.clone(),
            doctor_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDoctorRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub phone_number: String,
    pub years_of_experience: String,
    #[serde(rename = "specializationID")]
    pub specialization_id: i64,
}

/// One scheduled patient on the doctor dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledPatient {
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default, alias = "AppointmentDate", alias = "time")]
    pub appointment_date: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub blood_type: Option<String>,
    #[serde(default)]
    pub has_ai_report: bool,
    #[serde(default)]
    pub has_medication_warning: bool,
    #[serde(default)]
    pub chronic_diseases: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub current_medicine: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorOverview {
    #[serde(default)]
    pub doctor_name: Option<String>,
    #[serde(default)]
    pub patients: Vec<ScheduledPatient>,
}
