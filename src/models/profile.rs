use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PatientProfile {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub chronic_diseases: Vec<String>,
    #[serde(default)]
    pub current_medication: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientIdRequest {
    pub patient_id: String,
}

/// Medical history submitted once after registration. Empty lists are left
/// out of the body entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfileRequest {
    pub patient_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub chronic_diseases: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub current_medication: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allergies: Vec<String>,
}

impl CreateProfileRequest {
    /// Trims entries and drops blanks.
    pub fn new(
        patient_id: impl Into<String>,
        chronic_diseases: &[String],
        current_medication: &[String],
        allergies: &[String],
    ) -> Self {
        fn clean(items: &[String]) -> Vec<String> {
            items
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        }
        Self {
            patient_id: patient_id.into(),
            chronic_diseases: clean(chronic_diseases),
            current_medication: clean(current_medication),
            allergies: clean(allergies),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub gender: String,
    /// `YYYY-MM-DD`
    pub date_of_birth: String,
}

impl UpdateProfileRequest {
    /// Prefills the edit form from the stored profile.
    pub fn from_profile(id: impl Into<String>, profile: &PatientProfile) -> Self {
        Self {
            id: id.into(),
            full_name: profile.full_name.clone().unwrap_or_default(),
            email: profile.email.clone().unwrap_or_default(),
            phone_number: profile.phone_number.clone().unwrap_or_default(),
            gender: profile.gender.clone().unwrap_or_default(),
            date_of_birth: profile
                .date_of_birth
                .as_deref()
                .map(|dob| dob.split('T').next().unwrap_or(dob).to_string())
                .unwrap_or_default(),
        }
    }
}
