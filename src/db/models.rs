use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct PacsStudy {
    pub id: i32,
    pub study_instance_uid: Option<String>,
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub patient_birth_date: Option<String>,
    pub patient_age: Option<String>,
    pub patient_sex: Option<String>,
    pub study_date: Option<String>,
    pub study_time: Option<String>,
    pub accession_number: Option<String>,
    pub study_description: Option<String>,
    pub referring_physician_name: Option<String>,
    pub performing_physician_name: Option<String>,
    pub institution_name: Option<String>,
    pub station_name: Option<String>,
    pub modality: Option<String>,
    pub number_of_study_related_series: Option<i16>,
    pub number_of_study_related_instances: Option<i16>,
    pub device_serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub manufacturer_model_name: Option<String>,
    pub source_ae_title: Option<String>,
    pub dir_path: Option<String>,
    pub started_at: Option<NaiveDateTime>,
    pub finished_at: Option<NaiveDateTime>,
    pub modified_at: Option<NaiveDateTime>,
    pub study_status: Option<i16>,
}

impl PacsStudy {
    /// Business key of the seed row.
    pub const SAMPLE_UID: &'static str = "1.2.3.4.5.1";

    /// The single seed row inserted into an empty table.
    pub fn sample() -> Self {
        let s = |v: &str| Some(v.to_string());
        Self {
            id: 0,
            study_instance_uid: s(Self::SAMPLE_UID),
            patient_id: s("PAT001"),
            patient_name: s("John Doe"),
            patient_birth_date: s("19800101"),
            patient_age: s("43"),
            patient_sex: s("M"),
            study_date: s("20231201"),
            study_time: s("093000"),
            accession_number: None,
            study_description: s("Chest CT"),
            referring_physician_name: s("Dr. Smith"),
            performing_physician_name: s("Dr. Johnson"),
            institution_name: s("General Hospital"),
            station_name: None,
            modality: s("CT"),
            number_of_study_related_series: Some(2),
            number_of_study_related_instances: Some(124),
            device_serial_number: None,
            manufacturer: None,
            manufacturer_model_name: None,
            source_ae_title: None,
            dir_path: None,
            started_at: None,
            finished_at: None,
            modified_at: None,
            study_status: Some(1),
        }
    }
}
