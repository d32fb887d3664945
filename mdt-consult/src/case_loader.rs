//! Normalizes raw case records into [`Case`].
//!
//! Case files are flat JSON objects. Every field is optional; missing fields become
//! empty strings, which in turn disable the matching specialist. Scalars that are not
//! strings (a numeric age, say) are kept as their JSON text.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::Path;

use crate::error::{ConsultError, Result};
use crate::models::{Case, ClinicalRecord, GroundTruth, PatientInfo};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCaseRecord {
    #[serde(rename = "Age", deserialize_with = "lenient_text")]
    age: String,
    #[serde(rename = "Sex", deserialize_with = "lenient_text")]
    sex: String,
    #[serde(rename = "Chief-Complaints", deserialize_with = "lenient_text")]
    chief_complaints: String,
    #[serde(rename = "Present-Illness", deserialize_with = "lenient_text")]
    present_illness: String,
    #[serde(rename = "Physical-Examination", deserialize_with = "lenient_text")]
    physical_examination: String,
    #[serde(rename = "Laboratory-Examination", deserialize_with = "lenient_text")]
    laboratory_examination: String,
    #[serde(rename = "X光影像检查", deserialize_with = "lenient_text")]
    xray: String,
    #[serde(rename = "CT影像检查", deserialize_with = "lenient_text")]
    ct: String,
    #[serde(rename = "磁共振影像检查", deserialize_with = "lenient_text")]
    mri: String,
    #[serde(rename = "超声影像检查", deserialize_with = "lenient_text")]
    ultrasound: String,
    #[serde(rename = "病理检查", deserialize_with = "lenient_text")]
    pathology: String,
    #[serde(deserialize_with = "lenient_text")]
    options: String,
    #[serde(rename = "Diagnosis", deserialize_with = "lenient_text")]
    diagnosis: String,
    #[serde(deserialize_with = "lenient_text")]
    label: String,
}

fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        structured => serde_json::to_string_pretty(&structured).unwrap_or_default(),
    })
}

impl RawCaseRecord {
    fn into_case(self, id: String) -> Case {
        let imaging_results = [self.xray, self.ct, self.mri, self.ultrasound]
            .join("\n")
            .trim()
            .to_string();

        Case {
            id,
            clinical: ClinicalRecord {
                patient_info: PatientInfo {
                    age: self.age,
                    sex: self.sex,
                    chief_complaints: self.chief_complaints,
                    present_illness: self.present_illness,
                    physical_examination: self.physical_examination,
                },
                lab_results: self.laboratory_examination,
                imaging_results,
                pathology_results: self.pathology,
            },
            ground_truth: GroundTruth {
                diagnosis: self.diagnosis,
                options: self.options,
                label: self.label,
            },
        }
    }
}

/// Identity of a case: its file name.
pub fn case_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Parse one raw case record.
pub fn parse_case(id: impl Into<String>, raw: &str) -> serde_json::Result<Case> {
    let record: RawCaseRecord = serde_json::from_str(raw)?;
    Ok(record.into_case(id.into()))
}

/// Read and normalize a case file.
pub async fn load_case(path: &Path) -> Result<Case> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConsultError::CaseIo {
            path: path.to_path_buf(),
            source,
        })?;

    parse_case(case_name(path), &raw).map_err(|source| ConsultError::MalformedCase {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Specialty;

    #[test]
    fn imaging_sub_fields_are_joined_and_trimmed() {
        let case = parse_case(
            "c1.json",
            r#"{"CT影像检查": "nodule in right lobe", "超声影像检查": "normal liver"}"#,
        )
        .unwrap();

        assert_eq!(
            case.clinical.imaging_results,
            "nodule in right lobe\n\nnormal liver"
        );
        assert_eq!(case.eligible_specialties(), vec![Specialty::Imaging]);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let case = parse_case("empty.json", "{}").unwrap();

        assert_eq!(case.id, "empty.json");
        assert_eq!(case.clinical.imaging_results, "");
        assert!(case.eligible_specialties().is_empty());
    }

    #[test]
    fn non_string_fields_are_rendered_as_text() {
        let case = parse_case(
            "c2.json",
            r#"{"Age": 54, "Sex": null, "options": {"A": "Pneumonia", "B": "Tuberculosis"}, "label": "B"}"#,
        )
        .unwrap();

        assert_eq!(case.clinical.patient_info.age, "54");
        assert_eq!(case.clinical.patient_info.sex, "");
        assert!(case.ground_truth.options.contains("\"B\": \"Tuberculosis\""));
        assert_eq!(case.ground_truth.label, "B");
    }

    #[test]
    fn ground_truth_is_kept_out_of_the_clinical_record() {
        let case = parse_case(
            "c3.json",
            r#"{"Laboratory-Examination": "WBC 15.2", "Diagnosis": "Sepsis"}"#,
        )
        .unwrap();

        let clinical = serde_json::to_string(&case.clinical).unwrap();
        assert!(!clinical.contains("Sepsis"));
        assert_eq!(case.ground_truth.diagnosis, "Sepsis");
    }

    #[tokio::test]
    async fn unreadable_and_malformed_files_are_distinguished() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();

        assert!(matches!(
            load_case(&missing).await,
            Err(ConsultError::CaseIo { .. })
        ));
        assert!(matches!(
            load_case(&broken).await,
            Err(ConsultError::MalformedCase { .. })
        ));
    }
}
