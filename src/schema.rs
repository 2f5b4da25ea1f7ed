//! Typed view of the prescription schema the models are asked to fill.
//!
//! The pipeline itself writes whatever JSON the model produced, untouched, so
//! a slightly off-schema reply still reaches the output file. These types are
//! for callers that want to *read* results: [`Prescription`] deserialises
//! leniently (every field optional) and serialises every absent field as an
//! explicit `null`, never omitting a key.

use serde::{Deserialize, Serialize};

/// One prescription, as described by [`crate::prompts::PRESCRIPTION_SCHEMA`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub general_info: Option<Vec<GeneralInfo>>,
    pub medicines: Option<Vec<LineItem<MedicineText>>>,
    pub multivitamins: Option<Vec<LineItem<ScheduledMedicineText>>>,
    pub injections: Option<Vec<LineItem<ScheduledMedicineText>>>,
    pub radiological_tests: Option<Vec<LineItem<TestText>>>,
    pub pathological_tests: Option<Vec<LineItem<TestText>>>,
}

impl Prescription {
    /// Total number of entries across all six lists.
    pub fn entry_count(&self) -> usize {
        fn len<T>(v: &Option<Vec<T>>) -> usize {
            v.as_ref().map_or(0, Vec::len)
        }
        len(&self.general_info)
            + len(&self.medicines)
            + len(&self.multivitamins)
            + len(&self.injections)
            + len(&self.radiological_tests)
            + len(&self.pathological_tests)
    }
}

/// A labelled header field (patient name, date, doctor, …).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralInfo {
    pub label: Option<String>,
    pub read_text: Option<ValueText>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueText {
    pub value: Option<String>,
}

/// A numbered line on the prescription with its transcribed fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem<T> {
    pub sl_no: Option<LineNumber>,
    pub read_text: Option<T>,
}

/// Models usually emit the line number as an integer, occasionally as a
/// string ("1.", "i"). Both are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LineNumber {
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicineText {
    pub medicine: Option<String>,
    pub dosage: Option<String>,
    pub timing: Option<String>,
    pub duration: Option<String>,
}

/// Multivitamins and injections additionally carry a frequency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduledMedicineText {
    pub medicine: Option<String>,
    pub dosage: Option<String>,
    pub timing: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestText {
    pub test_name: Option<String>,
    pub additional_info: Option<String>,
}
