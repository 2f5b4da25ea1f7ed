//! Output records and the batch summary.
//!
//! One [`OutputRecord`] is written per input document, named after the
//! document's base name with a `.json` extension. The existence of that file
//! is the only state a batch keeps: a document whose output exists is
//! skipped, so an interrupted run resumes where it stopped.
//!
//! Two shapes exist, matching the two submission styles, and their key names
//! are relied on downstream:
//!
//! ```text
//! whole document:  {"filename", "mime_type", "content"}
//! per page:        {"filename", "pages": [{"page_number", "content"}, …]}
//! ```

use crate::error::Rx2JsonError;
use crate::pipeline::extract::Extraction;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};

/// The JSON artefact written for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputRecord {
    /// Whole-document submission: one extraction for the file.
    Document {
        filename: String,
        mime_type: String,
        content: Value,
    },
    /// Per-page submission: one extraction per page, in page order.
    Paged {
        filename: String,
        pages: Vec<PageOutput>,
    },
}

/// One page's extraction inside [`OutputRecord::Paged`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOutput {
    /// 1-based.
    pub page_number: usize,
    pub content: Value,
}

impl OutputRecord {
    pub fn document(filename: impl Into<String>, mime_type: impl Into<String>, content: Extraction) -> Self {
        OutputRecord::Document {
            filename: filename.into(),
            mime_type: mime_type.into(),
            content: content.into_value(),
        }
    }

    pub fn paged(filename: impl Into<String>, pages: Vec<(usize, Extraction)>) -> Self {
        OutputRecord::Paged {
            filename: filename.into(),
            pages: pages
                .into_iter()
                .map(|(page_number, content)| PageOutput {
                    page_number,
                    content: content.into_value(),
                })
                .collect(),
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            OutputRecord::Document { filename, .. } | OutputRecord::Paged { filename, .. } => filename,
        }
    }

    /// Pretty JSON: 2-space indent, non-ASCII characters written as-is.
    pub fn to_pretty_json(&self) -> Result<String, Rx2JsonError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Rx2JsonError::Internal(format!("serialising {}: {}", self.filename(), e)))
    }
}

/// `true` when `output_path` already exists and the document can be skipped.
pub fn is_processed(output_path: &Path) -> bool {
    output_path.exists()
}

/// Write `record` to `output_path` atomically.
///
/// The JSON goes to a temp file in the same directory which is then renamed
/// into place, so a crash mid-write never leaves a partial file that a later
/// run would treat as finished.
pub fn write_record(record: &OutputRecord, output_path: &Path) -> Result<(), Rx2JsonError> {
    let json = record.to_pretty_json()?;
    let dir = output_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let write_err = |e: std::io::Error| Rx2JsonError::OutputWriteFailed {
        path: output_path.to_path_buf(),
        source: e,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(json.as_bytes()).map_err(write_err)?;
    tmp.persist(output_path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Summary of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Documents listed in the input directory.
    pub total_documents: usize,
    /// Documents whose output was written by this run.
    pub processed: usize,
    /// Documents skipped because their output already existed.
    pub skipped: usize,
    /// Documents that could not be prepared (no output written).
    pub failed: usize,
    /// Requests that produced no text (transport/API failure or empty reply).
    pub no_response: usize,
    /// Replies kept as an error envelope.
    pub parse_failures: usize,
    /// Parsed replies that read as a [`Prescription`](crate::schema::Prescription).
    pub prescriptions: usize,
    /// Schema entries across those replies.
    pub prescription_entries: usize,
    /// Output files written, in processing order.
    pub written: Vec<PathBuf>,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

impl BatchReport {
    pub(crate) fn record_extraction(&mut self, extraction: &Extraction) {
        match extraction {
            Extraction::Empty => self.no_response += 1,
            Extraction::Failed { .. } => self.parse_failures += 1,
            Extraction::Parsed(_) => {
                if let Some(rx) = extraction.as_prescription() {
                    self.prescriptions += 1;
                    self.prescription_entries += rx.entry_count();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_record_shape() {
        let rec = OutputRecord::document(
            "rx1.jpg",
            "image/jpeg",
            Extraction::Parsed(json!({"medicines": []})),
        );
        assert_eq!(
            serde_json::to_value(&rec).unwrap(),
            json!({"filename": "rx1.jpg", "mime_type": "image/jpeg", "content": {"medicines": []}})
        );
    }

    #[test]
    fn paged_record_shape() {
        let rec = OutputRecord::paged(
            "rx2.pdf",
            vec![
                (1, Extraction::Parsed(json!({"a": 1}))),
                (2, Extraction::Failed { raw_content: "oops".into() }),
                (3, Extraction::Empty),
            ],
        );
        assert_eq!(
            serde_json::to_value(&rec).unwrap(),
            json!({
                "filename": "rx2.pdf",
                "pages": [
                    {"page_number": 1, "content": {"a": 1}},
                    {"page_number": 2, "content": {"error": "parsing_failed", "raw_content": "oops"}},
                    {"page_number": 3, "content": null}
                ]
            })
        );
    }

    #[test]
    fn pretty_json_keeps_non_ascii_and_indents_two_spaces() {
        let rec = OutputRecord::document(
            "ordonnance.pdf",
            "application/pdf",
            Extraction::Parsed(json!({"generalInfo": [{"label": "Médecin"}]})),
        );
        let text = rec.to_pretty_json().unwrap();
        assert!(text.contains("Médecin"));
        assert!(text.contains("\n  \"filename\": \"ordonnance.pdf\""));
        assert!(text.starts_with("{\n  \"filename\""));
    }

    #[test]
    fn records_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rx1.json");
        assert!(!is_processed(&path));

        let rec = OutputRecord::document("rx1.jpg", "image/jpeg", Extraction::Empty);
        write_record(&rec, &path).unwrap();
        assert!(is_processed(&path));

        let back: OutputRecord =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, rec);

        let paged = OutputRecord::paged("rx2.pdf", vec![(1, Extraction::Parsed(json!({"a": 1})))]);
        let paged_path = dir.path().join("rx2.json");
        write_record(&paged, &paged_path).unwrap();
        let back: OutputRecord =
            serde_json::from_str(&std::fs::read_to_string(&paged_path).unwrap()).unwrap();
        assert_eq!(back, paged);

        // no stray temp files left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("rx1.json");
        let rec = OutputRecord::document("rx1.jpg", "image/jpeg", Extraction::Empty);
        let err = write_record(&rec, &path).unwrap_err();
        assert!(matches!(err, Rx2JsonError::OutputWriteFailed { .. }));
    }

    #[test]
    fn report_counts_extraction_outcomes() {
        let mut report = BatchReport::default();
        report.record_extraction(&Extraction::Empty);
        report.record_extraction(&Extraction::Failed { raw_content: String::new() });
        report.record_extraction(&Extraction::Parsed(json!({})));
        report.record_extraction(&Extraction::Parsed(json!({
            "medicines": [{"slNo": 1}, {"slNo": 2}],
            "pathologicalTests": [{"slNo": "a"}]
        })));
        report.record_extraction(&Extraction::Parsed(json!({"text": "not a prescription"})));
        assert_eq!(report.no_response, 1);
        assert_eq!(report.parse_failures, 1);
        assert_eq!(report.prescriptions, 1);
        assert_eq!(report.prescription_entries, 3);
    }

    #[test]
    fn long_numbers_survive_a_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rx3.json");
        let content: Value =
            serde_json::from_str("{\"generalInfo\":[{\"readText\":{\"value\":98765432109876543210987}}]}")
                .unwrap();
        let rec = OutputRecord::paged("rx3.pdf", vec![(1, Extraction::Parsed(content))]);
        write_record(&rec, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"value\": 98765432109876543210987"), "{text}");
        let back: OutputRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, rec);
        match back {
            OutputRecord::Paged { pages, .. } => assert_eq!(pages[0].page_number, 1),
            other => panic!("expected a paged record, got {other:?}"),
        }
    }
}
