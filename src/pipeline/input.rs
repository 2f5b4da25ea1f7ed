//! Input enumeration: list the documents waiting in the input directory.
//!
//! The listing is taken once, at the start of a batch, and is not recursive:
//! only regular files directly inside the directory whose extension is in
//! the accepted set (case-insensitive) are returned. Names are sorted so two
//! runs over the same directory visit documents in the same order, which
//! keeps the `[i/N]` progress numbering stable across resumed runs.

use crate::error::Rx2JsonError;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Full path to the file.
    pub path: PathBuf,
    /// File name including extension, as written into the output record.
    pub filename: String,
    /// MIME type inferred from the extension.
    pub mime_type: String,
}

impl Document {
    /// Build a document for `path`, inferring its MIME type with
    /// [`document_mime_type`].
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = document_mime_type(&path);
        Self {
            path,
            filename,
            mime_type,
        }
    }

    /// `true` when the file has a `.pdf` extension (any case).
    pub fn is_pdf(&self) -> bool {
        extension_lower(&self.path).as_deref() == Some("pdf")
    }

    /// File name without its final extension; names the output file.
    pub fn base_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.filename.clone())
    }

    /// Path of the JSON output for this document inside `output_dir`.
    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.json", self.base_name()))
    }
}

/// List the accepted documents in `dir`, sorted by file name.
///
/// `extensions` are compared case-insensitively and may be given with or
/// without a leading dot.
pub fn list_documents(dir: &Path, extensions: &[String]) -> Result<Vec<Document>, Rx2JsonError> {
    let accepted: BTreeSet<String> = extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let entries = std::fs::read_dir(dir).map_err(|e| Rx2JsonError::InputDirUnreadable {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Rx2JsonError::InputDirUnreadable {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match extension_lower(&path) {
            Some(ext) if accepted.contains(&ext) => paths.push(path),
            _ => debug!("Ignoring {}", path.display()),
        }
    }

    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths.into_iter().map(Document::from_path).collect())
}

/// MIME type sent with a whole document.
///
/// Uses the extension registry first, then a small fixed table, and finally
/// `application/octet-stream`.
pub fn document_mime_type(path: &Path) -> String {
    if let Some(mime) = mime_guess::from_path(path).first() {
        return mime.essence_str().to_string();
    }
    match extension_lower(path).as_deref() {
        Some("pdf") => "application/pdf",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// MIME type sent with a single image file; unknown types are sent as JPEG.
pub fn image_mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "image/jpeg".to_string())
}

fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn exts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn lists_only_accepted_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.PDF", "a.jpg", "notes.txt", "c.Jpeg", "scan.heic"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested.pdf")).unwrap();
        fs::write(dir.path().join("nested.pdf").join("inner.pdf"), b"x").unwrap();

        let docs = list_documents(dir.path(), &exts(&["pdf", ".jpg", "JPEG"])).unwrap();
        let names: Vec<_> = docs.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.PDF", "c.Jpeg"]);
        assert!(docs[1].is_pdf());
        assert!(!docs[0].is_pdf());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = list_documents(&dir.path().join("nope"), &exts(&["pdf"])).unwrap_err();
        assert!(matches!(err, Rx2JsonError::InputDirUnreadable { .. }));
    }

    #[test]
    fn output_path_uses_base_name() {
        let doc = Document::from_path("/in/rx.2024.pdf");
        assert_eq!(doc.filename, "rx.2024.pdf");
        assert_eq!(doc.base_name(), "rx.2024");
        assert_eq!(
            doc.output_path(Path::new("/out")),
            PathBuf::from("/out/rx.2024.json")
        );
    }

    #[test]
    fn mime_types() {
        assert_eq!(document_mime_type(Path::new("a.pdf")), "application/pdf");
        assert_eq!(document_mime_type(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(document_mime_type(Path::new("a.png")), "image/png");
        assert_eq!(
            document_mime_type(Path::new("a.unknownext")),
            "application/octet-stream"
        );
        assert_eq!(image_mime_type(Path::new("a.png")), "image/png");
        assert_eq!(image_mime_type(Path::new("a.unknownext")), "image/jpeg");
    }
}
