//! Instruction prompts sent alongside each document or page.
//!
//! Both backends ask for the same prescription schema, but the wording differs
//! with the submission style: the cloud model sees the whole document at once
//! and is asked to merge every page into one object, while the local model
//! sees a single page image and is told to wrap its answer in a fenced JSON
//! block (which [`crate::pipeline::extract`] looks for first).
//!
//! Callers can override either prompt via
//! [`crate::config::BatchConfig::system_prompt`].

/// Expands to the schema description shared by both prompts.
macro_rules! prescription_schema {
    () => {
        r#"{
  "generalInfo": [{"label": "string", "readText": {"value": "string"}}],
  "medicines": [{"slNo": int, "readText": {"medicine": "string", "dosage": "string", "timing": "string", "duration": "string"}}],
  "multivitamins": [{"slNo": int, "readText": {"medicine": "string", "dosage": "string", "timing": "string", "frequency": "string", "duration": "string"}}],
  "injections": [{"slNo": int, "readText": {"medicine": "string", "dosage": "string", "timing": "string", "frequency": "string", "duration": "string"}}],
  "radiologicalTests": [{"slNo": int, "readText": {"testName": "string", "additionalInfo": "string"}}],
  "pathologicalTests": [{"slNo": int, "readText": {"testName": "string", "additionalInfo": "string"}}]
}"#
    };
}

/// The JSON schema the model is asked to fill, as shown in the prompts.
pub const PRESCRIPTION_SCHEMA: &str = prescription_schema!();

/// Opening marker of the fenced block the per-page prompt asks for.
pub const JSON_BLOCK_START: &str = "```json";

/// Closing marker of a fenced block.
pub const JSON_BLOCK_END: &str = "```";

/// Prompt for whole-document submission (cloud backend).
pub const DOCUMENT_PROMPT: &str = concat!(
    r#"
You are an advanced medical OCR assistant.
Analyze the ENTIRE document provided and return a JSON object strictly following this schema.

Schema Rules:
1. Categorize items correctly (e.g., Iron/Calcium go to 'multivitamins').
2. Return NULL for a key if NOT PRESENT.
3. If the document has multiple pages, extract data from ALL pages into the lists below.

Output Schema:
"#,
    prescription_schema!(),
    "\n"
);

/// Prompt for per-page submission (local vision server).
pub const PAGE_PROMPT: &str = concat!(
    r#"
You are an advanced medical OCR assistant.
Analyze the image and return a JSON object strictly following this schema.
Wrap your response in a markdown code block like this:
```json
{
  ... your json here ...
}
```

Schema:
"#,
    prescription_schema!(),
    r#"
Categorize items correctly (e.g., Iron/Calcium go to 'multivitamins', 'X-Ray' goes to 'radiologicalTests'). Return NULL for a key if NOT PRESENT.
Return ONLY JSON.
"#
);

/// Plain transcription prompt used by the `rx2json-probe` smoke test.
pub const PROBE_PROMPT: &str = "Convert this image to markdown.";
