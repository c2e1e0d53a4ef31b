//! collect — admit raw files into the matter's document manifest.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::StageError;
use crate::stages::keys::{
    CASE_ID, DOCUMENT_MANIFEST, DUPLICATES, FILES, METADATA, SOURCE_TYPE, key_names,
};
use crate::stages::model::{ChatMessage, DocumentEntry, DuplicateFile, EmailMeta, InputFile};
use crate::stages::{Output, StageDeps};
use crate::text::{cached_regex, Lang};
use crate::workflow::{Stage, StageEnvelope, WorkflowState};

pub const SOURCE_TYPES: &[&str] = &["gmail", "outlook", "upload", "whatsapp_export", "dms"];

const OCR_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/tiff",
];

pub struct CollectStage {
    deps: StageDeps,
}

impl CollectStage {
    pub const ID: &'static str = "collect";

    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Stage for CollectStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn required_keys(&self) -> &[&'static str] {
        key_names!(FILES, SOURCE_TYPE, CASE_ID)
    }

    fn guaranteed_keys(&self) -> &[&'static str] {
        key_names!(DOCUMENT_MANIFEST, DUPLICATES)
    }

    async fn process(&self, inputs: &WorkflowState) -> Result<StageEnvelope, StageError> {
        let files = inputs.read(&FILES)?;
        let source_type = inputs.read(&SOURCE_TYPE)?;
        let case_id = inputs.read(&CASE_ID)?;
        let metadata = inputs.read_or_default(&METADATA)?;

        if !SOURCE_TYPES.contains(&source_type.as_str()) {
            return Err(StageError::InvalidInput {
                key: "sourceType".to_string(),
                message: format!(
                    "unsupported source '{}' (expected one of: {})",
                    source_type,
                    SOURCE_TYPES.join(", ")
                ),
            });
        }

        let received_at = Utc::now();
        let mut manifest: Vec<DocumentEntry> = Vec::with_capacity(files.len());
        let mut duplicates = Vec::new();
        let mut seen: HashMap<String, String> = HashMap::new();

        for file in &files {
            let bytes = file.bytes()?;
            let sha256 = hex::encode(Sha256::digest(&bytes));

            if let Some(first) = seen.get(&sha256) {
                tracing::info!("[Intake] {} duplicates {}", file.filename, first);
                duplicates.push(DuplicateFile {
                    filename: file.filename.clone(),
                    duplicate_of: first.clone(),
                });
                continue;
            }

            let doc_id = format!("DOC-{}-{}", received_at.format("%Y%m%d"), &sha256[..8]);
            seen.insert(sha256.clone(), doc_id.clone());

            let ocr_needed = OCR_MIME_TYPES.contains(&file.mime_type.to_ascii_lowercase().as_str());
            let messages = if source_type == "whatsapp_export" && file.is_plain_text() {
                parse_whatsapp(&String::from_utf8_lossy(&bytes))
            } else {
                Vec::new()
            };

            manifest.push(DocumentEntry {
                doc_id,
                filename: file.filename.clone(),
                mime_type: file.mime_type.clone(),
                size_bytes: bytes.len(),
                sha256,
                source_type: source_type.clone(),
                received_at: received_at.to_rfc3339(),
                ocr_needed,
                language_hint: language_hint(file, &metadata),
                email: email_meta(&source_type, &metadata),
                messages,
                confidence: if ocr_needed { 0.86 } else { 0.95 },
            });
        }

        tracing::info!(
            "[Intake] case {}: {} document(s) collected from {}, {} duplicate(s)",
            case_id,
            manifest.len(),
            source_type,
            duplicates.len()
        );

        let data = Output::new()
            .put(&DOCUMENT_MANIFEST, &manifest)?
            .put(&DUPLICATES, &duplicates)?
            .into_map();
        Ok(self.envelope(data, Some(0.95), &self.deps.gate))
    }
}

fn language_hint(file: &InputFile, metadata: &Map<String, Value>) -> Option<Lang> {
    let name = file.filename.to_lowercase();
    if name.contains("malay") || name.contains("bahasa") || name.starts_with("ms_") {
        return Some(Lang::Ms);
    }
    if name.contains("english") || name.starts_with("en_") {
        return Some(Lang::En);
    }
    match metadata.get("language").and_then(Value::as_str) {
        Some("ms") => Some(Lang::Ms),
        Some("en") => Some(Lang::En),
        _ => None,
    }
}

fn email_meta(source_type: &str, metadata: &Map<String, Value>) -> Option<EmailMeta> {
    if source_type != "gmail" && source_type != "outlook" {
        return None;
    }
    let text = |key: &str| metadata.get(key).and_then(Value::as_str).map(str::to_string);
    let recipients = match metadata.get("recipients") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    Some(EmailMeta {
        sender: text("sender"),
        subject: text("subject"),
        recipients,
    })
}

/// Parse a WhatsApp chat export (`[12/03/2024, 10:15:02] Ali: text`).
/// Lines that do not start a message continue the previous one.
pub fn parse_whatsapp(export: &str) -> Vec<ChatMessage> {
    let Some(re) = cached_regex!(r"^\[([^\]]+)\]\s*([^:]+):\s*(.*)$") else {
        return Vec::new();
    };
    let mut messages: Vec<ChatMessage> = Vec::new();
    for line in export.lines() {
        let line = line.trim_start_matches('\u{200e}').trim_end();
        if let Some(caps) = re.captures(line) {
            messages.push(ChatMessage {
                timestamp: caps[1].trim().to_string(),
                sender: caps[2].trim().to_string(),
                text: caps[3].to_string(),
            });
        } else if let Some(last) = messages.last_mut() {
            if !line.is_empty() {
                last.text.push('\n');
                last.text.push_str(line);
            }
        }
    }
    messages
}
