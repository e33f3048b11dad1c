use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::VerifyError;

const MESSAGE_KIND: &str = "message";
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// One entry of an exported chat history.
///
/// Only `id` and `type` are interpreted; every other field is carried through
/// untouched so a cleaned export keeps the original content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMessage {
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExportMessage {
    pub fn is_message(&self) -> bool {
        self.kind == MESSAGE_KIND && self.id > 0
    }
}

/// Chat history export: `{"id": <chat>, "messages": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatExport {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub messages: Vec<ExportMessage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatExport {
    pub fn parse(raw: &str) -> Result<Self, VerifyError> {
        let export: Self = serde_json::from_str(raw)?;
        if export.id == 0 {
            return Err(VerifyError::MissingChatId);
        }
        Ok(export)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, VerifyError> {
        let raw = fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Ids of real messages (service entries and non-positive ids skipped), in export order.
    pub fn message_ids(&self) -> Vec<i64> {
        self.messages
            .iter()
            .filter(|m| m.is_message())
            .map(|m| m.id)
            .collect()
    }

    /// Copy of the export with every entry whose id is in `invalid` removed.
    pub fn without_ids(&self, invalid: &[i64]) -> Self {
        let drop: HashSet<i64> = invalid.iter().copied().collect();
        Self {
            id: self.id,
            messages: self
                .messages
                .iter()
                .filter(|m| !drop.contains(&m.id))
                .cloned()
                .collect(),
            extra: self.extra.clone(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, VerifyError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), VerifyError> {
        let path = path.as_ref();
        fs::write(path, self.to_json_pretty()?)?;
        info!(target: "courier.verify.export", path = %path.display(), messages = self.messages.len(), "export saved");
        Ok(())
    }

    /// `https://t.me/c/<chat>/<msg>` link for every entry.
    pub fn links(&self) -> Vec<String> {
        let chat = normalize_channel_id(self.id);
        self.messages
            .iter()
            .map(|m| format!("https://t.me/c/{chat}/{}", m.id))
            .collect()
    }
}

/// Free-function form of [`ChatExport::links`].
pub fn export_links(export: &ChatExport) -> Vec<String> {
    export.links()
}

/// Strip the `-100` prefix of a channel id as used in private links.
pub fn normalize_channel_id(id: i64) -> i64 {
    if id >= 0 {
        return id;
    }
    match id.checked_neg() {
        Some(abs) => abs - CHANNEL_ID_OFFSET,
        // |i64::MIN| is i64::MAX + 1
        None => i64::MAX - CHANNEL_ID_OFFSET + 1,
    }
}

/// `dir/export.json` -> `dir/export_cleaned.json`.
pub fn cleaned_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_cleaned.{}", ext.to_string_lossy()),
        None => format!("{stem}_cleaned.json"),
    };
    path.with_file_name(name)
}
