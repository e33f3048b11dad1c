//! Bounded fan-out verification of message identifiers, plus the chat-export
//! file handling built on top of it.

mod error;
pub use error::VerifyError;

mod export;
pub use export::{ChatExport, ExportMessage, cleaned_path, export_links, normalize_channel_id};

mod pool;
pub use pool::{Lookup, VerificationPool, VerifyProgress};
