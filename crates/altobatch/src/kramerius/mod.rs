pub mod client;

pub use client::KrameriusClient;

use serde::{Deserialize, Serialize};

use crate::error::KrameriusError;
use crate::pid::Pid;

/// Metadata of one object in a Kramerius repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub pid: Pid,
    /// Repository model name, e.g. "page" or "periodical".
    pub model: String,
    pub title: Option<String>,
}

impl ObjectMetadata {
    /// Pages are the leaves that carry ALTO/OCR content.
    pub fn is_page(&self) -> bool {
        self.model == "page" || self.model == "model:page"
    }
}

/// Content and metadata gateway consulted by a running batch process.
///
/// All lookups are keyed by PID plus the name of the Kramerius instance the
/// object lives in.
pub trait KrameriusGateway: Send + Sync {
    /// Returns the object's metadata, or `None` if the repository does not
    /// know the PID.
    fn object_metadata(
        &self,
        pid: &Pid,
        instance: &str,
    ) -> Result<Option<ObjectMetadata>, KrameriusError>;

    fn children_metadata(
        &self,
        pid: &Pid,
        instance: &str,
    ) -> Result<Vec<ObjectMetadata>, KrameriusError>;

    /// Fetches the ALTO markup of a page.
    fn alto(&self, pid: &Pid, instance: &str) -> Result<Vec<u8>, KrameriusError>;

    /// Fetches the plain OCR text of a page.
    fn ocr_text(&self, pid: &Pid, instance: &str) -> Result<String, KrameriusError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_is_page_accepts_both_model_forms() {
        let pid = Pid::from_str("uuid:e80e0e40-f251-11e3-b72e-005056827e52").unwrap();
        let page = ObjectMetadata {
            pid,
            model: "page".to_string(),
            title: None,
        };
        let prefixed = ObjectMetadata {
            pid,
            model: "model:page".to_string(),
            title: None,
        };
        let periodical = ObjectMetadata {
            pid,
            model: "periodical".to_string(),
            title: Some("Lidové noviny".to_string()),
        };

        assert!(page.is_page());
        assert!(prefixed.is_page());
        assert!(!periodical.is_page());
    }
}
