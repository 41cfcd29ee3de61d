use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecipientsError {
    #[error("Failed to read recipient file {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse recipient file: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Destination addresses, in file order. Addresses are not validated here;
/// a bad one only fails its own send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RecipientList {
    pub recipients: Vec<String>,
}

impl RecipientList {
    pub async fn load(path: &Path) -> Result<Self, RecipientsError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| RecipientsError::ReadError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, RecipientsError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.recipients.iter()
    }
}
