use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
}

impl DriveFile {
    /// Google-native documents have no binary content to download.
    pub fn is_native_google_type(&self) -> bool {
        self.mime_type.starts_with("application/vnd.google-apps.")
    }
}

#[async_trait]
pub trait DriveClient: Send + Sync {
    async fn list_files(&self, folder_id: Option<&str>) -> Result<Vec<DriveFile>, DomainError>;
    /// Writes the file's content to `dest`, creating its parent directory.
    async fn download(&self, file: &DriveFile, dest: &Path) -> Result<(), DomainError>;
}
