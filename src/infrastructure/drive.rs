//! Google Drive v3 client used by the indexer to pull source files.
//!
//! Authorization is done out of band: a token file holding an access token,
//! a refresh token and the OAuth client credentials must already exist.
//! Expired access tokens are refreshed and written back to that file.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::domain::{
    ports::{DriveClient, DriveFile},
    DomainError,
};
use crate::infrastructure::config::DriveConfig;
use crate::infrastructure::resilience::RetryPolicy;

const PAGE_SIZE: &str = "100";
const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType)";

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("token file not found at {0}; authorize the application first")]
    TokenMissing(PathBuf),
    #[error("token file {path}: {message}")]
    Token { path: PathBuf, message: String },
    #[error("token refresh failed: {0}")]
    Refresh(String),
    #[error("drive request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("drive returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<DriveError> for DomainError {
    fn from(err: DriveError) -> Self {
        match &err {
            DriveError::TokenMissing(_) | DriveError::Token { .. } | DriveError::Io { .. } => {
                DomainError::internal(err.to_string())
            }
            DriveError::Status { status: 404, .. } => DomainError::not_found(err.to_string()),
            DriveError::Status { status: 401 | 403, .. } => DomainError::internal(err.to_string()),
            _ => DomainError::drive(err.to_string()),
        }
    }
}

/// Contents of the persisted token file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl StoredToken {
    /// Treats tokens within a minute of expiry as expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .map(|expiry| expiry - ChronoDuration::seconds(60) <= now)
            .unwrap_or(false)
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

pub struct TokenStore {
    path: PathBuf,
    token_url: String,
    http: reqwest::Client,
    token: Mutex<StoredToken>,
}

impl TokenStore {
    pub fn load(
        path: impl Into<PathBuf>,
        token_url: impl Into<String>,
        http: reqwest::Client,
    ) -> Result<Self, DriveError> {
        let path = path.into();
        if !path.exists() {
            return Err(DriveError::TokenMissing(path));
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| DriveError::Token {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let token: StoredToken = serde_json::from_str(&raw).map_err(|e| DriveError::Token {
            path: path.clone(),
            message: e.to_string(),
        })?;

        Ok(Self {
            path,
            token_url: token_url.into(),
            http,
            token: Mutex::new(token),
        })
    }

    /// A valid access token, refreshing and persisting it first if expired.
    pub async fn access_token(&self) -> Result<String, DriveError> {
        let mut token = self.token.lock().await;
        if token.is_expired(Utc::now()) {
            self.refresh(&mut token).await?;
        }
        Ok(token.access_token.clone())
    }

    async fn refresh(&self, token: &mut StoredToken) -> Result<(), DriveError> {
        let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
            token.refresh_token.clone(),
            token.client_id.clone(),
            token.client_secret.clone(),
        ) else {
            return Err(DriveError::Refresh(
                "token expired and no refresh credentials are stored".to_string(),
            ));
        };

        tracing::info!(path = %self.path.display(), "refreshing drive access token");
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Refresh(format!("{status}: {body}")));
        }

        let refreshed: RefreshResponse = response.json().await?;
        token.access_token = refreshed.access_token;
        token.expiry = refreshed
            .expires_in
            .map(|secs| Utc::now() + ChronoDuration::seconds(secs));
        if let Some(rotated) = refreshed.refresh_token {
            token.refresh_token = Some(rotated);
        }

        let raw = serde_json::to_string_pretty(&*token).map_err(|e| DriveError::Token {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|source| DriveError::Io {
                path: self.path.clone(),
                source,
            })?;
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

pub struct GoogleDriveClient {
    http: reqwest::Client,
    api_base: String,
    tokens: TokenStore,
    policy: RetryPolicy,
}

impl GoogleDriveClient {
    pub fn from_config(config: &DriveConfig, policy: RetryPolicy) -> Result<Self, DriveError> {
        let http = reqwest::Client::builder().timeout(policy.timeout).build()?;
        let tokens = TokenStore::load(&config.token_path, &config.token_url, http.clone())?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            tokens,
            policy,
        })
    }

    async fn list_page(
        &self,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<FileList, DriveError> {
        let token = self.tokens.access_token().await?;
        let mut params = vec![
            ("q", query),
            ("pageSize", PAGE_SIZE),
            ("fields", LIST_FIELDS),
        ];
        if let Some(page_token) = page_token {
            params.push(("pageToken", page_token));
        }

        let response = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&params)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn fetch(&self, file: &DriveFile) -> Result<Vec<u8>, DriveError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .get(format!("{}/files/{}", self.api_base, file.id))
            .bearer_auth(token)
            .query(&[("alt", "media")])
            .send()
            .await?;
        Ok(check_status(response).await?.bytes().await?.to_vec())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DriveError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DriveError::Status {
        status: status.as_u16(),
        body,
    })
}

/// The final path component of a Drive file name. Falls back to the file id
/// when nothing usable is left.
pub fn sanitize_file_name(file: &DriveFile) -> String {
    let name = file
        .name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match name {
        "" | "." | ".." => file.id.clone(),
        name => name.to_string(),
    }
}

#[async_trait]
impl DriveClient for GoogleDriveClient {
    async fn list_files(&self, folder_id: Option<&str>) -> Result<Vec<DriveFile>, DomainError> {
        let query = match folder_id {
            Some(id) => format!("'{}' in parents and trashed = false", id.replace('\'', "\\'")),
            None => "trashed = false".to_string(),
        };

        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let (q, token) = (query.as_str(), page_token.as_deref());
            let page = self
                .policy
                .run("drive.list", || async move {
                    self.list_page(q, token).await.map_err(DomainError::from)
                })
                .await?;
            files.extend(page.files);
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        tracing::info!(folder = ?folder_id, files = files.len(), "listed drive files");
        Ok(files)
    }

    async fn download(&self, file: &DriveFile, dest: &Path) -> Result<(), DomainError> {
        if file.is_native_google_type() {
            return Err(DomainError::validation(format!(
                "{} is a Google-native {} and has no binary content",
                file.name, file.mime_type
            )));
        }

        let bytes = self
            .policy
            .run("drive.download", || async move {
                self.fetch(file).await.map_err(DomainError::from)
            })
            .await?;

        let io_error = |source| {
            DomainError::from(DriveError::Io {
                path: dest.to_path_buf(),
                source,
            })
        };
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        tokio::fs::write(dest, &bytes).await.map_err(io_error)?;

        tracing::info!(
            file = %file.name,
            path = %dest.display(),
            bytes = bytes.len(),
            "downloaded"
        );
        Ok(())
    }
}

/// Local file names for `files`, in order. A name shared by several files
/// gets each file's Drive id appended to its stem.
pub fn local_file_names(files: &[&DriveFile]) -> Vec<String> {
    let names: Vec<String> = files.iter().map(|file| sanitize_file_name(file)).collect();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in &names {
        *counts.entry(name.as_str()).or_default() += 1;
    }

    names
        .iter()
        .zip(files)
        .map(|(name, file)| {
            if counts[name.as_str()] > 1 {
                with_id_suffix(name, &file.id)
            } else {
                name.clone()
            }
        })
        .collect()
}

fn with_id_suffix(name: &str, id: &str) -> String {
    let path = Path::new(name);
    match (
        path.file_stem().and_then(|s| s.to_str()),
        path.extension().and_then(|e| e.to_str()),
    ) {
        (Some(stem), Some(ext)) => format!("{stem}-{id}.{ext}"),
        _ => format!("{name}-{id}"),
    }
}

/// Downloads every downloadable file of `folder_id` into `dest_dir`.
/// Google-native documents and files that fail to download are skipped.
pub async fn sync_folder(
    client: &dyn DriveClient,
    folder_id: Option<&str>,
    dest_dir: &Path,
) -> Result<Vec<PathBuf>, DomainError> {
    let listed = client.list_files(folder_id).await?;
    let (native, files): (Vec<&DriveFile>, Vec<&DriveFile>) =
        listed.iter().partition(|file| file.is_native_google_type());
    for file in &native {
        tracing::info!(
            file = %file.name,
            mime_type = %file.mime_type,
            "skipping google-native file"
        );
    }

    let mut downloaded = Vec::new();
    for (file, name) in files.iter().zip(local_file_names(&files)) {
        let dest = dest_dir.join(name);
        match client.download(file, &dest).await {
            Ok(()) => downloaded.push(dest),
            Err(e) => tracing::warn!(file = %file.name, error = %e, "download failed, skipping"),
        }
    }

    tracing::info!(listed = listed.len(), downloaded = downloaded.len(), "drive sync finished");
    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path as UrlPath, Query},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use std::time::Duration;

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer fresh")
    }

    async fn list(
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> impl IntoResponse {
        if !authorized(&headers) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        assert_eq!(
            params.get("q").map(String::as_str),
            Some("'folder-1' in parents and trashed = false")
        );
        let body = match params.get("pageToken").map(String::as_str) {
            None => serde_json::json!({
                "nextPageToken": "page-2",
                "files": [
                    {"id": "f1", "name": "notes.txt", "mimeType": "text/plain"},
                    {
                        "id": "f2",
                        "name": "Roadmap",
                        "mimeType": "application/vnd.google-apps.document"
                    }
                ]
            }),
            Some("page-2") => serde_json::json!({
                "files": [
                    {"id": "f3", "name": "../evil/report.md", "mimeType": "text/markdown"},
                    {"id": "f4", "name": "notes.txt", "mimeType": "text/plain"}
                ]
            }),
            Some(_) => return StatusCode::BAD_REQUEST.into_response(),
        };
        Json(body).into_response()
    }

    async fn media(
        headers: HeaderMap,
        UrlPath(id): UrlPath<String>,
        Query(params): Query<HashMap<String, String>>,
    ) -> impl IntoResponse {
        if !authorized(&headers) || params.get("alt").map(String::as_str) != Some("media") {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        match id.as_str() {
            "f1" => "plain notes".into_response(),
            "f3" => "# Report".into_response(),
            "f4" => "other notes".into_response(),
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn token() -> Json<serde_json::Value> {
        Json(serde_json::json!({"access_token": "fresh", "expires_in": 3600}))
    }

    async fn fake_drive() -> String {
        let app = Router::new()
            .route("/files", get(list))
            .route("/files/{id}", get(media))
            .route("/token", post(token));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn write_token(dir: &Path, token: &StoredToken) -> PathBuf {
        let path = dir.join("token.json");
        std::fs::write(&path, serde_json::to_string(token).unwrap()).unwrap();
        path
    }

    fn expired_token() -> StoredToken {
        StoredToken {
            access_token: "stale".into(),
            refresh_token: Some("refresh".into()),
            expiry: Some(Utc::now() - ChronoDuration::hours(1)),
            client_id: Some("client".into()),
            client_secret: Some("secret".into()),
        }
    }

    fn client(base: &str, token_path: PathBuf) -> GoogleDriveClient {
        let config = DriveConfig {
            token_path,
            folder_id: None,
            api_base: base.to_string(),
            token_url: format!("{base}/token"),
        };
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
            timeout: Duration::from_secs(5),
        };
        GoogleDriveClient::from_config(&config, policy).unwrap()
    }

    #[test]
    fn test_sanitize_file_name() {
        let file = |name: &str| DriveFile {
            id: "id-1".into(),
            name: name.into(),
            mime_type: "text/plain".into(),
        };
        assert_eq!(sanitize_file_name(&file("a/b/c.txt")), "c.txt");
        assert_eq!(sanitize_file_name(&file("..\\x.pdf")), "x.pdf");
        assert_eq!(sanitize_file_name(&file("..")), "id-1");
        assert_eq!(sanitize_file_name(&file("dir/")), "id-1");
    }

    #[test]
    fn test_local_file_names_disambiguate_duplicates() {
        let file = |id: &str, name: &str| DriveFile {
            id: id.into(),
            name: name.into(),
            mime_type: "text/plain".into(),
        };
        let files = [
            file("a", "Report.pdf"),
            file("b", "minutes"),
            file("c", "dir/Report.pdf"),
            file("d", "minutes"),
            file("e", "unique.md"),
        ];
        let refs: Vec<&DriveFile> = files.iter().collect();

        assert_eq!(
            local_file_names(&refs),
            vec!["Report-a.pdf", "minutes-b", "Report-c.pdf", "minutes-d", "unique.md"]
        );
    }

    #[test]
    fn test_missing_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let result =
            TokenStore::load(dir.path().join("none.json"), "http://x", reqwest::Client::new());
        assert!(matches!(result, Err(DriveError::TokenMissing(_))));
    }

    #[tokio::test]
    async fn test_sync_folder_pages_refreshes_and_skips_native() {
        let base = fake_drive().await;
        let dir = tempfile::tempdir().unwrap();
        let token_path = write_token(dir.path(), &expired_token());
        let drive = client(&base, token_path.clone());
        let dest = dir.path().join("downloads");

        let mut paths = sync_folder(&drive, Some("folder-1"), &dest).await.unwrap();
        paths.sort();

        assert_eq!(
            paths,
            vec![dest.join("notes-f1.txt"), dest.join("notes-f4.txt"), dest.join("report.md")]
        );
        assert_eq!(std::fs::read_to_string(dest.join("notes-f1.txt")).unwrap(), "plain notes");
        assert_eq!(std::fs::read_to_string(dest.join("notes-f4.txt")).unwrap(), "other notes");
        assert!(!dest.join("Roadmap").exists());

        let persisted: StoredToken =
            serde_json::from_str(&std::fs::read_to_string(token_path).unwrap()).unwrap();
        assert_eq!(persisted.access_token, "fresh");
        assert!(!persisted.is_expired(Utc::now()));
        assert_eq!(persisted.refresh_token.as_deref(), Some("refresh"));
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh_credentials() {
        let base = fake_drive().await;
        let dir = tempfile::tempdir().unwrap();
        let token = StoredToken {
            refresh_token: None,
            ..expired_token()
        };
        let drive = client(&base, write_token(dir.path(), &token));

        let err = drive.list_files(Some("folder-1")).await.unwrap_err();
        assert!(matches!(err, DomainError::Drive(_)));
    }
}
