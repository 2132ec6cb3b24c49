//! Minimal model hub client: list a repository's files and stream each one
//! into the store.

use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use super::part_file::PartFile;
use crate::error::{PanelError, PanelResult};
use crate::model_store::is_valid_segment;

/// A normalized `owner/name` hub identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubModelId {
    owner: String,
    name: String,
}

impl HubModelId {
    /// Bare names are placed under `default_namespace`.
    pub fn parse(raw: &str, default_namespace: &str) -> PanelResult<Self> {
        let raw = raw.trim();
        let invalid = || PanelError::InvalidModelId(raw.to_string());

        let (owner, name) = match raw.split_once('/') {
            Some((owner, name)) => (owner, name),
            None => (default_namespace, raw),
        };
        if name.contains('/') || !is_valid_segment(owner) || !is_valid_segment(name) {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    /// Last path segment, used as the store directory name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn repo(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for HubModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    #[serde(default)]
    siblings: Vec<Sibling>,
}

#[derive(Debug, Deserialize)]
struct Sibling {
    rfilename: String,
}

#[derive(Clone)]
pub struct HubClient {
    http: Client,
    endpoint: String,
    token: Option<String>,
}

impl HubClient {
    pub fn new(endpoint: &str, token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.http.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Relative paths of every file in the repository, sorted.
    pub async fn list_files(&self, id: &HubModelId) -> PanelResult<Vec<String>> {
        let url = format!("{}/api/models/{}", self.endpoint, id.repo());
        debug!("Listing hub files: {}", url);

        let response = self.get(&url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(PanelError::Acquisition(format!(
                    "Repository {} not found on the hub",
                    id
                )))
            }
            status if !status.is_success() => {
                return Err(PanelError::Acquisition(format!(
                    "Hub returned {} while listing {}",
                    status, id
                )))
            }
            _ => {}
        }

        let info: RepoInfo = response.json().await?;
        let mut files: Vec<String> = info
            .siblings
            .into_iter()
            .map(|s| s.rfilename)
            .filter(|f| is_safe_relative(f))
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(PanelError::Acquisition(format!(
                "Repository {} has no files",
                id
            )));
        }
        Ok(files)
    }

    /// Stream one file to `dest` through a `.part` file. `on_progress` gets
    /// the bytes received so far and the announced length, if any.
    /// Returns the number of bytes written; zero when `dest` already existed.
    pub async fn download_file(
        &self,
        id: &HubModelId,
        file: &str,
        dest: &Path,
        mut on_progress: impl FnMut(u64, Option<u64>),
    ) -> PanelResult<u64> {
        if dest.exists() {
            debug!("Skipping {}, already present", dest.display());
            return Ok(0);
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let url = format!("{}/{}/resolve/main/{}", self.endpoint, id.repo(), file);
        let response = self.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(PanelError::Acquisition(format!(
                "Hub returned {} for {}",
                response.status(),
                file
            )));
        }

        let total = response.content_length();
        let mut part = PartFile::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            part.write(&chunk?).await?;
            on_progress(part.written(), total);
        }

        if let Some(expected) = total {
            if part.written() != expected {
                return Err(PanelError::Acquisition(format!(
                    "Download size mismatch for {}: expected {} bytes, got {}",
                    file,
                    expected,
                    part.written()
                )));
            }
        }

        let written = part.persist(dest).await?;
        info!("Downloaded {} ({} bytes)", file, written);
        Ok(written)
    }
}

/// Rejects absolute paths and parent-directory components in hub file names.
fn is_safe_relative(file: &str) -> bool {
    !file.is_empty()
        && !file.starts_with('/')
        && !file.contains('\\')
        && file.split('/').all(|part| !part.is_empty() && part != "." && part != "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_name_gets_default_namespace() {
        let id = HubModelId::parse("bitnet-b1.58-2B-4T", "microsoft").unwrap();
        assert_eq!(id.repo(), "microsoft/bitnet-b1.58-2B-4T");
        assert_eq!(id.name(), "bitnet-b1.58-2B-4T");
    }

    #[test]
    fn test_owner_is_kept() {
        let id = HubModelId::parse(" 1bitLLM/bitnet_b1_58-large ", "microsoft").unwrap();
        assert_eq!(id.to_string(), "1bitLLM/bitnet_b1_58-large");
        assert_eq!(id.name(), "bitnet_b1_58-large");
    }

    #[test]
    fn test_invalid_identifiers() {
        for raw in ["", "a/b/c", "../etc", "owner/..", "/name", "owner/", "has space"] {
            assert!(
                matches!(HubModelId::parse(raw, "microsoft"), Err(PanelError::InvalidModelId(_))),
                "accepted {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_safe_relative_paths() {
        assert!(is_safe_relative("config.json"));
        assert!(is_safe_relative("onnx/model.onnx"));
        assert!(!is_safe_relative("../x"));
        assert!(!is_safe_relative("/abs"));
        assert!(!is_safe_relative("a//b"));
    }

    #[tokio::test]
    async fn test_list_files_reads_siblings() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/models/example/model-a")
            .with_header("content-type", "application/json")
            .with_body(r#"{"siblings":[{"rfilename":"model.gguf"},{"rfilename":"README.md"},{"rfilename":"../evil"}]}"#)
            .create_async()
            .await;

        let hub = HubClient::new(&server.url(), None);
        let id = HubModelId::parse("example/model-a", "microsoft").unwrap();
        let files = hub.list_files(&id).await.unwrap();

        assert_eq!(files, vec!["README.md", "model.gguf"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_files_missing_repo() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/models/example/missing")
            .with_status(404)
            .create_async()
            .await;

        let hub = HubClient::new(&server.url(), None);
        let id = HubModelId::parse("example/missing", "microsoft").unwrap();
        let err = hub.list_files(&id).await.unwrap_err();
        assert!(matches!(err, PanelError::Acquisition(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_download_file_streams_and_renames() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/example/model-a/resolve/main/model.gguf")
            .match_header("authorization", "Bearer secret")
            .with_body("GGUF-bytes")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.gguf");
        let hub = HubClient::new(&server.url(), Some("secret".to_string()));
        let id = HubModelId::parse("example/model-a", "microsoft").unwrap();

        let mut seen = Vec::new();
        let written = hub
            .download_file(&id, "model.gguf", &dest, |got, _| seen.push(got))
            .await
            .unwrap();

        assert_eq!(written, 10);
        assert_eq!(std::fs::read(&dest).unwrap(), b"GGUF-bytes");
        assert!(!dir.path().join("model.gguf.part").exists());
        assert_eq!(seen.last(), Some(&10));
    }

    #[tokio::test]
    async fn test_existing_file_is_not_refetched() {
        let server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.gguf");
        std::fs::write(&dest, b"local").unwrap();

        let hub = HubClient::new(&server.url(), None);
        let id = HubModelId::parse("example/model-a", "microsoft").unwrap();
        let written = hub.download_file(&id, "model.gguf", &dest, |_, _| {}).await.unwrap();

        assert_eq!(written, 0);
        assert_eq!(std::fs::read(&dest).unwrap(), b"local");
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_nothing_behind() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/example/model-a/resolve/main/model.gguf")
            .with_status(500)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.gguf");
        let hub = HubClient::new(&server.url(), None);
        let id = HubModelId::parse("example/model-a", "microsoft").unwrap();

        assert!(hub.download_file(&id, "model.gguf", &dest, |_, _| {}).await.is_err());
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
