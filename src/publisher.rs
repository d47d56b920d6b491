//! Artifact publishing
//!
//! Two sinks. The dashboard view is pushed into the platform's dashboard
//! storage over REST, replacing any previous view with our path so repeated
//! runs never accumulate duplicates. Everything else lands in the include
//! directory as files for the platform to pick up on reload.

use crate::dashboard::{Document, GENERATED_FILES, VIEW_PATH};
use reqwest::Client;
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub struct DashboardPublisher {
    http: Client,
    base_url: String,
    token: String,
}

impl DashboardPublisher {
    pub fn new(base_url: &str, token: &str) -> crate::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Replace-or-append our view in the platform's dashboard config.
    ///
    /// Fetches the current config, drops any view carrying our path, appends
    /// the freshly generated view, and writes the config back.
    pub async fn push_view(&self, view: &Value) -> crate::Result<()> {
        let url = format!("{}/api/lovelace/config", self.base_url);
        let current = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;

        let mut views: Vec<serde_json::Value> = current
            .get("views")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let before = views.len();
        views.retain(|v| v.get("path").and_then(|p| p.as_str()) != Some(VIEW_PATH));
        let replaced = before != views.len();

        let view_json = serde_json::to_value(view)?;
        views.push(view_json);

        let mut config = if current.is_object() {
            current
        } else {
            serde_json::json!({})
        };
        config["views"] = serde_json::Value::Array(views);

        let response = self
            .http
            .post(format!("{url}?force=true"))
            .bearer_auth(&self.token)
            .json(&config)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(crate::Error::Publish(format!(
                "dashboard push rejected: {status}: {body}"
            )));
        }

        info!(path = VIEW_PATH, replaced, "dashboard view published");
        Ok(())
    }
}

/// Writes generated documents into the include directory.
pub struct FileSink {
    output_dir: PathBuf,
}

impl FileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write all documents, creating the directory on first use. Each file
    /// goes through a temp-then-rename so readers never see a partial write.
    pub async fn write(&self, documents: &[Document]) -> crate::Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let mut written = Vec::with_capacity(documents.len());
        for doc in documents {
            let target = self.output_dir.join(&doc.file_name);
            let tmp = self.output_dir.join(format!(".{}.tmp", doc.file_name));
            tokio::fs::write(&tmp, doc.body.as_bytes()).await?;
            tokio::fs::rename(&tmp, &target).await?;
            written.push(target);
        }
        info!(files = written.len(), dir = %self.output_dir.display(), "documents written");
        Ok(written)
    }

    /// Remove stale generated files that the current run did not produce,
    /// e.g. danger automations after the last dangerous zone was removed.
    /// Only names from [`GENERATED_FILES`] are candidates; foreign files
    /// in the directory are left alone.
    pub async fn prune(&self, keep: &[Document]) -> crate::Result<()> {
        let mut dir = match tokio::fs::read_dir(&self.output_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !GENERATED_FILES.contains(&name) {
                continue;
            }
            if keep.iter().any(|doc| doc.file_name == name) {
                continue;
            }
            warn!(file = name, "removing stale generated document");
            tokio::fs::remove_file(entry.path()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::FILE_HEADER;

    fn doc(name: &str, body: &str) -> Document {
        Document {
            file_name: name.to_string(),
            body: format!("{FILE_HEADER}{body}"),
        }
    }

    #[tokio::test]
    async fn test_write_creates_directory_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("frigate_identity"));
        let written = sink
            .write(&[doc("dashboard.yaml", "views: []\n")])
            .await
            .unwrap();
        assert_eq!(written.len(), 1);
        let body = tokio::fs::read_to_string(&written[0]).await.unwrap();
        assert!(body.starts_with("# Generated by frigate-identity"));
        assert!(body.ends_with("views: []\n"));
    }

    #[tokio::test]
    async fn test_rewrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        sink.write(&[doc("dashboard.yaml", "views: [one]\n")])
            .await
            .unwrap();
        sink.write(&[doc("dashboard.yaml", "views: [two]\n")])
            .await
            .unwrap();
        let body = tokio::fs::read_to_string(dir.path().join("dashboard.yaml"))
            .await
            .unwrap();
        assert!(body.contains("views: [two]"));
    }

    #[tokio::test]
    async fn test_prune_removes_only_stale_generated_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        sink.write(&[
            doc("dashboard.yaml", "views: []\n"),
            doc("danger_zone_automations.yaml", "[]\n"),
        ])
        .await
        .unwrap();
        // Foreign files sharing the directory must survive, persons.yaml
        // in particular.
        tokio::fs::write(dir.path().join("persons.yaml"), "persons: {}\n")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "keep me")
            .await
            .unwrap();

        let current = vec![doc("dashboard.yaml", "views: []\n")];
        sink.prune(&current).await.unwrap();

        assert!(dir.path().join("dashboard.yaml").exists());
        assert!(!dir.path().join("danger_zone_automations.yaml").exists());
        assert!(dir.path().join("persons.yaml").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_prune_missing_directory_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("never_created"));
        sink.prune(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_platform_is_an_error() {
        let publisher = DashboardPublisher::new("http://127.0.0.1:9", "token").unwrap();
        let view = serde_yaml::to_value(serde_json::json!({"path": "frigate-identity"})).unwrap();
        assert!(publisher.push_view(&view).await.is_err());
    }
}
