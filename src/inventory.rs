//! Inventory sources: where the raw row export comes from.
//!
//! Defines the [`InventorySource`] trait so the export can be read from a
//! local file or fetched from a remote endpoint. Sources return the raw
//! text; decoding is the normalizer's job.

use anyhow::{Context, Result};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::error::{InventoryError, RowError};
use crate::hierarchy::Tree;
use crate::record::{parse_rows, FlatRecord};

/// Latest completed inventory export, as raw text.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub fingerprint: String,
}

impl Snapshot {
    pub fn new(text: String) -> Self {
        let fingerprint = {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            format!("{:x}", hasher.finalize())
        };
        Self { text, fingerprint }
    }

    pub fn records(&self) -> std::result::Result<Vec<FlatRecord>, RowError> {
        parse_rows(&self.text)
    }

    /// Normalize and assemble the snapshot into a tree.
    pub fn build(&self) -> std::result::Result<Tree, SnapshotError> {
        let records = self.records()?;
        Ok(Tree::build(&records)?)
    }
}

/// Why a snapshot could not become a tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Row(#[from] RowError),
    #[error(transparent)]
    Hierarchy(#[from] InventoryError),
}

/// Fetch the current export and build it. A snapshot that does not form a
/// tree is an error; there is no partial result.
pub async fn load(source: &dyn InventorySource) -> Result<(Snapshot, Tree)> {
    let snapshot = source.fetch_rows().await?;
    let tree = snapshot.build().context("Inventory snapshot rejected")?;
    info!(
        "Loaded inventory snapshot {} ({} records)",
        snapshot.fingerprint,
        tree.count_nodes()
    );
    Ok((snapshot, tree))
}

/// Async trait implemented by each export backend.
#[async_trait::async_trait]
pub trait InventorySource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the latest export.
    async fn fetch_rows(&self) -> Result<Snapshot>;

    /// Cheap reachability check for the health endpoint.
    async fn ping(&self) -> Result<()>;
}

/// Build the source named by the service config.
pub fn from_config(config: &SourceConfig) -> Arc<dyn InventorySource> {
    match config {
        SourceConfig::File(path) => Arc::new(CsvFileSource::new(path.clone())),
        SourceConfig::Url(url) => Arc::new(RemoteCsvSource::new(url.clone())),
    }
}

/// Export file on local disk.
#[derive(Debug, Clone)]
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl InventorySource for CsvFileSource {
    fn name(&self) -> &str {
        "csv_file"
    }

    async fn fetch_rows(&self) -> Result<Snapshot> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read inventory export: {:?}", self.path))?;
        debug!("Read {} bytes from {:?}", text.len(), self.path);
        Ok(Snapshot::new(text))
    }

    async fn ping(&self) -> Result<()> {
        tokio::fs::metadata(&self.path)
            .await
            .with_context(|| format!("Inventory export not accessible: {:?}", self.path))?;
        Ok(())
    }
}

/// Export served over HTTP as `text/plain`.
#[derive(Debug, Clone)]
pub struct RemoteCsvSource {
    client: Client,
    url: String,
}

impl RemoteCsvSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait::async_trait]
impl InventorySource for RemoteCsvSource {
    fn name(&self) -> &str {
        "remote_csv"
    }

    async fn fetch_rows(&self) -> Result<Snapshot> {
        let text = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Inventory request to {} failed", self.url))?
            .error_for_status()
            .context("Inventory endpoint returned error")?
            .text()
            .await
            .context("Failed to read inventory response body")?;
        info!("Fetched {} bytes of inventory from {}", text.len(), self.url);
        Ok(Snapshot::new(text))
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .head(&self.url)
            .send()
            .await
            .with_context(|| format!("Inventory endpoint {} unreachable", self.url))?
            .error_for_status()
            .context("Inventory endpoint returned error")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROWS: &str = "1,organization,resource,org/1,0,Acme,\n2,project,resource,proj/2,1,,proj-a\n";

    #[test]
    fn test_fingerprint_is_stable() {
        let a = Snapshot::new(ROWS.to_string());
        let b = Snapshot::new(ROWS.to_string());
        let c = Snapshot::new(format!("{}3,bucket,resource,b/3,2,,b\n", ROWS));
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, c.fingerprint);
        assert_eq!(a.fingerprint.len(), 64);
    }

    #[test]
    fn test_snapshot_build() {
        let tree = Snapshot::new(ROWS.to_string()).build().unwrap();
        assert_eq!(tree.count_nodes(), 2);
    }

    #[test]
    fn test_snapshot_build_errors() {
        let err = Snapshot::new("1,organization,resource\n".to_string())
            .build()
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Row(RowError { line: 1, .. })));

        let err = Snapshot::new("2,project,resource,p/2,7,,p\n".to_string())
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::Hierarchy(InventoryError::DanglingParent { id: 2, .. })
        ));
    }

    struct StaticSource(&'static str);

    #[async_trait::async_trait]
    impl InventorySource for StaticSource {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch_rows(&self) -> Result<Snapshot> {
            Ok(Snapshot::new(self.0.to_string()))
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_load_builds_tree() {
        let (snapshot, tree) = load(&StaticSource(ROWS)).await.unwrap();
        assert_eq!(snapshot.fingerprint, Snapshot::new(ROWS.to_string()).fingerprint);
        assert_eq!(tree.root_id(), 1);
    }

    #[tokio::test]
    async fn test_load_keeps_rejection_cause() {
        let err = load(&StaticSource("2,project,resource,p/2,7,,p\n"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Inventory snapshot rejected");
        assert!(matches!(
            err.downcast_ref::<SnapshotError>(),
            Some(SnapshotError::Hierarchy(InventoryError::DanglingParent { id: 2, .. }))
        ));
        let full = format!("{:#}", err);
        assert!(full.starts_with("Inventory snapshot rejected: "));
        assert!(full.len() > "Inventory snapshot rejected: ".len());
    }

    #[tokio::test]
    async fn test_file_source_reads_export() {
        let path = std::env::temp_dir().join(format!("inventory-viz-{}.csv", std::process::id()));
        tokio::fs::write(&path, ROWS).await.unwrap();

        let source = CsvFileSource::new(&path);
        source.ping().await.unwrap();
        let snapshot = source.fetch_rows().await.unwrap();
        assert_eq!(snapshot.text, ROWS);
        assert_eq!(snapshot.records().unwrap().len(), 2);

        tokio::fs::remove_file(&path).await.unwrap();
        assert!(source.ping().await.is_err());
        assert!(source.fetch_rows().await.is_err());
    }
}
