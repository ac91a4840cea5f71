//! services/api/src/adapters/memory.rs
//!
//! Process-local implementations of the storage ports, used when no database is
//! configured and by the HTTP tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use study_assistant_core::{
    domain::{Document, PageImage, TestRecord},
    ports::{DocumentStore, PortError, PortResult, UsageCounter},
};
use tokio::sync::RwLock;

/// Documents keyed by `(owner, name)` plus per-user test history.
#[derive(Default)]
pub struct InMemoryStore {
    documents: RwLock<HashMap<(String, String), Document>>,
    history: RwLock<HashMap<String, Vec<TestRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn save_document(&self, document: &Document) -> PortResult<u64> {
        let mut documents = self.documents.write().await;
        let key = (document.owner.clone(), document.name.clone());
        let current = documents.get(&key).map(|d| d.version);
        if document.version != 0 && current != Some(document.version) {
            return Err(PortError::Conflict(format!(
                "Document '{}' changed while this request was running",
                document.name
            )));
        }
        let version = current.unwrap_or(0) + 1;

        let mut stored = document.clone();
        stored.version = version;
        stored.updated_at = Utc::now();
        documents.insert(key, stored);
        Ok(version)
    }

    async fn get_document(&self, owner: &str, name: &str) -> PortResult<Document> {
        self.documents
            .read()
            .await
            .get(&(owner.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Document '{name}' not found")))
    }

    async fn list_documents(&self, owner: &str) -> PortResult<Vec<String>> {
        let mut names: Vec<String> = self
            .documents
            .read()
            .await
            .keys()
            .filter(|(o, _)| o == owner)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn get_page_image(&self, owner: &str, name: &str, index: usize) -> PortResult<PageImage> {
        let documents = self.documents.read().await;
        let document = documents
            .get(&(owner.to_string(), name.to_string()))
            .ok_or_else(|| PortError::NotFound(format!("Document '{name}' not found")))?;
        document
            .images
            .get(index)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Image {index} not found")))
    }

    async fn append_test_record(&self, username: &str, record: &TestRecord) -> PortResult<()> {
        self.history
            .write()
            .await
            .entry(username.to_string())
            .or_default()
            .insert(0, record.clone());
        Ok(())
    }

    async fn test_history(&self, username: &str) -> PortResult<Vec<TestRecord>> {
        Ok(self
            .history
            .read()
            .await
            .get(username)
            .cloned()
            .unwrap_or_default())
    }
}

/// A usage counter that lives and dies with the process.
#[derive(Default)]
pub struct InMemoryUsageCounter {
    counts: RwLock<HashMap<String, u64>>,
}

impl InMemoryUsageCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageCounter for InMemoryUsageCounter {
    async fn get(&self, key: &str) -> PortResult<u64> {
        Ok(self.counts.read().await.get(key).copied().unwrap_or(0))
    }

    async fn increment(&self, key: &str) -> PortResult<u64> {
        let mut counts = self.counts.write().await;
        let count = counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn increment_below(&self, key: &str, cap: u64) -> PortResult<Option<u64>> {
        let mut counts = self.counts.write().await;
        let count = counts.entry(key.to_string()).or_insert(0);
        if *count >= cap {
            return Ok(None);
        }
        *count += 1;
        Ok(Some(*count))
    }
}
