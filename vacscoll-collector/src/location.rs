use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::errors::FetchError;
use crate::fetcher::PageFetcher;

/// One node of the provider's region tree.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionNode {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub name: String,
    #[serde(default, rename = "areas", alias = "children")]
    pub children: Vec<RegionNode>,
}

fn id_as_string<'de, D>(de: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(de)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "region id must be a string or number, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaEntry {
    pub id: String,
    pub name: String,
    lowered: String,
}

/// Flat `(id, name)` table over every node of a region forest, in pre-order.
#[derive(Debug, Clone, Default)]
pub struct LocationIndex {
    entries: Vec<AreaEntry>,
}

impl LocationIndex {
    /// Flatten with an explicit stack so deep trees cannot exhaust the call stack.
    pub fn build(roots: &[RegionNode]) -> Self {
        let mut entries = Vec::new();
        let mut stack: Vec<&RegionNode> = roots.iter().rev().collect();

        while let Some(node) = stack.pop() {
            entries.push(AreaEntry {
                id: node.id.clone(),
                name: node.name.clone(),
                lowered: node.name.to_lowercase(),
            });
            stack.extend(node.children.iter().rev());
        }

        Self { entries }
    }

    /// Parse the provider's `areas` payload (a top-level array of roots).
    pub fn from_payload(payload: Value) -> Result<Self, serde_json::Error> {
        let roots: Vec<RegionNode> = serde_json::from_value(payload)?;
        Ok(Self::build(&roots))
    }

    /// First entry whose name contains `query`, ignoring case. The query is a
    /// literal string, not a pattern.
    ///
    /// ```
    /// use vacscoll_collector::location::{LocationIndex, RegionNode};
    ///
    /// let tree: Vec<RegionNode> = serde_json::from_str(
    ///     r#"[{"id": "113", "name": "Россия", "areas": [
    ///           {"id": "1", "name": "Москва", "areas": []},
    ///           {"id": "2", "name": "Санкт-Петербург", "areas": []}
    ///        ]}]"#,
    /// )
    /// .unwrap();
    /// let index = LocationIndex::build(&tree);
    ///
    /// assert_eq!(index.lookup("петербург").map(|e| e.id.as_str()), Some("2"));
    /// assert!(index.lookup("  ").is_none());
    /// ```
    pub fn lookup(&self, query: &str) -> Option<&AreaEntry> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.entries.iter().find(|e| e.lowered.contains(&needle))
    }

    pub fn entries(&self) -> &[AreaEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves free-text places to provider area ids, fetching the region tree
/// once and reusing it until [`invalidate`](Self::invalidate) is called.
pub struct AreaResolver {
    fetcher: Arc<dyn PageFetcher>,
    areas_url: String,
    index: RwLock<Option<Arc<LocationIndex>>>,
}

impl AreaResolver {
    pub fn new(fetcher: Arc<dyn PageFetcher>, areas_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            areas_url: areas_url.into(),
            index: RwLock::new(None),
        }
    }

    pub async fn resolve_area(&self, query: &str) -> Result<Option<String>, FetchError> {
        let index = self.index().await?;
        let hit = index.lookup(query);
        debug!(query, area_id = ?hit.map(|e| &e.id), "area.lookup");
        Ok(hit.map(|e| e.id.clone()))
    }

    /// The cached index, fetching it first if needed.
    pub async fn index(&self) -> Result<Arc<LocationIndex>, FetchError> {
        if let Some(index) = self.index.read().await.as_ref() {
            return Ok(index.clone());
        }

        let mut slot = self.index.write().await;
        // Another task may have filled it while we waited for the write lock.
        if let Some(index) = slot.as_ref() {
            return Ok(index.clone());
        }

        let payload = self.fetcher.fetch_json(&self.areas_url).await?;
        let index = Arc::new(
            LocationIndex::from_payload(payload)
                .map_err(|e| FetchError::shape(self.areas_url.clone(), e))?,
        );
        info!(entries = index.len(), url = %self.areas_url, "area.index.loaded");
        *slot = Some(index.clone());
        Ok(index)
    }

    pub async fn invalidate(&self) {
        self.index.write().await.take();
        debug!("area.index.invalidated");
    }
}
