//! Source to target address mappings

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::storage::CustodyStore;

use super::types::{MappingImportSummary, MappingPair, MappingView};

pub struct MappingRegistry {
    store: Arc<dyn CustodyStore>,
}

impl MappingRegistry {
    pub fn new(store: Arc<dyn CustodyStore>) -> Self {
        Self { store }
    }

    /// Insert or update by source address
    ///
    /// Re-importing a source moves it to the new target, project and
    /// remark. Pairs missing either address are ignored.
    pub async fn import(
        &self,
        pairs: Vec<MappingPair>,
        project: &str,
        remark: &str,
    ) -> Result<MappingImportSummary> {
        info!("Importing {} mappings into project {}", pairs.len(), project);
        let success_count = self.store.upsert_mappings(pairs, project, remark).await?;
        info!("Imported {} mappings", success_count);
        Ok(MappingImportSummary { success_count })
    }

    pub async fn query_many(&self, sources: &[String]) -> Result<Vec<MappingView>> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        let mappings = self.store.mappings_by_source(sources).await?;
        debug!("Found {} of {} mappings", mappings.len(), sources.len());
        Ok(mappings.into_iter().map(MappingView::from).collect())
    }

    pub async fn query_one(&self, source: &str) -> Result<Option<MappingView>> {
        let mapping = self.store.find_mapping(source).await?;
        debug!("Mapping for {}: {}", source, if mapping.is_some() { "found" } else { "none" });
        Ok(mapping.map(MappingView::from))
    }
}
