use std::{collections::BTreeMap, collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use crate::{client::Client, error::Error, tool::Tool};

/// The tools of one server from a single discovery round-trip.
#[derive(Debug)]
pub struct ToolCatalog {
    tools: Vec<Tool>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    pub fn new(tools: Vec<Tool>) -> Self {
        let index = tools
            .iter()
            .enumerate()
            .map(|(idx, tool)| (tool.name().to_owned(), idx))
            .collect();
        Self { tools, index }
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.index.get(name).map(|&idx| &self.tools[idx])
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name().to_owned()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

type Slot = RwLock<Option<Arc<ToolCatalog>>>;

/// Catalogs by server name.
///
/// The server set is fixed, so each server gets its own lock and work on one server never
/// waits on another.
pub(crate) struct CatalogCache {
    slots: BTreeMap<String, Slot>,
}

impl CatalogCache {
    pub(crate) fn new<'a>(servers: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            slots: servers
                .into_iter()
                .map(|server| (server.to_owned(), RwLock::new(None)))
                .collect(),
        }
    }

    fn slot(&self, server: &str) -> Result<&Slot, Error> {
        self.slots.get(server).ok_or_else(|| Error::ServerNotFound {
            requested: server.to_owned(),
            available: self.slots.keys().cloned().collect(),
        })
    }

    pub(crate) async fn get(&self, server: &str) -> Option<Arc<ToolCatalog>> {
        self.slot(server).ok()?.read().await.clone()
    }

    /// The cached catalog of `client`, discovering it on a miss.
    ///
    /// Concurrent misses on one server result in a single discovery. A failed discovery
    /// leaves the slot empty.
    pub(crate) async fn get_or_discover(&self, client: &Client) -> Result<Arc<ToolCatalog>, Error> {
        let server = client.name();
        let slot = self.slot(server)?;
        if let Some(catalog) = slot.read().await.clone() {
            tracing::debug!(server, "catalog cache hit");
            return Ok(catalog);
        }
        let mut entry = slot.write().await;
        // another caller may have populated the slot while we waited for the write lock
        if let Some(catalog) = entry.clone() {
            tracing::debug!(server, "catalog populated concurrently");
            return Ok(catalog);
        }
        tracing::debug!(server, "catalog cache miss");
        let catalog = Arc::new(ToolCatalog::new(client.get_tools().await?));
        *entry = Some(catalog.clone());
        Ok(catalog)
    }

    pub(crate) async fn invalidate(&self, server: &str) -> Result<(), Error> {
        self.slot(server)?.write().await.take();
        Ok(())
    }

    pub(crate) async fn clear(&self) {
        for slot in self.slots.values() {
            slot.write().await.take();
        }
    }
}
