//! # Group
//! A fixed set of named servers behind one interface.
//!
//! ```rust,no_run
//! # use mcp_group::{Arguments, Group, LocalParameters};
//! # async fn demo() -> Result<(), mcp_group::Error> {
//! let group = Group::new([(
//!     "math",
//!     LocalParameters::new("python").arg("math_server.py"),
//! )]);
//! group.connect().await?;
//! let sum = group
//!     .call_tool("math", "add", None, Arguments::new().arg("a", 1).arg("b", 2))
//!     .await?
//!     .output()
//!     .await?;
//! println!("1 + 2 = {sum}");
//! group.close().await;
//! # Ok(())
//! # }
//! ```
use std::{collections::BTreeMap, panic::AssertUnwindSafe, sync::Arc};

use futures::{
    FutureExt,
    future::{BoxFuture, join_all},
};

use crate::{
    call::CallResult,
    client::Client,
    config::ServersConfig,
    error::Error,
    model::Arguments,
    session::{Connector, RmcpConnector},
    tool::Tool,
    transport::TransportParameters,
};

mod cache;
pub use cache::ToolCatalog;
use cache::CatalogCache;

pub struct Group {
    clients: BTreeMap<String, Client>,
    cache: CatalogCache,
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("clients", &self.clients)
            .finish_non_exhaustive()
    }
}

impl Group {
    pub fn new<I, K, P>(servers: I) -> Self
    where
        I: IntoIterator<Item = (K, P)>,
        K: Into<String>,
        P: Into<TransportParameters>,
    {
        Self::with_connector(servers, Arc::new(RmcpConnector))
    }

    pub fn with_connector<I, K, P>(servers: I, connector: Arc<dyn Connector>) -> Self
    where
        I: IntoIterator<Item = (K, P)>,
        K: Into<String>,
        P: Into<TransportParameters>,
    {
        Self::from_clients(
            servers
                .into_iter()
                .map(|(name, parameters)| Client::with_connector(name, parameters, connector.clone())),
        )
    }

    pub fn from_config(config: ServersConfig) -> Self {
        Self::new(config.servers)
    }

    /// Build a group from existing clients, keyed by [`Client::name`]. A later client replaces
    /// an earlier one with the same name.
    pub fn from_clients(clients: impl IntoIterator<Item = Client>) -> Self {
        let clients: BTreeMap<String, Client> = clients
            .into_iter()
            .map(|client| (client.name().to_owned(), client))
            .collect();
        let cache = CatalogCache::new(clients.keys().map(String::as_str));
        Self { clients, cache }
    }

    pub fn clients(&self) -> &BTreeMap<String, Client> {
        &self.clients
    }

    pub fn client(&self, server: &str) -> Result<&Client, Error> {
        self.clients.get(server).ok_or_else(|| Error::ServerNotFound {
            requested: server.to_owned(),
            available: self.clients.keys().cloned().collect(),
        })
    }

    /// Server names in sorted order.
    pub fn server_names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    /// Connect every server concurrently.
    ///
    /// All servers are attempted. Servers that connected stay connected when others fail, the
    /// failures are reported together as [`Error::Aggregate`].
    pub async fn connect(&self) -> Result<(), Error> {
        let results = join_all(
            self.clients
                .iter()
                .map(|(name, client)| async move { (name, client.connect().await) }),
        )
        .await;
        self.cache.clear().await;
        let failures = results
            .into_iter()
            .filter_map(|(name, result)| result.err().map(|error| (name.clone(), error)))
            .collect();
        Error::aggregate(failures)
    }

    /// Close every server concurrently. Failures are logged, never returned.
    pub async fn close(&self) {
        let results = join_all(
            self.clients
                .iter()
                .map(|(name, client)| async move { (name, client.close().await) }),
        )
        .await;
        for (name, result) in results {
            if let Err(error) = result {
                tracing::warn!(server = %name, %error, "failed to close server");
            }
        }
        self.cache.clear().await;
    }

    /// Connect, run `f`, then close, also when `f` fails or panics.
    ///
    /// If connecting fails, the servers that did connect are closed before the error is
    /// returned.
    pub async fn scoped<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: for<'g> FnOnce(&'g Group) -> BoxFuture<'g, Result<T, E>>,
        E: From<Error>,
    {
        if let Err(error) = self.connect().await {
            self.close().await;
            return Err(error.into());
        }
        let outcome = AssertUnwindSafe(f(self)).catch_unwind().await;
        self.close().await;
        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// The catalog of one server, from cache when warm.
    pub async fn catalog(&self, server: &str) -> Result<Arc<ToolCatalog>, Error> {
        let client = self.client(server)?;
        self.cache.get_or_discover(client).await
    }

    async fn catalogs(&self) -> Result<Vec<(&str, Arc<ToolCatalog>)>, Error> {
        let results = join_all(self.clients.iter().map(|(name, client)| async move {
            (name.as_str(), self.cache.get_or_discover(client).await)
        }))
        .await;
        let mut catalogs = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (name, result) in results {
            match result {
                Ok(catalog) => catalogs.push((name, catalog)),
                Err(error) => failures.push((name.to_owned(), error)),
            }
        }
        Error::aggregate(failures)?;
        Ok(catalogs)
    }

    /// Tools of one server, or of every server in server order.
    pub async fn get_tools(&self, server: Option<&str>) -> Result<Vec<Tool>, Error> {
        match server {
            Some(server) => Ok(self.catalog(server).await?.tools().to_vec()),
            None => Ok(self
                .catalogs()
                .await?
                .into_iter()
                .flat_map(|(_, catalog)| catalog.tools().to_vec())
                .collect()),
        }
    }

    pub async fn get_tools_grouped_by_server(&self) -> Result<BTreeMap<String, Vec<Tool>>, Error> {
        Ok(self
            .catalogs()
            .await?
            .into_iter()
            .map(|(name, catalog)| (name.to_owned(), catalog.tools().to_vec()))
            .collect())
    }

    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        call_id: Option<&str>,
        arguments: Arguments,
    ) -> Result<CallResult, Error> {
        let catalog = self.catalog(server).await?;
        let tool = catalog.get(tool).ok_or_else(|| Error::ToolNotFound {
            server: server.to_owned(),
            requested: tool.to_owned(),
            available: catalog.names(),
        })?;
        tool.call(call_id, arguments).await
    }

    /// Forget cached catalogs, of one server or of all of them.
    pub async fn invalidate_cache(&self, server: Option<&str>) -> Result<(), Error> {
        match server {
            Some(server) => {
                let client = self.client(server)?;
                // client first: a lookup racing us must not refill the slot from it
                client.invalidate_cache().await;
                self.cache.invalidate(server).await?;
                tracing::debug!(server, "catalog invalidated");
            }
            None => {
                join_all(self.clients.values().map(Client::invalidate_cache)).await;
                self.cache.clear().await;
                tracing::debug!("all catalogs invalidated");
            }
        }
        Ok(())
    }

    /// The cached catalog of `server`, without discovering it.
    pub async fn cached_catalog(&self, server: &str) -> Option<Arc<ToolCatalog>> {
        self.cache.get(server).await
    }
}
