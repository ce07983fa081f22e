use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::transport::TransportParameters;

/// A server map, as found in MCP client configuration files.
///
/// ```json
/// {
///   "servers": {
///     "math": { "command": "python", "args": ["math_server.py"] },
///     "search": { "url": "http://localhost:8000", "headers": { "Authorization": "Bearer x" } },
///     "legacy": { "url": "http://localhost:9000", "protocol": "sse", "timeout": 10 }
///   }
/// }
/// ```
///
/// The `mcpServers` key is accepted as an alias of `servers`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServersConfig {
    #[serde(alias = "mcpServers")]
    pub servers: BTreeMap<String, TransportParameters>,
}

impl ServersConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl<K, P> FromIterator<(K, P)> for ServersConfig
where
    K: Into<String>,
    P: Into<TransportParameters>,
{
    fn from_iter<T: IntoIterator<Item = (K, P)>>(iter: T) -> Self {
        Self {
            servers: iter
                .into_iter()
                .map(|(name, parameters)| (name.into(), parameters.into()))
                .collect(),
        }
    }
}
