use std::{
    collections::BTreeSet,
    fmt,
    hash::{Hash, Hasher},
};

use serde_json::Value;

use crate::{
    call::{CallResult, Invocation},
    client::Client,
    error::Error,
    model::{self, Arguments, JsonObject, Parameter, ToolDefinition},
};

/// A tool bound to the client of the server that declared it.
///
/// Two tools are equal when they come from the same server and share a name.
#[derive(Clone)]
pub struct Tool {
    client: Client,
    definition: ToolDefinition,
}

impl Tool {
    pub(crate) fn new(client: Client, definition: ToolDefinition) -> Self {
        Self { client, definition }
    }

    pub fn server(&self) -> &str {
        self.client.name()
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// The description, empty when the server declares none.
    pub fn description(&self) -> &str {
        self.definition.description.as_deref().unwrap_or_default()
    }

    pub fn input_schema(&self) -> &JsonObject {
        &self.definition.input_schema
    }

    pub fn output_schema(&self) -> Option<&JsonObject> {
        self.definition.output_schema.as_deref()
    }

    /// Parameters declared by `inputSchema.properties`, in declaration order.
    pub fn parameters(&self) -> Vec<Parameter> {
        model::parameters(&self.definition.input_schema)
    }

    pub fn return_type(&self) -> Option<&str> {
        model::return_type(self.output_schema())
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Dispatch a call, see [`CallResult`].
    ///
    /// Arguments that do not fit the input schema fail the call with
    /// [`InvocationError::InvalidArguments`](crate::InvocationError::InvalidArguments) without
    /// contacting the server.
    pub async fn call(
        &self,
        call_id: Option<&str>,
        arguments: Arguments,
    ) -> Result<CallResult, Error> {
        self.client
            .dispatch(Invocation {
                tool: self.name().to_owned(),
                call_id: call_id.map(str::to_owned),
                arguments,
                definition: Some(self.definition.clone()),
            })
            .await
    }

    /// Call and wait for the output.
    pub async fn invoke(&self, arguments: Arguments) -> Result<Value, Error> {
        self.call(None, arguments).await?.output().await
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("server", &self.server())
            .field("name", &self.name())
            .field("description", &self.description())
            .finish()
    }
}

impl PartialEq for Tool {
    fn eq(&self, other: &Self) -> bool {
        self.server() == other.server() && self.name() == other.name()
    }
}

impl Eq for Tool {}

impl Hash for Tool {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.server().hash(state);
        self.name().hash(state);
    }
}

/// Select tools by name. An excluded name is never selected, even if included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolFilter {
    include: Option<BTreeSet<String>>,
    exclude: BTreeSet<String>,
}

impl ToolFilter {
    /// Selects every tool.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn include<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include
            .get_or_insert_with(BTreeSet::new)
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn matches(&self, name: &str) -> bool {
        if self.exclude.contains(name) {
            return false;
        }
        self.include
            .as_ref()
            .is_none_or(|include| include.contains(name))
    }
}
