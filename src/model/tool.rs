// SPDX-License-Identifier: MIT

//! Tools: single executable actions bound to a stage

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::any::Any;
use std::error::Error;
use std::future::Future;
use std::sync::Arc;

use super::state::{Construct, State};

/// Error type tool implementations may return
pub type ToolError = Box<dyn Error + Send + Sync>;

/// What a tool returns on success: its outcome and the scope it produced
pub type ToolOutput = (Value, Scope);

static EMPTY_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {}
    })
});

/// The state handed to a tool.
///
/// `local` belongs to the stage the tool runs in, `global` is shared by every
/// stage of the session. A tool returns a (possibly) new scope; the session
/// is the only writer of its own state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub local: State,
    pub global: State,
}

impl Scope {
    pub fn new(local: State, global: State) -> Self {
        Self { local, global }
    }

    /// Replace the local state, keeping global
    pub fn with_local(self, local: State) -> Self {
        Self { local, ..self }
    }

    /// Replace the global state, keeping local
    pub fn with_global(self, global: State) -> Self {
        Self { global, ..self }
    }
}

/// Trait for actions a controller can call inside a stage.
///
/// `name()`, `description()` and `schema()` return borrowed data; store them
/// in struct fields.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool name (unique within its stage)
    fn name(&self) -> &str;

    /// Returns a human-readable description of what the tool does
    fn description(&self) -> &str;

    /// Returns the JSON schema for the tool's arguments
    fn schema(&self) -> &Value {
        &EMPTY_SCHEMA
    }

    /// Construct the outcome must satisfy, if any
    fn output(&self) -> Option<&Construct> {
        None
    }

    /// Run the tool against a state scope with the given arguments
    async fn execute(&self, scope: Scope, args: Value) -> Result<ToolOutput, ToolError>;

    /// Description used when listing tools to a model
    fn to_schema(&self) -> Value {
        json!({
            "name": self.name(),
            "description": self.description(),
            "input_schema": self.schema(),
        })
    }
}

type SyncHandler = dyn Fn(Scope, Value) -> Result<ToolOutput, ToolError> + Send + Sync;
type SuspendingHandler =
    dyn Fn(Scope, Value) -> BoxFuture<'static, Result<ToolOutput, ToolError>> + Send + Sync;

enum Handler {
    Sync(Arc<SyncHandler>),
    Suspending(Box<SuspendingHandler>),
}

/// Tool backed by a closure.
///
/// ```
/// use concierge_rs::model::tool::FnTool;
/// use serde_json::json;
///
/// let search = FnTool::new("search", "Search for a stock", |scope, args| {
///     let symbol = args["symbol"].as_str().unwrap_or_default().to_string();
///     let local = scope.local.set("last_search", symbol.clone());
///     Ok((json!({"result": format!("Found {symbol}")}), scope.with_local(local)))
/// });
/// ```
pub struct FnTool {
    name: String,
    description: String,
    schema: Value,
    output: Option<Construct>,
    handler: Handler,
}

impl FnTool {
    /// Create a tool from a synchronous closure.
    ///
    /// The closure runs on tokio's blocking pool, so it may block.
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        F: Fn(Scope, Value) -> Result<ToolOutput, ToolError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema: EMPTY_SCHEMA.clone(),
            output: None,
            handler: Handler::Sync(Arc::new(f)),
        }
    }

    /// Create a tool from a closure returning a future (I/O-bound tools)
    pub fn suspending<F, Fut>(name: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        F: Fn(Scope, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema: EMPTY_SCHEMA.clone(),
            output: None,
            handler: Handler::Suspending(Box::new(move |scope, args| f(scope, args).boxed())),
        }
    }

    /// Create a tool whose arguments deserialize into `A`.
    ///
    /// The input schema is generated from `A`.
    pub fn typed<A, F>(name: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        A: DeserializeOwned + JsonSchema,
        F: Fn(Scope, A) -> Result<ToolOutput, ToolError> + Send + Sync + 'static,
    {
        let schema = serde_json::to_value(schemars::schema_for!(A))
            .unwrap_or_else(|_| EMPTY_SCHEMA.clone());
        let tool = Self::new(name, description, move |scope, args| {
            let args: A = serde_json::from_value(args)?;
            f(scope, args)
        });
        tool.with_schema(schema)
    }

    /// Override the input schema
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Require the outcome to validate against `construct`
    pub fn with_output(mut self, construct: Construct) -> Self {
        self.output = Some(construct);
        self
    }

    pub fn is_suspending(&self) -> bool {
        matches!(self.handler, Handler::Suspending(_))
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> &Value {
        &self.schema
    }

    fn output(&self) -> Option<&Construct> {
        self.output.as_ref()
    }

    async fn execute(&self, scope: Scope, args: Value) -> Result<ToolOutput, ToolError> {
        match &self.handler {
            Handler::Sync(f) => {
                let f = Arc::clone(f);
                match tokio::task::spawn_blocking(move || f(scope, args)).await {
                    Ok(result) => result,
                    Err(err) if err.is_panic() => {
                        Err(format!("panicked: {}", panic_message(err.into_panic().as_ref())).into())
                    }
                    Err(err) => Err(err.to_string().into()),
                }
            }
            Handler::Suspending(f) => f(scope, args).await,
        }
    }
}

/// Text of a panic payload
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
