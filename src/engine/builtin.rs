// SPDX-License-Identifier: MIT

//! Generic tools that declarative workflows can reference by name
//!
//! | Name | Effect |
//! |---|---|
//! | `store` | write `value` under `key` in local (default) or global state |
//! | `publish` | copy a local key into global state |
//! | `echo` | return the arguments unchanged |

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::registry::ToolRegistry;
use crate::model::tool::{FnTool, Tool};

/// Which state a write goes to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StateScope {
    #[default]
    Local,
    Global,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StoreArgs {
    /// State key to write
    pub key: String,
    /// Value to store
    pub value: Value,
    #[serde(default)]
    pub scope: StateScope,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PublishArgs {
    /// Local key to copy
    pub key: String,
    /// Global key to write; defaults to `key`
    #[serde(default)]
    pub rename: Option<String>,
}

pub fn store_tool() -> FnTool {
    FnTool::typed::<StoreArgs, _>(
        "store",
        "Store a value in the session state",
        |scope, args| {
            let scope = match args.scope {
                StateScope::Local => {
                    let local = scope.local.set(args.key.clone(), args.value);
                    scope.with_local(local)
                }
                StateScope::Global => {
                    let global = scope.global.set(args.key.clone(), args.value);
                    scope.with_global(global)
                }
            };
            Ok((json!({"stored": args.key}), scope))
        },
    )
}

pub fn publish_tool() -> FnTool {
    FnTool::typed::<PublishArgs, _>(
        "publish",
        "Copy a value from this stage's state into the shared state",
        |scope, args| {
            let value = scope
                .local
                .get(&args.key)
                .cloned()
                .ok_or_else(|| format!("key '{}' is not set in this stage", args.key))?;
            let target = args.rename.unwrap_or_else(|| args.key.clone());
            let global = scope.global.set(target.clone(), value);
            Ok((json!({"published": target}), scope.with_global(global)))
        },
    )
}

pub fn echo_tool() -> FnTool {
    FnTool::new("echo", "Return the arguments unchanged", |scope, args| {
        Ok((args, scope))
    })
}

/// Register every built-in tool
pub async fn register_builtins(registry: &ToolRegistry) {
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(store_tool()),
        Arc::new(publish_tool()),
        Arc::new(echo_tool()),
    ];
    for tool in tools {
        registry.register(tool).await;
    }
}
