//! Tools the model can call while answering a turn
//!
//! Tool names are resolved to a typed [`LookupTool`] at a single boundary,
//! [`ToolRegistry::dispatch`]. Unknown names fail with [`ToolError::NotFound`].

mod loop_detection;
mod lookup;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{self, LookupStore};
use crate::error::ToolError;
use crate::Result;

pub use loop_detection::{LoopDetector, LoopVerdict};
pub use lookup::{LookupTool, SPELL_SLOTS};

/// Tool definition advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the input object
    pub input_schema: Value,
}

/// Executes tool invocations by name
///
/// Implementations must be safe to call concurrently; one model round may
/// request several tools at once.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Tools offered to the model
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Run one tool
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown name, `InvalidInput` or `Execution`
    /// when the tool fails
    async fn dispatch(&self, name: &str, input: &Value) -> std::result::Result<Value, ToolError>;
}

/// Dispatcher over the champion lookup database
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    store: LookupStore,
    call_timeout: Duration,
}

impl ToolRegistry {
    /// Create a registry over an open store
    #[must_use]
    pub const fn new(store: LookupStore, call_timeout: Duration) -> Self {
        Self {
            store,
            call_timeout,
        }
    }

    /// Open the lookup database and build a registry
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened
    pub fn open(path: &Path, pool_size: usize, call_timeout: Duration) -> Result<Self> {
        let pool = db::init(path, u32::try_from(pool_size).unwrap_or(u32::MAX))?;
        Ok(Self::new(LookupStore::new(pool), call_timeout))
    }
}

#[async_trait]
impl ToolDispatcher for ToolRegistry {
    fn definitions(&self) -> Vec<ToolDefinition> {
        LookupTool::ALL.into_iter().map(LookupTool::definition).collect()
    }

    async fn dispatch(&self, name: &str, input: &Value) -> std::result::Result<Value, ToolError> {
        let tool = LookupTool::from_name(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        tracing::debug!(tool = name, input = %input, "dispatching tool");

        let store = self.store.clone();
        let input = input.clone();
        let task = tokio::task::spawn_blocking(move || tool.execute(&input, &store));

        match tokio::time::timeout(self.call_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ToolError::Execution {
                tool: name.to_string(),
                reason: format!("lookup worker failed: {e}"),
            }),
            Err(_) => Err(ToolError::Execution {
                tool: name.to_string(),
                reason: format!("timed out after {}ms", self.call_timeout.as_millis()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn registry() -> ToolRegistry {
        let pool = db::init_memory().unwrap();
        pool.get()
            .unwrap()
            .execute_batch(
                "INSERT INTO champion_story (champion_name, title, content)
                 VALUES ('Jax', 'Grandmaster at Arms', 'Armed with a lamppost.');",
            )
            .unwrap();
        ToolRegistry::new(LookupStore::new(pool), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn unknown_tool_fails_fast() {
        let err = registry()
            .dispatch("get_weather", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::NotFound("get_weather".to_string()));
    }

    #[tokio::test]
    async fn dispatch_runs_lookup() {
        let story = registry()
            .dispatch("get_champion_story", &json!({"champion_name": "Jax"}))
            .await
            .unwrap();
        assert_eq!(story["title"], "Grandmaster at Arms");
    }

    #[test]
    fn definitions_cover_every_tool() {
        let names: Vec<_> = registry()
            .definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names.len(), LookupTool::ALL.len());
        assert!(names.contains(&"get_champion_build".to_string()));
    }
}
