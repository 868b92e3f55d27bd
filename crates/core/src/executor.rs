//! Tool executor boundary.
//!
//! The pipeline never performs tool I/O itself — it is handed an injected
//! executor that maps a tool name and input to a result. Per-call timeouts
//! and retries are the executor's responsibility; from the pipeline's point
//! of view every invocation resolves to a result or an error.

use async_trait::async_trait;

use crate::error::ExecutorError;

/// The tool executor boundary.
///
/// Must be safe to invoke concurrently: mutually independent records in one
/// execution phase are dispatched in parallel against the same executor.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute the named tool capability with the given input.
    async fn execute(
        &self,
        name: &str,
        input: &serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ExecutorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An executor that echoes its input back.
    struct EchoExecutor;

    #[async_trait]
    impl ToolExecutor for EchoExecutor {
        async fn execute(
            &self,
            name: &str,
            input: &serde_json::Value,
        ) -> std::result::Result<serde_json::Value, ExecutorError> {
            if name == "missing" {
                return Err(ExecutorError::NotFound(name.into()));
            }
            Ok(input.clone())
        }
    }

    #[tokio::test]
    async fn executor_echoes_input() {
        let exec = EchoExecutor;
        let input = serde_json::json!({"text": "hello"});
        let out = exec.execute("echo", &input).await.unwrap();
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn executor_surfaces_not_found() {
        let exec = EchoExecutor;
        let err = exec
            .execute("missing", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::NotFound(_)));
    }
}
