//! System tools: direct model access.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::require_str;
use crate::error::AgentError;
use crate::inference::{call_type, InferenceResponse};
use crate::registry::{Tool, ToolCategory, ToolContext, ToolModule, ToolRegistration, ToolSpec};

pub struct SystemModule;

impl ToolModule for SystemModule {
    fn name(&self) -> &'static str {
        "system"
    }

    fn tools(&self) -> Vec<ToolRegistration> {
        vec![ToolRegistration::new(
            ToolSpec::new(
                "directInference",
                "Send a prompt straight to the model and return its answer",
                ToolCategory::System,
            )
            .requires_network(),
            Arc::new(DirectInference),
        )]
    }
}

/// Raw passthrough to the wired provider. Provider errors keep their kind,
/// so an offline call still reads as a connectivity failure downstream.
pub struct DirectInference;

#[async_trait]
impl Tool for DirectInference {
    async fn execute(&self, parameters: &Value, ctx: &ToolContext) -> anyhow::Result<Value> {
        let prompt = require_str(parameters, "prompt")?;
        let provider = ctx.provider.as_ref().ok_or_else(|| {
            AgentError::Tool("no inference provider attached to this context".to_string())
        })?;

        let response = provider.call(prompt, call_type::DIRECT).await?;
        Ok(json!({
            "structured": response.is_json(),
            "response": match response {
                InferenceResponse::Json(value) => value,
                InferenceResponse::Text(text) => Value::String(text),
            },
        }))
    }
}
