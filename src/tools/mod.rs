//! Builtin tool modules.
//!
//! Tools are grouped into compile-time modules by capability area. Bodies
//! here synthesize deterministic payloads in the shape their real
//! integrations return; the one exception is `directInference`, which goes
//! through the wired model provider.

pub mod analysis;
pub mod automation;
pub mod content;
pub mod integration;
pub mod productivity;
pub mod search;
pub mod security;
pub mod system;

use serde_json::Value;

use crate::error::AgentError;
use crate::registry::ToolModule;

/// The full static registration list. There is no runtime tool loading;
/// adding a tool means adding it to one of these modules.
pub fn builtin_modules() -> Vec<Box<dyn ToolModule>> {
    vec![
        Box::new(search::SearchModule),
        Box::new(content::ContentModule),
        Box::new(analysis::AnalysisModule),
        Box::new(automation::AutomationModule),
        Box::new(productivity::ProductivityModule),
        Box::new(security::SecurityModule),
        Box::new(integration::IntegrationModule),
        Box::new(system::SystemModule),
    ]
}

/// Fetch a required string parameter, rejecting blank values.
pub(crate) fn require_str<'a>(parameters: &'a Value, key: &str) -> anyhow::Result<&'a str> {
    parameters
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AgentError::Tool(format!("missing required parameter '{}'", key)).into())
}

/// Fetch an optional string parameter with a default.
pub(crate) fn str_or<'a>(parameters: &'a Value, key: &str, default: &'a str) -> &'a str {
    parameters.get(key).and_then(Value::as_str).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{RiskLevel, ToolRegistry};
    use serde_json::json;

    #[tokio::test]
    async fn test_builtin_catalog() {
        let registry = ToolRegistry::with_modules(&builtin_modules()).await;
        let tools = registry.all_tools().await;

        for name in [
            "searchWeb",
            "quickLookup",
            "siteCrawler",
            "trendAnalyzer",
            "citationBuilder",
            "buildLandingPage",
            "blogWriter",
            "tweetThreader",
            "chartBuilder",
            "dataframeCleaner",
            "scraperBot",
            "emailDraftSender",
            "codeExplainer",
            "regexBuilder",
            "threatScanner",
            "passwordStrengthChecker",
            "apiConnector",
            "webhookSender",
            "directInference",
        ] {
            assert!(tools.contains_key(name), "missing tool {}", name);
        }
        assert_eq!(tools.len(), 19);
    }

    #[tokio::test]
    async fn test_risk_and_network_flags() {
        let registry = ToolRegistry::with_modules(&builtin_modules()).await;
        let tools = registry.all_tools().await;

        let mut high_risk: Vec<&str> = tools
            .values()
            .filter(|t| t.risk == RiskLevel::High)
            .map(|t| t.name.as_str())
            .collect();
        high_risk.sort_unstable();
        assert_eq!(
            high_risk,
            vec![
                "apiConnector",
                "emailDraftSender",
                "scraperBot",
                "siteCrawler",
                "threatScanner",
                "webhookSender",
            ]
        );

        let mut networked: Vec<&str> = tools
            .values()
            .filter(|t| t.requires_network)
            .map(|t| t.name.as_str())
            .collect();
        networked.sort_unstable();
        assert_eq!(
            networked,
            vec![
                "apiConnector",
                "directInference",
                "searchWeb",
                "siteCrawler",
                "webhookSender",
            ]
        );
        assert!(registry.requires_network("searchWeb").await);
        assert!(!registry.requires_network("quickLookup").await);
    }

    #[test]
    fn test_require_str_rejects_blank_and_missing() {
        assert!(require_str(&json!({"q": "ok"}), "q").is_ok());
        assert!(require_str(&json!({"q": "  "}), "q").is_err());
        assert!(require_str(&json!({}), "q").is_err());
        assert!(require_str(&json!({"q": 7}), "q").is_err());
    }
}
