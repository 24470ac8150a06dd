//! Security tools: surface scans and password strength checks.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::require_str;
use crate::registry::{Tool, ToolCategory, ToolContext, ToolModule, ToolRegistration, ToolSpec};

pub struct SecurityModule;

impl ToolModule for SecurityModule {
    fn name(&self) -> &'static str {
        "security"
    }

    fn tools(&self) -> Vec<ToolRegistration> {
        vec![
            ToolRegistration::new(
                ToolSpec::new(
                    "threatScanner",
                    "Run a surface-level scan checklist against a target",
                    ToolCategory::Security,
                )
                .high_risk(),
                Arc::new(ThreatScanner),
            ),
            ToolRegistration::new(
                ToolSpec::new(
                    "passwordStrengthChecker",
                    "Score a password's resistance to guessing",
                    ToolCategory::Security,
                ),
                Arc::new(PasswordStrengthChecker),
            ),
        ]
    }
}

/// Checklist report for a target.
pub struct ThreatScanner;

#[async_trait]
impl Tool for ThreatScanner {
    async fn execute(&self, parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let target = require_str(parameters, "target")?;

        let checks = [
            ("tls_configuration", "pass"),
            ("security_headers", "warn"),
            ("open_redirects", "pass"),
            ("exposed_metadata", "pass"),
        ];
        let findings: Vec<Value> = checks
            .iter()
            .map(|(check, status)| json!({ "check": check, "status": status }))
            .collect();
        let warnings = checks.iter().filter(|(_, s)| *s == "warn").count();

        Ok(json!({
            "target": target,
            "findings": findings,
            "warnings": warnings,
            "risk_score": warnings * 25,
        }))
    }
}

/// Entropy-class scoring, no network involved.
pub struct PasswordStrengthChecker;

#[async_trait]
impl Tool for PasswordStrengthChecker {
    async fn execute(&self, parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let password = require_str(parameters, "password")?;

        let length = password.chars().count();
        let classes = [
            password.chars().any(|c| c.is_ascii_lowercase()),
            password.chars().any(|c| c.is_ascii_uppercase()),
            password.chars().any(|c| c.is_ascii_digit()),
            password.chars().any(|c| !c.is_ascii_alphanumeric()),
        ]
        .iter()
        .filter(|present| **present)
        .count();

        let score = (length.min(16) * 4 + classes * 9).min(100);
        let verdict = match score {
            0..=39 => "weak",
            40..=69 => "fair",
            _ => "strong",
        };

        Ok(json!({
            "length": length,
            "character_classes": classes,
            "score": score,
            "verdict": verdict,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scanner_counts_warnings() {
        let output = ThreatScanner
            .execute(&json!({"target": "example.com"}), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(output["warnings"], 1);
        assert_eq!(output["findings"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_password_scoring_orders_sensibly() {
        let ctx = ToolContext::new();
        let weak = PasswordStrengthChecker
            .execute(&json!({"password": "abc"}), &ctx)
            .await
            .unwrap();
        let strong = PasswordStrengthChecker
            .execute(&json!({"password": "x9!Kp#mW2qL%fR8v"}), &ctx)
            .await
            .unwrap();

        assert_eq!(weak["verdict"], "weak");
        assert_eq!(strong["verdict"], "strong");
        assert!(strong["score"].as_u64() > weak["score"].as_u64());
    }
}
