//! Content production tools: pages, posts, and threads.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{require_str, str_or};
use crate::registry::{Tool, ToolCategory, ToolContext, ToolModule, ToolRegistration, ToolSpec};

pub struct ContentModule;

impl ToolModule for ContentModule {
    fn name(&self) -> &'static str {
        "content"
    }

    fn tools(&self) -> Vec<ToolRegistration> {
        vec![
            ToolRegistration::new(
                ToolSpec::new(
                    "buildLandingPage",
                    "Generate a single-file landing page for a product or topic",
                    ToolCategory::Content,
                ),
                Arc::new(BuildLandingPage),
            ),
            ToolRegistration::new(
                ToolSpec::new(
                    "blogWriter",
                    "Draft a structured blog post in Markdown",
                    ToolCategory::Content,
                ),
                Arc::new(BlogWriter),
            ),
            ToolRegistration::new(
                ToolSpec::new(
                    "tweetThreader",
                    "Split a topic into a numbered social thread",
                    ToolCategory::Content,
                ),
                Arc::new(TweetThreader),
            ),
        ]
    }
}

/// Self-contained HTML page.
pub struct BuildLandingPage;

#[async_trait]
impl Tool for BuildLandingPage {
    async fn execute(&self, parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let title = require_str(parameters, "title")?;
        let tagline = str_or(parameters, "tagline", "Built for getting things done.");
        let cta = str_or(parameters, "cta", "Get started");

        let html = format!(
            "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
             <title>{title}</title>\n\
             <style>body{{font-family:sans-serif;max-width:40rem;margin:4rem auto}}</style>\n\
             </head>\n<body>\n<h1>{title}</h1>\n<p>{tagline}</p>\n\
             <a href=\"#signup\" role=\"button\">{cta}</a>\n</body>\n</html>\n"
        );

        Ok(json!({
            "title": title,
            "html": html,
            "sections": ["hero", "tagline", "call-to-action"],
        }))
    }
}

/// Markdown blog draft.
pub struct BlogWriter;

#[async_trait]
impl Tool for BlogWriter {
    async fn execute(&self, parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let topic = require_str(parameters, "topic")?;
        let tone = str_or(parameters, "tone", "practical");

        let markdown = format!(
            "# {topic}\n\n\
             A {tone} look at {topic}: what it is, why it matters, and how to apply it.\n\n\
             ## Background\n\nWhere {topic} came from and the problem it addresses.\n\n\
             ## In practice\n\nConcrete ways teams put {topic} to work today.\n\n\
             ## Takeaways\n\n- Start small\n- Measure before scaling\n- Revisit assumptions\n"
        );

        Ok(json!({
            "topic": topic,
            "markdown": markdown,
            "word_count": markdown.split_whitespace().count(),
        }))
    }
}

/// Numbered thread of short posts.
pub struct TweetThreader;

#[async_trait]
impl Tool for TweetThreader {
    async fn execute(&self, parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let topic = require_str(parameters, "topic")?;
        let count = parameters
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or(5)
            .clamp(2, 12) as usize;

        let tweets: Vec<String> = (1..=count)
            .map(|n| {
                if n == 1 {
                    format!("1/{} Why {} deserves your attention: a short thread.", count, topic)
                } else if n == count {
                    format!("{}/{} That's the thread. Bookmark this if {} is on your roadmap.", n, count, topic)
                } else {
                    format!("{}/{} Point {}: a concrete angle on {}.", n, count, n - 1, topic)
                }
            })
            .collect();

        Ok(json!({ "topic": topic, "tweets": tweets }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_landing_page_is_complete_html() {
        let output = BuildLandingPage
            .execute(&json!({"title": "GoalPilot"}), &ToolContext::new())
            .await
            .unwrap();
        let html = output["html"].as_str().unwrap();
        assert!(html.starts_with("<!doctype html>"));
        assert!(html.contains("<h1>GoalPilot</h1>"));
    }

    #[tokio::test]
    async fn test_thread_count_is_clamped() {
        let output = TweetThreader
            .execute(&json!({"topic": "caching", "count": 40}), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(output["tweets"].as_array().unwrap().len(), 12);
    }
}
