//! Research tools: web search, quick lookups, trends, and citations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Datelike;
use serde_json::{json, Value};

use super::{require_str, str_or};
use crate::registry::{Tool, ToolCategory, ToolContext, ToolModule, ToolRegistration, ToolSpec};

pub struct SearchModule;

impl ToolModule for SearchModule {
    fn name(&self) -> &'static str {
        "search"
    }

    fn tools(&self) -> Vec<ToolRegistration> {
        vec![
            ToolRegistration::new(
                ToolSpec::new(
                    "searchWeb",
                    "Search the web and return ranked results with source links",
                    ToolCategory::Search,
                )
                .requires_network(),
                Arc::new(SearchWeb),
            ),
            ToolRegistration::new(
                ToolSpec::new(
                    "quickLookup",
                    "Fetch a condensed reference entry for a topic",
                    ToolCategory::Search,
                ),
                Arc::new(QuickLookup),
            ),
            ToolRegistration::new(
                ToolSpec::new(
                    "siteCrawler",
                    "Crawl a site and report the pages visited",
                    ToolCategory::Search,
                )
                .high_risk()
                .requires_network(),
                Arc::new(SiteCrawler),
            ),
            ToolRegistration::new(
                ToolSpec::new(
                    "trendAnalyzer",
                    "Estimate interest direction for a topic over a time window",
                    ToolCategory::Search,
                ),
                Arc::new(TrendAnalyzer),
            ),
            ToolRegistration::new(
                ToolSpec::new(
                    "citationBuilder",
                    "Format a source reference in a citation style",
                    ToolCategory::Search,
                ),
                Arc::new(CitationBuilder),
            ),
        ]
    }
}

/// Ranked web results for a query.
pub struct SearchWeb;

#[async_trait]
impl Tool for SearchWeb {
    async fn execute(&self, parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let query = require_str(parameters, "query")?;
        let slug = slugify(query);

        let results: Vec<Value> = (1..=3)
            .map(|rank| {
                json!({
                    "rank": rank,
                    "title": format!("{} (result {})", query, rank),
                    "url": format!("https://search.example.com/{}/{}", slug, rank),
                    "snippet": format!("Key points about {} from source {}.", query, rank),
                })
            })
            .collect();
        let sources: Vec<Value> = results.iter().map(|r| r["url"].clone()).collect();

        Ok(json!({ "query": query, "results": results, "sources": sources }))
    }
}

/// Single condensed reference entry.
pub struct QuickLookup;

#[async_trait]
impl Tool for QuickLookup {
    async fn execute(&self, parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let query = require_str(parameters, "query")?;
        Ok(json!({
            "query": query,
            "summary": format!("Condensed reference entry for '{}'.", query),
            "related": [
                format!("{} overview", query),
                format!("{} examples", query),
            ],
        }))
    }
}

/// Breadth-limited crawl report.
pub struct SiteCrawler;

#[async_trait]
impl Tool for SiteCrawler {
    async fn execute(&self, parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let url = require_str(parameters, "url")?;
        let depth = parameters
            .get("depth")
            .and_then(Value::as_u64)
            .unwrap_or(1)
            .min(3);

        let base = url.trim_end_matches('/');
        let pages: Vec<Value> = (0..=depth)
            .map(|level| {
                json!({
                    "url": if level == 0 {
                        base.to_string()
                    } else {
                        format!("{}/section-{}", base, level)
                    },
                    "depth": level,
                    "word_count": 400 + level * 120,
                })
            })
            .collect();

        Ok(json!({ "url": url, "pages_visited": pages.len(), "pages": pages }))
    }
}

/// Interest direction over a window, derived deterministically from the
/// topic so repeat runs agree.
pub struct TrendAnalyzer;

#[async_trait]
impl Tool for TrendAnalyzer {
    async fn execute(&self, parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let topic = require_str(parameters, "topic")?;
        let window = str_or(parameters, "window", "90d");

        let seed = topic
            .bytes()
            .fold(7u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let samples: Vec<u64> = (0..6).map(|i| 40 + ((seed >> (i * 7)) % 60)).collect();
        let direction = match samples.last().cmp(&samples.first()) {
            std::cmp::Ordering::Greater => "rising",
            std::cmp::Ordering::Less => "falling",
            std::cmp::Ordering::Equal => "flat",
        };

        let points: Vec<Value> = samples
            .iter()
            .enumerate()
            .map(|(i, interest)| json!({ "period": format!("t-{}", 5 - i), "interest": interest }))
            .collect();

        Ok(json!({
            "topic": topic,
            "window": window,
            "direction": direction,
            "samples": points,
        }))
    }
}

/// One formatted reference.
pub struct CitationBuilder;

#[async_trait]
impl Tool for CitationBuilder {
    async fn execute(&self, parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let title = require_str(parameters, "title")?;
        let author = str_or(parameters, "author", "Unknown author");
        let style = str_or(parameters, "style", "apa");
        let year = parameters
            .get("year")
            .and_then(Value::as_u64)
            .unwrap_or_else(|| chrono::Utc::now().year() as u64);

        let mut citation = match style {
            "mla" => format!("{}. \"{}.\" {}.", author, title, year),
            _ => format!("{} ({}). {}.", author, year, title),
        };
        if let Some(url) = parameters.get("url").and_then(Value::as_str) {
            citation = format!("{} {}", citation, url);
        }

        Ok(json!({ "citation": citation, "style": style }))
    }
}

fn slugify(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
