//! Search tool — keyword search over the aggregated tool catalogue

use crate::context::ToolContext;
use crate::registry::{HandlerResult, Tool};
use serde_json::{json, Value};
use tracing::debug;

const DEFAULT_LIMIT: usize = 10;

pub struct SearchTool;

impl SearchTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Find available tools by keyword. Matches tool names, descriptions and owning plugin."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Whitespace-separated keywords"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of matches (default 10)"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value, ctx: ToolContext) -> HandlerResult {
        let query = args["query"].as_str().unwrap_or_default().to_lowercase();
        let limit = args["limit"]
            .as_u64()
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_LIMIT);
        let terms: Vec<&str> = query.split_whitespace().collect();

        let mut scored: Vec<(usize, &crate::ToolDefinition)> = ctx
            .catalog()
            .iter()
            .filter_map(|def| {
                let name = def.name.to_lowercase();
                let haystack = format!("{} {}", def.description, def.origin).to_lowercase();
                let score: usize = terms
                    .iter()
                    .map(|t| {
                        if name == *t {
                            4
                        } else if name.contains(t) {
                            2
                        } else if haystack.contains(t) {
                            1
                        } else {
                            0
                        }
                    })
                    .sum();
                (score > 0).then_some((score, def))
            })
            .collect();
        // Stable sort keeps catalogue (name) order among equal scores.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let matches: Vec<Value> = scored
            .into_iter()
            .take(limit)
            .map(|(score, def)| {
                json!({
                    "name": def.name,
                    "description": def.description,
                    "origin": def.origin,
                    "score": score,
                })
            })
            .collect();

        debug!(query = %query, hits = matches.len(), "search");
        Ok(json!({ "query": query, "matches": matches }))
    }
}
