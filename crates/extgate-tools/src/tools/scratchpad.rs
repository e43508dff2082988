//! Scratchpad tools — per-session key/value working memory for the agent

use crate::context::{Scratchpad, ToolContext};
use crate::registry::{HandlerResult, Tool};
use extgate_core::GatewayError;
use serde_json::{json, Value};
use std::sync::Arc;

fn require_scratchpad(ctx: &ToolContext) -> anyhow::Result<Arc<dyn Scratchpad>> {
    ctx.scratchpad()
        .cloned()
        .ok_or_else(|| GatewayError::auth("scratchpad requires an authenticated session").into())
}

fn key_arg(args: &Value) -> &str {
    args["key"].as_str().unwrap_or_default()
}

fn key_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "key": { "type": "string", "description": "Scratchpad key" }
        },
        "required": ["key"],
        "additionalProperties": false
    })
}

pub struct ScratchpadSetTool;

#[async_trait::async_trait]
impl Tool for ScratchpadSetTool {
    fn name(&self) -> &str {
        "scratchpad_set"
    }

    fn description(&self) -> &str {
        "Store a JSON value under a key in this session's scratchpad. Overwrites any previous value."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": { "type": "string", "description": "Scratchpad key" },
                "value": { "description": "Any JSON value" }
            },
            "required": ["key", "value"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value, ctx: ToolContext) -> HandlerResult {
        let pad = require_scratchpad(&ctx)?;
        let key = key_arg(&args);
        pad.set(key, args["value"].clone())?;
        Ok(json!({ "key": key, "stored": true }))
    }
}

pub struct ScratchpadGetTool;

#[async_trait::async_trait]
impl Tool for ScratchpadGetTool {
    fn name(&self) -> &str {
        "scratchpad_get"
    }

    fn description(&self) -> &str {
        "Read a value from this session's scratchpad. Returns null when the key is absent."
    }

    fn input_schema(&self) -> Value {
        key_schema()
    }

    async fn execute(&self, args: Value, ctx: ToolContext) -> HandlerResult {
        let pad = require_scratchpad(&ctx)?;
        let key = key_arg(&args);
        let value = pad.get(key)?;
        Ok(json!({ "key": key, "found": value.is_some(), "value": value }))
    }
}

pub struct ScratchpadDeleteTool;

#[async_trait::async_trait]
impl Tool for ScratchpadDeleteTool {
    fn name(&self) -> &str {
        "scratchpad_delete"
    }

    fn description(&self) -> &str {
        "Remove a key from this session's scratchpad."
    }

    fn input_schema(&self) -> Value {
        key_schema()
    }

    async fn execute(&self, args: Value, ctx: ToolContext) -> HandlerResult {
        let pad = require_scratchpad(&ctx)?;
        let key = key_arg(&args);
        let removed = pad.remove(key)?;
        Ok(json!({ "key": key, "removed": removed.is_some() }))
    }
}

pub struct ScratchpadListTool;

#[async_trait::async_trait]
impl Tool for ScratchpadListTool {
    fn name(&self) -> &str {
        "scratchpad_list"
    }

    fn description(&self) -> &str {
        "List the keys currently stored in this session's scratchpad."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    async fn execute(&self, _args: Value, ctx: ToolContext) -> HandlerResult {
        let pad = require_scratchpad(&ctx)?;
        let mut keys = pad.keys()?;
        keys.sort();
        Ok(json!({ "keys": keys }))
    }
}
