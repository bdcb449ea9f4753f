//! Built-in `tools` service: a single `echo` tool.

use mcp_protocol::{HandlerResult, JsonRpcError, Methods};
use mcp_server::Service;
use serde_json::{Value, json};

pub struct EchoTools;

impl Service for EchoTools {
    fn namespace(&self) -> &str {
        "tools"
    }

    async fn handle(&self, method: &str, params: Option<Value>) -> HandlerResult {
        match method {
            Methods::TOOLS_LIST => Ok(json!({
                "tools": [{
                    "name": "echo",
                    "description": "Return the given text unchanged",
                    "inputSchema": {
                        "type": "object",
                        "properties": { "text": { "type": "string" } },
                        "required": ["text"],
                    },
                }],
            })),
            Methods::TOOLS_CALL => {
                let params = params.ok_or_else(|| JsonRpcError::invalid_params("missing params"))?;
                let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
                if name != "echo" {
                    return Err(JsonRpcError::invalid_params(format!("unknown tool: {name}")));
                }
                let text = params
                    .pointer("/arguments/text")
                    .and_then(Value::as_str)
                    .ok_or_else(|| JsonRpcError::invalid_params("echo requires a text argument"))?;
                Ok(json!({
                    "content": [{ "type": "text", "text": text }],
                    "isError": false,
                }))
            }
            _ => Err(JsonRpcError::method_not_found(method)),
        }
    }
}
