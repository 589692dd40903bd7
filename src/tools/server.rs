use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::provider::{FunctionDef, ToolDef};

struct RemoteTool {
    server_url: String,
    name: String,
}

/// JSON-RPC client for external tool servers.
///
/// Tools are discovered per message and calls are routed to the server that
/// advertised them. With no servers configured the tool set is empty and the
/// agent runs as a plain chat completion.
pub struct ToolServerClient {
    client: Client,
    tools: Vec<RemoteTool>,
    defs: Vec<ToolDef>,
}

impl ToolServerClient {
    /// Query every configured server for its tool list. A server that cannot
    /// be reached is skipped with a warning rather than failing the message.
    pub async fn discover(servers: &[String]) -> Self {
        let client = Client::new();
        let mut tools: Vec<RemoteTool> = Vec::new();
        let mut defs = Vec::new();

        for server in servers {
            match list_tools(&client, server).await {
                Ok(listed) => {
                    for def in listed {
                        if tools.iter().any(|t| t.name == def.function.name) {
                            warn!(
                                "Duplicate tool {} from {server}, keeping the first",
                                def.function.name
                            );
                            continue;
                        }
                        tools.push(RemoteTool {
                            server_url: server.clone(),
                            name: def.function.name.clone(),
                        });
                        defs.push(def);
                    }
                }
                Err(err) => warn!("Tool discovery failed for {server}: {err}"),
            }
        }

        if !servers.is_empty() {
            debug!("Discovered {} tools from {} servers", defs.len(), servers.len());
        }

        Self {
            client,
            tools,
            defs,
        }
    }

    /// Definitions to hand to the LLM.
    pub fn definitions(&self) -> &[ToolDef] {
        &self.defs
    }

    /// Execute a tool call. Failures come back as text so the agent loop can
    /// feed them to the model instead of aborting the turn.
    pub async fn call(&self, name: &str, arguments: &str) -> String {
        let Some(tool) = self.tools.iter().find(|t| t.name == name) else {
            return format!("Unknown tool: {name}");
        };
        let args: Value = serde_json::from_str(arguments).unwrap_or_default();
        match call_tool(&self.client, &tool.server_url, name, args).await {
            Ok(text) => text,
            Err(err) => format!("Tool {name} failed: {err}"),
        }
    }
}

async fn rpc(
    client: &Client,
    server_url: &str,
    method: &str,
    params: Value,
) -> Result<Value, String> {
    let body = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });
    let resp = client
        .post(server_url)
        .json(&body)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    let status = resp.status();
    if !status.is_success() {
        return Err(format!("HTTP {status}"));
    }

    let body: Value = resp.json().await.map_err(|e| e.to_string())?;
    if let Some(err) = body.get("error") {
        return Err(err["message"].as_str().unwrap_or("unknown error").to_string());
    }
    Ok(body["result"].clone())
}

async fn list_tools(client: &Client, server_url: &str) -> Result<Vec<ToolDef>, String> {
    let result = rpc(client, server_url, "tools/list", json!({})).await?;
    Ok(parse_tool_list(&result))
}

async fn call_tool(
    client: &Client,
    server_url: &str,
    name: &str,
    arguments: Value,
) -> Result<String, String> {
    let params = json!({"name": name, "arguments": arguments});
    let result = rpc(client, server_url, "tools/call", params).await?;
    Ok(extract_text_content(&result))
}

fn parse_tool_list(result: &Value) -> Vec<ToolDef> {
    result["tools"]
        .as_array()
        .map(|arr| arr.iter().filter_map(tool_def_from_value).collect())
        .unwrap_or_default()
}

fn tool_def_from_value(value: &Value) -> Option<ToolDef> {
    let name = value["name"].as_str()?;
    Some(ToolDef {
        tool_type: "function".into(),
        function: FunctionDef {
            name: name.to_string(),
            description: value["description"].as_str().unwrap_or("").to_string(),
            parameters: value
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
        },
    })
}

/// Tool results arrive as a content array of typed parts; concatenate the
/// text parts, falling back to the raw JSON for anything else.
fn extract_text_content(result: &Value) -> String {
    match result["content"].as_array() {
        Some(parts) => parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("\n"),
        None => result.to_string(),
    }
}
