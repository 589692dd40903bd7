use reqwest::Client;
use serde_json::json;

use super::types::*;

/// Chat-completions client for any OpenAI-compatible endpoint (OpenRouter
/// by default).
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(base_url: String, model: String, temperature: f32, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            model,
            temperature,
            api_key,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDef],
    ) -> Result<LlmResponse, ProviderError> {
        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": build_chat_messages(messages),
        });

        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(tools)
                .map_err(|e| ProviderError::ParseError(e.to_string()))?;
            body["tool_choice"] = json!("auto");
        }

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::RequestError(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::AuthError(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::RequestError(format!("HTTP {status}: {text}")));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;
        parse_chat_body(&body)
    }
}

pub fn build_chat_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            match &m.content {
                MessageContent::Text(text) => json!({
                    "role": role,
                    "content": text,
                }),
                MessageContent::AssistantWithToolCalls { text, tool_calls } => json!({
                    "role": "assistant",
                    "content": text,
                    "tool_calls": tool_calls,
                }),
                MessageContent::ToolResult {
                    tool_call_id,
                    content,
                } => json!({
                    "role": "tool",
                    "tool_call_id": tool_call_id,
                    "content": content,
                }),
            }
        })
        .collect()
}

pub fn parse_chat_body(body: &serde_json::Value) -> Result<LlmResponse, ProviderError> {
    let choice = body["choices"]
        .get(0)
        .ok_or_else(|| ProviderError::ParseError("no choices in response".into()))?;

    let message = &choice["message"];
    let content = message["content"].as_str().map(|s| s.to_string());

    let tool_calls: Vec<ToolCall> = if let Some(tcs) = message["tool_calls"].as_array() {
        tcs.iter()
            .filter_map(|tc| serde_json::from_value(tc.clone()).ok())
            .collect()
    } else {
        vec![]
    };

    let usage = Usage {
        prompt_tokens: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: body["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    };

    Ok(LlmResponse {
        content,
        tool_calls,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_messages_carry_the_call_id() {
        let messages = vec![
            Message {
                role: Role::System,
                content: MessageContent::Text("be brief".into()),
            },
            Message {
                role: Role::Tool,
                content: MessageContent::ToolResult {
                    tool_call_id: "call_1".into(),
                    content: "42".into(),
                },
            },
        ];
        let built = build_chat_messages(&messages);
        assert_eq!(built[0]["role"], "system");
        assert_eq!(built[1]["role"], "tool");
        assert_eq!(built[1]["tool_call_id"], "call_1");
        assert_eq!(built[1]["content"], "42");
    }

    #[test]
    fn assistant_tool_calls_are_echoed_back_verbatim() {
        let messages = vec![Message {
            role: Role::Assistant,
            content: MessageContent::AssistantWithToolCalls {
                text: None,
                tool_calls: vec![ToolCall {
                    id: "call_7".into(),
                    tool_type: "function".into(),
                    function: FunctionCall {
                        name: "lookup".into(),
                        arguments: "{\"q\":\"rust\"}".into(),
                    },
                }],
            },
        }];
        let built = build_chat_messages(&messages);
        assert_eq!(built[0]["tool_calls"][0]["id"], "call_7");
        assert_eq!(built[0]["tool_calls"][0]["function"]["name"], "lookup");
    }

    #[test]
    fn parses_a_plain_text_completion() {
        let body = serde_json::json!({
            "choices": [{"message": {"content": "hello"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3},
        });
        let parsed = parse_chat_body(&body).unwrap();
        assert_eq!(parsed.content.as_deref(), Some("hello"));
        assert!(parsed.tool_calls.is_empty());
        assert_eq!(parsed.usage.prompt_tokens, 12);
    }

    #[test]
    fn parses_tool_calls() {
        let body = serde_json::json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "search", "arguments": "{}"},
                }],
            }}],
        });
        let parsed = parse_chat_body(&body).unwrap();
        assert_eq!(parsed.content, None);
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].function.name, "search");
    }

    #[test]
    fn empty_choices_is_a_parse_error() {
        let body = serde_json::json!({"choices": []});
        assert!(matches!(
            parse_chat_body(&body),
            Err(ProviderError::ParseError(_))
        ));
    }
}
