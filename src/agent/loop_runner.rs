use tracing::{debug, info, warn};

use crate::history::{self, TurnRecord};
use crate::provider::{Message, MessageContent, OpenAiProvider, Role};
use crate::tools::ToolServerClient;

/// Result of an agent loop execution.
pub struct AgentResult {
    pub response: String,
    pub tools_used: Vec<String>,
}

pub struct AgentLoop;

impl AgentLoop {
    /// Run the agent loop: send the replayed transcript plus the new input to
    /// the LLM, execute any tool calls through the tool servers, repeat until
    /// the model answers in plain text.
    pub async fn run(
        provider: &OpenAiProvider,
        system_prompt: &str,
        history: &[TurnRecord],
        user_message: &str,
        tool_client: &ToolServerClient,
        max_turns: usize,
    ) -> Result<AgentResult, String> {
        let tools = tool_client.definitions();
        let mut tools_used: Vec<String> = Vec::new();
        let mut messages = build_messages(system_prompt, history, user_message);

        for turn in 0..max_turns {
            debug!("Agent turn {}/{}", turn + 1, max_turns);

            let response = provider
                .chat(&messages, tools)
                .await
                .map_err(|e| format!("LLM error: {e}"))?;

            if response.tool_calls.is_empty() {
                let content = response.content.unwrap_or_default();
                info!(
                    "Agent completed in {} turns via {} ({} + {} tokens)",
                    turn + 1,
                    provider.model(),
                    response.usage.prompt_tokens,
                    response.usage.completion_tokens
                );
                tools_used.sort();
                tools_used.dedup();
                return Ok(AgentResult {
                    response: content,
                    tools_used,
                });
            }

            messages.push(Message {
                role: Role::Assistant,
                content: MessageContent::AssistantWithToolCalls {
                    text: response.content.clone(),
                    tool_calls: response.tool_calls.clone(),
                },
            });

            for tc in &response.tool_calls {
                let tool_name = &tc.function.name;
                debug!("Executing tool: {tool_name}({})", tc.function.arguments);
                tools_used.push(tool_name.clone());

                let result = tool_client.call(tool_name, &tc.function.arguments).await;

                messages.push(Message {
                    role: Role::Tool,
                    content: MessageContent::ToolResult {
                        tool_call_id: tc.id.clone(),
                        content: result,
                    },
                });
            }
        }

        warn!("Agent hit max turns ({max_turns})");
        let last_assistant = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_text().to_string())
            .unwrap_or_else(|| "Reached max processing limit. Please try again.".into());

        tools_used.sort();
        tools_used.dedup();
        Ok(AgentResult {
            response: last_assistant,
            tools_used,
        })
    }
}

/// System prompt, replayed transcript, then the new user message.
fn build_messages(
    system_prompt: &str,
    history: &[TurnRecord],
    user_message: &str,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message {
        role: Role::System,
        content: MessageContent::Text(system_prompt.to_string()),
    });
    for turn in history {
        let role = match turn.role {
            history::Role::User => Role::User,
            history::Role::Assistant => Role::Assistant,
        };
        messages.push(Message {
            role,
            content: MessageContent::Text(turn.content.clone()),
        });
    }
    messages.push(Message {
        role: Role::User,
        content: MessageContent::Text(user_message.to_string()),
    });
    messages
}
