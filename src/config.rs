use std::env;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. \
Keep replies concise and readable in a chat window.";

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    pub allowed_users: Vec<String>,

    // LLM endpoint (OpenAI-compatible)
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub system_prompt: String,

    // Transcript repository
    pub git_repo_url: String,
    pub git_token: String,
    pub history_dir: String,

    // Agent
    pub tool_servers: Vec<String>,
    pub max_agent_turns: usize,

    // Transport: webhook when a public host is configured, polling otherwise
    pub webhook_host: Option<String>,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN")
                .expect("TELEGRAM_BOT_TOKEN is required"),
            allowed_users: parse_list("ALLOWED_USERS"),
            llm_api_key: env::var("LLM_API_KEY").expect("LLM_API_KEY is required"),
            llm_base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://openrouter.ai/api/v1".into()),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "qwen/qwen3-coder:free".into()),
            llm_temperature: env::var("LLM_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.6),
            system_prompt: env::var("SYSTEM_PROMPT")
                .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.into()),
            git_repo_url: env::var("GIT_REPO_URL").expect("GIT_REPO_URL is required"),
            git_token: env::var("GIT_TOKEN").expect("GIT_TOKEN is required"),
            history_dir: env::var("HISTORY_DIR").unwrap_or_else(|_| "repo".into()),
            tool_servers: parse_list("TOOL_SERVERS"),
            max_agent_turns: env::var("MAX_AGENT_TURNS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            webhook_host: env::var("WEBHOOK_HOST").ok().filter(|h| !h.is_empty()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10000),
        }
    }

    /// An empty allow-list authorizes nobody.
    pub fn is_allowed(&self, username: &str) -> bool {
        self.allowed_users.iter().any(|u| u == username)
    }
}

fn parse_list(env_var: &str) -> Vec<String> {
    env::var(env_var)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
