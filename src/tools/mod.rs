mod server;

pub use server::ToolServerClient;
