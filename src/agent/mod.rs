mod loop_runner;

pub use loop_runner::{AgentLoop, AgentResult};
