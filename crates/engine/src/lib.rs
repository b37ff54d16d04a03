pub mod agent;
pub mod sink;

pub use agent::{AgentSettings, AgentStatus, DryRun, OpenOrderAgent, PollError, PollReport};
pub use sink::{CollectingSink, JsonLinesSink};
