//! Run engine: streamed multi-agent runs over the agent graph.

pub mod events;
pub mod runner;

pub use events::*;
pub use runner::*;
