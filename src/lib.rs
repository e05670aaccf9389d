//! vaxbot: a multi-agent vaccination booking assistant.
//!
//! A turn enters the agent graph at the triage agent (or wherever the
//! previous turn left off), runs until the active agent stops calling tools,
//! and streams [`types::ResponseChunk`]s as it goes. Conversation state is
//! round-tripped by the client: the terminating chunk carries the transcript
//! and the agent the next turn should start at.
//!
//! ```no_run
//! use futures::StreamExt;
//! use vaxbot::prelude::*;
//!
//! # async fn example() -> vaxbot::error::Result<()> {
//! let config = VaxConfig::load(None)?;
//! let service = ChatService::from_config(&config)?;
//! let mut chunks = service
//!     .stream_turn(TurnRequest::new("I want the flu vaccine", "token"), ResponseMode::Chat)
//!     .await?;
//! while let Some(chunk) = chunks.next().await {
//!     print!("{}", chunk?.to_ndjson()?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod agent_loop;
pub mod audio;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod language;
pub mod metrics;
pub mod prelude;
pub mod provider;
pub mod server;
pub mod service;
pub mod tools;
pub mod translator;
pub mod types;
pub mod util;
