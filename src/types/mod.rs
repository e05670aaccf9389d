//! Core types for vaxbot.

pub mod chunk;
pub mod generation;
pub mod message;
pub mod stream;

pub use chunk::*;
pub use generation::*;
pub use message::*;
pub use stream::*;
