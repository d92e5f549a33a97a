//! chatsync runtime: the single-writer chat mutator, the streaming
//! director step and the operator CLI built on them.

pub mod accumulator;
pub mod analysis;
pub mod bootstrap;
pub mod cancel;
pub mod cli;
pub mod mutator;
pub mod session_lock;
pub mod state;
