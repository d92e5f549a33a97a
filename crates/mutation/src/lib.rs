//! Path-addressed mutations over the conversation graph.
//!
//! A [`Mutation`] is the unit of change shared by the server and every
//! mirror: the server applies it through [`MutationEngine`] (which also
//! queues persistence), a mirror applies the very same value to its own
//! [`Graph`]. Both go through [`Graph::apply`], so identical mutation
//! sequences produce identical graphs.

pub mod apply;
pub mod chat_mutations;
pub mod engine;
pub mod mutation;
pub mod reference;
pub mod schema;

pub use apply::{Graph, CHATS};
pub use chat_mutations::ChatMutation;
pub use engine::MutationEngine;
pub use mutation::Mutation;
pub use reference::Reference;
pub use schema::{FieldKind, ObjectType};
