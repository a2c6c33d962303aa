pub mod connection;
pub mod migrations;
pub mod repository;
pub mod schema;

pub use connection::*;
pub use migrations::*;
pub use repository::{AgentLookup, AgentRegistry, CommandQueue, RegisteredAgent};
pub use schema::*;
