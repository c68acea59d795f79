pub mod auth;
pub mod client;
pub mod codec;
pub mod commands;
pub mod connection;
pub mod engine;
pub mod protocol;
pub mod schema;
pub mod state;
pub mod supervisor;

pub use auth::*;
pub use client::*;
pub use codec::*;
pub use commands::*;
pub use connection::*;
pub use engine::*;
pub use protocol::*;
pub use schema::*;
pub use state::*;
pub use supervisor::*;
