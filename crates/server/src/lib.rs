//! The Comcore protocol engine.
//!
//! Clients hold one persistent TLS connection each and speak
//! newline-delimited JSON. Per connection, requests are handled one at a
//! time against a login state machine; server-wide, a session registry
//! fans push notifications out to every other live session of affected
//! users.

pub mod codes;
pub mod conn;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod login;
pub mod server;
pub mod sessions;
pub mod state;
pub mod tls;

pub use {
    error::{RequestError, Result},
    server::Server,
    state::ServerState,
};
