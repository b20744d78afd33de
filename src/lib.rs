//! Causerie is a terminal client for a streaming chatbot service.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the conversation engine: the duplex channel, fragment
//!   assembly, conversation routing, and the append-only message store.
//! - [`api`] defines the service's REST payloads and the HTTP client that
//!   loads history and performs auth exchanges.
//! - [`auth`] holds session credentials and the lazy refresh coordinator.
//! - [`ui`] runs the interactive line-oriented chat loop.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which dispatches into [`ui::chat_loop`]
//! for interactive sessions.

pub mod api;
pub mod auth;
pub mod cli;
pub mod core;
pub mod ui;
pub mod utils;
