pub mod config;
pub mod connection;
pub mod conversation;
pub mod message;
pub mod router;
pub mod stream;
pub mod view;
