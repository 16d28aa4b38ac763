pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod dom;
pub mod framing;
pub mod global;
pub mod message;
pub mod publisher;
pub mod replay;
pub mod sink;
pub mod watcher;
