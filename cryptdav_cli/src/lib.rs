//! Library half of the `cryptdav` binary: config handling and the command
//! implementations, kept out of `main.rs` so they can be tested.

pub mod cmd;
pub mod config;
