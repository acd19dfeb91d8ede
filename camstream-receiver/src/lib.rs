//! # camstream-receiver - camera stream receiver
//!
//! Listens for a camstream sender, decodes its `[tag][len][payload]`
//! messages, saves captured stills as numbered JPEG files and keeps the
//! most recent video frame as `latest.jpg`.

pub mod config;
pub mod server;
pub mod sink;
