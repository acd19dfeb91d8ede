//! # camstream-sender - camera streaming sender
//!
//! Produces frames, encodes them to JPEG and streams them over one TCP
//! connection to a camstream receiver. The control surface (connect,
//! disconnect, capture, streaming on/off) is a set of line commands read
//! from stdin.

pub mod command;
pub mod config;
pub mod service;
