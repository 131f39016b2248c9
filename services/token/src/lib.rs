//! Voicebar Token Service Library Crate
//!
//! This library contains all the logic for the ephemeral-credential
//! service: configuration, the mint handler, and routing. The binaries in
//! `bin/` are thin wrappers around it.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
