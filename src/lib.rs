//! # Keel
//!
//! An embeddable, multi-type in-memory data engine with a Redis-compatible
//! command surface.
//!
//! Keys hold strings (with bit-level access), hashes with per-field expiry,
//! sorted sets (with geospatial indexing on top) or JSON documents addressed
//! by JSONPath. Commands are executed through [`engine::Engine::execute`],
//! which takes the command name and its arguments and returns a typed
//! [`reply::Reply`]. Multi-key commands lock all of their keys up front, so
//! each command is atomic with respect to every other.

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod glob;
pub mod inline;
pub mod reply;
pub mod scan;
pub mod store;
pub mod types;
