//! # kbroute core
//!
//! Runtime-agnostic logic for kbroute: data models, chunking, the vector
//! index and its binary encoding, the content store abstraction, the
//! intent categories, usage insights, and the capability traits
//! (embedding, generation, remote fetch, usage log) the app crate
//! implements.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O.

pub mod category;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod fetch;
pub mod generation;
pub mod index;
pub mod models;
pub mod store;
pub mod usage;
