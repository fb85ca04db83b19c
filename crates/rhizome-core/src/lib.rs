//! # Rhizome Core
//!
//! Runtime-agnostic logic for the Rhizome connection pipeline: data
//! models, the coordinate mapper that aligns structural anchors with
//! semantic chunks, metadata transfer, the detection engine contract with
//! its built-in engines, the embedding capability trait, and the
//! connection store abstraction.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. Scheduling, timeouts and persistence live in
//! the `rhizome` application crate.

pub mod embedding;
pub mod engine;
pub mod error;
pub mod mapper;
pub mod models;
pub mod similarity;
pub mod store;
pub mod text;
pub mod transfer;
