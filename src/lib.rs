//! # Rhizome
//!
//! Connection detection for a personal reading library.
//!
//! Rhizome takes documents that have already been extracted and chunked
//! upstream, reconciles the two views of each document (structural anchors
//! from layout extraction, semantic chunks from cleaned text), and discovers
//! relationships between chunks with several independent engines.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Coordinate   │──▶│  Metadata    │──▶│ Orchestrator │──▶│  SQLite  │
//! │ Mapper       │   │  Transfer    │   │ 4 engines    │   │  store   │
//! └──────────────┘   └──────────────┘   └──────────────┘   └────┬─────┘
//!                                                               │
//!                                                               ▼
//!                                                          ┌──────────┐
//!                                                          │   CLI    │
//!                                                          │  (rhz)   │
//!                                                          └──────────┘
//! ```
//!
//! The mapper, transfer and engines live in `rhizome-core` and carry no
//! I/O. This crate adds configuration, HTTP embedding providers, SQLite
//! persistence, concurrent orchestration and the command-line surface.
//!
//! ## Quick Start
//!
//! ```bash
//! rhz init                                   # create database
//! rhz map ./book.json                        # inspect anchor mapping
//! rhz connect ./book.json --library lib.json # detect and store connections
//! rhz connections <chunk_id>                 # list what was found
//! rhz stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`pipeline`] | Per-document map → transfer → detect → persist |
//! | [`orchestrator`] | Concurrent engine fan-out, weighting and ranking |
//! | [`persist`] | Batched connection writes with retry |
//! | [`sqlite_store`] | SQLite `ConnectionStore` |
//! | [`embedding`] | OpenAI and Ollama embedding providers |
//! | [`locator`] | Ollama text locator for assisted anchor mapping |
//! | [`report`] | Per-run statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod connect_cmd;
pub mod connections;
pub mod db;
pub mod embedding;
pub mod locator;
pub mod migrate;
pub mod orchestrator;
pub mod persist;
pub mod pipeline;
pub mod report;
pub mod sqlite_store;
pub mod stats;
