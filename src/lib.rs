//! # kbroute
//!
//! An intent-routed assistant backed by a local retrieval-augmented
//! knowledge pipeline.
//!
//! Articles from a remote knowledge-base API are collected into SQLite,
//! chunked into fragments and embedded. Per-category vector indexes
//! combine those fragments with curated web pages and are cached on disk.
//! User requests are classified into a closed set of intents and routed to
//! the matching handler.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Article API│──▶│   Pipeline   │──▶│  SQLite  │
//! │            │   │ Chunk+Embed  │   │ fragments│
//! └────────────┘   └──────────────┘   └────┬─────┘
//!                                          │
//! ┌────────────┐   ┌──────────────┐        │
//! │ Web pages  │──▶│  Knowledge   │◀───────┘
//! └────────────┘   │  bases (.kbix)│
//!                  └──────┬───────┘
//!                         ▼
//!   request ──▶ intent ──▶ router ──▶ RAG answer / schema / general
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kbr init                      # create database and cache directory
//! kbr ingest                    # collect, process, embed
//! kbr build accounting          # build a knowledge base
//! kbr ask "Como emitir uma NF-e?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite content store |
//! | [`collector`] | Article API client |
//! | [`web`] | Web page fetching |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Text generation providers |
//! | [`pipeline`] | Collect, process, and embed stages |
//! | [`artifact`] | Index artifact persistence |
//! | [`knowledge`] | Per-category knowledge bases |
//! | [`answer`] | Retrieval-augmented answering |
//! | [`intent`] | Intent classification |
//! | [`router`] | Intent routing |
//! | [`services`] | Provider and store wiring |
//! | [`usage_log`] | Interaction and feedback log |
//! | [`stats`] | Store, knowledge base, and usage statistics |

pub mod answer;
pub mod artifact;
pub mod collector;
pub mod config;
pub mod db;
pub mod embedding;
pub mod generation;
pub mod intent;
pub mod knowledge;
pub mod migrate;
pub mod pipeline;
pub mod router;
pub mod services;
pub mod sqlite_store;
pub mod stats;
pub mod usage_log;
pub mod web;
