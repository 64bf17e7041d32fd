//! # DocQuest
//!
//! A local-first document question-answering pipeline.
//!
//! DocQuest ingests text and PDF files, extracts and chunks their
//! content, embeds each chunk, and answers natural-language questions
//! grounded in the retrieved chunks, with cited sources. Everything is
//! stored in a single SQLite database.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────┐   ┌──────────┐
//! │  Files   │──▶│  Pipeline              │──▶│  SQLite   │
//! │ txt/pdf  │   │ Extract+Chunk+Embed   │   │ docs+vec │
//! └──────────┘   └───────────────────────┘   └────┬─────┘
//!                                                 │
//!                             ┌───────────────────┤
//!                             ▼                   ▼
//!                        ┌──────────┐       ┌──────────┐
//!                        │   CLI    │       │   HTTP   │
//!                        │  (docq)  │       │  (REST)  │
//!                        └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docq init                       # create database
//! docq add notes.txt              # register and process a file
//! docq search "error budgets"     # semantic search
//! docq ask "what is our SLO?"     # grounded answer with sources
//! docq serve                      # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`documents`] | Document store and lifecycle |
//! | [`extract`] | Text extraction (plain text, PDF) |
//! | [`chunker`] | Text chunking |
//! | [`embedding`] | Embedding provider and batch orchestration |
//! | [`vector_index`] | Vector storage and similarity search |
//! | [`pipeline`] | Background ingestion pipeline |
//! | [`generation`] | LLM generation provider |
//! | [`query`] | Search and question answering |
//! | [`server`] | HTTP API server |

pub mod chunker;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod server;
pub mod vector_index;
