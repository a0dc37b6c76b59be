//! # Onboard RAG
//!
//! A retrieval-augmented onboarding assistant: it ingests an institution's
//! web pages and documents into a local vector index and answers newcomers'
//! questions from that index, with per-session conversational memory.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │   Loader    │──▶│   Chunker   │──▶│ Vector index │
//! │ web/pdf/... │   │ token spans │   │   (SQLite)   │
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │ MMR
//!            ┌──────────────┐         ┌──────▼───────┐
//!            │ Chat memory  │◀───────▶│  Generator   │
//!            │   (SQLite)   │         │ rewrite+LLM  │
//!            └──────────────┘         └──────┬───────┘
//!                                  ┌─────────┴────────┐
//!                                  ▼                  ▼
//!                             ┌─────────┐        ┌─────────┐
//!                             │   CLI   │        │  HTTP   │
//!                             │(onboard)│        │ (axum)  │
//!                             └─────────┘        └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GOOGLE_API_KEY=...
//! onboard init
//! onboard index https://www.iiitb.ac.in/ docs/handbook.pdf
//! onboard ask "How do I get a hostel room?" --user alice
//! onboard serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`app`] | Wiring shared by the CLI and server |
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Library error type and categories |
//! | [`models`] | Core data types |
//! | [`loader`] | Source classification and document loading |
//! | [`extract`] | PDF, OOXML and HTML text extraction |
//! | [`tokenize`] | Tokenizers used for chunk boundaries |
//! | [`chunk`] | Token-bounded overlapping chunks |
//! | [`gemini`] | Shared Gemini REST client |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Chat model abstraction |
//! | [`index`] | Persistent vector index |
//! | [`search`] | Similarity and MMR selection |
//! | [`handle`] | Swappable reference to the active index |
//! | [`ingest`] | Indexing pipeline and cold-start manifest |
//! | [`reformulate`] | Standalone query rewriting |
//! | [`memory`] | Per-session chat history |
//! | [`generate`] | Retrieval-augmented answer generation |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod app;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod gemini;
pub mod generate;
pub mod handle;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod reformulate;
pub mod search;
pub mod server;
pub mod tokenize;
