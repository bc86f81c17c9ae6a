//! # Harborlight
//!
//! Grounded question answering over a curated document archive, with a
//! confidence-gated web-search fallback.
//!
//! Harborlight keeps a remote vector index synchronized with a zip archive
//! of documents (plain text, markdown, PDF), answers questions grounded on
//! retrieved context, and falls back to a web search when the model flags
//! its own answer as uncertain. Every answer discloses its provenance:
//! `knowledge_base` or `web_search`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Zip archive │──▶│   Pipeline   │──▶│ Vector index │
//! │ txt/md/pdf  │   │ Chunk+Embed  │   │ (REST/memory)│
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!        │                                     │
//!   fingerprint                          ┌─────┴──────┐
//!   (skip when                           ▼            ▼
//!    unchanged)                    ┌──────────┐  ┌──────────┐
//!                                  │   CLI    │  │   HTTP   │
//!                                  │ (harbor) │  │ (axum)   │
//!                                  └──────────┘  └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harbor sync                         # index the archive (if changed)
//! harbor ask "what does vitamin c do?"
//! harbor status                       # is the index up to date?
//! harbor serve                        # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`fingerprint`] | Archive change detection (SHA-256 + sidecar state) |
//! | [`loader`] | Zip extraction and text parsing |
//! | [`chunk`] | Deterministic overlapping chunking with stable IDs |
//! | [`embedding`] | Embedding service client |
//! | [`index`] | Vector index backends and the index manager |
//! | [`generate`] | Chat-completion client for answer generation |
//! | [`websearch`] | Web search fallback |
//! | [`orchestrator`] | The answer pipeline with its confidence gate |
//! | [`update`] | Knowledge-base synchronization |
//! | [`server`] | JSON HTTP server |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod fingerprint;
pub mod generate;
pub mod index;
pub mod loader;
pub mod models;
pub mod orchestrator;
pub mod server;
pub mod update;
pub mod websearch;
