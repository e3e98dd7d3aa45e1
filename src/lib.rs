//! # ragdesk
//!
//! Conversational question answering over a private collection of PDFs,
//! with source citations.
//!
//! PDFs dropped into a data folder are hashed, loaded, split into chunks,
//! embedded, and upserted into a hosted vector index. A content-hash state
//! file makes ingestion idempotent across restarts: a file is only marked
//! processed after its chunks are durably uploaded. Chat turns retrieve the
//! nearest passages, ask a hosted model for an answer, and list one citation
//! per distinct `(source, page)`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  data/   │──▶│ hash+load+   │──▶│ vector index │
//! │  *.pdf   │   │ split+embed  │   │  (Pinecone)  │
//! └──────────┘   └──────┬───────┘   └──────┬───────┘
//!                       │ commit           │ retrieve
//!                       ▼                  ▼
//!               ┌──────────────┐   ┌──────────────┐
//!               │ state.json + │   │  RAG chain + │
//!               │  processed/  │   │  citations   │
//!               └──────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragdesk ingest            # upload new PDFs from ./data
//! ragdesk status            # what has been ingested
//! ragdesk search "refunds"  # raw similarity search
//! ragdesk chat              # ask questions
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`state`] | Content hashing and the persistent processed-file record |
//! | [`citation`] | Citation deduplication and rendering |
//! | [`ingest`] | Ingestion orchestration |
//! | [`loader`] | PDF discovery and page extraction |
//! | [`chunk`] | Recursive character text splitter |
//! | [`embedding`] | Embedding providers |
//! | [`vector_store`] | Vector index backends |
//! | [`llm`] | Generation model client |
//! | [`rag`] | History-aware retrieval chain |
//! | [`chat`] | Terminal chat loop |
//! | [`config`] | TOML + environment configuration |

pub mod chat;
pub mod chunk;
pub mod citation;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod models;
pub mod progress;
pub mod rag;
pub mod search;
pub mod state;
pub mod status;
pub mod vector_store;
