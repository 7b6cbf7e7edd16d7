//! Persistent semantic memory for AI agents.
//!
//! memex stores unstructured notes ("memories") tagged by a small type
//! taxonomy and scoped to an owner+project, and retrieves them with hybrid
//! semantic + lexical search. Every write runs through two-stage conflict
//! detection — a vector shortlist over memory-level embeddings, then LLM
//! arbitration — and versions the outcome, so a memory is either created,
//! updated in place (with a snapshot), or skipped.
//!
//! # Architecture
//!
//! - **Storage**: PostgreSQL with [pgvector](https://github.com/pgvector/pgvector)
//!   for HNSW cosine search and `to_tsvector('simple', …)` full-text search
//! - **Retrieval**: vector + substring + FTS sub-searches fused by weighted
//!   Reciprocal Rank Fusion, deduplicated per memory, optionally reranked
//! - **Providers**: embedding and LLM capabilities behind traits, each with a
//!   deterministic `mock` implementation for hermetic tests
//! - **Transport**: MCP (stdio or streamable HTTP) plus a REST mirror
//!
//! # Modules
//!
//! - [`config`] — TOML configuration and environment overrides
//! - [`db`] — PostgreSQL DAO: schema, writes, sub-searches, aggregations
//! - [`chunking`] — deterministic rune windowing
//! - [`embedding`] / [`llm`] — provider abstractions
//! - [`memory`] — the core engine: ingest, search, history, index, metrics
//! - [`server`] / [`tools`] — HTTP and MCP surfaces

pub mod app;
pub mod chunking;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod memory;
pub mod server;
pub mod tools;
