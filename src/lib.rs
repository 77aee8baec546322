//! # codelink
//!
//! Keeps a searchable, per-project index of GitHub repositories and answers
//! developer and client questions about their code.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────────┐
//! │  GitHub  │──▶│    Sync     │──▶│ VectorStore  │
//! │ webhooks │   │ Chunk+Embed │   │ (per project)│
//! └──────────┘   └─────────────┘   └──────┬───────┘
//!                                         │
//!                    ┌────────────────────┤
//!                    ▼                    ▼
//!              ┌──────────┐        ┌────────────┐
//!              │ Accounts │        │    Chat    │
//!              │  (HTTP)  │        │ RAG + LLM  │
//!              └──────────┘        └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`projects`] | Projects, clients, users and documentation records |
//! | [`github`] | GitHub REST client |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store backends |
//! | [`sync`] | Change-set sync into the vector store |
//! | [`retriever`] | Project-scoped retrieval |
//! | [`llm`] / [`prompts`] / [`memory`] | Chat model, prompt assembly, conversation memory |
//! | [`analysis`] / [`chat`] | Analysis routines and the chat dispatcher |
//! | [`webhook`] / [`accounts`] / [`server`] | HTTP surface |

pub mod accounts;
pub mod analysis;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod github;
pub mod llm;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod projects;
pub mod prompts;
pub mod retriever;
pub mod server;
pub mod services;
pub mod store;
pub mod sync;
pub mod webhook;
