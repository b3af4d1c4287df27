//! # DocBot
//!
//! A tenant-isolated retrieval and escalation engine for community support
//! bots.
//!
//! DocBot ingests project documentation per tenant (one community per
//! tenant), retrieves grounding context for incoming questions via
//! embedding similarity with a confidence gate, tracks per-user repeat
//! questions through an escalating-response state machine, and orchestrates
//! answers through a pluggable LLM backend. Chat connectors (Discord,
//! Telegram, web widgets) talk to it over a JSON HTTP gateway or embed it
//! as a library.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │   Ingest    │──▶│ Chunk+Embed  │──▶│  SQLite   │
//! │ CLI / HTTP  │   │              │   │  + index  │
//! └─────────────┘   └──────────────┘   └─────┬─────┘
//!                                            │
//!          ┌────────────┐   ┌───────────┐    │
//! ask ────▶│ Rate limit │──▶│ Retrieve  │◀───┘
//!          │ + repeats  │   │ (gated)   │
//!          └─────┬──────┘   └─────┬─────┘
//!                │                ▼
//!                │          ┌───────────┐
//!                └─────────▶│    LLM    │──▶ reply
//!                           └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docbot init                                    # create database
//! docbot ingest acme docs/staking.md             # load docs for a tenant
//! docbot ask acme alice "how long to unstake?"   # one-off question
//! docbot serve                                   # start the HTTP gateway
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Deterministic text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory per-tenant vector index |
//! | [`ingest`] | Document ingestion pipeline |
//! | [`retrieve`] | Similarity retrieval and topic fingerprints |
//! | [`escalate`] | Repeat-question escalation state machine |
//! | [`ratelimit`] | Per-user question cooldowns |
//! | [`llm`] | LLM completion clients |
//! | [`answer`] | Answer orchestration ([`answer::Engine`]) |
//! | [`server`] | HTTP gateway |
//! | [`db`] | Database connection |
//! | [`store`] | SQLite persistence |
//! | [`migrate`] | Schema migrations |
//! | [`error`] | Engine error taxonomy |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod escalate;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod ratelimit;
pub mod retrieve;
pub mod server;
pub mod store;
