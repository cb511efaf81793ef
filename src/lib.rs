//! # Journal
//!
//! A fitness journal backend that answers list queries for exercises and
//! workouts from two stores. A denormalized document store serves the
//! expanded (`include=…`) shape quickly; the relational store is the source
//! of truth and answers everything else, including any read the document
//! store cannot finish inside its time budget.
//!
//! ## Architecture
//!
//! ```text
//!              ┌──────────────┐
//!  writes ───▶ │  Relational  │ ──── sync ────┬──────────────┐
//!              │  (SQLite)    │               ▼              ▼
//!              └──────┬───────┘      ┌────────────────┐ ┌──────────┐
//!                     │              │ Document store │ │  Search  │
//!                     │ fallback     │ (JSON in SQLite)│ │  (FTS5)  │
//!                     │              └───────┬────────┘ └────┬─────┘
//!                     ▼                      ▼ fast path     │ candidate ids
//!              ┌──────────────────────────────────────────────┴─┐
//!              │                   Aggregator                   │
//!              └───────────────────────┬────────────────────────┘
//!                               ┌──────┴──────┐
//!                               ▼             ▼
//!                          ┌─────────┐   ┌─────────┐
//!                          │   CLI   │   │  HTTP   │
//!                          └─────────┘   └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! journal init
//! journal seed fixtures/journal.json
//! journal sync documents all
//! journal sync search all
//! journal list exercises --include muscles
//! journal serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | SQLite pool setup for both stores |
//! | [`migrate`] | Schema migrations |
//! | [`models`] | Rows, responses, and documents |
//! | [`query`] | List parameters: ids, filters, sorting, paging, includes |
//! | [`relational`] | Relational reads and batch lookups |
//! | [`join`] | Building documents and projecting them to responses |
//! | [`document`] | Document store abstraction and backends |
//! | [`search`] | Full-text candidate lookup |
//! | [`aggregator`] | Fast path / fallback read orchestration |
//! | [`sync`] | Rebuilding the document store and search index |
//! | [`write`] | Create, update, and delete operations |
//! | [`seed`] | JSON fixture loading |
//! | [`renewal`] | Subscription renewal-date arithmetic |
//! | [`server`] | HTTP API |
//! | [`error`] | Domain error kinds |

pub mod aggregator;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod join;
pub mod migrate;
pub mod models;
pub mod query;
pub mod relational;
pub mod renewal;
pub mod search;
pub mod seed;
pub mod server;
pub mod sync;
pub mod write;
