//! # Catalog Harvest
//!
//! A scraping, deduplication, and semantic indexing pipeline for university
//! course catalogs.
//!
//! Catalog Harvest walks a catalog site department by department, extracts
//! structured course records from detail pages (embedded JSON where the site
//! provides it, labeled HTML otherwise), embeds each course's text, and
//! reconciles the result against SQLite. Re-scraped courses whose content is
//! semantically unchanged are skipped with only their semester metadata
//! merged; changed courses are updated in place. Nothing is ever deleted by
//! a sync.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌───────────┐   ┌──────────┐   ┌────────────┐
//! │ Fetcher │──▶│ Extractor │──▶│ Embedder │──▶│ Dedup/Diff │
//! └─────────┘   └───────────┘   └──────────┘   └─────┬──────┘
//!                                                    │
//!                                              ┌─────▼──────┐
//!                                              │   Store    │
//!                                              │  (SQLite)  │
//!                                              └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harvest init                              # create database
//! harvest sync cmpe --semester "Fall 2025"  # scrape one department
//! harvest sync all                          # every department and semester
//! harvest search "machine learning"
//! harvest course CMPE211
//! harvest embed pending                     # backfill missing vectors
//! harvest stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`fetch`] | Listing and detail page retrieval with retry |
//! | [`extract`] | JSON and HTML course page parsing |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`dedup`] | Similarity-based new/update/skip decisions |
//! | [`store`] | Relational-first commit with vector saga |
//! | [`pipeline`] | Batch orchestration and reporting |
//! | [`search`] | Semantic search over stored courses |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod dedup;
pub mod embed_cmd;
pub mod embedding;
pub mod extract;
pub mod fetch;
pub mod get;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod stats;
pub mod store;
