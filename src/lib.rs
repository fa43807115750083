//! # Docent
//!
//! A document ingestion and AI-assisted research analysis pipeline.
//!
//! Docent validates uploaded files against an upload policy, extracts their
//! text, and sends the extracted corpus to a remote language model for
//! cross-document analysis (insights, connections, a timeline,
//! contradictions and knowledge gaps) or for question answering. It is
//! exposed as a CLI and as the JSON HTTP API behind a research dashboard.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────────┐   ┌──────────┐
//! │ validate │──▶│  extract  │──▶│ request      │──▶│  client  │
//! │ policy   │   │ text/csv  │   │ prompt+schema│   │ (LLM API)│
//! └──────────┘   └─────┬─────┘   └──────────────┘   └────┬─────┘
//!                      │                                 │
//!                ┌─────▼─────┐                     ┌─────▼─────┐
//!                │ processor │                     │   parse   │
//!                │ store     │                     │ analysis  │
//!                └─────┬─────┘                     └─────┬─────┘
//!                      └──────────────┬──────────────────┘
//!                          ┌──────────┴─────────┐
//!                          ▼                    ▼
//!                     ┌──────────┐        ┌──────────┐
//!                     │   CLI    │        │   HTTP   │
//!                     │ (docent) │        │  (axum)  │
//!                     └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docent validate notes.txt data.csv        # check the upload policy
//! docent extract notes.txt data.csv         # extract text, print JSON
//! docent analyze notes.txt data.csv         # cross-document analysis
//! docent chat "What changed in Q3?" --file notes.txt
//! docent serve                              # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error types |
//! | [`validate`] | Upload policy checks |
//! | [`extract`] | Text extraction strategies |
//! | [`store`] | Upload and processed-file state |
//! | [`processor`] | Concurrent per-file processing |
//! | [`progress`] | Processing progress reporting |
//! | [`request`] | Prompt and request construction |
//! | [`client`] | Completion API client |
//! | [`parse`] | Model reply decoding |
//! | [`analysis`] | Bulk analysis and per-file description |
//! | [`chat`] | Question answering |
//! | [`server`] | Dashboard HTTP API |

pub mod analysis;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod models;
pub mod parse;
pub mod processor;
pub mod progress;
pub mod request;
pub mod server;
pub mod store;
pub mod validate;
