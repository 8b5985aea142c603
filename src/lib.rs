//! # Cardex
//!
//! A local-first business card collection with AI field extraction.
//!
//! Cardex takes a photo of a business card, asks a vision model to read the
//! contact fields and locate the portrait, crops the portrait out, and keeps
//! the resulting cards in a small SQLite key-value store. Cards can be
//! searched, grouped by industry, edited, and exported to or imported from
//! JSON backups.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │ FrameSource │──▶│  Extract +  │──▶│   Form   │
//! │ file/stdin  │   │    Crop     │   │  draft   │
//! └─────────────┘   └─────────────┘   └────┬─────┘
//!                                          │ save
//!                                          ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │◀─────▶│  SQLite  │
//!                 │ (cardex) │       │    kv    │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cardex init                       # create database
//! cardex key set <GEMINI_API_KEY>   # store the extraction credential
//! cardex scan card.jpg              # scan, extract, crop, save
//! cardex list --search gmail        # grouped listing
//! cardex export                     # ai-card-backup-<date>.json
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed error enums |
//! | [`store`] | Persistent key-value store |
//! | [`repository`] | Card collection operations |
//! | [`extract`] | AI field extraction |
//! | [`crop`] | Portrait cropping |
//! | [`capture`] | Frame sources and capture sessions |
//! | [`controller`] | View state machine and scan pipeline |
//! | [`theme`] | Theme preference |
//! | [`credential`] | API key management |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod capture;
pub mod config;
pub mod controller;
pub mod credential;
pub mod crop;
pub mod db;
pub mod edit_cmd;
pub mod error;
pub mod export;
pub mod extract;
pub mod get;
pub mod import;
pub mod list;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod repository;
pub mod scan_cmd;
pub mod stats;
pub mod store;
pub mod theme;
