//! # OAI-PMH Responder
//!
//! An OAI-PMH 2.0 endpoint that lets metadata harvesters pull records from
//! an institutional repository catalog.
//!
//! Harvesters send one of six verbs with form-encoded arguments. The
//! responder validates them, queries the catalog, crosswalks item metadata
//! into the requested format, and answers with an XML document. Long lists
//! are paginated with stateless resumption tokens.
//!
//! ## Architecture
//!
//! ```text
//!              ┌──────────────┐   ┌───────────┐   ┌──────────┐
//!  HTTP/CLI ──▶│  validate    │──▶│ responder │──▶│ assemble │──▶ XML
//!              │ (3 phases)   │   │ dispatch  │   │ + formats│
//!              └──────┬───────┘   └─────┬─────┘   └──────────┘
//!                     │                 │
//!                     ▼                 ▼
//!               ┌─────────────────────────────┐
//!               │ Catalog (SQLite / in-memory)│
//!               └─────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! oai init                          # create database
//! oai import ./data/catalog.json    # load collections and items
//! oai serve                         # start HTTP endpoint
//! curl 'http://localhost:7410/oai-pmh?verb=Identify'
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`protocol`] | Verbs, error codes, arguments, datestamps |
//! | [`identifier`] | Handles, OAI identifiers, setSpecs |
//! | [`validate`] | Argument validation |
//! | [`query`] | Selective-harvest criteria |
//! | [`resumption`] | Resumption token codec |
//! | [`formats`] | Metadata formats and crosswalks |
//! | [`assemble`] | Response documents |
//! | [`xml`] | XML writer |
//! | [`responder`] | Request pipeline |
//! | [`catalog`] | Catalog trait |
//! | [`catalog_memory`] | In-memory catalog |
//! | [`catalog_sqlite`] | SQLite catalog |
//! | [`institution`] | Host-based institution resolution |
//! | [`server`] | HTTP server |
//! | [`import`] | JSON catalog import |
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Infrastructure error taxonomy |
//! | [`models`] | Core data types |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod assemble;
pub mod catalog;
pub mod catalog_memory;
pub mod catalog_sqlite;
pub mod config;
pub mod db;
pub mod error;
pub mod formats;
pub mod identifier;
pub mod import;
pub mod institution;
pub mod migrate;
pub mod models;
pub mod protocol;
pub mod query;
pub mod responder;
pub mod resumption;
pub mod server;
pub mod validate;
pub mod xml;
