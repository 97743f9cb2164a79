//! ACARS message recorder
//!
//! Receives decoded ACARS messages as UDP datagrams, stores them in SQLite
//! and serves filtered queries, statistics and bulk exports over HTTP.

pub mod api;
pub mod config;
pub mod database;
pub mod dataset;
pub mod errors;
pub mod export;
pub mod filter;
pub mod listener;
pub mod models;
pub mod query;
pub mod reassembly;
pub mod statistics;
