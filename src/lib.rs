//! Certification Anchor Service: batches pending anchor requests into a
//! Merkle tree, commits the root to a blockchain transaction, and
//! publishes per-stream anchor commits and witnesses into a
//! content-addressed store.

pub mod app;
pub mod block_store;
pub mod cidutil;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod event_emitter;
pub mod merkle;
pub mod orchestrator;
pub mod secret;
pub mod witness;
