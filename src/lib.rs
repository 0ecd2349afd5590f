//! Monthly income and expense grid with hierarchical category rollups.

pub mod cache;
pub mod cli;
pub mod clipboard;
pub mod db;
pub mod error;
pub mod fmt;
pub mod grid;
pub mod models;
pub mod reconcile;
pub mod rollup;
pub mod settings;
pub mod store;
pub mod tree;
