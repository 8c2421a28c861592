//! Vigil server: SQLite-backed vault store and the sweep daemon.

pub mod config;
pub mod daemon;
pub mod db;
