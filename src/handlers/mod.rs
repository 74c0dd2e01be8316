// src/handlers/mod.rs
pub mod batch;
pub mod error;
pub mod extract;
pub mod reconcile;
