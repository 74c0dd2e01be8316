// src/services/mod.rs
pub mod calculations;
pub mod calendar;
pub mod chart;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod labels;
pub mod markup;
pub mod merge;
pub mod pipeline;
pub mod reconcile;
pub mod row;
pub mod scale;
pub mod table;
