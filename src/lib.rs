//! Knowhub backend library / 知识库后端
//!
//! - `search`: projection index, sync engine and multi-type search
//! - `source`: read interface onto notes, documents, todos and the rest
//! - `config`: config.json loading

pub mod config;
pub mod search;
pub mod source;
