//! Source archive retrieval.

pub mod download;
pub mod extract;
