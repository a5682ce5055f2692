//! Hybrid job recommendation engine.
//!
//! Ranks job postings for a user by embedding similarity (skill space and summary
//! space), nudged toward jobs the user liked, then lets an LLM pick and explain the
//! final shortlist. See `service::MatchService` for the upward-facing operation.

pub mod completion;
pub mod config;
pub mod embedding;
pub mod enrichment;
pub mod errors;
pub mod feedback;
pub mod inflight;
pub mod logging;
pub mod profile;
pub mod recommend;
pub mod rerank;
pub mod retry;
pub mod search;
pub mod service;
pub mod store;
pub mod vector;
