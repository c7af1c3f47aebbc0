//! Argument-keyed query cache engine with request deduplication,
//! subscription-counted expiry, tag invalidation, and optimistic mutations.

pub mod cache;
pub mod config;
pub mod demo;
pub mod domain;
pub mod infra;
pub mod source;
