//! Faculty graduation ranking: department list intake, aggregation into a
//! single GPA-ordered ranking, and publication of the result.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod export;
pub mod guard;
pub mod intake;
pub mod models;
pub mod notice;
pub mod parse;
pub mod publisher;
pub mod session;
pub mod workflow;
