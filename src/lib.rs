pub mod api;
pub mod config;
pub mod engine;
pub mod humanize;
pub mod jobs;
pub mod observability;
pub mod storage;
