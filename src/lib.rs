//! Pricebook: a small CRUD service for priced items backed by Postgres,
//! with a Redis cache in front of the read paths.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
