//! Application services layer scaffolding.

pub mod cache;
pub mod error;
pub mod items;
pub mod store;
