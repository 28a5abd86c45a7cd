//! Persistence layer for fitplan: PostgreSQL schema, row models and query
//! functions for profiles, check-ins, plans, job state and attempt logs.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
