//! Relational persistence

mod database;

pub use database::Database;
