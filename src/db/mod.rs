//! Storage collaborators

pub mod sqlite;
