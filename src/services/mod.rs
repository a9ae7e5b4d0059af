//! Business logic that sits between the HTTP handlers and the database.

pub mod project;
