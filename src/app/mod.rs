//! Application layer: the transactional dispatcher and the statements it runs.

pub mod database_service;
pub mod dispatcher;
pub mod query_builder;
