pub mod hooks;
pub mod naming;
pub mod operation;
pub mod schema;
