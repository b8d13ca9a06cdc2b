//! End-to-end tests wiring real workers to SQLite-backed stores and a
//! scripted platform client

pub mod pipeline_test;
pub mod scheduler_test;
