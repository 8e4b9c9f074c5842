pub mod assistant;
pub mod auth;
pub mod connection_manager;
pub mod error;
pub mod performance_log;
pub mod query_library;
pub mod query_runner;
pub mod result_cache;
pub mod results_buffer;
pub mod role_guard;
pub mod schema_cache;
pub mod session;
pub mod settings;
pub mod sql_text;
