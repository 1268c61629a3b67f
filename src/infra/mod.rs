pub mod compress;
pub mod config;
pub mod keys;
pub mod logging;
pub mod memory_repo;
pub mod postgres_repo;
pub mod rate_limit;
pub mod reqwest_http;
pub mod system_clock;
