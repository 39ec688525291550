pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod jobs;
pub mod license_file;
pub mod licensing;
pub mod middleware;
pub mod models;
pub mod pagination;
pub mod util;
