pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod models;
pub mod performance;
pub mod response;
pub mod routes;
pub mod schema;
pub mod seed;
pub mod state;
pub mod status;
pub mod sync;
pub mod utils;

pub use sync::{default_jobs, SyncJob, SyncReport, SyncRunner};
