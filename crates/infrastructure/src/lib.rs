pub mod database;
pub mod observability;
pub mod worker_client;

pub use database::*;
pub use observability::*;
pub use worker_client::HttpWorkerClient;
