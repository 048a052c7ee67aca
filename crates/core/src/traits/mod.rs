pub mod dataset;
pub mod repository;
pub mod worker_client;

pub use dataset::*;
pub use repository::*;
pub use worker_client::*;
