pub mod manager;
pub mod sqlite;

pub use manager::{DatabaseManager, MIGRATOR};
pub use sqlite::{
    SqliteDatasetRepository, SqliteModelingDetailRepository, SqliteModelingRepository,
    SqliteResourcePool, SqliteTaskRepository, BEST_MODELS_DETAIL,
};
