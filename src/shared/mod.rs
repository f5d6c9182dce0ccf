pub mod error;
pub mod models;
pub mod schema;
pub mod state;
pub mod utils;

pub use error::ServiceError;
pub use models::{Queue, User, UserRole};
pub use state::AppState;
pub use utils::{create_conn, DbPool};
