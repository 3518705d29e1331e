pub mod answer;
pub mod catalog_service;
pub mod connection_pool;
pub mod database; // PostgreSQL and MySQL data store adapters
pub mod fusion;
pub mod llm_service;
pub mod pipeline;
pub mod planner;
pub mod query_service;
pub mod router;
pub mod session;
pub mod synthesis;

pub use catalog_service::{DatabaseCatalog, SchemaCatalog};
pub use connection_pool::*;
pub use llm_service::*;
pub use pipeline::{QueryPipeline, TurnFailure};
pub use query_service::*;
pub use session::{SessionManager, SessionSummary};
