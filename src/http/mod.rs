//! Operator-facing HTTP edge: thin controllers over the charging core,
//! the session registry and the command dispatcher.

pub mod auth_handlers;
pub mod common;
pub mod monitoring;
pub mod router;
pub mod sessions;
pub mod stations;
pub mod tariffs;
pub mod tenants;
pub mod users;

pub use common::{ApiResponse, ValidatedJson};
pub use router::{create_api_router, AppState};
