//! Cross-cutting utilities: errors, OCPP-J framing, shutdown, pagination.

pub mod errors;
pub mod ocpp_frame;
pub mod pagination;
pub mod shutdown;

pub use errors::{DomainError, DomainResult, OcppError};
pub use ocpp_frame::{OcppErrorCode, OcppFrame, OcppFrameError};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
