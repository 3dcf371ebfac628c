//! Storage seam: repository traits, the tenant guard hook, and the
//! in-memory adapter. A SQL adapter plugs in behind the same traits.

pub mod guard;
pub mod memory;
pub mod traits;

pub use memory::InMemoryRepositoryProvider;
pub use traits::{
    AuthTokenRepository, ConnectorRepository, RepositoryProvider, SessionRepository,
    StationRepository, TariffRepository, TenantRepository, UserRepository,
};
