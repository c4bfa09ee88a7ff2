//! Identity provider connectors.

pub mod firebase;
pub mod mock;

pub use firebase::{FirebaseIdentityConfig, FirebaseIdentityProvider, DEFAULT_IDENTITY_BASE_URL};
pub use mock::MockIdentityProvider;
