//! Credential issuance for identities.

pub mod firebase;
pub mod mock;
pub mod service_account;

pub use firebase::{FirebaseTokenConfig, FirebaseTokenProvider, DEFAULT_EXCHANGE_URL};
pub use mock::MockTokenProvider;
pub use service_account::ServiceAccountKey;
