//! Remote resource API connectors.

pub mod api;
pub mod mock;

pub use api::{ResourceApiConfig, ResourceApiConnector};
pub use mock::{MockResourceClient, RecordedCall, ResourceCall};
