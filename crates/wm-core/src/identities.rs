//! Full, deduplicated identity enumeration.

use crate::error::{MigrationError, MigrationResult, Operation};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use wm_connectors::{Identity, IdentityProvider};

/// Default provider page size.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Materialises every identity of a provider before a run starts.
pub struct IdentitySource {
    provider: Arc<dyn IdentityProvider>,
    page_size: usize,
}

impl IdentitySource {
    pub fn new(provider: Arc<dyn IdentityProvider>, page_size: usize) -> Self {
        Self {
            provider,
            page_size: page_size.max(1),
        }
    }

    /// Follows the cursor until the provider returns none.
    ///
    /// Identities repeated across pages are kept once, at their first
    /// position. A cursor that repeats is treated as an enumeration failure
    /// rather than looping forever.
    pub async fn list_all(&self) -> MigrationResult<Vec<Identity>> {
        let mut identities = Vec::new();
        let mut seen = HashSet::new();
        let mut cursors = HashSet::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .provider
                .list_page(self.page_size, cursor.as_deref())
                .await
                .map_err(|e| MigrationError::classify(Operation::Enumeration, &e))?;
            pages += 1;
            debug!(page = pages, count = page.identities.len(), "Fetched identity page");

            for identity in page.identities {
                if seen.insert(identity.id.clone()) {
                    identities.push(identity);
                } else {
                    warn!(identity_id = %identity.id, "Duplicate identity across pages");
                }
            }

            match page.next_cursor {
                Some(next) => {
                    if !cursors.insert(next.clone()) {
                        return Err(MigrationError::Enumeration(format!(
                            "Provider repeated cursor '{}'",
                            next
                        )));
                    }
                    cursor = Some(next);
                }
                None => break,
            }
        }

        info!(
            total = identities.len(),
            pages = pages,
            "Enumerated identities"
        );
        Ok(identities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wm_connectors::testing::{sample_identities, sample_identity};
    use wm_connectors::MockIdentityProvider;

    #[tokio::test]
    async fn test_follows_all_pages() {
        let provider = Arc::new(MockIdentityProvider::paged("mock", sample_identities(7), 3));
        let source = IdentitySource::new(provider.clone(), 3);

        let identities = source.list_all().await.unwrap();
        assert_eq!(identities.len(), 7);
        assert_eq!(identities[6].id, "user-0006");
        assert_eq!(provider.requests().await.len(), 3);
    }

    #[tokio::test]
    async fn test_deduplicates_overlapping_pages() {
        let provider = Arc::new(MockIdentityProvider::with_pages(
            "mock",
            vec![
                vec![sample_identity("a"), sample_identity("b")],
                vec![sample_identity("b"), sample_identity("c")],
            ],
        ));
        let identities = IdentitySource::new(provider, 2).list_all().await.unwrap();
        let ids: Vec<_> = identities.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_empty_provider() {
        let provider = Arc::new(MockIdentityProvider::new("mock"));
        assert!(IdentitySource::new(provider, 10)
            .list_all()
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_page_failure_is_enumeration_error() {
        let provider = Arc::new(MockIdentityProvider::paged("mock", sample_identities(4), 2));
        provider.fail_on_page(1).await;
        let result = IdentitySource::new(provider, 2).list_all().await;
        assert!(matches!(result, Err(MigrationError::Enumeration(_))));
    }
}
