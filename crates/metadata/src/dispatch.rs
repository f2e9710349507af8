use std::sync::Arc;

use henmeta_core::{FetchedPage, LanguageCode, TransportError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::SearchError;
use crate::config::SiteProfile;
use crate::transport::Transport;

/// Builds catalog requests and validates what the transport returns.
/// Never retries.
#[derive(Clone)]
pub struct QueryDispatcher {
    transport: Arc<dyn Transport>,
    site: SiteProfile,
}

impl QueryDispatcher {
    pub fn new(transport: Arc<dyn Transport>, site: SiteProfile) -> Self {
        Self { transport, site }
    }

    pub fn site(&self) -> &SiteProfile {
        &self.site
    }

    /// Run the site's search-by-id for `code` in `language`.
    pub async fn search_by_code(
        &self,
        code: &str,
        language: &LanguageCode,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, SearchError> {
        let url = self.site.search_url(language, code)?;
        debug!(code, language = %language, url = %url, "searching by code");
        Ok(self.fetch_page(&url, cancel).await?)
    }

    /// Fetch one page, failing on cancellation, transport errors and non-2xx
    /// statuses.
    pub async fn fetch_page(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        // A response that is already complete wins over a concurrent cancel
        let page = tokio::select! {
            biased;
            result = self.transport.fetch(url) => result?,
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
        };

        if !page.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: page.status,
            });
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FixtureTransport;

    const SEARCH_URL: &str = "http://www.javlibrary.com/en/vl_searchbyid.php?keyword=LOVE-049";

    fn dispatcher(transport: FixtureTransport) -> (QueryDispatcher, Arc<FixtureTransport>) {
        let transport = Arc::new(transport);
        (
            QueryDispatcher::new(transport.clone(), SiteProfile::default()),
            transport,
        )
    }

    #[tokio::test]
    async fn search_returns_final_page() {
        let (d, _) = dispatcher(FixtureTransport::new().with_redirect(
            SEARCH_URL,
            "http://www.javlibrary.com/en/?v=javli",
            "body",
        ));

        let page = d
            .search_by_code("LOVE-049", &LanguageCode::new("en"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(page.final_url, "http://www.javlibrary.com/en/?v=javli");
    }

    #[tokio::test]
    async fn non_success_status_is_transport_error() {
        let (d, _) = dispatcher(FixtureTransport::new());

        let err = d
            .search_by_code("LOVE-049", &LanguageCode::new("en"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SearchError::Transport(TransportError::Status {
                url: SEARCH_URL.into(),
                status: 404
            })
        );
    }

    #[tokio::test]
    async fn cancelled_token_skips_fetch() {
        let (d, transport) = dispatcher(FixtureTransport::new().with_page(SEARCH_URL, "body"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = d
            .search_by_code("LOVE-049", &LanguageCode::new("en"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, SearchError::Transport(TransportError::Cancelled));
        assert!(transport.requests().is_empty());
    }
}
