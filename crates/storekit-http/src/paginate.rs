//! "Has more + cursor" pagination

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::HttpError;

/// A page of a paginated response
pub trait Page {
    /// True if the server holds further pages
    fn has_more(&self) -> bool;

    /// Cursor for the next page (revision or pagination token)
    fn cursor(&self) -> Option<&str>;

    /// Cursor to continue with: only when more pages exist and the cursor is non-empty
    fn next_cursor(&self) -> Option<String> {
        if !self.has_more() {
            return None;
        }
        self.cursor()
            .filter(|cursor| !cursor.is_empty())
            .map(str::to_owned)
    }
}

/// Pagination stopped by a failed page
///
/// `pages` holds everything fetched before the failure, in arrival order.
pub struct PaginationError<P, E> {
    /// Pages fetched before the failure
    pub pages: Vec<P>,
    /// The failure
    pub source: E,
}

impl<P, E: fmt::Debug> fmt::Debug for PaginationError<P, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaginationError")
            .field("pages", &self.pages.len())
            .field("source", &self.source)
            .finish()
    }
}

impl<P, E: fmt::Display> fmt::Display for PaginationError<P, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pagination stopped after {} pages: {}",
            self.pages.len(),
            self.source
        )
    }
}

impl<P, E> StdError for PaginationError<P, E>
where
    E: StdError + 'static,
{
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}

/// Fetches pages strictly one after another with a pause between them
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    delay: Duration,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(Duration::from_millis(10))
    }
}

impl Paginator {
    /// Pause `delay` between consecutive page requests
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Pause between pages
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Fetch the first page with no cursor, then keep fetching with the returned
    /// cursor while the last page reports more
    ///
    /// # Errors
    ///
    /// Stops at the first failing page. Cancellation during the pause fails with
    /// [`HttpError::Cancelled`] converted into `E`.
    pub async fn collect<P, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut fetch: F,
    ) -> Result<Vec<P>, PaginationError<P, E>>
    where
        P: Page,
        E: From<HttpError>,
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<P, E>>,
    {
        let mut pages = Vec::new();
        let mut cursor = None;

        loop {
            let page = match fetch(cursor.take()).await {
                Ok(page) => page,
                Err(source) => return Err(PaginationError { pages, source }),
            };
            let next = page.next_cursor();
            pages.push(page);

            let Some(next) = next else {
                debug!(pages = pages.len(), "Pagination complete");
                return Ok(pages);
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(PaginationError {
                        pages,
                        source: E::from(HttpError::Cancelled),
                    });
                }
                () = tokio::time::sleep(self.delay) => {}
            }
            cursor = Some(next);
        }
    }
}
