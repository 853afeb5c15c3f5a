//! Sequential traversal of paginated controller collections.

use futures::stream::{Stream, TryStreamExt};
use futures::Future;
use serde::Deserialize;

use crate::errors::{ClientError, Result};

/// A response shape that exposes a total-page count and a page of resources.
pub trait Paginated {
    /// Element type of the collection.
    type Resource;

    /// Total number of pages, as reported by this page's response.
    fn total_pages(&self) -> Option<u32>;

    /// Consumes the page, yielding its resources in response order.
    fn resources(self) -> Vec<Self::Resource>;
}

/// Wire shape of a controller collection page.
#[derive(Debug, Clone, Deserialize)]
pub struct PageResponse<T> {
    /// Total number of resources across all pages.
    pub total_results: Option<u64>,
    /// Total number of pages.
    pub total_pages: Option<u32>,
    /// URL of the previous page, if any.
    pub prev_url: Option<String>,
    /// URL of the next page, if any.
    pub next_url: Option<String>,
    /// The resources on this page.
    #[serde(default = "Vec::new")]
    pub resources: Vec<T>,
}

impl<T> Paginated for PageResponse<T> {
    type Resource = T;

    fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }

    fn resources(self) -> Vec<T> {
        self.resources
    }
}

/// Produces a single ordered, lazy sequence of all collection elements across
/// all pages.
///
/// `fetch` is called with 1-based page numbers, strictly sequentially. A page
/// that reports no total-page count terminates the sequence with a protocol
/// error rather than silently yielding a partial result; the count is re-read
/// from every page in case the server's answer changes mid-traversal. Any
/// fetch failure terminates the sequence with that failure; already-emitted
/// elements remain valid. Dropping the stream stops issuing page requests.
pub fn paginate<P, T, F, Fut>(fetch: F) -> impl Stream<Item = Result<T>>
where
    P: Paginated<Resource = T>,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<P>>,
{
    futures::stream::try_unfold(
        (1u32, None::<u32>, fetch),
        |(page, known_total, mut fetch)| async move {
            if let Some(total) = known_total {
                if page > total {
                    return Ok(None);
                }
            }

            let response = fetch(page).await?;
            let total = response.total_pages().ok_or_else(|| {
                ClientError::protocol("paginated response reports no total-page count")
            })?;
            let items = futures::stream::iter(response.resources().into_iter().map(Ok));

            Ok(Some((items, (page + 1, Some(total), fetch))))
        },
    )
    .try_flatten()
}

/// Collects a paginated traversal into a vector.
pub async fn paginate_collect<P, T, F, Fut>(fetch: F) -> Result<Vec<T>>
where
    P: Paginated<Resource = T>,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<P>>,
{
    paginate(fetch).try_collect().await
}
