//! Pagination shared by the YouTube list endpoints.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio_stream::Stream;

/// One page of results plus the token for the page after it.
pub type Page<T> = (VecDeque<T>, Option<String>);

type PendingPage<'a, F, T> = Pin<Box<dyn Future<Output = eyre::Result<(F, Page<T>)>> + 'a + Send>>;

/// Walks a `nextPageToken`-paginated list endpoint, yielding one item at a time.
///
/// The first page is always requested, so an empty result set still costs exactly one
/// call and then ends the stream. Paging stops at the first response without a
/// continuation token, or at the first error (which is yielded once).
pub struct PagedStream<'a, T, F> {
    buffered: VecDeque<T>,
    pending: Option<PendingPage<'a, F, T>>,
    pages_fetched: usize,
    what: &'static str,
}

impl<'a, T, F> PagedStream<'a, T, F> {
    /// Starts paging with `fetcher(None)`; `what` names the resource in progress logs.
    pub fn new<Fut>(what: &'static str, fetcher: F) -> Self
    where
        F: Fn(Option<String>) -> Fut,
        F: Send + 'a,
        Fut: Future<Output = eyre::Result<Page<T>>> + Send + 'a,
    {
        let first = async move {
            let page = fetcher(None).await?;
            Ok((fetcher, page))
        };
        Self {
            buffered: VecDeque::new(),
            pending: Some(Box::pin(first)),
            pages_fetched: 0,
            what,
        }
    }
}

impl<T: Unpin, F> Unpin for PagedStream<'_, T, F> {}

impl<'a, T: Unpin, F, Fut> Stream for PagedStream<'a, T, F>
where
    F: Fn(Option<String>) -> Fut,
    F: Send + 'a,
    Fut: Future<Output = eyre::Result<Page<T>>> + Send + 'a,
{
    type Item = eyre::Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }

            let Some(pending) = self.pending.as_mut() else {
                return Poll::Ready(None);
            };

            match pending.as_mut().poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => {
                    self.pending = None;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(Ok((fetcher, (items, next_token)))) => {
                    self.pages_fetched += 1;
                    tracing::info!(
                        what = self.what,
                        page = self.pages_fetched,
                        items = items.len(),
                        more = next_token.is_some(),
                        "fetched page"
                    );
                    self.buffered.extend(items);
                    self.pending = next_token.map(|token| -> PendingPage<'a, F, T> {
                        Box::pin(async move {
                            let page = fetcher(Some(token)).await?;
                            Ok((fetcher, page))
                        })
                    });
                }
            }
        }
    }
}

/// Paging details for lists of resources.
///
/// See: <https://developers.google.com/youtube/v3/docs/pageInfo>
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct PageInfo {
    /// The total number of results in the result set.
    #[serde(rename = "totalResults")]
    pub total_results: u32,
    /// The number of results included in the API response.
    #[serde(rename = "resultsPerPage")]
    pub results_per_page: u32,
}
