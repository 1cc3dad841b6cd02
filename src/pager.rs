//! Drains paginated `messages.list` results into a flat id sequence

use async_stream::stream;
use futures::{Stream, StreamExt};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info, warn};

use crate::client::MailboxClient;
use crate::error::Result;
use crate::interrupt::Interrupt;
use crate::models::{MessageFilter, MessageId, MessagePage};
use crate::retry::RetryPolicy;

pub type MessageIdStream<'a> = Pin<Box<dyn Stream<Item = Result<MessageId>> + Send + 'a>>;

/// Lazily walk a paginated listing.
///
/// `fetch_page` is called with no token first, then with each returned
/// continuation token until a page comes back without one. A page error is
/// yielded once and ends the stream.
///
/// The walk also stops, with a warning, when the listing misbehaves:
/// a page carries a token but no ids, a page repeats the previous page's ids
/// (those ids are not yielded twice), or a token comes back a second time.
pub fn paginate<'a, F, Fut>(mut fetch_page: F) -> MessageIdStream<'a>
where
    F: FnMut(Option<String>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<MessagePage>> + Send + 'a,
{
    Box::pin(stream! {
        let mut token: Option<String> = None;
        let mut seen_tokens: HashSet<String> = HashSet::new();
        let mut previous_ids: Option<Vec<MessageId>> = None;
        let mut pages = 0usize;

        loop {
            let page = match fetch_page(token.take()).await {
                Ok(page) => page,
                Err(e) => {
                    yield Err(e);
                    break;
                }
            };
            pages += 1;

            if !page.ids.is_empty() && previous_ids.as_ref() == Some(&page.ids) {
                warn!("Page {} repeated the previous page's ids, stopping pagination", pages);
                break;
            }

            for id in &page.ids {
                yield Ok(id.clone());
            }

            match page.next_page_token {
                None => break,
                Some(_) if page.ids.is_empty() => {
                    warn!("Page {} returned a continuation token but no ids, stopping pagination", pages);
                    break;
                }
                Some(next) => {
                    if !seen_tokens.insert(next.clone()) {
                        warn!("Page token '{}' was returned twice, stopping pagination", next);
                        break;
                    }
                    token = Some(next);
                }
            }

            previous_ids = Some(page.ids);
        }

        debug!("Pagination finished after {} pages", pages);
    })
}

/// Everything one listing produced
#[derive(Debug, Clone)]
pub struct Listing {
    pub filter: MessageFilter,
    pub ids: Vec<MessageId>,
    /// The user interrupted before the last page was read
    pub interrupted: bool,
}

impl Listing {
    /// Only whole-mailbox listings feed the mailbox total; filtered
    /// listings are counted by the action that consumes them
    pub fn counts_toward_total(&self) -> bool {
        matches!(self.filter, MessageFilter::All)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Lists messages through a [`MailboxClient`], retrying each page on
/// rate limits and server errors
pub struct Pager<'a> {
    client: &'a dyn MailboxClient,
    retry: &'a RetryPolicy,
    interrupt: &'a Interrupt,
}

impl<'a> Pager<'a> {
    pub fn new(client: &'a dyn MailboxClient, retry: &'a RetryPolicy, interrupt: &'a Interrupt) -> Self {
        Self {
            client,
            retry,
            interrupt,
        }
    }

    /// Stream ids matching `filter` without collecting them
    pub fn stream<'s>(&'s self, filter: &'s MessageFilter) -> MessageIdStream<'s> {
        let client: &'s dyn MailboxClient = self.client;
        let retry: &'s RetryPolicy = self.retry;
        let interrupt: &'s Interrupt = self.interrupt;

        paginate(move |token| async move {
            retry
                .with_retry("messages.list", interrupt, || client.list_messages(filter, token.clone()))
                .await
        })
    }

    /// Collect every id matching `filter`
    pub async fn list(&self, filter: &MessageFilter) -> Result<Listing> {
        let mut ids = Vec::new();
        let mut interrupted = false;

        {
            let mut stream = self.stream(filter);
            while let Some(item) = stream.next().await {
                if self.interrupt.is_set() {
                    interrupted = true;
                    break;
                }
                ids.push(item?);
            }
        }

        if interrupted {
            warn!("Listing {} interrupted after {} messages", filter, ids.len());
        } else {
            info!("Found {} messages matching {}", ids.len(), filter);
        }

        Ok(Listing {
            filter: filter.clone(),
            ids,
            interrupted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GmailError;
    use futures::TryStreamExt;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    fn page(ids: &[&str], token: Option<&str>) -> MessagePage {
        MessagePage {
            ids: ids.iter().map(|s| s.to_string()).collect(),
            next_page_token: token.map(str::to_string),
        }
    }

    /// Serves canned pages in order and records the tokens it was called with
    fn scripted(
        pages: Vec<Result<MessagePage>>,
    ) -> (
        impl FnMut(Option<String>) -> futures::future::Ready<Result<MessagePage>> + Send,
        Arc<Mutex<Vec<Option<String>>>>,
    ) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&calls);
        let mut pages: VecDeque<_> = pages.into();
        let fetch = move |token: Option<String>| {
            recorded.lock().unwrap().push(token);
            futures::future::ready(pages.pop_front().unwrap_or_else(|| Ok(MessagePage::default())))
        };
        (fetch, calls)
    }

    #[tokio::test]
    async fn test_concatenates_pages_in_order() {
        let (fetch, calls) = scripted(vec![
            Ok(page(&["a", "b"], Some("t1"))),
            Ok(page(&["c"], Some("t2"))),
            Ok(page(&["d"], None)),
        ]);

        let ids: Vec<_> = paginate(fetch).try_collect().await.unwrap();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![None, Some("t1".to_string()), Some("t2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_single_page_without_token() {
        let (fetch, calls) = scripted(vec![Ok(page(&["only"], None))]);
        let ids: Vec<_> = paginate(fetch).try_collect().await.unwrap();
        assert_eq!(ids, vec!["only"]);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_mailbox() {
        let (fetch, _) = scripted(vec![Ok(MessagePage::default())]);
        let ids: Vec<MessageId> = paginate(fetch).try_collect().await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_stops_on_token_with_no_ids() {
        let (fetch, calls) = scripted(vec![
            Ok(page(&["a"], Some("t1"))),
            Ok(page(&[], Some("t2"))),
            Ok(page(&["never"], None)),
        ]);

        let ids: Vec<_> = paginate(fetch).try_collect().await.unwrap();
        assert_eq!(ids, vec!["a"]);
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stops_on_identical_page() {
        let (fetch, calls) = scripted(vec![
            Ok(page(&["a", "b"], Some("t1"))),
            Ok(page(&["a", "b"], Some("t2"))),
            Ok(page(&["c"], None)),
        ]);

        let ids: Vec<_> = paginate(fetch).try_collect().await.unwrap();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stops_on_repeated_token() {
        let (fetch, calls) = scripted(vec![
            Ok(page(&["a"], Some("loop"))),
            Ok(page(&["b"], Some("loop"))),
            Ok(page(&["c"], None)),
        ]);

        let ids: Vec<_> = paginate(fetch).try_collect().await.unwrap();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_page_error_ends_stream() {
        let (fetch, _) = scripted(vec![
            Ok(page(&["a"], Some("t1"))),
            Err(GmailError::Forbidden("nope".to_string())),
        ]);

        let items: Vec<_> = paginate(fetch).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().ok(), Some("a"));
        assert!(matches!(items[1], Err(GmailError::Forbidden(_))));
    }

    #[test]
    fn test_listing_counts_toward_total() {
        let listing = Listing {
            filter: MessageFilter::All,
            ids: vec!["a".to_string()],
            interrupted: false,
        };
        assert!(listing.counts_toward_total());

        let listing = Listing {
            filter: MessageFilter::from_sender("x@y.com"),
            ..listing
        };
        assert!(!listing.counts_toward_total());
        assert_eq!(listing.len(), 1);
    }
}
