//! Thread enumeration
//!
//! Lazily walks the paginated thread listing for one sender and window.

use anyhow::Result;
use log::{debug, error};
use std::collections::VecDeque;

use crate::gmail::api::ThreadRef;
use crate::gmail::{MAX_PAGE_SIZE, MailApi};
use crate::models::RunWindow;

/// Gmail search query for a sender within a window (unix seconds)
pub fn build_query(sender: &str, window: &RunWindow) -> String {
    format!(
        "from:{} after:{} before:{}",
        sender,
        window.start().timestamp(),
        window.end().timestamp()
    )
}

/// Enumerate threads from `sender` inside `window`
///
/// Each call starts a new enumeration from the first page.
pub fn list_threads<'a>(api: &'a dyn MailApi, sender: &str, window: &RunWindow) -> ThreadPages<'a> {
    ThreadPages::new(api, build_query(sender, window), MAX_PAGE_SIZE)
}

/// Iterator over thread references, fetching pages on demand
///
/// A page fetch failure is yielded once as `Err`, after which the iterator
/// is exhausted.
pub struct ThreadPages<'a> {
    api: &'a dyn MailApi,
    query: String,
    page_size: usize,
    buffer: VecDeque<ThreadRef>,
    next_page: Option<String>,
    pages_fetched: usize,
    done: bool,
}

impl<'a> ThreadPages<'a> {
    pub fn new(api: &'a dyn MailApi, query: String, page_size: usize) -> Self {
        Self {
            api,
            query,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            buffer: VecDeque::new(),
            next_page: None,
            pages_fetched: 0,
            done: false,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    fn fetch_page(&mut self) -> Result<()> {
        let response = self
            .api
            .list_threads_page(&self.query, self.page_size, self.next_page.as_deref())?;
        self.pages_fetched += 1;

        let threads = response.threads.unwrap_or_default();
        debug!(
            "Fetched thread page {} ({} threads, estimate {:?})",
            self.pages_fetched,
            threads.len(),
            response.result_size_estimate
        );
        self.buffer.extend(threads);

        self.next_page = response.next_page_token;
        if self.next_page.is_none() {
            self.done = true;
        }
        Ok(())
    }
}

impl Iterator for ThreadPages<'_> {
    type Item = Result<ThreadRef>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(thread) = self.buffer.pop_front() {
                return Some(Ok(thread));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                error!("Thread listing failed after {} page(s): {:#}", self.pages_fetched, e);
                self.done = true;
                self.buffer.clear();
                return Some(Err(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::api::{GmailMessage, ListThreadsResponse};
    use crate::models::{ThreadId, parse_hour_stamp};
    use chrono::FixedOffset;
    use std::cell::RefCell;

    /// Serves pre-built pages keyed by page token; `None` entries fail
    struct PagedApi {
        pages: Vec<Option<ListThreadsResponse>>,
        calls: RefCell<Vec<(usize, Option<String>)>>,
    }

    impl PagedApi {
        fn new(pages: Vec<Option<ListThreadsResponse>>) -> Self {
            Self {
                pages,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl MailApi for PagedApi {
        fn authenticate(&self) -> Result<()> {
            Ok(())
        }

        fn list_threads_page(
            &self,
            _query: &str,
            max_results: usize,
            page_token: Option<&str>,
        ) -> Result<ListThreadsResponse> {
            let index = page_token.map(|t| t.parse::<usize>().unwrap()).unwrap_or(0);
            self.calls
                .borrow_mut()
                .push((max_results, page_token.map(str::to_string)));
            match &self.pages[index] {
                Some(page) => Ok(ListThreadsResponse {
                    threads: page.threads.clone(),
                    next_page_token: page.next_page_token.clone(),
                    result_size_estimate: page.result_size_estimate,
                }),
                None => anyhow::bail!("backend unavailable"),
            }
        }

        fn get_message(&self, _id: &ThreadId) -> Result<GmailMessage> {
            unreachable!("enumeration never fetches messages")
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> Option<ListThreadsResponse> {
        Some(ListThreadsResponse {
            threads: Some(
                ids.iter()
                    .map(|id| ThreadRef {
                        id: id.to_string(),
                        snippet: None,
                        history_id: None,
                    })
                    .collect(),
            ),
            next_page_token: next.map(str::to_string),
            result_size_estimate: None,
        })
    }

    fn window() -> RunWindow {
        let offset = FixedOffset::east_opt(19800).unwrap();
        RunWindow::new(
            parse_hour_stamp("01 01 2024 00", offset).unwrap(),
            parse_hour_stamp("02 01 2024 00", offset).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_build_query_uses_unix_seconds() {
        let query = build_query("jobs@example.com", &window());
        // 2023-12-31T18:30:00Z and 2024-01-01T18:30:00Z
        assert_eq!(
            query,
            "from:jobs@example.com after:1704047400 before:1704133800"
        );
    }

    #[test]
    fn test_paginates_until_no_token() {
        let api = PagedApi::new(vec![
            page(&["a", "b"], Some("1")),
            page(&[], Some("2")),
            page(&["c"], None),
        ]);

        let ids: Vec<String> = list_threads(&api, "jobs@example.com", &window())
            .map(|t| t.unwrap().id)
            .collect();

        assert_eq!(ids, vec!["a", "b", "c"]);
        let calls = api.calls.borrow();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(size, _)| *size == MAX_PAGE_SIZE));
        assert_eq!(calls[2].1.as_deref(), Some("2"));
    }

    #[test]
    fn test_is_lazy() {
        let api = PagedApi::new(vec![page(&["a"], Some("1")), page(&["b"], None)]);
        let mut pages = list_threads(&api, "x", &window());

        assert_eq!(pages.next().unwrap().unwrap().id, "a");
        assert_eq!(api.calls.borrow().len(), 1);
        assert_eq!(pages.next().unwrap().unwrap().id, "b");
        assert_eq!(pages.pages_fetched(), 2);
    }

    #[test]
    fn test_failure_is_signalled_then_stops() {
        let api = PagedApi::new(vec![page(&["a"], Some("1")), None]);
        let results: Vec<Result<ThreadRef>> = list_threads(&api, "x", &window()).collect();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn test_each_call_restarts() {
        let api = PagedApi::new(vec![page(&["a"], None)]);
        assert_eq!(list_threads(&api, "x", &window()).count(), 1);
        assert_eq!(list_threads(&api, "x", &window()).count(), 1);
        assert_eq!(api.calls.borrow().len(), 2);
    }
}
