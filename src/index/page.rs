//! Cursor-driven pagination over remote result sets.

use futures::stream::{self, Stream};
use futures::Future;

use super::query::{Page, PageCursor, QueryError};

/// Drive `fetch_page` into a lazy stream of accumulated results.
///
/// Each emission is the full list collected so far: consumers treat a later
/// emission as replacing the previous one, matching a UI where the latest
/// yielded value is the current truth. The stream is pull-based with at
/// most one page in flight — page *k+1* is not requested until the consumer
/// polls past page *k* — so a consumer that stops pulling stops all further
/// fetches with nothing left to cancel. Every call is a fresh run.
///
/// Termination: no cursor in the response, the `max_pages` budget running
/// out (a cost cap, not an error, so a silent stop), or a `None` fetch
/// result meaning the index has no data at all. A page with zero items
/// still consumes budget but is not emitted unless it is the first page,
/// so partial results already shown are never replaced by an identical
/// list. A fetch error is emitted once and ends the run; emissions before
/// it stand.
pub fn paginate<T, F, Fut>(
    fetch_page: F,
    max_pages: usize,
) -> impl Stream<Item = Result<Vec<T>, QueryError>>
where
    T: Clone,
    F: FnMut(Option<PageCursor>) -> Fut,
    Fut: Future<Output = Result<Option<Page<T>>, QueryError>>,
{
    struct Run<T, F> {
        fetch_page: F,
        cursor: Option<PageCursor>,
        collected: Vec<T>,
        fetched: usize,
        done: bool,
    }

    let run = Run {
        fetch_page,
        cursor: None,
        collected: Vec::new(),
        fetched: 0,
        done: false,
    };

    stream::unfold(run, move |mut run| async move {
        loop {
            if run.done || run.fetched == max_pages {
                return None;
            }
            let page = match (run.fetch_page)(run.cursor.take()).await {
                Ok(Some(page)) => page,
                Ok(None) => return None,
                Err(err) => {
                    run.done = true;
                    return Some((Err(err), run));
                }
            };
            run.fetched += 1;
            match page.next {
                Some(next) => run.cursor = Some(next),
                None => run.done = true,
            }
            if page.items.is_empty() && run.fetched > 1 {
                continue;
            }
            run.collected.extend(page.items);
            return Some((Ok(run.collected.clone()), run));
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use futures::StreamExt;

    use super::*;

    type Script = Vec<Result<Option<Page<&'static str>>, QueryError>>;

    fn page(items: &[&'static str], next: Option<&str>) -> Result<Option<Page<&'static str>>, QueryError> {
        Ok(Some(Page {
            items: items.to_vec(),
            next: next.map(|c| PageCursor(c.to_string())),
        }))
    }

    /// Fetcher that replays `script` in order and counts fetches.
    fn scripted(
        script: Script,
        fetches: &Arc<AtomicUsize>,
    ) -> impl FnMut(Option<PageCursor>) -> futures::future::Ready<Result<Option<Page<&'static str>>, QueryError>>
    {
        let fetches = Arc::clone(fetches);
        move |_cursor| {
            let call = fetches.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(script[call].clone())
        }
    }

    async fn run(script: Script, max_pages: usize) -> (Vec<Result<Vec<&'static str>, QueryError>>, usize) {
        let fetches = Arc::new(AtomicUsize::new(0));
        let emitted = paginate(scripted(script, &fetches), max_pages)
            .collect::<Vec<_>>()
            .await;
        (emitted, fetches.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn accumulates_monotonically() {
        let (emitted, fetches) = run(
            vec![page(&["a", "b"], Some("x")), page(&["c"], None)],
            10,
        )
        .await;
        assert_eq!(
            emitted,
            vec![Ok(vec!["a", "b"]), Ok(vec!["a", "b", "c"])]
        );
        assert_eq!(fetches, 2);
    }

    #[tokio::test]
    async fn budget_caps_fetches_silently() {
        let script: Script = (0..20).map(|_| page(&["x"], Some("more"))).collect();
        let (emitted, fetches) = run(script, 3).await;
        assert_eq!(fetches, 3);
        assert_eq!(emitted.len(), 3);
        assert_eq!(emitted[2], Ok(vec!["x", "x", "x"]));
    }

    #[tokio::test]
    async fn empty_later_page_consumes_budget_without_emission() {
        let (emitted, fetches) = run(
            vec![
                page(&["a"], Some("x")),
                page(&[], Some("y")),
                page(&["b"], None),
            ],
            10,
        )
        .await;
        assert_eq!(emitted, vec![Ok(vec!["a"]), Ok(vec!["a", "b"])]);
        assert_eq!(fetches, 3);
    }

    #[tokio::test]
    async fn empty_first_page_is_emitted() {
        let (emitted, _) = run(vec![page(&[], None)], 10).await;
        assert_eq!(emitted, vec![Ok(vec![])]);
    }

    #[tokio::test]
    async fn null_fetch_terminates_immediately() {
        let (emitted, fetches) = run(vec![Ok(None)], 10).await;
        assert!(emitted.is_empty());
        assert_eq!(fetches, 1);
    }

    #[tokio::test]
    async fn error_aborts_but_keeps_prior_emissions() {
        let (emitted, fetches) = run(
            vec![
                page(&["a"], Some("x")),
                Err(QueryError::Transport("connection reset".into())),
                page(&["never"], None),
            ],
            10,
        )
        .await;
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0], Ok(vec!["a"]));
        assert!(emitted[1].is_err());
        assert_eq!(fetches, 2);
    }

    #[tokio::test]
    async fn abandoned_consumer_issues_no_further_fetches() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let script: Script = (0..10).map(|_| page(&["x"], Some("more"))).collect();
        let mut stream = Box::pin(paginate(scripted(script, &fetches), 10));

        let first = stream.next().await;
        assert_eq!(first, Some(Ok(vec!["x"])));
        drop(stream);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_budget_fetches_nothing() {
        let (emitted, fetches) = run(vec![page(&["a"], None)], 0).await;
        assert!(emitted.is_empty());
        assert_eq!(fetches, 0);
    }
}
