//! Latency-biased racing of a cheap candidate against an authoritative
//! fallback.

use std::time::Duration;

use futures::Future;

use super::query::QueryError;

/// Race `fast` against a deadline, falling back to `slow`.
///
/// `fast` is an already-pending computation; `slow` is only invoked if
/// needed. If `fast` settles with an `accept`-ed value before `delay`
/// elapses, that value is returned and `slow` never runs. Otherwise `slow`
/// starts, and whichever of the two settles first with an accepted value
/// wins — except that `slow` is the last resort, so its value is returned
/// even when `accept` rejects it. A `fast` error counts as not-accepted
/// and falls through to `slow`.
///
/// The intended shape: `fast` is a bulk-prefetched window lookup that is
/// usually either already resolved or will never cover this position, so a
/// short deadline (25 ms by default) caps the added latency without giving
/// up correctness.
pub async fn race_with_fallback<R, Fast, Slow, SlowFut, Accept>(
    fast: Fast,
    slow: Slow,
    delay: Duration,
    accept: Accept,
) -> Result<R, QueryError>
where
    Fast: Future<Output = Result<R, QueryError>>,
    Slow: FnOnce() -> SlowFut,
    SlowFut: Future<Output = Result<R, QueryError>>,
    Accept: Fn(&R) -> bool,
{
    tokio::pin!(fast);
    let deadline = tokio::time::sleep(delay);
    tokio::pin!(deadline);

    let mut fast_settled = false;
    tokio::select! {
        result = &mut fast => {
            match result {
                Ok(value) if accept(&value) => return Ok(value),
                _ => fast_settled = true,
            }
        }
        _ = &mut deadline => {}
    }

    let slow_fut = slow();
    tokio::pin!(slow_fut);

    if fast_settled {
        return slow_fut.await;
    }

    tokio::select! {
        result = &mut fast => {
            match result {
                Ok(value) if accept(&value) => Ok(value),
                _ => slow_fut.await,
            }
        }
        result = &mut slow_fut => result,
    }
}
