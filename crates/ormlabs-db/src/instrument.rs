//! Query-count instrumentation.
//!
//! [`instrument`] runs a unit of work against a [`QueryLog`] and returns the
//! work's value together with how many round trips it made and how long they
//! took in total. The report is emitted as a `tracing` event on the
//! `ormlabs::statistics` target, and only when the work succeeds.
//!
//! The measurement is a baseline count taken before the work and a delta
//! taken after it. Round trips recorded on the same log by another thread in
//! between are counted too, so share a log across concurrent callers only if
//! they serialize their instrumented calls.
//!
//! The count is always exact, but the time can only be summed over the
//! events the log still retains (see [`QueryLog::DEFAULT_CAPACITY`]). When an
//! operation makes more round trips than that, `total_time` covers the most
//! recent ones only, [`QueryStats::partial_time`] is set and a warning is
//! logged.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use ormlabs_core::logging::operation_span;
use tracing::Instrument as _;

use crate::query_log::QueryLog;

/// Round-trip statistics of one instrumented operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryStats {
    /// The operation name.
    pub operation: String,
    /// Round trips made during the operation.
    pub count: usize,
    /// Summed duration of those round trips.
    pub total_time: Duration,
    /// Set when the log no longer held every round trip, so `total_time`
    /// only covers the retained ones.
    pub partial_time: bool,
}

impl QueryStats {
    /// Returns the total time in seconds.
    pub fn total_seconds(&self) -> f64 {
        self.total_time.as_secs_f64()
    }

    /// Returns the one-line report.
    ///
    /// ```
    /// use std::time::Duration;
    /// use ormlabs_db::instrument::QueryStats;
    ///
    /// let stats = QueryStats {
    ///     operation: "all_communities".into(),
    ///     count: 2,
    ///     total_time: Duration::from_millis(500),
    ///     partial_time: false,
    /// };
    /// assert_eq!(stats.report(), "[Statistics] : 2 queries performed in 0.5s.");
    /// ```
    pub fn report(&self) -> String {
        format!(
            "[Statistics] : {} queries performed in {}s.",
            self.count,
            self.total_seconds()
        )
    }

    fn emit(&self) {
        tracing::info!(
            target: "ormlabs::statistics",
            operation = %self.operation,
            queries = self.count,
            seconds = self.total_seconds(),
            "{}",
            self.report()
        );
    }
}

impl fmt::Display for QueryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.report())
    }
}

/// A measurement window over a [`QueryLog`].
///
/// For work that does not fit in a closure: call [`begin`](Self::begin)
/// before it and [`finish`](Self::finish) after it succeeded.
#[derive(Debug)]
pub struct QueryScope<'a> {
    log: &'a QueryLog,
    baseline: usize,
}

impl<'a> QueryScope<'a> {
    /// Takes the baseline count.
    pub fn begin(log: &'a QueryLog) -> Self {
        Self {
            log,
            baseline: log.count(),
        }
    }

    /// Computes the statistics of the round trips made since
    /// [`begin`](Self::begin) and emits the report.
    pub fn finish(self, operation: &str) -> QueryStats {
        let count = self.log.count().saturating_sub(self.baseline);
        let events = self.log.events_since(self.baseline);
        let partial_time = count > events.len();
        if partial_time {
            tracing::warn!(
                target: "ormlabs::statistics",
                operation,
                queries = count,
                timed = events.len(),
                "query log overflowed; total time covers the retained round trips only"
            );
        }
        let total_time = events.iter().map(|e| e.duration).sum();
        let stats = QueryStats {
            operation: operation.to_string(),
            count,
            total_time,
            partial_time,
        };
        stats.emit();
        stats
    }
}

/// Runs `op` and measures the round trips it makes on `log`.
///
/// On success returns the value unchanged together with the statistics. On
/// failure returns the error unchanged and emits no report.
///
/// `count` is exact however many round trips `op` makes. `total_time` sums
/// the events still retained by `log`; past its capacity the oldest ones are
/// gone, the sum covers the tail only and `partial_time` is set.
///
/// ```
/// use std::time::Duration;
/// use ormlabs_db::instrument::instrument;
/// use ormlabs_db::query_log::{QueryEvent, QueryLog};
///
/// let log = QueryLog::new();
/// let (value, stats) = instrument("lookup", &log, || {
///     log.record(QueryEvent::new("SELECT 1", Duration::from_millis(10)));
///     Ok::<_, String>(42)
/// })
/// .unwrap();
/// assert_eq!(value, 42);
/// assert_eq!(stats.count, 1);
///
/// let failed = instrument("lookup", &log, || Err::<(), _>("boom".to_string()));
/// assert_eq!(failed.unwrap_err(), "boom");
/// ```
pub fn instrument<T, E, F>(name: &str, log: &QueryLog, op: F) -> Result<(T, QueryStats), E>
where
    F: FnOnce() -> Result<T, E>,
{
    let span = operation_span(name);
    let _guard = span.enter();
    let scope = QueryScope::begin(log);
    let value = op()?;
    Ok((value, scope.finish(name)))
}

/// Runs an infallible `op` and measures it.
pub fn measure<T, F>(name: &str, log: &QueryLog, op: F) -> (T, QueryStats)
where
    F: FnOnce() -> T,
{
    match instrument::<T, Infallible, _>(name, log, || Ok(op())) {
        Ok(measured) => measured,
        Err(never) => match never {},
    }
}

/// Awaits `fut` and measures the round trips it makes on `log`.
///
/// Same contract as [`instrument`].
pub async fn instrument_async<T, E, Fut>(
    name: &str,
    log: &QueryLog,
    fut: Fut,
) -> Result<(T, QueryStats), E>
where
    Fut: Future<Output = Result<T, E>>,
{
    let span = operation_span(name);
    let scope = QueryScope::begin(log);
    let value = fut.instrument(span.clone()).await?;
    let _guard = span.enter();
    Ok((value, scope.finish(name)))
}
