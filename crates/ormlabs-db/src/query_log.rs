//! Round-trip log of a data layer.
//!
//! Every round trip the data layer performs is appended here as a
//! [`QueryEvent`]. The log keeps a monotonic count of everything recorded plus
//! the most recent events, up to a fixed capacity, so a caller can take a
//! baseline count and later read back exactly the events recorded since.
//!
//! Each recorded statement is also logged at debug level on the
//! `ormlabs::db::backends` target. With [`QueryLog::set_pretty`] on, the
//! statement is laid out by [`format_sql`] first, one clause per line.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use regex::Regex;

static CLAUSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\s+(FROM|WHERE|GROUP BY|ORDER BY|LIMIT|INNER JOIN|LEFT OUTER JOIN|SET|VALUES)\b",
    )
    .expect("valid regex")
});

static TUPLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\),\s*\(").expect("valid regex"));

/// Reindents a statement: each clause starts a new line and each row of a
/// multi-row `VALUES` list gets its own indented line.
///
/// Text inside string literals is left alone.
///
/// ```
/// use ormlabs_db::query_log::format_sql;
///
/// assert_eq!(
///     format_sql("SELECT \"name\" FROM \"event\" WHERE \"name\" = 'FROM here'"),
///     "SELECT \"name\"\nFROM \"event\"\nWHERE \"name\" = 'FROM here'"
/// );
/// ```
pub fn format_sql(sql: &str) -> String {
    sql.trim()
        .split('\'')
        .enumerate()
        .map(|(i, part)| {
            if i % 2 == 1 {
                return part.to_string();
            }
            let clauses = CLAUSE_RE.replace_all(part, "\n$1");
            TUPLE_RE.replace_all(&clauses, "),\n  (").into_owned()
        })
        .collect::<Vec<_>>()
        .join("'")
}

/// One data-store round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryEvent {
    /// The statement the round trip stands for.
    pub sql: String,
    /// How long it took.
    pub duration: Duration,
}

impl QueryEvent {
    /// Creates an event.
    pub fn new(sql: impl Into<String>, duration: Duration) -> Self {
        Self {
            sql: sql.into(),
            duration,
        }
    }

    /// Returns the duration in seconds.
    pub fn seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

#[derive(Debug)]
struct LogState {
    total: usize,
    events: VecDeque<QueryEvent>,
    capacity: usize,
}

/// A bounded log of round trips with a cumulative counter.
///
/// ```
/// use std::time::Duration;
/// use ormlabs_db::query_log::{QueryEvent, QueryLog};
///
/// let log = QueryLog::new();
/// let baseline = log.count();
/// log.record(QueryEvent::new("SELECT 1", Duration::from_millis(2)));
/// assert_eq!(log.count() - baseline, 1);
/// assert_eq!(log.events_since(baseline)[0].sql, "SELECT 1");
/// ```
#[derive(Debug)]
pub struct QueryLog {
    state: Mutex<LogState>,
    enabled: AtomicBool,
    pretty: AtomicBool,
}

impl QueryLog {
    /// The number of events retained by default.
    pub const DEFAULT_CAPACITY: usize = 9000;

    /// Creates an enabled log with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Creates an enabled log retaining at most `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LogState {
                total: 0,
                events: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
            }),
            enabled: AtomicBool::new(true),
            pretty: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Turns recording on or off. A disabled log ignores new events.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Returns `true` if new events are recorded.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Turns reindented statement logging on or off.
    pub fn set_pretty(&self, pretty: bool) {
        self.pretty.store(pretty, Ordering::SeqCst);
    }

    /// Returns `true` if logged statements are reindented.
    pub fn is_pretty(&self) -> bool {
        self.pretty.load(Ordering::SeqCst)
    }

    /// Returns the statement as it is written to the debug log.
    pub fn display_sql(&self, sql: &str) -> String {
        if self.is_pretty() {
            format!("\n{}", format_sql(sql))
        } else {
            sql.to_string()
        }
    }

    /// Appends an event, evicting the oldest one when full.
    pub fn record(&self, event: QueryEvent) {
        if !self.is_enabled() {
            return;
        }
        if tracing::enabled!(target: "ormlabs::db::backends", tracing::Level::DEBUG) {
            tracing::debug!(
                target: "ormlabs::db::backends",
                sql = %self.display_sql(&event.sql),
                duration = event.seconds(),
                "query"
            );
        }
        let mut state = self.lock();
        state.total += 1;
        if state.capacity == 0 {
            return;
        }
        if state.events.len() == state.capacity {
            state.events.pop_front();
        }
        state.events.push_back(event);
    }

    /// Returns the number of events recorded since creation or the last
    /// [`clear`](Self::clear).
    pub fn count(&self) -> usize {
        self.lock().total
    }

    /// Returns the retained events recorded after the count was `baseline`.
    ///
    /// If more events were recorded than the log retains, only the retained
    /// tail is returned.
    pub fn events_since(&self, baseline: usize) -> Vec<QueryEvent> {
        let state = self.lock();
        let delta = state.total.saturating_sub(baseline);
        let take = delta.min(state.events.len());
        state
            .events
            .iter()
            .skip(state.events.len() - take)
            .cloned()
            .collect()
    }

    /// Returns all retained events.
    pub fn events(&self) -> Vec<QueryEvent> {
        self.lock().events.iter().cloned().collect()
    }

    /// Forgets every event and resets the counter.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.total = 0;
        state.events.clear();
    }
}

impl Default for QueryLog {
    fn default() -> Self {
        Self::new()
    }
}
