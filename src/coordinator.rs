use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::error::{CoordinatorError, LookupError};
use crate::model::{GameId, Outcome, TaskStage};
use crate::parser;
use crate::table::ResultTable;
use crate::transport::Transport;

// =============================================================================
// Completion policy
// =============================================================================

/// How the fan-in loop decides that every dispatched task has reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionPolicy {
    /// Receive exactly as many outcomes as tasks were spawned.
    Counted,
    /// Drain until every task has released its sender, then join the tracker.
    #[default]
    Tracked,
}

impl fmt::Display for CompletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionPolicy::Counted => f.write_str("counted"),
            CompletionPolicy::Tracked => f.write_str("tracked"),
        }
    }
}

impl FromStr for CompletionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "counted" => Ok(CompletionPolicy::Counted),
            "tracked" => Ok(CompletionPolicy::Tracked),
            other => Err(format!("unknown completion policy '{other}'")),
        }
    }
}

// =============================================================================
// Per-task outcome emission
// =============================================================================

/// Sends the task's outcome when dropped.
///
/// A task that unwinds before calling [`OutcomeGuard::finish`] still reports,
/// as [`LookupError::TaskAborted`] at the stage it had reached.
struct OutcomeGuard {
    id: GameId,
    stage: TaskStage,
    result: Option<Result<String, LookupError>>,
    started: Instant,
    tx: mpsc::UnboundedSender<Outcome>,
}

impl OutcomeGuard {
    fn new(id: GameId, tx: mpsc::UnboundedSender<Outcome>) -> Self {
        Self {
            id,
            stage: TaskStage::Pending,
            result: None,
            started: Instant::now(),
            tx,
        }
    }

    fn advance(&mut self, stage: TaskStage) {
        tracing::trace!(from = %self.stage, to = %stage, "stage change");
        self.stage = stage;
    }

    fn finish(&mut self, result: Result<String, LookupError>) {
        self.stage = TaskStage::Done;
        self.result = Some(result);
    }
}

impl Drop for OutcomeGuard {
    fn drop(&mut self) {
        let result = self.result.take().unwrap_or(Err(LookupError::TaskAborted {
            stage: self.stage,
        }));
        let elapsed_ms = self.started.elapsed().as_millis() as u64;

        match &result {
            Ok(name) => tracing::debug!(%name, elapsed_ms, "resolved"),
            Err(error) => tracing::debug!(%error, elapsed_ms, "lookup failed"),
        }

        if self.tx.send(Outcome::from_result(self.id.clone(), result)).is_err() {
            tracing::warn!("coordinator stopped listening before outcome was delivered");
        }
    }
}

async fn lookup(
    transport: &dyn Transport,
    id: &GameId,
    mut on_stage: impl FnMut(TaskStage),
) -> Result<String, LookupError> {
    on_stage(TaskStage::Fetching);
    let body = transport.fetch(id).await?;
    on_stage(TaskStage::Parsing);
    parser::parse_primary_name(&body)
}

// =============================================================================
// Fan-out / fan-in
// =============================================================================

/// Resolves game IDs to primary names with one concurrent task per ID.
#[derive(Clone)]
pub struct Coordinator {
    transport: Arc<dyn Transport>,
    limiter: Option<Arc<Semaphore>>,
}

impl Coordinator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            limiter: None,
        }
    }

    /// Caps how many tasks fetch at once. Tasks over the cap wait in
    /// [`TaskStage::Pending`]; every task still reports exactly once.
    pub fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.limiter = Some(Arc::new(Semaphore::new(limit.max(1))));
        self
    }

    /// Single inline lookup with no task or channel involved.
    pub async fn resolve_one(&self, id: &GameId) -> Result<String, LookupError> {
        lookup(self.transport.as_ref(), id, |_| {}).await
    }

    pub async fn resolve(
        &self,
        queries: impl IntoIterator<Item = GameId>,
        policy: CompletionPolicy,
    ) -> Result<ResultTable, CoordinatorError> {
        match policy {
            CompletionPolicy::Counted => self.resolve_counted(queries).await,
            CompletionPolicy::Tracked => self.resolve_tracked(queries).await,
        }
    }

    pub async fn resolve_counted(
        &self,
        queries: impl IntoIterator<Item = GameId>,
    ) -> Result<ResultTable, CoordinatorError> {
        let ids = distinct(queries);
        let expected = ids.len();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for id in &ids {
            tokio::spawn(self.task(id.clone(), tx.clone()));
        }
        drop(tx);
        tracing::info!(expected, policy = "counted", "dispatched lookups");

        let mut table = ResultTable::expecting(ids);
        for received in 0..expected {
            let outcome = rx
                .recv()
                .await
                .ok_or(CoordinatorError::MissingOutcomes { expected, received })?;
            table.record(outcome)?;
        }

        Ok(table)
    }

    pub async fn resolve_tracked(
        &self,
        queries: impl IntoIterator<Item = GameId>,
    ) -> Result<ResultTable, CoordinatorError> {
        let ids = distinct(queries);
        let expected = ids.len();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tracker = TaskTracker::new();

        for id in &ids {
            tracker.spawn(self.task(id.clone(), tx.clone()));
        }
        tracker.close();
        drop(tx);
        tracing::info!(expected, policy = "tracked", "dispatched lookups");

        let mut table = ResultTable::expecting(ids);
        while let Some(outcome) = rx.recv().await {
            table.record(outcome)?;
        }
        tracker.wait().await;

        let received = table.len();
        if received != expected {
            return Err(CoordinatorError::MissingOutcomes { expected, received });
        }

        Ok(table)
    }

    fn task(
        &self,
        id: GameId,
        tx: mpsc::UnboundedSender<Outcome>,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        let transport = Arc::clone(&self.transport);
        let limiter = self.limiter.clone();
        let span = tracing::debug_span!("lookup", id = %id);

        async move {
            let mut guard = OutcomeGuard::new(id.clone(), tx);
            let _permit = match limiter {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };

            let result = lookup(transport.as_ref(), &id, |stage| guard.advance(stage)).await;
            guard.finish(result);
        }
        .instrument(span)
    }
}

fn distinct(queries: impl IntoIterator<Item = GameId>) -> Vec<GameId> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    for id in queries {
        if seen.insert(id.clone()) {
            ids.push(id);
        } else {
            tracing::warn!(%id, "duplicate game id ignored");
        }
    }

    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::future::{BoxFuture, FutureExt};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone)]
    enum Canned {
        Body(String),
        Refused,
        Panic,
    }

    #[derive(Default)]
    struct MockTransport {
        responses: HashMap<GameId, Canned>,
        calls: Mutex<HashMap<GameId, usize>>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
        delay: Option<fn(&GameId) -> Duration>,
    }

    impl MockTransport {
        fn with(mut self, id: impl Into<GameId>, response: Canned) -> Self {
            self.responses.insert(id.into(), response);
            self
        }

        fn calls_for(&self, id: &GameId) -> usize {
            self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
        }
    }

    impl Transport for MockTransport {
        fn fetch<'a>(&'a self, id: &'a GameId) -> BoxFuture<'a, Result<Bytes, LookupError>> {
            async move {
                *self.calls.lock().unwrap().entry(id.clone()).or_default() += 1;
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay(id)).await;
                }
                self.in_flight.fetch_sub(1, Ordering::SeqCst);

                match self.responses.get(id).cloned() {
                    Some(Canned::Body(body)) => Ok(Bytes::from(body)),
                    Some(Canned::Refused) | None => {
                        Err(LookupError::NetworkError("connection refused".to_string()))
                    }
                    Some(Canned::Panic) => panic!("transport blew up for {id}"),
                }
            }
            .boxed()
        }
    }

    fn inverse_delay(id: &GameId) -> Duration {
        Duration::from_millis(20 - (id.as_str().parse::<u64>().unwrap_or(0) % 20))
    }

    fn fixed_delay(_: &GameId) -> Duration {
        Duration::from_millis(10)
    }

    fn named(name: &str) -> Canned {
        Canned::Body(format!(
            r#"<items><item><name type="alternate" value="Alt {name}"/><name type="primary" value="{name}"/></item></items>"#
        ))
    }

    // Five response shapes cycled over the ids, with delays that invert
    // dispatch order so outcomes arrive shuffled.
    fn mixed_transport(n: u32) -> (MockTransport, HashMap<GameId, Result<String, LookupError>>) {
        let mut transport = MockTransport {
            delay: Some(inverse_delay as fn(&GameId) -> Duration),
            ..Default::default()
        };
        let mut expected = HashMap::new();

        for i in 0..n {
            let (canned, outcome) = match i % 5 {
                0 => (
                    Canned::Body("<html>Service Unavailable</html>".to_string()),
                    Err(LookupError::MalformedResponseError(String::new())),
                ),
                1 => (
                    Canned::Body("<items></items>".to_string()),
                    Err(LookupError::GameNotFoundError),
                ),
                2 => (named(&format!("Game {i}")), Ok(format!("Game {i}"))),
                3 => (
                    Canned::Body(
                        r#"<items><item><name type="alternate" value="Foo"/></item></items>"#
                            .to_string(),
                    ),
                    Err(LookupError::GameNameMissingError),
                ),
                _ => (Canned::Refused, Err(LookupError::NetworkError(String::new()))),
            };
            transport = transport.with(i, canned);
            expected.insert(GameId::from(i), outcome);
        }

        (transport, expected)
    }

    fn assert_matches_expected(
        table: &ResultTable,
        expected: &HashMap<GameId, Result<String, LookupError>>,
    ) {
        assert_eq!(table.len(), expected.len());
        assert!(table.is_complete());

        for (id, want) in expected {
            let got = table.get(id).unwrap_or_else(|| panic!("missing entry for {id}"));
            match (got, want) {
                (Ok(a), Ok(b)) => assert_eq!(a, b),
                (
                    Err(LookupError::MalformedResponseError(_)),
                    Err(LookupError::MalformedResponseError(_)),
                ) => {}
                (Err(LookupError::NetworkError(_)), Err(LookupError::NetworkError(_))) => {}
                (Err(a), Err(b)) => assert_eq!(a, b),
                _ => panic!("id {id}: got {got:?}, expected {want:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_counted_resolves_hundred_mixed_ids() {
        let (transport, expected) = mixed_transport(100);
        let coordinator = Coordinator::new(Arc::new(transport));

        let table = coordinator
            .resolve_counted((0..100u32).map(GameId::from))
            .await
            .unwrap();
        assert_matches_expected(&table, &expected);
    }

    #[tokio::test]
    async fn test_tracked_resolves_hundred_mixed_ids() {
        let (transport, expected) = mixed_transport(100);
        let coordinator = Coordinator::new(Arc::new(transport));

        let table = coordinator
            .resolve((0..100u32).map(GameId::from), CompletionPolicy::Tracked)
            .await
            .unwrap();
        assert_matches_expected(&table, &expected);
    }

    #[tokio::test]
    async fn test_network_failures_only_affect_their_ids() {
        let failing: HashSet<u32> = [3, 17, 42].into_iter().collect();
        let mut transport = MockTransport::default();
        for i in 0..50u32 {
            let canned = if failing.contains(&i) {
                Canned::Refused
            } else {
                named(&format!("Game {i}"))
            };
            transport = transport.with(i, canned);
        }

        let table = Coordinator::new(Arc::new(transport))
            .resolve((0..50u32).map(GameId::from), CompletionPolicy::Counted)
            .await
            .unwrap();

        assert_eq!(table.len(), 50);
        for i in 0..50u32 {
            let entry = table.get(&GameId::from(i)).unwrap();
            if failing.contains(&i) {
                assert!(entry.as_ref().unwrap_err().is_network(), "id {i}");
            } else {
                assert_eq!(entry.as_deref(), Ok(format!("Game {i}").as_str()));
            }
        }
    }

    #[tokio::test]
    async fn test_each_id_fetched_exactly_once() {
        let (transport, _) = mixed_transport(30);
        let transport = Arc::new(transport);
        let coordinator = Coordinator::new(transport.clone());

        coordinator
            .resolve_tracked((0..30u32).map(GameId::from))
            .await
            .unwrap();

        for i in 0..30u32 {
            assert_eq!(transport.calls_for(&GameId::from(i)), 1, "id {i}");
        }
    }

    #[tokio::test]
    async fn test_panicking_task_still_reports() {
        let transport = MockTransport::default()
            .with(1u32, named("One"))
            .with(2u32, Canned::Panic)
            .with(3u32, named("Three"));
        let coordinator = Coordinator::new(Arc::new(transport));

        for policy in [CompletionPolicy::Counted, CompletionPolicy::Tracked] {
            let table = coordinator
                .resolve((1..=3u32).map(GameId::from), policy)
                .await
                .unwrap();

            assert_eq!(table.len(), 3);
            assert_eq!(
                table.get(&GameId::from(2u32)),
                Some(&Err(LookupError::TaskAborted {
                    stage: TaskStage::Fetching
                }))
            );
            assert_eq!(table.get(&GameId::from(3u32)), Some(&Ok("Three".to_string())));
        }
    }

    #[tokio::test]
    async fn test_duplicate_ids_collapse() {
        let transport = MockTransport::default().with(7u32, named("Seven"));
        let transport = Arc::new(transport);
        let coordinator = Coordinator::new(transport.clone());

        let ids = ["7", "7", "7"].into_iter().map(GameId::from);
        let table = coordinator.resolve_counted(ids).await.unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(transport.calls_for(&GameId::from("7")), 1);
    }

    #[tokio::test]
    async fn test_empty_query_set_completes() {
        let coordinator = Coordinator::new(Arc::new(MockTransport::default()));
        for policy in [CompletionPolicy::Counted, CompletionPolicy::Tracked] {
            let table = coordinator.resolve(Vec::<GameId>::new(), policy).await.unwrap();
            assert!(table.is_empty());
        }
    }

    #[tokio::test]
    async fn test_max_in_flight_caps_concurrency() {
        let mut transport = MockTransport {
            delay: Some(fixed_delay as fn(&GameId) -> Duration),
            ..Default::default()
        };
        for i in 0..20u32 {
            transport = transport.with(i, named("x"));
        }
        let transport = Arc::new(transport);
        let coordinator = Coordinator::new(transport.clone()).with_max_in_flight(3);

        let table = coordinator
            .resolve_tracked((0..20u32).map(GameId::from))
            .await
            .unwrap();

        assert_eq!(table.len(), 20);
        assert!(transport.peak_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_resolve_one_returns_recoverable_error() {
        let transport = MockTransport::default()
            .with(1u32, named("Die Macher"))
            .with(2u32, Canned::Body("<items/>".to_string()));
        let coordinator = Coordinator::new(Arc::new(transport));

        assert_eq!(
            coordinator.resolve_one(&GameId::from(1u32)).await.unwrap(),
            "Die Macher"
        );
        assert_eq!(
            coordinator.resolve_one(&GameId::from(2u32)).await,
            Err(LookupError::GameNotFoundError)
        );
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "counted".parse::<CompletionPolicy>(),
            Ok(CompletionPolicy::Counted)
        );
        assert_eq!(
            "Tracked".parse::<CompletionPolicy>(),
            Ok(CompletionPolicy::Tracked)
        );
        assert!("waitgroup".parse::<CompletionPolicy>().is_err());
    }
}
