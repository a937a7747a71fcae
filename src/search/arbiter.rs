//! Strategy arbiter with quota-gated, priority-ordered search loop.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::track::{RequesterInfo, TrackQuery};

use super::{QuotaGuard, SearchCandidate, SearchStrategy};

/// Runs search strategies one at a time in priority order.
///
/// Quota-gated strategies are skipped while the [`QuotaGuard`] reports the
/// quota as exhausted. The first candidate wins; later strategies are never
/// consulted once an earlier one succeeds. Within the same priority,
/// strategies run in registration order.
pub struct SearchArbiter {
    strategies: Vec<Box<dyn SearchStrategy>>,
    quota: Arc<QuotaGuard>,
}

impl SearchArbiter {
    /// Creates an arbiter with no strategies.
    #[must_use]
    pub fn new(quota: Arc<QuotaGuard>) -> Self {
        Self {
            strategies: Vec::new(),
            quota,
        }
    }

    /// Registers a strategy, keeping the list sorted by priority.
    pub fn register(&mut self, strategy: Box<dyn SearchStrategy>) {
        debug!(
            name = strategy.name(),
            priority = ?strategy.priority(),
            quota_gated = strategy.quota_gated(),
            "Registering search strategy"
        );
        self.strategies.push(strategy);
        // stable: registration order survives within a priority
        self.strategies.sort_by_key(|s| s.priority());
    }

    /// Returns the registered strategy names in execution order.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Returns the shared quota guard.
    #[must_use]
    pub fn quota(&self) -> &Arc<QuotaGuard> {
        &self.quota
    }

    /// Finds the best candidate for `query`, or `None` if every strategy comes up empty.
    #[instrument(skip(self, query, requester), fields(track = %query.id, requester = %requester))]
    pub async fn find_candidate(
        &self,
        query: &TrackQuery,
        requester: &RequesterInfo,
    ) -> Option<SearchCandidate> {
        for strategy in &self.strategies {
            if strategy.quota_gated() && !self.quota.is_available() {
                debug!(strategy = strategy.name(), "Quota exhausted; skipping strategy");
                continue;
            }

            if let Some(candidate) = strategy.search(query, requester).await {
                debug!(
                    strategy = strategy.name(),
                    url = %candidate.url,
                    duration_ms = candidate.duration_ms,
                    "Settled on candidate"
                );
                return Some(candidate);
            }
        }

        info!(query = %query.search_text(), "No search strategy found a candidate");
        None
    }
}

impl std::fmt::Debug for SearchArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchArbiter")
            .field("strategies", &self.strategy_names())
            .field("quota_exhausted_at", &self.quota.exhausted_at())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::search::StrategyPriority;

    struct FixedStrategy {
        name: &'static str,
        priority: StrategyPriority,
        gated: bool,
        result: Option<u64>,
        calls: Arc<AtomicUsize>,
    }

    impl FixedStrategy {
        fn boxed(
            name: &'static str,
            priority: StrategyPriority,
            gated: bool,
            result: Option<u64>,
        ) -> (Box<dyn SearchStrategy>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let strategy = Self {
                name,
                priority,
                gated,
                result,
                calls: Arc::clone(&calls),
            };
            (Box::new(strategy), calls)
        }
    }

    #[async_trait]
    impl SearchStrategy for FixedStrategy {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> StrategyPriority {
            self.priority
        }

        fn quota_gated(&self) -> bool {
            self.gated
        }

        async fn search(
            &self,
            _query: &TrackQuery,
            _requester: &RequesterInfo,
        ) -> Option<SearchCandidate> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .map(|ms| SearchCandidate::new(format!("https://yt/{}", self.name), ms, self.name))
        }
    }

    fn query() -> TrackQuery {
        TrackQuery::new("t1", "A", "B", 200_000)
    }

    #[tokio::test]
    async fn test_primary_hit_skips_fallback() {
        let mut arbiter = SearchArbiter::new(Arc::new(QuotaGuard::new()));
        let (fallback, fallback_calls) =
            FixedStrategy::boxed("fallback", StrategyPriority::Fallback, false, Some(1));
        let (primary, primary_calls) =
            FixedStrategy::boxed("primary", StrategyPriority::Primary, true, Some(2));
        arbiter.register(fallback);
        arbiter.register(primary);

        assert_eq!(arbiter.strategy_names(), vec!["primary", "fallback"]);
        let candidate = arbiter
            .find_candidate(&query(), &RequesterInfo::default())
            .await
            .unwrap();

        assert_eq!(candidate.source, "primary");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_primary_empty_runs_fallback() {
        let mut arbiter = SearchArbiter::new(Arc::new(QuotaGuard::new()));
        let (primary, primary_calls) =
            FixedStrategy::boxed("primary", StrategyPriority::Primary, true, None);
        let (fallback, _) =
            FixedStrategy::boxed("fallback", StrategyPriority::Fallback, false, Some(1));
        arbiter.register(primary);
        arbiter.register(fallback);

        let candidate = arbiter
            .find_candidate(&query(), &RequesterInfo::default())
            .await
            .unwrap();
        assert_eq!(candidate.source, "fallback");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_quota_skips_gated_strategy() {
        let quota = Arc::new(QuotaGuard::new());
        quota.mark_exhausted();
        let mut arbiter = SearchArbiter::new(Arc::clone(&quota));
        let (primary, primary_calls) =
            FixedStrategy::boxed("primary", StrategyPriority::Primary, true, Some(2));
        let (fallback, fallback_calls) =
            FixedStrategy::boxed("fallback", StrategyPriority::Fallback, false, Some(1));
        arbiter.register(primary);
        arbiter.register(fallback);

        let candidate = arbiter
            .find_candidate(&query(), &RequesterInfo::default())
            .await
            .unwrap();
        assert_eq!(candidate.source, "fallback");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 0);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_empty_is_none() {
        let mut arbiter = SearchArbiter::new(Arc::new(QuotaGuard::new()));
        let (primary, _) = FixedStrategy::boxed("primary", StrategyPriority::Primary, true, None);
        let (fallback, _) =
            FixedStrategy::boxed("fallback", StrategyPriority::Fallback, false, None);
        arbiter.register(primary);
        arbiter.register(fallback);

        assert!(
            arbiter
                .find_candidate(&query(), &RequesterInfo::default())
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_empty_arbiter_is_none() {
        let arbiter = SearchArbiter::new(Arc::new(QuotaGuard::new()));
        assert!(
            arbiter
                .find_candidate(&query(), &RequesterInfo::default())
                .await
                .is_none()
        );
    }
}
