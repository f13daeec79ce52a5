use std::time::Duration;

use tryhard::RetryPolicy;

use crate::{
    CONFIG, ConvergeError, DiffError, ExclusiveScopes, ExecuteError, ExecutionReport, Gateway,
    IdentityMatcher, ParentId, PhaseOrder, Plan, RetryConfig, ScopeGuard, executor,
    matcher::AssociationOf, plan,
};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Converges the associations of one resource kind.
///
/// Each concrete resource supplies an [`IdentityMatcher`] and a [`Gateway`];
/// the diff and apply loop is shared.
#[derive(Debug, Clone)]
pub struct Reconciler<M> {
    matcher: M,
    phase_order: PhaseOrder,
    scope: Option<(ExclusiveScopes, String)>,
    retry: RetryConfig,
}

impl<M: IdentityMatcher> Reconciler<M> {
    #[must_use]
    pub fn new(matcher: M) -> Self {
        Self {
            matcher,
            phase_order: PhaseOrder::default(),
            scope: None,
            retry: RetryConfig::default(),
        }
    }

    /// Reconciler configured from [`CONFIG`] for `resource_kind`.
    #[must_use]
    pub fn for_resource(matcher: M, resource_kind: &str) -> Self {
        Self::new(matcher)
            .with_phase_order(CONFIG.phase_order_for(resource_kind))
            .with_retry(CONFIG.retry)
    }

    #[must_use]
    pub fn with_phase_order(mut self, phase_order: PhaseOrder) -> Self {
        self.phase_order = phase_order;
        self
    }

    /// Serializes every execution through the scope named `collection`.
    #[must_use]
    pub fn with_exclusive_scope(
        mut self,
        scopes: ExclusiveScopes,
        collection: impl Into<String>,
    ) -> Self {
        self.scope = Some((scopes, collection.into()));
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    #[must_use]
    pub fn phase_order(&self) -> PhaseOrder {
        self.phase_order
    }

    pub fn diff(
        &self,
        desired: Vec<AssociationOf<M>>,
        current: Vec<AssociationOf<M>>,
    ) -> Result<Plan<M::Key, M::Attributes>, DiffError> {
        plan::diff(&self.matcher, desired, current)
    }

    /// Executes `plan` in the configured phase order, inside the exclusive
    /// scope if one is configured.
    pub async fn execute<G>(
        &self,
        plan: Plan<M::Key, M::Attributes>,
        gateway: &G,
    ) -> Result<ExecutionReport<M::Key>, ExecuteError<M::Key>>
    where
        G: Gateway<M::Key, M::Attributes> + ?Sized,
    {
        let _guard = self.acquire_scope().await;
        executor::execute(plan, gateway, self.phase_order).await
    }

    /// Lists the current associations of `parent`, diffs them against
    /// `desired` and executes the resulting plan.
    ///
    /// With an exclusive scope configured the scope is held for the whole
    /// cycle, so the listing cannot go stale before execution.
    #[tracing::instrument(skip_all, fields(parent = %parent, phase_order = %self.phase_order))]
    pub async fn reconcile<G>(
        &self,
        parent: &ParentId,
        desired: &[AssociationOf<M>],
        gateway: &G,
    ) -> Result<ExecutionReport<M::Key>, ConvergeError<M::Key>>
    where
        G: Gateway<M::Key, M::Attributes> + ?Sized,
    {
        plan::validate_desired(parent, desired).map_err(DiffError::from)?;

        let _guard = self.acquire_scope().await;

        let current = gateway
            .list(parent)
            .await
            .map_err(|source| ConvergeError::List {
                parent: parent.clone(),
                source,
            })?;
        let plan = self.diff(desired.to_vec(), current)?;
        if plan.is_empty() {
            tracing::debug!(unchanged = plan.unchanged.len(), "Already converged");
            return Ok(ExecutionReport::default());
        }

        let report = executor::execute(plan, gateway, self.phase_order).await?;
        tracing::info!(
            created = report.created.len(),
            updated = report.updated.len(),
            removed = report.removed.len(),
            already_absent = report.already_absent.len(),
            "Reconciled associations"
        );
        Ok(report)
    }

    /// [`Self::reconcile`], re-running the whole cycle on transient failures
    /// with exponential backoff. Configuration errors are never retried.
    pub async fn reconcile_with_retry<G>(
        &self,
        parent: &ParentId,
        desired: &[AssociationOf<M>],
        gateway: &G,
    ) -> Result<ExecutionReport<M::Key>, ConvergeError<M::Key>>
    where
        G: Gateway<M::Key, M::Attributes> + ?Sized,
    {
        let initial_backoff = self.retry.initial_backoff();
        tryhard::retry_fn(move || self.reconcile(parent, desired, gateway))
            .retries(self.retry.max_retries)
            .custom_backoff(move |attempt, error: &ConvergeError<M::Key>| {
                if error.is_retryable() {
                    let delay = backoff_delay(initial_backoff, attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Reconciliation failed, retrying: {error}"
                    );
                    RetryPolicy::Delay(delay)
                } else {
                    RetryPolicy::Break
                }
            })
            .await
    }

    async fn acquire_scope(&self) -> Option<ScopeGuard> {
        match &self.scope {
            Some((scopes, collection)) => Some(scopes.acquire(collection).await),
            None => None,
        }
    }
}

fn backoff_delay(initial: Duration, attempt: u32) -> Duration {
    let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
    initial.saturating_mul(factor).min(MAX_BACKOFF)
}
