use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
};

use serde::{Deserialize, Serialize};

use crate::{
    Association, AssociationAttributes, Gateway, GatewayError, NaturalKey, RemoteId,
    error::{ExecuteError, ItemFailure},
    plan::{Plan, Removal, Update},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Create,
    Update,
    Remove,
}

/// Order in which the phases of a plan are executed.
///
/// `CreateFirst` leaves a superset of the desired associations behind when
/// execution is interrupted. `RemoveFirst` leaves a subset, which is the safer
/// choice for resources where a stale grant is worse than a missing one.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PhaseOrder {
    /// Create, then update, then remove.
    #[default]
    CreateFirst,
    /// Remove, then create, then update.
    RemoveFirst,
}

impl PhaseOrder {
    #[must_use]
    pub fn phases(self) -> [Phase; 3] {
        match self {
            PhaseOrder::CreateFirst => [Phase::Create, Phase::Update, Phase::Remove],
            PhaseOrder::RemoveFirst => [Phase::Remove, Phase::Create, Phase::Update],
        }
    }
}

/// Mutations applied remotely during one execution, keyed by natural key.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport<K> {
    pub created: Vec<(K, RemoteId)>,
    pub updated: Vec<(K, RemoteId)>,
    pub removed: Vec<(K, RemoteId)>,
    /// Updates and removals whose target had already disappeared remotely.
    pub already_absent: Vec<(K, RemoteId)>,
}

impl<K> Default for ExecutionReport<K> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
            already_absent: Vec::new(),
        }
    }
}

impl<K: NaturalKey> ExecutionReport<K> {
    /// Remote ids assigned to newly created associations.
    #[must_use]
    pub fn created_ids(&self) -> HashMap<K, RemoteId> {
        self.created.iter().cloned().collect()
    }

    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.created.len() + self.updated.len() + self.removed.len()
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.mutation_count() == 0 && self.already_absent.is_empty()
    }

    /// Writes the remote ids of created associations back into `desired`,
    /// so the caller can persist them for the next cycle.
    pub fn assign_remote_ids<A>(&self, desired: &mut [Association<K, A>]) {
        let created = self.created_ids();
        for association in desired.iter_mut() {
            if let Some(remote_id) = created.get(&association.key) {
                association.remote_id = Some(remote_id.clone());
            }
        }
    }
}

fn fmt_keys<K: Display>(f: &mut Formatter<'_>, label: &str, items: &[(K, RemoteId)]) -> std::fmt::Result {
    write!(f, "{label} [")?;
    for (i, (key, remote_id)) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{key} ({remote_id})")?;
    }
    write!(f, "]")
}

impl<K: Display> Display for ExecutionReport<K> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fmt_keys(f, "created", &self.created)?;
        write!(f, ", ")?;
        fmt_keys(f, "updated", &self.updated)?;
        write!(f, ", ")?;
        fmt_keys(f, "removed", &self.removed)?;
        write!(f, ", ")?;
        fmt_keys(f, "already absent", &self.already_absent)
    }
}

/// Executes `plan` against `gateway` phase by phase in `order`.
///
/// Fails fast: the first gateway error other than a `NotFound` on update or
/// remove aborts the execution, and the mutations applied so far are returned
/// inside the error. Nothing is retried here.
pub async fn execute<K, A, G>(
    plan: Plan<K, A>,
    gateway: &G,
    order: PhaseOrder,
) -> Result<ExecutionReport<K>, ExecuteError<K>>
where
    K: NaturalKey,
    A: AssociationAttributes,
    G: Gateway<K, A> + ?Sized,
{
    let Plan {
        to_create,
        to_update,
        to_remove,
        unchanged: _,
    } = plan;

    let mut execution = Execution {
        gateway,
        report: ExecutionReport::default(),
    };
    let mut to_create = Some(to_create);
    let mut to_update = Some(to_update);
    let mut to_remove = Some(to_remove);

    for phase in order.phases() {
        let result = match phase {
            Phase::Create => execution.create_all(to_create.take().unwrap_or_default()).await,
            Phase::Update => execution.update_all(to_update.take().unwrap_or_default()).await,
            Phase::Remove => execution.remove_all(to_remove.take().unwrap_or_default()).await,
        };
        if let Err(failure) = result {
            tracing::error!(
                phase = %failure.phase,
                key = %failure.key,
                kind = %failure.error.kind,
                applied = execution.report.mutation_count(),
                "Aborting reconciliation: {}",
                failure.error
            );
            return Err(ExecuteError {
                report: execution.report,
                failure,
            });
        }
    }

    Ok(execution.report)
}

struct Execution<'g, K, G: ?Sized> {
    gateway: &'g G,
    report: ExecutionReport<K>,
}

impl<K, G> Execution<'_, K, G>
where
    K: NaturalKey,
    G: ?Sized,
{
    async fn create_all<A>(
        &mut self,
        associations: Vec<Association<K, A>>,
    ) -> Result<(), ItemFailure<K>>
    where
        A: AssociationAttributes,
        G: Gateway<K, A>,
    {
        for association in associations {
            match self
                .gateway
                .create(&association.parent, &association)
                .await
            {
                Ok(remote_id) => {
                    tracing::info!(
                        parent = %association.parent,
                        key = %association.key,
                        remote_id = %remote_id,
                        "Created association"
                    );
                    self.report.created.push((association.key, remote_id));
                }
                Err(error) => {
                    return Err(failure(Phase::Create, association.key, error));
                }
            }
        }
        Ok(())
    }

    async fn update_all<A>(&mut self, updates: Vec<Update<K, A>>) -> Result<(), ItemFailure<K>>
    where
        A: AssociationAttributes,
        G: Gateway<K, A>,
    {
        for Update {
            remote_id,
            desired,
            current: _,
        } in updates
        {
            match self
                .gateway
                .update(&desired.parent, &remote_id, &desired)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        parent = %desired.parent,
                        key = %desired.key,
                        remote_id = %remote_id,
                        "Updated association"
                    );
                    self.report.updated.push((desired.key, remote_id));
                }
                Err(error) if error.is_not_found() => {
                    tracing::warn!(
                        parent = %desired.parent,
                        key = %desired.key,
                        remote_id = %remote_id,
                        "Association to update no longer exists remotely, skipping"
                    );
                    self.report.already_absent.push((desired.key, remote_id));
                }
                Err(error) => {
                    return Err(failure(Phase::Update, desired.key, error));
                }
            }
        }
        Ok(())
    }

    async fn remove_all<A>(&mut self, removals: Vec<Removal<K, A>>) -> Result<(), ItemFailure<K>>
    where
        A: AssociationAttributes,
        G: Gateway<K, A>,
    {
        for Removal { remote_id, current } in removals {
            match self.gateway.remove(&current.parent, &remote_id).await {
                Ok(()) => {
                    tracing::info!(
                        parent = %current.parent,
                        key = %current.key,
                        remote_id = %remote_id,
                        "Removed association"
                    );
                    self.report.removed.push((current.key, remote_id));
                }
                Err(error) if error.is_not_found() => {
                    tracing::warn!(
                        parent = %current.parent,
                        key = %current.key,
                        remote_id = %remote_id,
                        "Association to remove no longer exists remotely, skipping"
                    );
                    self.report.already_absent.push((current.key, remote_id));
                }
                Err(error) => {
                    return Err(failure(Phase::Remove, current.key, error));
                }
            }
        }
        Ok(())
    }
}

fn failure<K: NaturalKey>(phase: Phase, key: K, error: GatewayError) -> ItemFailure<K> {
    let error = error.append_detail(format!("{phase} of `{key}`"));
    ItemFailure { key, phase, error }
}
