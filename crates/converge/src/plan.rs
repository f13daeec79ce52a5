use serde::Serialize;

use crate::{
    Association, AssociationAttributes, IdentityMatcher, NaturalKey, ParentId, RemoteId,
    error::{AmbiguousMatch, ConfigurationError, DiffError, DuplicateNaturalKey, InvalidAssociation, MissingRemoteId},
};

/// A matched pair. `desired` already carries the remote id of `current`.
#[derive(Debug, Clone, PartialEq)]
pub struct Update<K, A> {
    pub remote_id: RemoteId,
    pub desired: Association<K, A>,
    pub current: Association<K, A>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Removal<K, A> {
    pub remote_id: RemoteId,
    pub current: Association<K, A>,
}

/// Mutations required to converge current associations to the desired ones.
///
/// Every desired association lands in exactly one of `to_create`, `to_update`
/// or `unchanged`. Every current association lands in exactly one of
/// `to_update`, `to_remove` or `unchanged`.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan<K, A> {
    pub to_create: Vec<Association<K, A>>,
    pub to_update: Vec<Update<K, A>>,
    pub to_remove: Vec<Removal<K, A>>,
    /// Matched pairs without divergence. Never sent to the gateway.
    pub unchanged: Vec<Update<K, A>>,
}

impl<K, A> Default for Plan<K, A> {
    fn default() -> Self {
        Self {
            to_create: Vec::new(),
            to_update: Vec::new(),
            to_remove: Vec::new(),
            unchanged: Vec::new(),
        }
    }
}

impl<K: NaturalKey, A: AssociationAttributes> Plan<K, A> {
    /// Whether executing the plan would not call the gateway at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_remove.is_empty()
    }

    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_remove.len()
    }

    /// Serializable view of the plan for dry runs.
    #[must_use]
    pub fn summary(&self) -> PlanSummary<A>
    where
        A: Serialize,
    {
        PlanSummary {
            create: self.to_create.iter().map(PlannedChange::desired).collect(),
            update: self
                .to_update
                .iter()
                .map(|u| PlannedChange {
                    key: u.desired.key.to_string(),
                    remote_id: Some(u.remote_id.clone()),
                    attributes: Some(u.desired.attributes.clone()),
                    previous: Some(u.current.attributes.clone()),
                })
                .collect(),
            remove: self
                .to_remove
                .iter()
                .map(|r| PlannedChange {
                    key: r.current.key.to_string(),
                    remote_id: Some(r.remote_id.clone()),
                    attributes: None,
                    previous: Some(r.current.attributes.clone()),
                })
                .collect(),
            unchanged: self.unchanged.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PlanSummary<A> {
    pub create: Vec<PlannedChange<A>>,
    pub update: Vec<PlannedChange<A>>,
    pub remove: Vec<PlannedChange<A>>,
    pub unchanged: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PlannedChange<A> {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<A>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<A>,
}

impl<A: Clone> PlannedChange<A> {
    fn desired<K: NaturalKey>(association: &Association<K, A>) -> Self {
        Self {
            key: association.key.to_string(),
            remote_id: None,
            attributes: Some(association.attributes.clone()),
            previous: None,
        }
    }
}

/// Computes the plan converging `current` to `desired`.
///
/// Pure: the gateway is never consulted. Fails with a
/// [`ConfigurationError`] when `desired` repeats a natural key or when a
/// current association matches more than one desired association, and with
/// [`MissingRemoteId`] when a current association carries no remote id.
pub fn diff<M: IdentityMatcher>(
    matcher: &M,
    desired: Vec<Association<M::Key, M::Attributes>>,
    current: Vec<Association<M::Key, M::Attributes>>,
) -> Result<Plan<M::Key, M::Attributes>, DiffError> {
    reject_duplicate_keys(&desired)?;
    let parent = common_parent(&desired, &current)?;

    let mut claimed: Vec<bool> = vec![false; desired.len()];
    let mut pairs: Vec<(usize, Association<M::Key, M::Attributes>, RemoteId)> = Vec::new();
    let mut plan = Plan::default();

    for current in current {
        let Some(remote_id) = current.remote_id.clone() else {
            return Err(MissingRemoteId::new(&current.key).into());
        };

        let mut candidates = desired
            .iter()
            .enumerate()
            .filter(|(_, d)| matcher.matches(d, &current))
            .map(|(i, _)| i);

        let Some(index) = candidates.next() else {
            plan.to_remove.push(Removal { remote_id, current });
            continue;
        };
        if let Some(other) = candidates.next() {
            return Err(ambiguous(
                &current.key,
                format!(
                    "current association matches desired `{}` and `{}`",
                    desired[index].key, desired[other].key
                ),
            ));
        }
        if claimed[index] {
            return Err(ambiguous(
                &desired[index].key,
                "desired association matches more than one current association".to_string(),
            ));
        }
        claimed[index] = true;
        pairs.push((index, current, remote_id));
    }

    let mut desired: Vec<Option<_>> = desired.into_iter().map(Some).collect();
    for (index, current, remote_id) in pairs {
        let Some(mut wanted) = desired[index].take() else {
            continue;
        };
        matcher.carry_over(&mut wanted, &current);
        let update = Update {
            remote_id,
            desired: wanted,
            current,
        };
        if matcher.needs_update(&update.desired, &update.current) {
            plan.to_update.push(update);
        } else {
            plan.unchanged.push(update);
        }
    }
    plan.to_create.extend(desired.into_iter().flatten());

    tracing::debug!(
        parent = parent.as_ref().map_or("", ParentId::as_str),
        create = plan.to_create.len(),
        update = plan.to_update.len(),
        remove = plan.to_remove.len(),
        unchanged = plan.unchanged.len(),
        "Computed reconciliation plan"
    );

    Ok(plan)
}

/// Checks `desired` on its own, before anything is listed remotely.
pub(crate) fn validate_desired<K: NaturalKey, A>(
    parent: &ParentId,
    desired: &[Association<K, A>],
) -> Result<(), ConfigurationError> {
    if let Some(foreign) = desired.iter().find(|a| &a.parent != parent) {
        return Err(InvalidAssociation::new(format!(
            "desired association `{}` belongs to `{}`, not `{parent}`",
            foreign.key, foreign.parent
        ))
        .into());
    }
    reject_duplicate_keys(desired)
}

fn reject_duplicate_keys<K: NaturalKey, A>(
    desired: &[Association<K, A>],
) -> Result<(), ConfigurationError> {
    let mut seen = std::collections::HashSet::with_capacity(desired.len());
    for association in desired {
        if !seen.insert(&association.key) {
            return Err(DuplicateNaturalKey::new(&association.key).into());
        }
    }
    Ok(())
}

fn common_parent<K: NaturalKey, A>(
    desired: &[Association<K, A>],
    current: &[Association<K, A>],
) -> Result<Option<ParentId>, ConfigurationError> {
    let mut parents = desired.iter().chain(current).map(|a| &a.parent);
    let Some(first) = parents.next() else {
        return Ok(None);
    };
    if let Some(other) = parents.find(|p| *p != first) {
        return Err(InvalidAssociation::new(format!(
            "associations of parents `{first}` and `{other}` cannot be reconciled together"
        ))
        .into());
    }
    Ok(Some(first.clone()))
}

fn ambiguous<K: NaturalKey>(key: &K, reason: String) -> DiffError {
    ConfigurationError::from(AmbiguousMatch::new(key, reason)).into()
}
