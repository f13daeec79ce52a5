//! Offline planning: diff a desired document against a listing snapshot
//! without touching the remote system.

use std::path::Path;

use anyhow::Context;
use converge::{
    IdentityMatcher, ParentId, PhaseOrder, Reconciler, matcher::AssociationOf, tracing,
};
use converge_grafana::{
    ResourceKind,
    alerting::{self, GlobalItem, MessageTemplateItem, MuteTimingItem},
    notifiers::{self, ContactPointItem, RemoteNotifier},
    permissions::{self, PermissionItem, PermissionResource, RemotePermission},
    roles::{self, BuiltInRoleItem, RoleAssignmentsItem},
};
use serde::{Serialize, de::DeserializeOwned};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

/// Plan of one reconciliation, as printed by `converge plan`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct PlanOutput {
    pub(crate) kind: ResourceKindName,
    pub(crate) parent: ParentId,
    pub(crate) phase_order: PhaseOrder,
    #[serde(flatten)]
    pub(crate) summary: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub(crate) struct ResourceKindName(&'static str);

impl PlanOutput {
    pub(crate) fn render(&self, format: OutputFormat) -> anyhow::Result<String> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            OutputFormat::Yaml => Ok(serde_norway::to_string(self)?),
        }
    }
}

/// Reads a JSON or YAML document. YAML is a superset of JSON, so a single
/// parser handles both.
pub(crate) fn read_document(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read `{}`", path.display()))
}

fn parse<T: DeserializeOwned>(document: &str, what: &str) -> anyhow::Result<T> {
    serde_norway::from_str(document).with_context(|| format!("Failed to parse {what} document"))
}

/// Current state is optional; a missing listing means nothing exists yet.
fn parse_current<T: DeserializeOwned + Default>(document: Option<&str>) -> anyhow::Result<T> {
    document.map_or_else(|| Ok(T::default()), |d| parse(d, "current"))
}

fn summarize<M>(
    kind: ResourceKind,
    parent: ParentId,
    reconciler: &Reconciler<M>,
    desired: Vec<AssociationOf<M>>,
    current: Vec<AssociationOf<M>>,
) -> anyhow::Result<PlanOutput>
where
    M: IdentityMatcher,
    M::Attributes: Serialize,
{
    let plan = reconciler.diff(desired, current)?;
    tracing::debug!(
        kind = kind.as_str(),
        parent = %parent,
        mutations = plan.mutation_count(),
        "Computed offline plan"
    );
    Ok(PlanOutput {
        kind: ResourceKindName(kind.as_str()),
        parent,
        phase_order: reconciler.phase_order(),
        summary: serde_json::to_value(plan.summary())?,
    })
}

fn summarize_permissions(
    kind: ResourceKind,
    resource: PermissionResource,
    parent: ParentId,
    desired: &str,
    current: Option<&str>,
) -> anyhow::Result<PlanOutput> {
    let desired = permissions::desired_permissions(
        resource,
        &parent,
        parse::<Vec<PermissionItem>>(desired, "desired")?,
    )?;
    let current = permissions::current_permissions(
        resource,
        &parent,
        parse_current::<Vec<RemotePermission>>(current)?,
    );
    summarize(
        kind,
        parent,
        &permissions::reconciler(resource),
        desired,
        current,
    )
}

fn summarize_global<I>(
    kind: ResourceKind,
    desired: &str,
    current: Option<&str>,
) -> anyhow::Result<PlanOutput>
where
    I: GlobalItem + DeserializeOwned,
    I::Attributes: Serialize,
{
    let scopes = converge::ExclusiveScopes::new();
    let desired = alerting::desired_entries(parse::<Vec<I>>(desired, "desired")?)?;
    let current = alerting::current_entries(parse_current::<Vec<I>>(current)?);
    summarize(
        kind,
        I::COLLECTION.parent(),
        &alerting::reconciler::<I>(&scopes),
        desired,
        current,
    )
}

/// Computes the plan that reconciling `desired` against `current` would
/// execute for `parent`.
///
/// Global alerting collections ignore `parent` and use the collection itself.
pub(crate) fn plan(
    kind: ResourceKind,
    parent: &str,
    desired: &str,
    current: Option<&str>,
) -> anyhow::Result<PlanOutput> {
    let parent = ParentId::from(parent);
    match kind {
        ResourceKind::DashboardPermissions => {
            summarize_permissions(kind, PermissionResource::Dashboards, parent, desired, current)
        }
        ResourceKind::FolderPermissions => {
            summarize_permissions(kind, PermissionResource::Folders, parent, desired, current)
        }
        ResourceKind::DatasourcePermissions => {
            summarize_permissions(kind, PermissionResource::Datasources, parent, desired, current)
        }
        ResourceKind::ServiceAccountPermissions => summarize_permissions(
            kind,
            PermissionResource::ServiceAccounts,
            parent,
            desired,
            current,
        ),
        ResourceKind::BuiltInRoleAssignments => {
            let desired = roles::desired_built_in_role_assignments(
                &parent,
                parse::<Vec<BuiltInRoleItem>>(desired, "desired")?,
            )?;
            let current = roles::current_built_in_role_assignments(
                &parent,
                parse_current::<Vec<BuiltInRoleItem>>(current)?,
            );
            summarize(
                kind,
                parent,
                &roles::built_in_role_reconciler(),
                desired,
                current,
            )
        }
        ResourceKind::RoleAssignments => {
            let desired = roles::desired_role_assignments(
                &parent,
                parse::<RoleAssignmentsItem>(desired, "desired")?,
            );
            let current = roles::current_role_assignments(
                &parent,
                parse_current::<RoleAssignmentsItem>(current)?,
            );
            summarize(
                kind,
                parent,
                &roles::role_assignment_reconciler(),
                desired,
                current,
            )
        }
        ResourceKind::ContactPointNotifiers => {
            let desired = notifiers::desired_notifiers(
                &parent,
                parse::<ContactPointItem>(desired, "desired")?,
            )?;
            let current = notifiers::current_notifiers(
                &parent,
                parse_current::<Vec<RemoteNotifier>>(current)?,
            );
            summarize(
                kind,
                parent,
                &notifiers::notifier_reconciler(),
                desired,
                current,
            )
        }
        ResourceKind::MessageTemplates => {
            summarize_global::<MessageTemplateItem>(kind, desired, current)
        }
        ResourceKind::MuteTimings => summarize_global::<MuteTimingItem>(kind, desired, current),
    }
}

/// Validates a desired document and returns the number of associations it
/// declares.
pub(crate) fn check(kind: ResourceKind, parent: &str, desired: &str) -> anyhow::Result<usize> {
    let output = plan(kind, parent, desired, None)?;
    let planned = output
        .summary
        .get("create")
        .and_then(serde_json::Value::as_array)
        .map_or(0, Vec::len);
    Ok(planned)
}
