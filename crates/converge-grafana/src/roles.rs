//! Role assignments.
//!
//! Built-in role assignments attach custom roles (by UID) to a basic role such
//! as `Viewer`. Role assignments attach users, teams and service accounts to
//! one custom role.

use std::collections::HashSet;

use converge::{Association, ConfigurationError, ParentId, Reconciler, matcher::TupleMatcher};
use serde::{Deserialize, Serialize};

use crate::{ItemError, ResourceKind, scoped_id::deserialize_scoped_ids};

// --------------------------- BUILT-IN ROLE ASSIGNMENTS ---------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuiltInRoleAttributes {
    /// Assigned in every organization instead of the current one.
    pub global: bool,
}

pub type BuiltInRoleAssociation = Association<String, BuiltInRoleAttributes>;
pub type BuiltInRoleMatcher = TupleMatcher<String, BuiltInRoleAttributes>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltInRoleItem {
    pub uid: String,
    #[serde(default)]
    pub global: bool,
}

/// Desired custom roles of the basic role `parent`. A role UID may only be
/// listed once.
pub fn desired_built_in_role_assignments(
    parent: &ParentId,
    items: Vec<BuiltInRoleItem>,
) -> Result<Vec<BuiltInRoleAssociation>, ConfigurationError> {
    let mut seen = HashSet::with_capacity(items.len());
    let mut desired = Vec::with_capacity(items.len());
    for item in items {
        if item.uid.trim().is_empty() {
            return Err(ItemError::Empty { field: "uid" }.into());
        }
        if !seen.insert(item.uid.clone()) {
            return Err(ItemError::DuplicateRole(item.uid).into());
        }
        desired.push(Association::desired(
            parent.clone(),
            item.uid,
            BuiltInRoleAttributes {
                global: item.global,
            },
        ));
    }
    Ok(desired)
}

/// Current custom roles of `parent`; the role UID doubles as remote id.
#[must_use]
pub fn current_built_in_role_assignments(
    parent: &ParentId,
    listed: Vec<BuiltInRoleItem>,
) -> Vec<BuiltInRoleAssociation> {
    listed
        .into_iter()
        .map(|item| {
            Association::current(
                parent.clone(),
                item.uid.clone(),
                item.uid,
                BuiltInRoleAttributes {
                    global: item.global,
                },
            )
        })
        .collect()
}

#[must_use]
pub fn built_in_role_reconciler() -> Reconciler<BuiltInRoleMatcher> {
    Reconciler::for_resource(
        BuiltInRoleMatcher::new(),
        ResourceKind::BuiltInRoleAssignments.as_str(),
    )
}

// --------------------------- ROLE ASSIGNMENTS ---------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Assignee {
    User(i64),
    Team(i64),
    ServiceAccount(i64),
}

impl std::fmt::Display for Assignee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Assignee::User(id) => write!(f, "user:{id}"),
            Assignee::Team(id) => write!(f, "team:{id}"),
            Assignee::ServiceAccount(id) => write!(f, "service_account:{id}"),
        }
    }
}

pub type RoleAssignmentAssociation = Association<Assignee, ()>;
pub type RoleAssignmentMatcher = TupleMatcher<Assignee, ()>;

/// Everything assigned to one role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleAssignmentsItem {
    #[serde(default, deserialize_with = "deserialize_scoped_ids")]
    pub users: Vec<i64>,
    #[serde(default, deserialize_with = "deserialize_scoped_ids")]
    pub teams: Vec<i64>,
    #[serde(default, deserialize_with = "deserialize_scoped_ids")]
    pub service_accounts: Vec<i64>,
}

impl RoleAssignmentsItem {
    fn assignees(self) -> impl Iterator<Item = Assignee> {
        self.users
            .into_iter()
            .map(Assignee::User)
            .chain(self.teams.into_iter().map(Assignee::Team))
            .chain(self.service_accounts.into_iter().map(Assignee::ServiceAccount))
    }
}

/// Desired assignees of the role `parent`. Repeated ids are left to the diff,
/// which rejects them as duplicate keys.
#[must_use]
pub fn desired_role_assignments(
    parent: &ParentId,
    item: RoleAssignmentsItem,
) -> Vec<RoleAssignmentAssociation> {
    item.assignees()
        .map(|assignee| Association::desired(parent.clone(), assignee, ()))
        .collect()
}

/// Current assignees of the role `parent`, addressed remotely by assignee.
#[must_use]
pub fn current_role_assignments(
    parent: &ParentId,
    item: RoleAssignmentsItem,
) -> Vec<RoleAssignmentAssociation> {
    item.assignees()
        .map(|assignee| Association::current(parent.clone(), assignee, assignee.to_string(), ()))
        .collect()
}

#[must_use]
pub fn role_assignment_reconciler() -> Reconciler<RoleAssignmentMatcher> {
    Reconciler::for_resource(
        RoleAssignmentMatcher::new(),
        ResourceKind::RoleAssignments.as_str(),
    )
}
