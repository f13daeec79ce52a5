//! Resource permissions of dashboards, folders, datasources and service
//! accounts.
//!
//! All four resources share the same remote permission API. A permission is
//! keyed by its subject (team, user or built-in role) and carries the granted
//! level as its only attribute.

use converge::{
    Association, ConfigurationError, ParentId, Reconciler, RemoteId, matcher::TupleMatcher,
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{ItemError, ResourceKind, scoped_id::deserialize_scoped_id};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
pub enum PermissionLevel {
    Query,
    View,
    Edit,
    Admin,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
pub enum BasicRole {
    Viewer,
    Editor,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum PermissionResource {
    Dashboards,
    Folders,
    Datasources,
    ServiceAccounts,
}

impl PermissionResource {
    /// Resource type segment of the remote permission API.
    #[must_use]
    pub fn api_type(self) -> &'static str {
        match self {
            PermissionResource::Dashboards => "dashboards",
            PermissionResource::Folders => "folders",
            PermissionResource::Datasources => "datasources",
            PermissionResource::ServiceAccounts => "serviceaccounts",
        }
    }

    #[must_use]
    pub fn allowed_levels(self) -> &'static [PermissionLevel] {
        match self {
            PermissionResource::Datasources => &[
                PermissionLevel::Query,
                PermissionLevel::Edit,
                PermissionLevel::Admin,
            ],
            PermissionResource::Dashboards
            | PermissionResource::Folders
            | PermissionResource::ServiceAccounts => &[
                PermissionLevel::View,
                PermissionLevel::Edit,
                PermissionLevel::Admin,
            ],
        }
    }

    /// Service accounts can only be shared with teams and users.
    #[must_use]
    pub fn supports_built_in_roles(self) -> bool {
        !matches!(self, PermissionResource::ServiceAccounts)
    }

    #[must_use]
    pub fn resource_kind(self) -> ResourceKind {
        match self {
            PermissionResource::Dashboards => ResourceKind::DashboardPermissions,
            PermissionResource::Folders => ResourceKind::FolderPermissions,
            PermissionResource::Datasources => ResourceKind::DatasourcePermissions,
            PermissionResource::ServiceAccounts => ResourceKind::ServiceAccountPermissions,
        }
    }

    fn check_level(self, level: PermissionLevel) -> Result<(), ItemError> {
        if self.allowed_levels().contains(&level) {
            Ok(())
        } else {
            Err(ItemError::UnsupportedPermission {
                level: level.to_string(),
                resource: self.api_type(),
                allowed: self.allowed_levels().iter().join("|"),
            })
        }
    }
}

/// Subject a permission is granted to. Users include service accounts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PermissionKey {
    Team(i64),
    User(i64),
    BuiltInRole(BasicRole),
}

impl std::fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionKey::Team(id) => write!(f, "team:{id}"),
            PermissionKey::User(id) => write!(f, "user:{id}"),
            PermissionKey::BuiltInRole(role) => write!(f, "role:{role}"),
        }
    }
}

impl PermissionKey {
    fn from_subjects(
        team_id: Option<i64>,
        user_id: Option<i64>,
        built_in_role: Option<BasicRole>,
    ) -> Result<Self, ItemError> {
        match (team_id, user_id, built_in_role) {
            (Some(team), None, None) => Ok(PermissionKey::Team(team)),
            (None, Some(user), None) => Ok(PermissionKey::User(user)),
            (None, None, Some(role)) => Ok(PermissionKey::BuiltInRole(role)),
            (None, None, None) => Err(ItemError::MissingSubject),
            (team, user, role) => Err(ItemError::MultipleSubjects(
                [
                    team.map(|id| format!("team_id={id}")),
                    user.map(|id| format!("user_id={id}")),
                    role.map(|role| format!("built_in_role={role}")),
                ]
                .into_iter()
                .flatten()
                .join(", "),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PermissionAttributes {
    pub permission: PermissionLevel,
}

pub type PermissionAssociation = Association<PermissionKey, PermissionAttributes>;
pub type PermissionMatcher = TupleMatcher<PermissionKey, PermissionAttributes>;

/// A permission as written by operators.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionItem {
    #[serde(default, deserialize_with = "deserialize_scoped_id")]
    pub team_id: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_scoped_id")]
    pub user_id: Option<i64>,
    #[serde(default, alias = "role")]
    pub built_in_role: Option<BasicRole>,
    pub permission: PermissionLevel,
}

/// A permission as listed by the remote permission API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePermission {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub team_id: i64,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub built_in_role: String,
    pub permission: String,
    #[serde(default = "default_true")]
    pub is_managed: bool,
    #[serde(default)]
    pub is_inherited: bool,
}

fn default_true() -> bool {
    true
}

/// Validates `items` and turns them into desired associations of `parent`.
pub fn desired_permissions(
    resource: PermissionResource,
    parent: &ParentId,
    items: Vec<PermissionItem>,
) -> Result<Vec<PermissionAssociation>, ConfigurationError> {
    items
        .into_iter()
        .map(|item| {
            let key = PermissionKey::from_subjects(item.team_id, item.user_id, item.built_in_role)?;
            if matches!(key, PermissionKey::BuiltInRole(_)) && !resource.supports_built_in_roles() {
                return Err(ItemError::BuiltInRoleNotSupported(resource.api_type()));
            }
            resource.check_level(item.permission)?;
            Ok(Association::desired(
                parent.clone(),
                key,
                PermissionAttributes {
                    permission: item.permission,
                },
            ))
        })
        .collect::<Result<Vec<_>, ItemError>>()
        .map_err(|e| {
            ConfigurationError::from(e)
                .append_detail(format!("Invalid {} permission on `{parent}`", resource.api_type()))
        })
}

/// Converts a remote listing into current associations of `parent`.
///
/// Inherited and unmanaged permissions are not reconciled and are dropped, as
/// are entries without a recognizable subject or level.
#[must_use]
pub fn current_permissions(
    resource: PermissionResource,
    parent: &ParentId,
    listed: Vec<RemotePermission>,
) -> Vec<PermissionAssociation> {
    listed
        .into_iter()
        .filter(|p| p.is_managed && !p.is_inherited)
        .filter_map(|p| {
            let key = match remote_key(&p) {
                Ok(key) => key,
                Err(e) => {
                    tracing::debug!(
                        parent = %parent,
                        resource = resource.api_type(),
                        id = p.id,
                        "Skipping listed permission: {e}"
                    );
                    return None;
                }
            };
            let Ok(permission) = p.permission.parse::<PermissionLevel>() else {
                tracing::warn!(
                    parent = %parent,
                    resource = resource.api_type(),
                    key = %key,
                    permission = %p.permission,
                    "Skipping listed permission with unknown level"
                );
                return None;
            };
            let remote_id = if p.id > 0 {
                RemoteId::from(p.id)
            } else {
                RemoteId::from(key.to_string())
            };
            Some(Association::current(
                parent.clone(),
                key,
                remote_id,
                PermissionAttributes { permission },
            ))
        })
        .collect()
}

fn remote_key(permission: &RemotePermission) -> Result<PermissionKey, ItemError> {
    let positive = |id: i64| (id > 0).then_some(id);
    let role = if permission.built_in_role.is_empty() {
        None
    } else {
        Some(
            permission
                .built_in_role
                .parse::<BasicRole>()
                .map_err(|_| ItemError::UnknownRole(permission.built_in_role.clone()))?,
        )
    };
    PermissionKey::from_subjects(positive(permission.team_id), positive(permission.user_id), role)
}

/// Reconciler for `resource`, with its phase order taken from configuration.
#[must_use]
pub fn reconciler(resource: PermissionResource) -> Reconciler<PermissionMatcher> {
    Reconciler::for_resource(PermissionMatcher::new(), resource.resource_kind().as_str())
}

#[cfg(test)]
mod tests {
    use converge::{
        ConvergeError, DiffError, ExecutionReport,
        tests::{InMemoryGateway, Operation},
    };
    use pretty_assertions::assert_eq;

    use super::*;

    fn folder() -> ParentId {
        ParentId::from("folder-uid")
    }

    fn items(json: &str) -> Vec<PermissionItem> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_desired_permissions_accept_org_scoped_ids() {
        let desired = desired_permissions(
            PermissionResource::Folders,
            &folder(),
            items(
                r#"[
                    {"team_id": "1:7", "permission": "Edit"},
                    {"user_id": 3, "permission": "View"},
                    {"role": "Viewer", "permission": "View"}
                ]"#,
            ),
        )
        .unwrap();
        let keys: Vec<_> = desired.iter().map(|a| a.key.to_string()).collect();
        assert_eq!(keys, vec!["team:7", "user:3", "role:Viewer"]);
        assert!(desired.iter().all(|a| a.remote_id.is_none()));
    }

    #[test]
    fn test_subject_must_be_unique() {
        let err = desired_permissions(
            PermissionResource::Dashboards,
            &folder(),
            items(r#"[{"team_id": 1, "user_id": 2, "permission": "View"}]"#),
        )
        .unwrap_err();
        assert!(err.to_string().contains("found team_id=1, user_id=2"));
        assert_eq!(err.stack().len(), 2);

        let err = desired_permissions(
            PermissionResource::Dashboards,
            &folder(),
            items(r#"[{"team_id": "0", "permission": "View"}]"#),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidAssociation(_)));
    }

    #[test]
    fn test_levels_depend_on_resource() {
        let query = items(r#"[{"team_id": 1, "permission": "Query"}]"#);
        assert!(desired_permissions(PermissionResource::Datasources, &folder(), query.clone()).is_ok());
        let err = desired_permissions(PermissionResource::Folders, &folder(), query).unwrap_err();
        assert!(err.to_string().contains("expected one of View|Edit|Admin"));

        let view = items(r#"[{"team_id": 1, "permission": "View"}]"#);
        assert!(desired_permissions(PermissionResource::Datasources, &folder(), view).is_err());
    }

    #[test]
    fn test_service_accounts_reject_built_in_roles() {
        let err = desired_permissions(
            PermissionResource::ServiceAccounts,
            &ParentId::from("12"),
            items(r#"[{"built_in_role": "Editor", "permission": "Edit"}]"#),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not supported for serviceaccounts"));
    }

    #[test]
    fn test_current_permissions_skip_unmanaged_and_subjectless() {
        let listed: Vec<RemotePermission> = serde_json::from_str(
            r#"[
                {"id": 1, "teamId": 7, "permission": "Edit", "isManaged": true},
                {"id": 2, "userId": 3, "permission": "View", "isManaged": false},
                {"id": 3, "builtInRole": "Viewer", "permission": "View", "isInherited": true},
                {"id": 4, "permission": "Admin"},
                {"id": 5, "builtInRole": "Editor", "permission": "Edit"},
                {"id": 6, "userId": 9, "permission": "Owner"}
            ]"#,
        )
        .unwrap();
        let current = current_permissions(PermissionResource::Folders, &folder(), listed);
        assert_eq!(
            current,
            vec![
                Association::current(
                    folder(),
                    PermissionKey::Team(7),
                    "1",
                    PermissionAttributes {
                        permission: PermissionLevel::Edit
                    }
                ),
                Association::current(
                    folder(),
                    PermissionKey::BuiltInRole(BasicRole::Editor),
                    "5",
                    PermissionAttributes {
                        permission: PermissionLevel::Edit
                    }
                ),
            ]
        );
    }

    fn seed(
        gateway: &InMemoryGateway<PermissionKey, PermissionAttributes>,
        key: PermissionKey,
        level: PermissionLevel,
    ) {
        gateway.seed(Association::desired(
            folder(),
            key,
            PermissionAttributes { permission: level },
        ));
    }

    #[tokio::test]
    async fn test_folder_permissions_converge() {
        let gateway = InMemoryGateway::new();
        gateway.add_parent(folder());
        seed(&gateway, PermissionKey::Team(7), PermissionLevel::View);
        seed(&gateway, PermissionKey::User(9), PermissionLevel::Admin);

        let desired = desired_permissions(
            PermissionResource::Folders,
            &folder(),
            items(
                r#"[
                    {"team_id": 7, "permission": "Edit"},
                    {"user_id": 3, "permission": "View"}
                ]"#,
            ),
        )
        .unwrap();

        let reconciler = reconciler(PermissionResource::Folders);
        let report = reconciler
            .reconcile(&folder(), &desired, &gateway)
            .await
            .unwrap();
        assert_eq!(
            report.updated.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
            vec![PermissionKey::Team(7)]
        );
        assert_eq!(report.created[0].0, PermissionKey::User(3));
        assert_eq!(report.removed[0].0, PermissionKey::User(9));

        let second = reconciler
            .reconcile(&folder(), &desired, &gateway)
            .await
            .unwrap();
        assert_eq!(second, ExecutionReport::default());
        assert_eq!(
            gateway.mutating_operations(),
            vec![Operation::Create, Operation::Update, Operation::Remove]
        );
    }

    #[tokio::test]
    async fn test_duplicate_subject_is_rejected_before_listing() {
        let gateway = InMemoryGateway::new();
        gateway.add_parent(folder());
        let desired = desired_permissions(
            PermissionResource::Folders,
            &folder(),
            items(
                r#"[
                    {"team_id": 7, "permission": "Edit"},
                    {"team_id": "1:7", "permission": "View"}
                ]"#,
            ),
        )
        .unwrap();

        let err = reconciler(PermissionResource::Folders)
            .reconcile(&folder(), &desired, &gateway)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConvergeError::Diff(DiffError::ConfigurationError(
                ConfigurationError::DuplicateNaturalKey(_)
            ))
        ));
        assert!(gateway.calls().is_empty());
    }

    fn team(id: i64, level: PermissionLevel) -> PermissionAssociation {
        Association::desired(folder(), PermissionKey::Team(id), PermissionAttributes { permission: level })
    }

    #[test]
    fn test_new_team_permission_is_created() {
        let plan = reconciler(PermissionResource::Folders)
            .diff(vec![team(7, PermissionLevel::Edit)], vec![])
            .unwrap();
        assert_eq!(plan.to_create, vec![team(7, PermissionLevel::Edit)]);
        assert!(plan.to_update.is_empty());
        assert!(plan.to_remove.is_empty());
    }

    #[test]
    fn test_changed_level_updates_existing_remote_id() {
        let current = team(7, PermissionLevel::Edit).with_remote_id("abc");
        let plan = reconciler(PermissionResource::Folders)
            .diff(vec![team(7, PermissionLevel::Admin)], vec![current])
            .unwrap();
        assert!(plan.to_create.is_empty());
        assert!(plan.to_remove.is_empty());
        assert_eq!(plan.to_update.len(), 1);
        assert_eq!(plan.to_update[0].remote_id, RemoteId::from("abc"));
        assert_eq!(plan.to_update[0].desired.attributes.permission, PermissionLevel::Admin);
    }

    #[tokio::test]
    async fn test_removal_of_vanished_permission_succeeds() {
        let gateway = InMemoryGateway::new();
        gateway.add_parent(folder());
        let current = Association::current(
            folder(),
            PermissionKey::User(3),
            "xyz",
            PermissionAttributes {
                permission: PermissionLevel::View,
            },
        );
        let reconciler = reconciler(PermissionResource::Folders);
        let plan = reconciler.diff(vec![], vec![current]).unwrap();
        assert_eq!(plan.to_remove[0].remote_id, RemoteId::from("xyz"));

        let report = reconciler.execute(plan, &gateway).await.unwrap();
        assert!(report.removed.is_empty());
        assert_eq!(
            report.already_absent,
            vec![(PermissionKey::User(3), RemoteId::from("xyz"))]
        );
    }

    #[test]
    fn test_unchanged_permission_plans_nothing_twice() {
        let reconciler = reconciler(PermissionResource::Folders);
        for _ in 0..2 {
            let current = team(7, PermissionLevel::Edit).with_remote_id("abc");
            let plan = reconciler
                .diff(vec![team(7, PermissionLevel::Edit)], vec![current])
                .unwrap();
            assert!(plan.is_empty());
            assert_eq!(plan.unchanged.len(), 1);
        }
    }
}
