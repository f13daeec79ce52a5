#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![forbid(unsafe_code)]

pub mod alerting;
mod error;
pub mod notifiers;
pub mod permissions;
pub mod roles;
mod scoped_id;

pub use error::ItemError;
pub use scoped_id::parse_scoped_id;

/// Association collections that can be reconciled.
///
/// The snake case name is the resource kind used for per-resource
/// configuration such as `phase_order_overrides`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
    strum_macros::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ResourceKind {
    DashboardPermissions,
    FolderPermissions,
    DatasourcePermissions,
    ServiceAccountPermissions,
    BuiltInRoleAssignments,
    RoleAssignments,
    ContactPointNotifiers,
    MessageTemplates,
    MuteTimings,
}

impl ResourceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}
