use converge::{ConfigurationError, DuplicateNaturalKey, InvalidAssociation};

/// A single configured or listed item that cannot become an association.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ItemError {
    #[error("Exactly one of `team_id`, `user_id` or `built_in_role` must be set, found none")]
    MissingSubject,
    #[error("Exactly one of `team_id`, `user_id` or `built_in_role` must be set, found {0}")]
    MultipleSubjects(String),
    #[error("Invalid identifier `{0}`: expected `<id>` or `<org id>:<id>`")]
    InvalidScopedId(String),
    #[error("Permission `{level}` is not supported for {resource}, expected one of {allowed}")]
    UnsupportedPermission {
        level: String,
        resource: &'static str,
        allowed: String,
    },
    #[error("Unknown built-in role `{0}`")]
    UnknownRole(String),
    #[error("Built-in role subjects are not supported for {0}")]
    BuiltInRoleNotSupported(&'static str),
    #[error("Role '{0}' cannot be specified multiple times.")]
    DuplicateRole(String),
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
}

impl From<ItemError> for ConfigurationError {
    fn from(err: ItemError) -> Self {
        match err {
            ItemError::DuplicateRole(uid) => DuplicateNaturalKey::new(&uid)
                .append_detail(format!("Role '{uid}' cannot be specified multiple times."))
                .into(),
            other => InvalidAssociation::new(other.to_string()).into(),
        }
    }
}
