use std::{
    fmt::{Debug, Display},
    hash::Hash,
};

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Key used to pair desired associations with current ones.
///
/// Blanket-implemented for every type with the required bounds.
pub trait NaturalKey: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static {}

impl<T> NaturalKey for T where T: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static {}

/// Mutable payload of an association.
pub trait AssociationAttributes: Clone + Debug + PartialEq + Send + Sync + 'static {}

impl<T> AssociationAttributes for T where T: Clone + Debug + PartialEq + Send + Sync + 'static {}

macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_identifier!(
    /// Opaque identifier of the resource owning a collection of associations
    /// (dashboard, folder, datasource, role, service account, contact point, ...).
    ParentId
);

string_identifier!(
    /// Identifier assigned by the remote system once an association exists there.
    /// Numeric ids are stored in their decimal form.
    RemoteId
);

/// One edge between a parent resource and a target principal or notifier.
///
/// Desired associations usually carry no [`RemoteId`]; current associations
/// always do, as they originate from the gateway listing.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct Association<K, A> {
    #[builder(setter(into))]
    pub parent: ParentId,
    pub key: K,
    #[builder(default, setter(strip_option, into))]
    pub remote_id: Option<RemoteId>,
    pub attributes: A,
}

impl<K, A> Association<K, A> {
    /// Association that does not exist remotely yet.
    #[must_use]
    pub fn desired(parent: impl Into<ParentId>, key: K, attributes: A) -> Self {
        Self {
            parent: parent.into(),
            key,
            remote_id: None,
            attributes,
        }
    }

    /// Association as reported by the remote system.
    #[must_use]
    pub fn current(
        parent: impl Into<ParentId>,
        key: K,
        remote_id: impl Into<RemoteId>,
        attributes: A,
    ) -> Self {
        Self {
            parent: parent.into(),
            key,
            remote_id: Some(remote_id.into()),
            attributes,
        }
    }

    #[must_use]
    pub fn with_remote_id(mut self, remote_id: impl Into<RemoteId>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }

    #[must_use]
    pub fn exists_remotely(&self) -> bool {
        self.remote_id.is_some()
    }
}
