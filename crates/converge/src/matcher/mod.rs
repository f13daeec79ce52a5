//! Identity matchers decide which desired association pairs with which
//! current one, and whether a pair needs an update.

mod singleton;
mod tuple;

pub use singleton::{TypedSingletonMatcher, WriteOnlyFields};
pub use tuple::TupleMatcher;

use crate::{Association, AssociationAttributes, NaturalKey};

pub type AssociationOf<M> =
    Association<<M as IdentityMatcher>::Key, <M as IdentityMatcher>::Attributes>;

pub trait IdentityMatcher: Send + Sync {
    type Key: NaturalKey;
    type Attributes: AssociationAttributes;

    /// Whether `desired` and `current` describe the same remote association.
    ///
    /// Must be consistent with natural key equality: two desired associations
    /// with distinct keys never both match the same current one.
    fn matches(
        &self,
        desired: &Association<Self::Key, Self::Attributes>,
        current: &Association<Self::Key, Self::Attributes>,
    ) -> bool {
        desired.key == current.key
    }

    /// Whether a matched pair differs in anything the remote system stores.
    fn needs_update(
        &self,
        desired: &Association<Self::Key, Self::Attributes>,
        current: &Association<Self::Key, Self::Attributes>,
    ) -> bool {
        desired.attributes != current.attributes
    }

    /// Copies identity information from `current` into a matched `desired`
    /// before it is planned.
    fn carry_over(
        &self,
        desired: &mut Association<Self::Key, Self::Attributes>,
        current: &Association<Self::Key, Self::Attributes>,
    ) {
        desired.remote_id.clone_from(&current.remote_id);
    }
}
