use std::{fmt::Debug, marker::PhantomData};

use crate::{AssociationAttributes, IdentityMatcher, NaturalKey};

/// Matches by natural key equality and updates on any attribute difference.
///
/// Used for collections such as permissions, where the key is the subject
/// (team, user or built-in role) and the attributes are the granted level.
pub struct TupleMatcher<K, A>(PhantomData<fn() -> (K, A)>);

impl<K, A> TupleMatcher<K, A> {
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<K, A> Default for TupleMatcher<K, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, A> Clone for TupleMatcher<K, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, A> Copy for TupleMatcher<K, A> {}

impl<K, A> Debug for TupleMatcher<K, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TupleMatcher")
    }
}

impl<K: NaturalKey, A: AssociationAttributes> IdentityMatcher for TupleMatcher<K, A> {
    type Key = K;
    type Attributes = A;
}
