use std::{collections::BTreeMap, fmt::Debug, marker::PhantomData};

use crate::{Association, AssociationAttributes, IdentityMatcher, NaturalKey};

/// Attributes holding sensitive values the remote system accepts but may not
/// report back.
pub trait WriteOnlyFields {
    /// Equality over every attribute except the write-only ones.
    fn public_eq(&self, other: &Self) -> bool;

    /// Write-only values keyed by field name.
    fn write_only(&self) -> &BTreeMap<String, String>;
}

/// Matches by a type tag when at most one association per tag may exist on a
/// parent, e.g. one `email` notifier per contact point.
///
/// On match the current remote id (the notifier UID) is carried over so the
/// association is updated in place instead of being deleted and recreated.
/// A write-only value only counts as divergent when both sides report it and
/// the values differ.
///
/// A remote that hides its secrets therefore never sees a rotated secret on
/// its own: changing only a token in the desired config plans no update. The
/// rotation reaches the remote with the next update caused by a public field.
pub struct TypedSingletonMatcher<T, A>(PhantomData<fn() -> (T, A)>);

impl<T, A> TypedSingletonMatcher<T, A> {
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T, A> Default for TypedSingletonMatcher<T, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A> Clone for TypedSingletonMatcher<T, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, A> Copy for TypedSingletonMatcher<T, A> {}

impl<T, A> Debug for TypedSingletonMatcher<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TypedSingletonMatcher")
    }
}

impl<T, A> IdentityMatcher for TypedSingletonMatcher<T, A>
where
    T: NaturalKey,
    A: AssociationAttributes + WriteOnlyFields,
{
    type Key = T;
    type Attributes = A;

    fn needs_update(&self, desired: &Association<T, A>, current: &Association<T, A>) -> bool {
        if !desired.attributes.public_eq(&current.attributes) {
            return true;
        }
        let current_secrets = current.attributes.write_only();
        desired
            .attributes
            .write_only()
            .iter()
            .any(|(field, value)| match current_secrets.get(field) {
                Some(reported) if !reported.is_empty() && !value.is_empty() => reported != value,
                _ => false,
            })
    }

    fn carry_over(&self, desired: &mut Association<T, A>, current: &Association<T, A>) {
        if let (Some(configured), Some(remote)) = (&desired.remote_id, &current.remote_id) {
            if configured != remote {
                tracing::debug!(
                    key = %desired.key,
                    configured = %configured,
                    remote = %remote,
                    "Replacing configured uid with the uid reported remotely"
                );
            }
        }
        desired.remote_id.clone_from(&current.remote_id);
    }
}
