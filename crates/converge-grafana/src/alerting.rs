//! Global alerting collections: message templates and mute timings.
//!
//! These collections have no parent resource. Each one is reconciled as a
//! whole under its own exclusive scope, so concurrent reconciliations of the
//! same collection never interleave.

use converge::{
    Association, AssociationAttributes, ConfigurationError, ExclusiveScopes, InvalidAssociation,
    ParentId, Reconciler, matcher::TupleMatcher,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum GlobalCollection {
    MessageTemplates,
    MuteTimings,
}

impl GlobalCollection {
    /// Pseudo parent holding every entry of the collection.
    #[must_use]
    pub fn parent(self) -> ParentId {
        ParentId::new(self.to_string())
    }

    #[must_use]
    pub fn resource_kind(self) -> ResourceKind {
        match self {
            GlobalCollection::MessageTemplates => ResourceKind::MessageTemplates,
            GlobalCollection::MuteTimings => ResourceKind::MuteTimings,
        }
    }
}

/// Entry of a global collection, keyed and addressed remotely by name.
pub trait GlobalItem {
    const COLLECTION: GlobalCollection;
    type Attributes: AssociationAttributes;

    fn name(&self) -> &str;

    fn into_attributes(self) -> Self::Attributes;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplateItem {
    pub name: String,
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageTemplateAttributes {
    pub template: String,
}

impl GlobalItem for MessageTemplateItem {
    const COLLECTION: GlobalCollection = GlobalCollection::MessageTemplates;
    type Attributes = MessageTemplateAttributes;

    fn name(&self) -> &str {
        &self.name
    }

    fn into_attributes(self) -> Self::Attributes {
        MessageTemplateAttributes {
            template: self.template,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuteTimingItem {
    pub name: String,
    #[serde(default)]
    pub time_intervals: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MuteTimingAttributes {
    pub time_intervals: Vec<Value>,
}

impl GlobalItem for MuteTimingItem {
    const COLLECTION: GlobalCollection = GlobalCollection::MuteTimings;
    type Attributes = MuteTimingAttributes;

    fn name(&self) -> &str {
        &self.name
    }

    fn into_attributes(self) -> Self::Attributes {
        MuteTimingAttributes {
            time_intervals: self.time_intervals,
        }
    }
}

pub type GlobalAssociation<I> = Association<String, <I as GlobalItem>::Attributes>;
pub type GlobalMatcher<I> = TupleMatcher<String, <I as GlobalItem>::Attributes>;

pub fn desired_entries<I: GlobalItem>(
    items: Vec<I>,
) -> Result<Vec<GlobalAssociation<I>>, ConfigurationError> {
    let parent = I::COLLECTION.parent();
    items
        .into_iter()
        .map(|item| {
            if item.name().trim().is_empty() {
                return Err(ConfigurationError::from(InvalidAssociation::new(format!(
                    "every entry of {} needs a name",
                    I::COLLECTION
                ))));
            }
            let name = item.name().to_string();
            Ok(Association::desired(parent.clone(), name, item.into_attributes()))
        })
        .collect()
}

#[must_use]
pub fn current_entries<I: GlobalItem>(listed: Vec<I>) -> Vec<GlobalAssociation<I>> {
    let parent = I::COLLECTION.parent();
    listed
        .into_iter()
        .map(|item| {
            let name = item.name().to_string();
            Association::current(parent.clone(), name.clone(), name, item.into_attributes())
        })
        .collect()
}

/// Reconciler holding the exclusive scope of the item's collection in
/// `scopes` for the duration of each run.
#[must_use]
pub fn reconciler<I: GlobalItem>(scopes: &ExclusiveScopes) -> Reconciler<GlobalMatcher<I>> {
    Reconciler::for_resource(
        GlobalMatcher::<I>::new(),
        I::COLLECTION.resource_kind().as_str(),
    )
    .with_exclusive_scope(scopes.clone(), I::COLLECTION.to_string())
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use converge::tests::{InMemoryGateway, Operation};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn templates(entries: &[(&str, &str)]) -> Vec<MessageTemplateItem> {
        entries
            .iter()
            .map(|(name, template)| MessageTemplateItem {
                name: (*name).to_string(),
                template: (*template).to_string(),
            })
            .collect()
    }

    #[test]
    fn test_unnamed_entry_is_rejected() {
        let err = desired_entries(templates(&[("", "{{ define \"x\" }}{{ end }}")])).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidAssociation(_)));
    }

    #[tokio::test]
    async fn test_message_templates_converge() {
        let gateway = InMemoryGateway::new();
        for association in current_entries(templates(&[("a", "old"), ("stale", "x")])) {
            gateway.seed(association);
        }
        let scopes = ExclusiveScopes::new();
        let desired = desired_entries(templates(&[("a", "new"), ("b", "fresh")])).unwrap();

        let report = reconciler::<MessageTemplateItem>(&scopes)
            .reconcile(&GlobalCollection::MessageTemplates.parent(), &desired, &gateway)
            .await
            .unwrap();
        assert_eq!(report.updated.len(), 1);
        assert_eq!(report.created[0].0, "b");
        assert_eq!(report.removed[0].0, "stale");
    }

    #[tokio::test]
    async fn test_mute_timings_wait_for_their_scope() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.add_parent(GlobalCollection::MuteTimings.parent());
        let scopes = ExclusiveScopes::new();
        let desired = desired_entries(vec![MuteTimingItem {
            name: "weekends".to_string(),
            time_intervals: vec![json!({"weekdays": ["saturday", "sunday"]})],
        }])
        .unwrap();

        let held = scopes.acquire("mute_timings").await;
        // Templates use a different scope and are not blocked.
        let template_gateway = InMemoryGateway::new();
        template_gateway.add_parent(GlobalCollection::MessageTemplates.parent());
        tokio::time::timeout(
            Duration::from_secs(1),
            reconciler::<MessageTemplateItem>(&scopes).reconcile(
                &GlobalCollection::MessageTemplates.parent(),
                &[],
                &template_gateway,
            ),
        )
        .await
        .unwrap()
        .unwrap();

        let task = {
            let gateway = Arc::clone(&gateway);
            let scopes = scopes.clone();
            tokio::spawn(async move {
                reconciler::<MuteTimingItem>(&scopes)
                    .reconcile(&GlobalCollection::MuteTimings.parent(), &desired, gateway.as_ref())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(gateway.calls().is_empty());

        drop(held);
        let report = task.await.unwrap().unwrap();
        assert_eq!(report.created.len(), 1);
        assert_eq!(gateway.mutating_operations(), vec![Operation::Create]);
    }
}
