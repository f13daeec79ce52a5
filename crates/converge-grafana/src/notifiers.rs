//! Notifiers of a contact point.
//!
//! A contact point holds at most one notifier per type. Notifiers are matched
//! by type and updated in place through their UID. Secure settings are
//! write-only: the remote never reports their values back.

use std::collections::BTreeMap;

use converge::{
    Association, ConfigurationError, ExecutionReport, InvalidAssociation, ParentId, Reconciler,
    matcher::{TypedSingletonMatcher, WriteOnlyFields},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use veil::Redact;

use crate::ResourceKind;

/// Placeholder the remote reports instead of a secure value.
const REDACTED: &str = "[REDACTED]";

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
    strum_macros::EnumIter,
    strum_macros::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NotifierType {
    Alertmanager,
    Dingding,
    Discord,
    Email,
    Googlechat,
    Kafka,
    Line,
    Mqtt,
    Oncall,
    Opsgenie,
    Pagerduty,
    Pushover,
    Sensugo,
    Slack,
    Sns,
    Teams,
    Telegram,
    Threema,
    Victorops,
    Webex,
    Webhook,
    Wecom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifierSpec {
    pub notifier_type: NotifierType,
    /// Type name used by the remote API.
    pub remote_type: &'static str,
    /// Write-only settings.
    pub secure_fields: &'static [&'static str],
}

const fn notifier(
    notifier_type: NotifierType,
    remote_type: &'static str,
    secure_fields: &'static [&'static str],
) -> NotifierSpec {
    NotifierSpec {
        notifier_type,
        remote_type,
        secure_fields,
    }
}

/// Indexed by `NotifierType` discriminant.
static NOTIFIERS: [NotifierSpec; 22] = [
    notifier(NotifierType::Alertmanager, "prometheus-alertmanager", &["basic_auth_password"]),
    notifier(NotifierType::Dingding, "dingding", &[]),
    notifier(NotifierType::Discord, "discord", &["url"]),
    notifier(NotifierType::Email, "email", &[]),
    notifier(NotifierType::Googlechat, "googlechat", &["url"]),
    notifier(NotifierType::Kafka, "kafka", &["rest_proxy_url", "password"]),
    notifier(NotifierType::Line, "LINE", &["token"]),
    notifier(NotifierType::Mqtt, "mqtt", &["password"]),
    notifier(NotifierType::Oncall, "oncall", &["basic_auth_password", "authorization_credentials"]),
    notifier(NotifierType::Opsgenie, "opsgenie", &["api_key"]),
    notifier(NotifierType::Pagerduty, "pagerduty", &["integration_key"]),
    notifier(NotifierType::Pushover, "pushover", &["user_key", "api_token"]),
    notifier(NotifierType::Sensugo, "sensugo", &["api_key"]),
    notifier(NotifierType::Slack, "slack", &["url", "token"]),
    notifier(NotifierType::Sns, "sns", &["access_key", "secret_key"]),
    notifier(NotifierType::Teams, "teams", &["url"]),
    notifier(NotifierType::Telegram, "telegram", &["token"]),
    notifier(NotifierType::Threema, "threema", &["api_secret"]),
    notifier(NotifierType::Victorops, "victorops", &["url"]),
    notifier(NotifierType::Webex, "webex", &["token"]),
    notifier(NotifierType::Webhook, "webhook", &["basic_auth_password", "authorization_credentials"]),
    notifier(NotifierType::Wecom, "wecom", &["url", "secret"]),
];

impl NotifierType {
    #[must_use]
    pub fn spec(self) -> &'static NotifierSpec {
        &NOTIFIERS[self as usize]
    }

    /// Name of the notifier block in a contact point definition.
    #[must_use]
    pub fn field(self) -> &'static str {
        self.into()
    }

    #[must_use]
    pub fn from_remote_type(remote_type: &str) -> Option<Self> {
        NOTIFIERS
            .iter()
            .find(|spec| spec.remote_type.eq_ignore_ascii_case(remote_type))
            .map(|spec| spec.notifier_type)
    }
}

#[derive(Clone, PartialEq, Serialize, Redact)]
pub struct NotifierAttributes {
    pub disable_resolve_message: bool,
    pub settings: Map<String, Value>,
    #[redact]
    #[serde(skip_serializing)]
    pub secure_settings: BTreeMap<String, String>,
}

impl WriteOnlyFields for NotifierAttributes {
    fn public_eq(&self, other: &Self) -> bool {
        self.disable_resolve_message == other.disable_resolve_message
            && self.settings == other.settings
    }

    fn write_only(&self) -> &BTreeMap<String, String> {
        &self.secure_settings
    }
}

impl NotifierAttributes {
    /// Splits `settings` into public and secure settings of `notifier_type`.
    /// Empty values are dropped, and so are secure values the remote redacted.
    fn from_settings(
        notifier_type: NotifierType,
        disable_resolve_message: bool,
        mut settings: Map<String, Value>,
    ) -> Self {
        settings.retain(|_, v| !is_empty_value(v));
        let mut secure_settings = BTreeMap::new();
        for field in notifier_type.spec().secure_fields {
            let value = match settings.remove(*field) {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => continue,
            };
            if value != REDACTED {
                secure_settings.insert((*field).to_string(), value);
            }
        }
        Self {
            disable_resolve_message,
            settings,
            secure_settings,
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

pub type NotifierAssociation = Association<NotifierType, NotifierAttributes>;
pub type NotifierMatcher = TypedSingletonMatcher<NotifierType, NotifierAttributes>;

/// One notifier block as written by operators.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NotifierItem {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default)]
    pub disable_resolve_message: bool,
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl NotifierItem {
    /// A block whose only populated field is its UID requests removal of that
    /// notifier.
    #[must_use]
    pub fn is_zeroed(&self) -> bool {
        !self.uid.is_empty()
            && !self.disable_resolve_message
            && self.settings.values().all(is_empty_value)
    }
}

/// A contact point as written by operators: its name and notifier blocks
/// grouped by type.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ContactPointItem {
    pub name: String,
    #[serde(flatten)]
    pub notifiers: BTreeMap<NotifierType, Vec<NotifierItem>>,
}

/// A notifier as listed by the remote contact point API.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNotifier {
    pub uid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub notifier_type: String,
    #[serde(default)]
    pub disable_resolve_message: bool,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

/// Desired notifiers of the contact point `parent`. Zeroed blocks are
/// dropped so the diff removes their notifier.
pub fn desired_notifiers(
    parent: &ParentId,
    item: ContactPointItem,
) -> Result<Vec<NotifierAssociation>, ConfigurationError> {
    if item.name != parent.as_str() {
        return Err(InvalidAssociation::new(format!(
            "contact point `{}` cannot be reconciled as `{parent}`",
            item.name
        ))
        .into());
    }
    let mut desired = Vec::new();
    for (notifier_type, blocks) in item.notifiers {
        for block in blocks {
            if block.is_zeroed() {
                tracing::debug!(
                    contact_point = %parent,
                    notifier = %notifier_type,
                    uid = %block.uid,
                    "Notifier block zeroed, removing notifier"
                );
                continue;
            }
            let attributes = NotifierAttributes::from_settings(
                notifier_type,
                block.disable_resolve_message,
                block.settings,
            );
            let mut association = Association::desired(parent.clone(), notifier_type, attributes);
            if !block.uid.is_empty() {
                association = association.with_remote_id(block.uid);
            }
            desired.push(association);
        }
    }
    Ok(desired)
}

/// Current notifiers of the contact point `parent`. Notifiers of unknown
/// types are left alone.
#[must_use]
pub fn current_notifiers(parent: &ParentId, listed: Vec<RemoteNotifier>) -> Vec<NotifierAssociation> {
    listed
        .into_iter()
        .filter(|n| n.name == parent.as_str())
        .filter_map(|n| {
            let Some(notifier_type) = NotifierType::from_remote_type(&n.notifier_type) else {
                tracing::warn!(
                    contact_point = %parent,
                    uid = %n.uid,
                    notifier = %n.notifier_type,
                    "Skipping notifier of unknown type"
                );
                return None;
            };
            let attributes =
                NotifierAttributes::from_settings(notifier_type, n.disable_resolve_message, n.settings);
            Some(Association::current(parent.clone(), notifier_type, n.uid, attributes))
        })
        .collect()
}

/// Remote payload creating or updating `association`, secure settings
/// included.
#[must_use]
pub fn remote_payload(association: &NotifierAssociation) -> RemoteNotifier {
    let attributes = &association.attributes;
    let mut settings = attributes.settings.clone();
    for (field, value) in &attributes.secure_settings {
        settings.insert(field.clone(), Value::String(value.clone()));
    }
    RemoteNotifier {
        uid: association
            .remote_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        name: association.parent.to_string(),
        notifier_type: association.key.spec().remote_type.to_string(),
        disable_resolve_message: attributes.disable_resolve_message,
        settings,
    }
}

/// Records the UIDs of created notifiers in `item` so the next run can
/// target them.
pub fn write_back_uids(item: &mut ContactPointItem, report: &ExecutionReport<NotifierType>) {
    for (notifier_type, uid) in &report.created {
        if let Some(block) = item
            .notifiers
            .get_mut(notifier_type)
            .and_then(|blocks| blocks.iter_mut().find(|b| !b.is_zeroed()))
        {
            block.uid = uid.to_string();
        }
    }
}

#[must_use]
pub fn notifier_reconciler() -> Reconciler<NotifierMatcher> {
    Reconciler::for_resource(
        NotifierMatcher::new(),
        ResourceKind::ContactPointNotifiers.as_str(),
    )
}

#[cfg(test)]
mod tests {
    use converge::{
        ConvergeError, DiffError, IdentityMatcher, RemoteId,
        tests::{InMemoryGateway, Operation},
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use strum::IntoEnumIterator;

    use super::*;

    fn contact_point() -> ParentId {
        ParentId::from("on-call")
    }

    fn item(value: Value) -> ContactPointItem {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_lookup_table_is_indexed_by_type() {
        for notifier_type in NotifierType::iter() {
            assert_eq!(notifier_type.spec().notifier_type, notifier_type);
            assert_eq!(
                NotifierType::from_remote_type(notifier_type.spec().remote_type),
                Some(notifier_type)
            );
        }
        assert_eq!(NotifierType::from_remote_type("line"), Some(NotifierType::Line));
        assert_eq!(
            NotifierType::Alertmanager.spec().remote_type,
            "prometheus-alertmanager"
        );
        assert_eq!(NotifierType::Googlechat.field(), "googlechat");
    }

    #[test]
    fn test_secure_settings_are_split_and_redacted_in_debug() {
        let desired = desired_notifiers(
            &contact_point(),
            item(json!({
                "name": "on-call",
                "slack": [{"recipient": "#alerts", "token": "xoxb-secret", "url": ""}]
            })),
        )
        .unwrap();
        assert_eq!(desired.len(), 1);
        let attributes = &desired[0].attributes;
        assert_eq!(attributes.settings, json!({"recipient": "#alerts"}).as_object().unwrap().clone());
        assert_eq!(attributes.secure_settings["token"], "xoxb-secret");
        assert!(!format!("{attributes:?}").contains("xoxb-secret"));
        assert!(!serde_json::to_string(attributes).unwrap().contains("xoxb-secret"));
    }

    #[test]
    fn test_zeroed_block_is_dropped() {
        let desired = desired_notifiers(
            &contact_point(),
            item(json!({
                "name": "on-call",
                "email": [{"uid": "email-uid", "addresses": ""}],
                "discord": [{"url": "https://discord/hook"}]
            })),
        )
        .unwrap();
        let keys: Vec<_> = desired.iter().map(|a| a.key).collect();
        assert_eq!(keys, vec![NotifierType::Discord]);
    }

    #[test]
    fn test_redacted_current_secret_does_not_diverge() {
        let desired = desired_notifiers(
            &contact_point(),
            item(json!({"name": "on-call", "telegram": [{"chatid": "1", "token": "t0ken"}]})),
        )
        .unwrap();
        let current = current_notifiers(
            &contact_point(),
            vec![RemoteNotifier {
                uid: "tg-uid".to_string(),
                name: "on-call".to_string(),
                notifier_type: "telegram".to_string(),
                disable_resolve_message: false,
                settings: json!({"chatid": "1", "token": "[REDACTED]"})
                    .as_object()
                    .unwrap()
                    .clone(),
            }],
        );
        assert!(!NotifierMatcher::new().needs_update(&desired[0], &current[0]));
    }

    #[test]
    fn test_remote_payload_restores_secure_settings() {
        let desired = desired_notifiers(
            &contact_point(),
            item(json!({"name": "on-call", "line": [{"uid": "line-uid", "token": "abc"}]})),
        )
        .unwrap();
        let payload = remote_payload(&desired[0]);
        assert_eq!(payload.uid, "line-uid");
        assert_eq!(payload.notifier_type, "LINE");
        assert_eq!(payload.settings["token"], "abc");
    }

    #[test]
    fn test_contact_point_name_must_match_parent() {
        let err = desired_notifiers(
            &contact_point(),
            item(json!({"name": "other", "email": [{"addresses": "a@example.com"}]})),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidAssociation(_)));
    }

    #[tokio::test]
    async fn test_duplicate_notifier_type_is_rejected() {
        let gateway = InMemoryGateway::new();
        gateway.add_parent(contact_point());
        let desired = desired_notifiers(
            &contact_point(),
            item(json!({
                "name": "on-call",
                "email": [{"addresses": "a@example.com"}, {"addresses": "b@example.com"}]
            })),
        )
        .unwrap();

        let err = notifier_reconciler()
            .reconcile(&contact_point(), &desired, &gateway)
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

    #[tokio::test]
    async fn test_notifiers_converge_and_uids_are_written_back() {
        let gateway = InMemoryGateway::new();
        gateway.add_parent(contact_point());
        let listed = vec![
            RemoteNotifier {
                uid: "email-uid".to_string(),
                name: "on-call".to_string(),
                notifier_type: "email".to_string(),
                disable_resolve_message: false,
                settings: json!({"addresses": "old@example.com"}).as_object().unwrap().clone(),
            },
            RemoteNotifier {
                uid: "hook-uid".to_string(),
                name: "on-call".to_string(),
                notifier_type: "webhook".to_string(),
                disable_resolve_message: false,
                settings: json!({"url": "https://hooks"}).as_object().unwrap().clone(),
            },
        ];
        for association in current_notifiers(&contact_point(), listed) {
            gateway.seed(association);
        }

        let mut config = item(json!({
            "name": "on-call",
            "email": [{"addresses": "oncall@example.com"}],
            "webhook": [{"uid": "hook-uid"}],
            "pagerduty": [{"integration_key": "pd-key", "severity": "critical"}]
        }));
        let desired = desired_notifiers(&contact_point(), config.clone()).unwrap();

        let report = notifier_reconciler()
            .reconcile(&contact_point(), &desired, &gateway)
            .await
            .unwrap();
        assert_eq!(
            report.updated,
            vec![(NotifierType::Email, RemoteId::from("email-uid"))]
        );
        assert_eq!(
            report.removed,
            vec![(NotifierType::Webhook, RemoteId::from("hook-uid"))]
        );
        assert_eq!(report.created.len(), 1);
        assert_eq!(
            gateway.mutating_operations(),
            vec![Operation::Create, Operation::Update, Operation::Remove]
        );

        write_back_uids(&mut config, &report);
        assert_eq!(
            config.notifiers[&NotifierType::Pagerduty][0].uid,
            report.created[0].1.to_string()
        );
    }
}
