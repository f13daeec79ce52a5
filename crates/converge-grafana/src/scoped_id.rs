use serde::{Deserialize, Deserializer};

use crate::ItemError;

/// Parses a team, user or service account id written as `<id>` or
/// `<org id>:<id>`. The org prefix is dropped. `0` and the empty string mean
/// unset.
pub fn parse_scoped_id(raw: &str) -> Result<Option<i64>, ItemError> {
    let raw = raw.trim();
    let id = match raw.split_once(':') {
        Some((org, id)) if !org.is_empty() && org.parse::<i64>().is_ok() => id,
        Some(_) => return Err(ItemError::InvalidScopedId(raw.to_string())),
        None => raw,
    };
    if id.is_empty() {
        return Ok(None);
    }
    match id.parse::<i64>() {
        Ok(0) => Ok(None),
        Ok(id) if id > 0 => Ok(Some(id)),
        _ => Err(ItemError::InvalidScopedId(raw.to_string())),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

impl RawId {
    fn resolve(self) -> Result<Option<i64>, ItemError> {
        match self {
            RawId::Number(0) => Ok(None),
            RawId::Number(id) if id > 0 => Ok(Some(id)),
            RawId::Number(id) => Err(ItemError::InvalidScopedId(id.to_string())),
            RawId::Text(text) => parse_scoped_id(&text),
        }
    }
}

pub(crate) fn deserialize_scoped_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawId>::deserialize(deserializer)? {
        Some(raw) => raw.resolve().map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

pub(crate) fn deserialize_scoped_ids<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<RawId>::deserialize(deserializer)?;
    let mut ids = Vec::with_capacity(raw.len());
    for id in raw {
        match id.resolve().map_err(serde::de::Error::custom)? {
            Some(id) => ids.push(id),
            None => return Err(serde::de::Error::custom("identifiers must not be 0 or empty")),
        }
    }
    Ok(ids)
}
