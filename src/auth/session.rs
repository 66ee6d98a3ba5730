//! The normalized session and conversions to and from provider attributes.

use crate::config::AuthConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::provider::Attribute;

const CUSTOM_PREFIX: &str = "custom:";

/// The signed-in user, independent of the provider.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Every other attribute, keyed by its normalized name.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Session {
    /// Build a session from the provider's attribute list.
    ///
    /// `sub` becomes `id`, a leading `custom:` is dropped, and attributes
    /// listed in `config.json_fields` are decoded as JSON (kept as a
    /// string when they fail to parse).
    pub fn from_attributes(attributes: &[Attribute], config: &AuthConfig) -> Self {
        let mut session = Session::default();

        for attribute in attributes {
            let key = normalized_name(&attribute.name);
            let raw = attribute.value.clone();
            match key {
                "id" => session.id = raw,
                "email" => session.email = Some(raw),
                "phone_number" => session.phone_number = Some(raw),
                "name" => session.display_name = Some(raw),
                "picture" => session.photo_url = Some(raw),
                _ => {
                    let value = if config.json_fields.iter().any(|f| f == key) {
                        serde_json::from_str(&raw).unwrap_or(Value::String(raw))
                    } else {
                        Value::String(raw)
                    };
                    session.attributes.insert(key.to_string(), value);
                }
            }
        }

        session
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

fn normalized_name(name: &str) -> &str {
    let name = name.strip_prefix(CUSTOM_PREFIX).unwrap_or(name);
    if name == "sub" {
        "id"
    } else {
        name
    }
}

/// Turn a profile patch into provider attributes.
///
/// Keys use the session's field names (`displayName`, `photoURL`,
/// `phoneNumber` or any custom attribute). Configured custom and JSON
/// fields get the `custom:` prefix; JSON fields are serialized. `id` is
/// never sent.
pub fn to_provider_attributes(patch: &Map<String, Value>, config: &AuthConfig) -> Vec<Attribute> {
    patch
        .iter()
        .filter(|(key, _)| key.as_str() != "id")
        .map(|(key, value)| {
            let is_json = config.json_fields.iter().any(|f| f == key);
            let is_custom = is_json || config.custom_fields.iter().any(|f| f == key);

            let name = match key.as_str() {
                "displayName" => "name".to_string(),
                "photoURL" => "picture".to_string(),
                "phoneNumber" => "phone_number".to_string(),
                _ if is_custom => format!("{CUSTOM_PREFIX}{key}"),
                _ => key.clone(),
            };
            let value = match value {
                Value::String(s) if !is_json => s.clone(),
                other => other.to_string(),
            };

            Attribute { name, value }
        })
        .collect()
}
