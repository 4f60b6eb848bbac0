//! Model catalog normalization.
//!
//! The backend's `/api/v1/models` listing (and `models` pushes) can be
//! partially malformed: missing arrays, non-string or blank ids, duplicated
//! entries. [`normalize`] turns whatever arrived into a catalog the store can
//! trust.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

const UNKNOWN_PROVIDER: &str = "unknown";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalog {
    /// Server default model id; empty when unset or not in the catalog.
    pub current_model: String,
    pub providers: Vec<ProviderEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    pub enabled: bool,
    pub is_active: bool,
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub provider: String,
}

/// Flattened selectable model, as offered in a model picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelOption {
    pub id: String,
    pub provider: String,
    pub is_default: bool,
}

impl ModelCatalog {
    pub fn contains(&self, model_id: &str) -> bool {
        self.providers
            .iter()
            .any(|p| p.models.iter().any(|m| m.id == model_id))
    }

    /// Models of enabled providers, in catalog order.
    pub fn options(&self) -> Vec<ModelOption> {
        self.providers
            .iter()
            .filter(|p| p.enabled)
            .flat_map(|p| {
                p.models.iter().map(move |m| ModelOption {
                    id: m.id.clone(),
                    provider: m.provider.clone(),
                    is_default: m.id == self.current_model,
                })
            })
            .collect()
    }
}

/// Normalizes a raw provider/model listing.
///
/// - non-object providers and models with a missing, non-string or blank id
///   are dropped
/// - `enabled` defaults to true unless explicitly `false`
/// - providers with the same name are merged, and model ids are unique
///   within a provider (first occurrence wins)
/// - `current_model` becomes empty when it is not a string or not present
///   in the normalized catalog
pub fn normalize(raw: &Value) -> ModelCatalog {
    let mut providers: Vec<ProviderEntry> = Vec::new();

    let providers_raw = raw
        .get("providers")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for provider_raw in providers_raw {
        let Some(provider_obj) = provider_raw.as_object() else {
            tracing::debug!("[ModelCatalog] Dropping non-object provider entry");
            continue;
        };

        let name = non_blank_str(provider_obj.get("name"))
            .unwrap_or(UNKNOWN_PROVIDER)
            .to_string();
        let enabled = !matches!(provider_obj.get("enabled"), Some(Value::Bool(false)));
        let is_active = matches!(provider_obj.get("is_active"), Some(Value::Bool(true)));

        let index = match providers.iter().position(|p| p.name == name) {
            Some(index) => index,
            None => {
                providers.push(ProviderEntry {
                    name: name.clone(),
                    enabled,
                    is_active,
                    models: Vec::new(),
                });
                providers.len() - 1
            }
        };
        let entry = &mut providers[index];
        let mut seen: HashSet<String> = entry.models.iter().map(|m| m.id.clone()).collect();

        let models_raw = provider_obj
            .get("models")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for model_raw in models_raw {
            let Some(id) = non_blank_str(model_raw.get("id")) else {
                continue;
            };
            if !seen.insert(id.to_string()) {
                continue;
            }
            let provider = non_blank_str(model_raw.get("provider")).unwrap_or(name.as_str());
            entry.models.push(ModelEntry {
                id: id.to_string(),
                provider: provider.to_string(),
            });
        }
    }

    let mut catalog = ModelCatalog {
        current_model: raw
            .get("current_model")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        providers,
    };

    if !catalog.current_model.is_empty() && !catalog.contains(&catalog.current_model) {
        tracing::debug!(
            "[ModelCatalog] Default model '{}' not in catalog, clearing",
            catalog.current_model
        );
        catalog.current_model.clear();
    }

    catalog
}

fn non_blank_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}
