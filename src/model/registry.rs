//! Built-in table of model names and where their manifests live.

use crate::error::{Result, StemError};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    pub manifest: String,
}

#[derive(Debug, Deserialize)]
pub struct Registry {
    pub default: String,
    pub models: Vec<RegistryEntry>,
}

impl Registry {
    /// Looks up `name`; an empty name selects the default model.
    pub fn find(&self, name: &str) -> Option<&RegistryEntry> {
        let target = if name.is_empty() { &self.default } else { name };
        self.models.iter().find(|m| m.name == target)
    }

    pub fn is_default(&self, entry: &RegistryEntry) -> bool {
        entry.name == self.default
    }
}

const REGISTRY_JSON: &str = include_str!("../../models/registry.json");

pub fn registry() -> Result<Registry> {
    Ok(serde_json::from_str(REGISTRY_JSON)?)
}

pub fn resolve_manifest_url(model_name: &str) -> Result<String> {
    let reg = registry()?;
    reg.find(model_name)
        .map(|m| m.manifest.clone())
        .ok_or_else(|| {
            let known: Vec<&str> = reg.models.iter().map(|m| m.name.as_str()).collect();
            StemError::Registry(format!(
                "model `{model_name}` not found in registry (known: {})",
                known.join(", ")
            ))
        })
}
