//! Disk-bundle boundary types.
//!
//! The bundle format itself (directory layout, asset encoding) belongs to
//! the packaging tool; the engine only needs the manifest shape and the
//! `{ "source": ... }` unwrap rule for script assets.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BundleManifest {
    #[serde(default)]
    pub format_version: u32,
    #[serde(default)]
    pub scene_name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub objects: Vec<BundleObject>,
    #[serde(default)]
    pub assets: BTreeMap<String, AssetEntry>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub statistics: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BundleObject {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub asset_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEntry {
    #[serde(rename = "type")]
    pub asset_type: String,
    pub path: String,
}

/// Script sources are stored as text, in practice wrapped as JSON with a
/// `source` field. Unwrap when the wrapper is present, otherwise take the
/// text verbatim.
pub fn unwrap_script_source(raw: &str) -> String {
    #[derive(Deserialize)]
    struct Wrapper {
        source: String,
    }
    match serde_json::from_str::<Wrapper>(raw) {
        Ok(wrapper) => wrapper.source,
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_manifest() {
        let manifest: BundleManifest = serde_json::from_str(
            r#"{
                "format_version": 1,
                "scene_name": "plaza",
                "region": "sandbox",
                "objects": [{
                    "id": "door-1",
                    "name": "Door",
                    "inventory": [
                        {"name": "opener", "type": "script", "asset_uuid": "u-1"}
                    ]
                }],
                "assets": {
                    "u-1": {"type": "script", "path": "assets/opener.lsl"}
                },
                "statistics": {"objects": 1}
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.scene_name, "plaza");
        assert_eq!(manifest.objects[0].inventory[0].item_type, "script");
        assert_eq!(manifest.assets["u-1"].path, "assets/opener.lsl");
    }

    #[test]
    fn unwraps_wrapped_sources() {
        assert_eq!(
            unwrap_script_source(r#"{"source": "default {}"}"#),
            "default {}"
        );
        assert_eq!(unwrap_script_source("default {}"), "default {}");
    }
}
