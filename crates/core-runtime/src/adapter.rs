//! Host adapter: the single facade the embedding application talks to.
//!
//! Pure glue over the manager and the command router — the interesting
//! semantics live below. Bundle loading is a straight pipeline: parse the
//! manifest, unwrap each script asset, and push it through `load_script`
//! (which transpiles, hardens, and places it).

use crate::manager::{LoadOptions, LoadResult, ScriptManager};
use crate::router::{CommandRouter, HostReply};
use core_config::EngineConfig;
use core_protocol::bundle::{unwrap_script_source, BundleManifest};
use core_protocol::{
    ContainerId, ScriptCommandEnvelope, ScriptId, ScriptState, WorldEventEnvelope,
};
use core_syntax::diagnostics::Diagnostic;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct BundleLoadReport {
    /// `(container, script)` pairs in load order.
    pub loaded: Vec<(ContainerId, ScriptId)>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ScriptHost {
    manager: ScriptManager,
    router: Arc<CommandRouter>,
}

impl ScriptHost {
    pub fn new(config: EngineConfig) -> Self {
        let mut manager = ScriptManager::new(config);
        manager.start();
        let router = Arc::new(CommandRouter::new(manager.container_lookup()));
        let routed = router.clone();
        manager.set_api_resolver(Arc::new(move |script_id, method, args| {
            match routed.dispatch(script_id, method, args) {
                Ok(Some(reply)) => Ok(reply),
                // Not a command: undefined, no envelope. Keeps the
                // pass-through contract for names the manager already
                // consumed.
                Ok(None) => Ok(HostReply::Value(Json::Null)),
                Err(e) => Err(e.to_string()),
            }
        }));
        Self { manager, router }
    }

    /// Register the single host command handler.
    pub fn on_script_command(
        &self,
        handler: impl Fn(ScriptCommandEnvelope) -> HostReply + Send + Sync + 'static,
    ) {
        self.router.set_handler(Arc::new(handler));
    }

    pub fn load_script(&self, source: &str, options: LoadOptions) -> LoadResult {
        self.manager.load_script(source, options)
    }

    /// Load every script asset of a bundle manifest. `sources` maps asset
    /// paths to their (possibly JSON-wrapped) text.
    pub fn load_bundle(
        &self,
        manifest_json: &str,
        sources: &HashMap<String, String>,
    ) -> Result<BundleLoadReport, serde_json::Error> {
        let manifest: BundleManifest = serde_json::from_str(manifest_json)?;
        let mut report = BundleLoadReport::default();
        info!(
            target: "runtime.manager",
            scene = %manifest.scene_name,
            objects = manifest.objects.len(),
            "bundle load"
        );
        for object in &manifest.objects {
            let container_id: ContainerId = if object.id.is_empty() {
                object.name.clone()
            } else {
                object.id.clone()
            };
            for item in &object.inventory {
                if !item.item_type.eq_ignore_ascii_case("script") {
                    continue;
                }
                let Some(asset) = manifest.assets.get(&item.asset_uuid) else {
                    report.diagnostics.push(
                        Diagnostic::warning(format!(
                            "inventory item `{}` references missing asset `{}`",
                            item.name, item.asset_uuid
                        ))
                        .with_file(item.name.clone()),
                    );
                    continue;
                };
                let Some(raw) = sources.get(&asset.path) else {
                    report.diagnostics.push(
                        Diagnostic::warning(format!(
                            "no source provided for asset path `{}`",
                            asset.path
                        ))
                        .with_file(item.name.clone()),
                    );
                    continue;
                };
                let source = unwrap_script_source(raw);
                let result = self.load_script(
                    &source,
                    LoadOptions {
                        container_id: container_id.clone(),
                        link_number: 0,
                        name: Some(item.name.clone()),
                        overrides: Default::default(),
                    },
                );
                report.diagnostics.extend(result.diagnostics);
                if let Some(script_id) = result.script_id {
                    report.loaded.push((container_id.clone(), script_id));
                }
            }
        }
        Ok(report)
    }

    pub fn dispatch_world_event(&self, envelope: WorldEventEnvelope) {
        self.manager.dispatch_world_event(envelope);
    }

    /// JSON boundary for hosts that speak the wire protocol directly.
    /// Unknown or malformed events are logged and dropped.
    pub fn dispatch_world_event_json(&self, json: &str) {
        match serde_json::from_str::<WorldEventEnvelope>(json) {
            Ok(envelope) => self.dispatch_world_event(envelope),
            Err(e) => {
                tracing::warn!(
                    target: "runtime.dispatch",
                    error = %e,
                    "world event dropped at the boundary"
                );
            }
        }
    }

    /// The host removed a composite object; terminate everything in it.
    pub fn remove_object(&self, container_id: &ContainerId) -> Vec<ScriptId> {
        self.manager.remove_container(container_id)
    }

    pub fn get_script_status(&self, script_id: &ScriptId) -> Option<ScriptState> {
        self.manager.script_status(script_id)
    }

    pub fn manager(&self) -> &ScriptManager {
        &self.manager
    }

    pub fn stop(&mut self) {
        self.manager.stop();
    }
}
