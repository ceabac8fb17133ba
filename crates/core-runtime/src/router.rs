//! Command router: `(script, method, args)` → one typed command envelope.
//!
//! The method set is closed; anything unrecognized returns `None` without
//! emitting an envelope, preserving the pass-through contract for
//! manager built-ins. `call_id` is strictly monotonic within one router.
//! Dispatching with no registered handler is a programmer error, the one
//! case this module reports as an `Err`.

use core_protocol::{
    commands::{Quat, Vec3},
    ContainerId, PermissionMask, ScriptCommand, ScriptCommandEnvelope, ScriptId,
};
use serde_json::Value as Json;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub type HostFuture = Pin<Box<dyn Future<Output = Result<Json, String>> + Send>>;

/// What a host handler may hand back: an immediate value or a promise.
pub enum HostReply {
    Value(Json),
    Future(HostFuture),
}

impl std::fmt::Debug for HostReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostReply::Value(v) => f.debug_tuple("Value").field(v).finish(),
            HostReply::Future(_) => f.debug_tuple("Future").finish(),
        }
    }
}

impl HostReply {
    pub fn nothing() -> Self {
        HostReply::Value(Json::Null)
    }
}

pub type CommandHandler = Arc<dyn Fn(ScriptCommandEnvelope) -> HostReply + Send + Sync>;
pub type ContainerLookup = Arc<dyn Fn(&ScriptId) -> Option<ContainerId> + Send + Sync>;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("no command handler registered")]
    NoHandler,
}

pub struct CommandRouter {
    handler: std::sync::RwLock<Option<CommandHandler>>,
    container_lookup: ContainerLookup,
    next_call_id: AtomicU64,
}

impl CommandRouter {
    pub fn new(container_lookup: ContainerLookup) -> Self {
        Self {
            handler: std::sync::RwLock::new(None),
            container_lookup,
            next_call_id: AtomicU64::new(1),
        }
    }

    pub fn set_handler(&self, handler: CommandHandler) {
        *self.handler.write().expect("router handler lock") = Some(handler);
    }

    /// Route one api call. `Ok(None)` means the method is not a command
    /// (a manager built-in or unknown name) and no envelope was emitted.
    pub fn dispatch(
        &self,
        script_id: &ScriptId,
        method: &str,
        args: &[Json],
    ) -> Result<Option<HostReply>, RouterError> {
        let Some(command) = build_command(method, args) else {
            return Ok(None);
        };
        let handler = self
            .handler
            .read()
            .expect("router handler lock")
            .clone()
            .ok_or(RouterError::NoHandler)?;
        let call_id = self.next_call_id.fetch_add(1, Ordering::SeqCst);
        let container_id = (self.container_lookup)(script_id).unwrap_or_default();
        debug!(
            target: "runtime.router",
            script_id = %script_id,
            call_id,
            command = command.type_name(),
            "envelope emitted"
        );
        let envelope =
            ScriptCommandEnvelope::new(script_id.clone(), container_id, call_id, command);
        Ok(Some(handler(envelope)))
    }
}

// ---------------------------------------------------------------------
// Argument coercion
// ---------------------------------------------------------------------

fn arg_i32(args: &[Json], i: usize) -> i32 {
    args.get(i).and_then(Json::as_i64).unwrap_or(0) as i32
}

fn arg_f64(args: &[Json], i: usize) -> f64 {
    args.get(i).and_then(Json::as_f64).unwrap_or(0.0)
}

fn arg_bool(args: &[Json], i: usize) -> bool {
    match args.get(i) {
        Some(Json::Bool(b)) => *b,
        Some(Json::Number(n)) => n.as_f64().unwrap_or(0.0) != 0.0,
        _ => false,
    }
}

fn arg_str(args: &[Json], i: usize) -> String {
    match args.get(i) {
        Some(Json::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Vectors arrive as `{x,y,z}` objects from the VM or `[x,y,z]` arrays
/// from host-side callers.
fn arg_vec3(args: &[Json], i: usize) -> Vec3 {
    match args.get(i) {
        Some(Json::Object(map)) => Vec3::new(
            map.get("x").and_then(Json::as_f64).unwrap_or(0.0),
            map.get("y").and_then(Json::as_f64).unwrap_or(0.0),
            map.get("z").and_then(Json::as_f64).unwrap_or(0.0),
        ),
        Some(Json::Array(items)) if items.len() >= 3 => Vec3::new(
            items[0].as_f64().unwrap_or(0.0),
            items[1].as_f64().unwrap_or(0.0),
            items[2].as_f64().unwrap_or(0.0),
        ),
        _ => Vec3::zeros(),
    }
}

fn arg_quat(args: &[Json], i: usize) -> Quat {
    match args.get(i) {
        Some(Json::Object(map)) => Quat::new(
            map.get("s").and_then(Json::as_f64).unwrap_or(1.0),
            map.get("x").and_then(Json::as_f64).unwrap_or(0.0),
            map.get("y").and_then(Json::as_f64).unwrap_or(0.0),
            map.get("z").and_then(Json::as_f64).unwrap_or(0.0),
        ),
        Some(Json::Array(items)) if items.len() >= 4 => Quat::new(
            items[3].as_f64().unwrap_or(1.0),
            items[0].as_f64().unwrap_or(0.0),
            items[1].as_f64().unwrap_or(0.0),
            items[2].as_f64().unwrap_or(0.0),
        ),
        _ => Quat::new(1.0, 0.0, 0.0, 0.0),
    }
}

fn arg_list(args: &[Json], i: usize) -> Vec<Json> {
    match args.get(i) {
        Some(Json::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
        None => Vec::new(),
    }
}

fn arg_str_list(args: &[Json], i: usize) -> Vec<String> {
    arg_list(args, i)
        .into_iter()
        .map(|v| match v {
            Json::String(s) => s,
            other => other.to_string(),
        })
        .collect()
}

fn arg_i32_list(args: &[Json], i: usize) -> Vec<i32> {
    arg_list(args, i)
        .into_iter()
        .map(|v| v.as_i64().unwrap_or(0) as i32)
        .collect()
}

/// The closed method → command mapping, with constructor-like default
/// fill-in (`object.loopSound` lowers to `playSound { loop: true }`).
fn build_command(method: &str, a: &[Json]) -> Option<ScriptCommand> {
    use ScriptCommand as C;
    Some(match method {
        // --- transform ---------------------------------------------------
        "object.setPosition" => C::SetPosition { position: arg_vec3(a, 0) },
        "object.setRotation" => C::SetRotation { rotation: arg_quat(a, 0) },
        "object.setScale" => C::SetScale { scale: arg_vec3(a, 0) },
        "object.setLocalPosition" => C::SetLocalPosition { position: arg_vec3(a, 0) },
        "object.setLocalRotation" => C::SetLocalRotation { rotation: arg_quat(a, 0) },
        "object.setRegionPosition" => C::SetRegionPosition { position: arg_vec3(a, 0) },
        "object.setTargetOmega" => C::SetTargetOmega {
            axis: arg_vec3(a, 0),
            spin_rate: arg_f64(a, 1),
            gain: arg_f64(a, 2),
        },
        "object.lookAt" => C::LookAt {
            target: arg_vec3(a, 0),
            strength: arg_f64(a, 1),
            damping: arg_f64(a, 2),
        },
        "object.stopLookAt" => C::StopLookAt,
        "object.moveToTarget" => C::MoveToTarget {
            target: arg_vec3(a, 0),
            tau: arg_f64(a, 1),
        },
        "object.stopMoveToTarget" => C::StopMoveToTarget,
        "object.target" => C::Target {
            position: arg_vec3(a, 0),
            range: arg_f64(a, 1),
        },
        "object.targetRemove" => C::TargetRemove { handle: arg_i32(a, 0) },

        // --- appearance --------------------------------------------------
        "object.setColor" => C::SetColor {
            color: arg_vec3(a, 0),
            face: arg_i32(a, 1),
        },
        "object.setAlpha" => C::SetAlpha {
            alpha: arg_f64(a, 0),
            face: arg_i32(a, 1),
        },
        "object.setTexture" => C::SetTexture {
            texture: arg_str(a, 0),
            face: arg_i32(a, 1),
        },
        "object.setTextureScale" => C::SetTextureScale {
            u: arg_f64(a, 0),
            v: arg_f64(a, 1),
            face: arg_i32(a, 2),
        },
        "object.setTextureOffset" => C::SetTextureOffset {
            u: arg_f64(a, 0),
            v: arg_f64(a, 1),
            face: arg_i32(a, 2),
        },
        "object.setTextureRotation" => C::SetTextureRotation {
            angle: arg_f64(a, 0),
            face: arg_i32(a, 1),
        },
        "object.setText" => C::SetText {
            text: arg_str(a, 0),
            color: arg_vec3(a, 1),
            alpha: arg_f64(a, 2),
        },
        "object.setName" => C::SetName { name: arg_str(a, 0) },
        "object.setDescription" => C::SetDescription { description: arg_str(a, 0) },
        "object.setPrimitiveParams" | "object.setLinkPrimitiveParams" => {
            C::SetPrimitiveParams { params: arg_list(a, 0) }
        }
        "object.setClickAction" => C::SetClickAction { action: arg_i32(a, 0) },
        "object.setSitText" => C::SetSitText { text: arg_str(a, 0) },
        "object.setTouchText" => C::SetTouchText { text: arg_str(a, 0) },
        "object.sitTarget" => C::SitTarget {
            offset: arg_vec3(a, 0),
            rotation: arg_quat(a, 1),
        },
        "object.unsit" => C::Unsit { agent: arg_str(a, 0) },

        // --- communication -----------------------------------------------
        "world.say" => C::Say {
            channel: arg_i32(a, 0),
            message: arg_str(a, 1),
        },
        "world.whisper" => C::Whisper {
            channel: arg_i32(a, 0),
            message: arg_str(a, 1),
        },
        "world.shout" => C::Shout {
            channel: arg_i32(a, 0),
            message: arg_str(a, 1),
        },
        "world.regionSay" => C::RegionSay {
            channel: arg_i32(a, 0),
            message: arg_str(a, 1),
        },
        "world.regionSayTo" => C::RegionSayTo {
            target: arg_str(a, 0),
            channel: arg_i32(a, 1),
            message: arg_str(a, 2),
        },
        "world.ownerSay" => C::OwnerSay { message: arg_str(a, 0) },
        "world.instantMessage" => C::InstantMessage {
            agent: arg_str(a, 0),
            message: arg_str(a, 1),
        },
        "world.email" => C::Email {
            address: arg_str(a, 0),
            subject: arg_str(a, 1),
            message: arg_str(a, 2),
        },
        "world.dialog" => C::Dialog {
            agent: arg_str(a, 0),
            message: arg_str(a, 1),
            buttons: arg_str_list(a, 2),
            channel: arg_i32(a, 3),
        },
        "world.textBox" => C::TextBox {
            agent: arg_str(a, 0),
            message: arg_str(a, 1),
            channel: arg_i32(a, 2),
        },
        "world.loadUrl" => C::LoadUrl {
            agent: arg_str(a, 0),
            message: arg_str(a, 1),
            url: arg_str(a, 2),
        },
        "world.mapDestination" => C::MapDestination {
            sim_name: arg_str(a, 0),
            position: arg_vec3(a, 1),
            look_at: arg_vec3(a, 2),
        },

        // --- sound -------------------------------------------------------
        "object.playSound" => C::PlaySound {
            sound: arg_str(a, 0),
            volume: arg_f64(a, 1),
            looped: false,
        },
        "object.loopSound" => C::PlaySound {
            sound: arg_str(a, 0),
            volume: arg_f64(a, 1),
            looped: true,
        },
        "object.triggerSound" => C::TriggerSound {
            sound: arg_str(a, 0),
            volume: arg_f64(a, 1),
        },
        "object.stopSound" => C::StopSound,
        "object.preloadSound" => C::PreloadSound { sound: arg_str(a, 0) },
        "object.adjustVolume" => C::AdjustVolume { volume: arg_f64(a, 0) },
        "object.setSoundQueueing" => C::SetSoundQueueing { enabled: arg_bool(a, 0) },

        // --- effects -----------------------------------------------------
        "object.particleSystem" => C::ParticleSystem { rules: arg_list(a, 0) },
        "object.linkParticleSystem" => C::LinkParticleSystem {
            link: arg_i32(a, 0),
            rules: arg_list(a, 1),
        },

        // --- animation ---------------------------------------------------
        "world.startAnimation" => C::StartAnimation { animation: arg_str(a, 0) },
        "world.stopAnimation" => C::StopAnimation { animation: arg_str(a, 0) },

        // --- physics -----------------------------------------------------
        "object.setStatus" => C::SetStatus {
            status: arg_i32(a, 0),
            value: arg_bool(a, 1),
        },
        "object.getStatus" => C::GetStatus { status: arg_i32(a, 0) },
        "object.setPhysics" => C::SetPhysics { enabled: arg_bool(a, 0) },
        "object.applyImpulse" => C::ApplyImpulse {
            impulse: arg_vec3(a, 0),
            local: arg_bool(a, 1),
        },
        "object.applyTorque" => C::ApplyTorque {
            torque: arg_vec3(a, 0),
            local: arg_bool(a, 1),
        },
        "object.setVelocity" => C::SetVelocity {
            velocity: arg_vec3(a, 0),
            local: arg_bool(a, 1),
        },
        "object.setBuoyancy" => C::SetBuoyancy { buoyancy: arg_f64(a, 0) },
        "object.setForce" => C::SetForce {
            force: arg_vec3(a, 0),
            local: arg_bool(a, 1),
        },
        "object.setTorque" => C::SetTorque {
            torque: arg_vec3(a, 0),
            local: arg_bool(a, 1),
        },
        "object.setHoverHeight" => C::SetHoverHeight {
            height: arg_f64(a, 0),
            water: arg_bool(a, 1),
            tau: arg_f64(a, 2),
        },
        "object.stopHover" => C::StopHover,
        "world.pushObject" => C::PushObject {
            target: arg_str(a, 0),
            impulse: arg_vec3(a, 1),
            angular_impulse: arg_vec3(a, 2),
            local: arg_bool(a, 3),
        },

        // --- perception --------------------------------------------------
        "world.sensor" => C::Sensor {
            name: arg_str(a, 0),
            id: arg_str(a, 1),
            sensor_type: arg_i32(a, 2),
            range: arg_f64(a, 3),
            arc: arg_f64(a, 4),
        },
        "world.sensorRepeat" => C::SensorRepeat {
            name: arg_str(a, 0),
            id: arg_str(a, 1),
            sensor_type: arg_i32(a, 2),
            range: arg_f64(a, 3),
            arc: arg_f64(a, 4),
            rate: arg_f64(a, 5),
        },
        "world.sensorRemove" => C::SensorRemove,
        "world.getAgentInfo" => C::GetAgentInfo { agent: arg_str(a, 0) },
        "world.getAgentSize" => C::GetAgentSize { agent: arg_str(a, 0) },
        "world.getAgentList" => C::GetAgentList {
            scope: arg_i32(a, 0),
            options: arg_list(a, 1),
        },
        "world.getObjectDetails" => C::GetObjectDetails {
            id: arg_str(a, 0),
            params: arg_i32_list(a, 1),
        },
        "world.getBoundingBox" => C::GetBoundingBox { object: arg_str(a, 0) },
        "object.getMass" => C::GetMass,
        "world.keyToName" => C::KeyToName { id: arg_str(a, 0) },
        "world.getOwnerKey" => C::GetOwnerKey { id: arg_str(a, 0) },
        "world.requestAgentData" => C::RequestAgentData {
            agent: arg_str(a, 0),
            data: arg_i32(a, 1),
        },
        "world.requestInventoryData" => C::RequestInventoryData { name: arg_str(a, 0) },

        // --- queries (mirrored property reads) ---------------------------
        "object.position" => C::GetPosition,
        "object.localPosition" => C::GetLocalPosition,
        "object.rotation" => C::GetRotation,
        "object.localRotation" => C::GetLocalRotation,
        "object.scale" => C::GetScale,
        "object.velocity" => C::GetVelocity,
        "object.owner" => C::GetOwner,
        "object.key" => C::GetKey,
        "object.creator" => C::GetCreator,
        "object.name" => C::GetName,
        "object.description" => C::GetDescription,
        "object.linkNumber" => C::GetLinkNumber,
        "object.primCount" => C::GetPrimCount,
        "object.attachPoint" => C::GetAttachPoint,
        "region.name" => C::GetRegionName,
        "region.corner" => C::GetRegionCorner,
        "region.fps" => C::GetRegionFps,
        "region.timeDilation" => C::GetRegionTimeDilation,

        // --- NPC ---------------------------------------------------------
        "npc.create" => C::NpcCreate {
            first_name: arg_str(a, 0),
            last_name: arg_str(a, 1),
            position: arg_vec3(a, 2),
            notecard: arg_str(a, 3),
        },
        "npc.remove" => C::NpcRemove { npc: arg_str(a, 0) },
        "npc.moveTo" => C::NpcMoveTo {
            npc: arg_str(a, 0),
            position: arg_vec3(a, 1),
        },
        "npc.moveToTarget" => C::NpcMoveToTarget {
            npc: arg_str(a, 0),
            target: arg_vec3(a, 1),
            options: arg_i32(a, 2),
        },
        "npc.stopMoveTo" => C::NpcStopMoveTo { npc: arg_str(a, 0) },
        "npc.say" => C::NpcSay {
            npc: arg_str(a, 0),
            channel: arg_i32(a, 1),
            message: arg_str(a, 2),
        },
        "npc.whisper" => C::NpcWhisper {
            npc: arg_str(a, 0),
            channel: arg_i32(a, 1),
            message: arg_str(a, 2),
        },
        "npc.shout" => C::NpcShout {
            npc: arg_str(a, 0),
            channel: arg_i32(a, 1),
            message: arg_str(a, 2),
        },
        "npc.playAnimation" => C::NpcPlayAnimation {
            npc: arg_str(a, 0),
            animation: arg_str(a, 1),
        },
        "npc.stopAnimation" => C::NpcStopAnimation {
            npc: arg_str(a, 0),
            animation: arg_str(a, 1),
        },
        "npc.sit" => C::NpcSit {
            npc: arg_str(a, 0),
            target: arg_str(a, 1),
            options: arg_i32(a, 2),
        },
        "npc.stand" => C::NpcStand { npc: arg_str(a, 0) },
        "npc.touch" => C::NpcTouch {
            npc: arg_str(a, 0),
            object: arg_str(a, 1),
            link: arg_i32(a, 2),
            face: arg_i32(a, 3),
        },

        // --- lifecycle ---------------------------------------------------
        "object.rezObject" => C::RezObject {
            inventory: arg_str(a, 0),
            position: arg_vec3(a, 1),
            velocity: arg_vec3(a, 2),
            rotation: arg_quat(a, 3),
            start_param: arg_i32(a, 4),
        },
        "object.rezAtRoot" => C::RezAtRoot {
            inventory: arg_str(a, 0),
            position: arg_vec3(a, 1),
            velocity: arg_vec3(a, 2),
            rotation: arg_quat(a, 3),
            start_param: arg_i32(a, 4),
        },
        "object.die" => C::Die,
        "object.attach" => C::AttachToAvatar { attach_point: arg_i32(a, 0) },
        "object.detach" => C::DetachFromAvatar,
        "script.remoteLoadPin" => C::RemoteLoadScriptPin {
            target: arg_str(a, 0),
            name: arg_str(a, 1),
            pin: arg_i32(a, 2),
            running: arg_bool(a, 3),
            start_param: arg_i32(a, 4),
        },

        // --- inventory ---------------------------------------------------
        "object.giveInventory" => C::GiveInventory {
            target: arg_str(a, 0),
            inventory: arg_str(a, 1),
        },
        "object.giveInventoryList" => C::GiveInventoryList {
            target: arg_str(a, 0),
            folder: arg_str(a, 1),
            inventory: arg_str_list(a, 2),
        },
        "object.removeInventory" => C::RemoveInventory { name: arg_str(a, 0) },
        "object.inventoryCount" => C::InventoryCount { inventory_type: arg_i32(a, 0) },
        "object.inventoryName" => C::InventoryName {
            inventory_type: arg_i32(a, 0),
            index: arg_i32(a, 1),
        },
        "object.inventoryType" => C::InventoryType { name: arg_str(a, 0) },
        "object.inventoryKey" => C::InventoryKey { name: arg_str(a, 0) },
        "object.getNotecardLine" => C::GetNotecardLine {
            name: arg_str(a, 0),
            line: arg_i32(a, 1),
        },
        "object.getNotecardLineCount" => C::GetNotecardLineCount { name: arg_str(a, 0) },
        "object.readNotecard" => C::ReadNotecard { name: arg_str(a, 0) },
        "object.makeNotecard" => C::MakeNotecard {
            name: arg_str(a, 0),
            contents: arg_str_list(a, 1),
        },

        // --- permissions & controls --------------------------------------
        "world.requestPermissions" => C::RequestPermissions {
            agent: arg_str(a, 0),
            permissions: PermissionMask::from_bits_retain(arg_i32(a, 1)),
        },
        "world.takeControls" => C::TakeControls {
            controls: arg_i32(a, 0),
            accept: arg_bool(a, 1),
            pass_on: arg_bool(a, 2),
        },
        "world.releaseControls" => C::ReleaseControls,

        // --- HTTP & data -------------------------------------------------
        "world.httpRequest" => C::HttpRequest {
            url: arg_str(a, 0),
            parameters: arg_list(a, 1),
            body: arg_str(a, 2),
        },
        "world.httpResponse" => C::HttpResponse {
            request_id: arg_str(a, 0),
            status: arg_i32(a, 1),
            body: arg_str(a, 2),
        },
        "object.linksetDataWrite" => C::LinksetDataWrite {
            name: arg_str(a, 0),
            value: arg_str(a, 1),
        },
        "object.linksetDataRead" => C::LinksetDataRead { name: arg_str(a, 0) },
        "object.linksetDataDelete" => C::LinksetDataDelete { name: arg_str(a, 0) },
        "object.linksetDataReset" => C::LinksetDataReset,
        "world.messageObject" => C::MessageObject {
            target: arg_str(a, 0),
            message: arg_str(a, 1),
        },

        // --- camera / land -----------------------------------------------
        "world.setCameraParams" => C::SetCameraParams { rules: arg_list(a, 0) },
        "world.clearCameraParams" => C::ClearCameraParams,
        "world.teleportAgent" => C::TeleportAgent {
            agent: arg_str(a, 0),
            destination: arg_str(a, 1),
            position: arg_vec3(a, 2),
            look_at: arg_vec3(a, 3),
        },
        "world.ejectAgent" => C::EjectAgent { agent: arg_str(a, 0) },
        "world.overMyLand" => C::OverMyLand { id: arg_str(a, 0) },

        _ => return None,
    })
}
