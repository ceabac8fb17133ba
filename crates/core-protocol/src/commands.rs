//! The closed command set scripts can ask of the host.
//!
//! One tagged discriminant per shape, dispatched exhaustively — the whole
//! taxonomy stays a single grep-able unit and the compiler flags every
//! match that a new variant invalidates. Commands are plain serializable
//! records: no references, no callbacks, so they cross the worker boundary
//! and the host boundary unchanged.

use nalgebra::{Quaternion, Vector3};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::masks::PermissionMask;

pub type Vec3 = Vector3<f64>;
pub type Quat = Quaternion<f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ScriptCommand {
    // --- transform ---------------------------------------------------
    SetPosition { position: Vec3 },
    SetRotation { rotation: Quat },
    SetScale { scale: Vec3 },
    SetLocalPosition { position: Vec3 },
    SetLocalRotation { rotation: Quat },
    SetRegionPosition { position: Vec3 },
    SetTargetOmega { axis: Vec3, spin_rate: f64, gain: f64 },
    LookAt { target: Vec3, strength: f64, damping: f64 },
    StopLookAt,
    MoveToTarget { target: Vec3, tau: f64 },
    StopMoveToTarget,
    Target { position: Vec3, range: f64 },
    TargetRemove { handle: i32 },

    // --- appearance --------------------------------------------------
    SetColor { color: Vec3, face: i32 },
    SetAlpha { alpha: f64, face: i32 },
    SetTexture { texture: String, face: i32 },
    SetTextureScale { u: f64, v: f64, face: i32 },
    SetTextureOffset { u: f64, v: f64, face: i32 },
    SetTextureRotation { angle: f64, face: i32 },
    SetText { text: String, color: Vec3, alpha: f64 },
    SetName { name: String },
    SetDescription { description: String },
    SetPrimitiveParams { params: Vec<Value> },
    SetClickAction { action: i32 },
    SetSitText { text: String },
    SetTouchText { text: String },
    SitTarget { offset: Vec3, rotation: Quat },
    Unsit { agent: String },

    // --- communication -----------------------------------------------
    Say { channel: i32, message: String },
    Whisper { channel: i32, message: String },
    Shout { channel: i32, message: String },
    RegionSay { channel: i32, message: String },
    RegionSayTo { target: String, channel: i32, message: String },
    OwnerSay { message: String },
    InstantMessage { agent: String, message: String },
    Email { address: String, subject: String, message: String },
    Dialog { agent: String, message: String, buttons: Vec<String>, channel: i32 },
    TextBox { agent: String, message: String, channel: i32 },
    LoadUrl { agent: String, message: String, url: String },
    MapDestination { sim_name: String, position: Vec3, look_at: Vec3 },

    // --- sound & media -----------------------------------------------
    PlaySound {
        sound: String,
        volume: f64,
        #[serde(rename = "loop")]
        looped: bool,
    },
    TriggerSound { sound: String, volume: f64 },
    StopSound,
    PreloadSound { sound: String },
    AdjustVolume { volume: f64 },
    SetSoundQueueing { enabled: bool },

    // --- effects -----------------------------------------------------
    ParticleSystem { rules: Vec<Value> },
    LinkParticleSystem { link: i32, rules: Vec<Value> },

    // --- animation ---------------------------------------------------
    StartAnimation { animation: String },
    StopAnimation { animation: String },

    // --- physics -----------------------------------------------------
    SetStatus { status: i32, value: bool },
    GetStatus { status: i32 },
    SetPhysics { enabled: bool },
    ApplyImpulse { impulse: Vec3, local: bool },
    ApplyTorque { torque: Vec3, local: bool },
    SetVelocity { velocity: Vec3, local: bool },
    SetBuoyancy { buoyancy: f64 },
    SetForce { force: Vec3, local: bool },
    SetTorque { torque: Vec3, local: bool },
    SetHoverHeight { height: f64, water: bool, tau: f64 },
    StopHover,
    PushObject { target: String, impulse: Vec3, angular_impulse: Vec3, local: bool },

    // --- perception --------------------------------------------------
    Sensor { name: String, id: String, sensor_type: i32, range: f64, arc: f64 },
    SensorRepeat {
        name: String,
        id: String,
        sensor_type: i32,
        range: f64,
        arc: f64,
        rate: f64,
    },
    SensorRemove,
    GetAgentInfo { agent: String },
    GetAgentSize { agent: String },
    GetAgentList { scope: i32, options: Vec<Value> },
    GetObjectDetails { id: String, params: Vec<i32> },
    GetBoundingBox { object: String },
    GetMass,
    KeyToName { id: String },
    GetOwnerKey { id: String },
    RequestAgentData { agent: String, data: i32 },
    RequestInventoryData { name: String },

    // --- mirrored-state queries --------------------------------------
    GetPosition,
    GetLocalPosition,
    GetRotation,
    GetLocalRotation,
    GetScale,
    GetVelocity,
    GetOwner,
    GetKey,
    GetCreator,
    GetName,
    GetDescription,
    GetLinkNumber,
    GetPrimCount,
    GetAttachPoint,
    GetRegionName,
    GetRegionCorner,
    GetRegionFps,
    GetRegionTimeDilation,

    // --- NPC ---------------------------------------------------------
    NpcCreate { first_name: String, last_name: String, position: Vec3, notecard: String },
    NpcRemove { npc: String },
    NpcMoveTo { npc: String, position: Vec3 },
    NpcMoveToTarget { npc: String, target: Vec3, options: i32 },
    NpcStopMoveTo { npc: String },
    NpcSay { npc: String, channel: i32, message: String },
    NpcWhisper { npc: String, channel: i32, message: String },
    NpcShout { npc: String, channel: i32, message: String },
    NpcPlayAnimation { npc: String, animation: String },
    NpcStopAnimation { npc: String, animation: String },
    NpcSit { npc: String, target: String, options: i32 },
    NpcStand { npc: String },
    NpcTouch { npc: String, object: String, link: i32, face: i32 },

    // --- lifecycle ---------------------------------------------------
    RezObject { inventory: String, position: Vec3, velocity: Vec3, rotation: Quat, start_param: i32 },
    RezAtRoot { inventory: String, position: Vec3, velocity: Vec3, rotation: Quat, start_param: i32 },
    Die,
    AttachToAvatar { attach_point: i32 },
    DetachFromAvatar,
    RemoteLoadScriptPin { target: String, name: String, pin: i32, running: bool, start_param: i32 },

    // --- inventory ---------------------------------------------------
    GiveInventory { target: String, inventory: String },
    GiveInventoryList { target: String, folder: String, inventory: Vec<String> },
    RemoveInventory { name: String },
    InventoryCount { inventory_type: i32 },
    InventoryName { inventory_type: i32, index: i32 },
    InventoryType { name: String },
    InventoryKey { name: String },
    GetNotecardLine { name: String, line: i32 },
    GetNotecardLineCount { name: String },
    ReadNotecard { name: String },
    MakeNotecard { name: String, contents: Vec<String> },

    // --- permissions & controls --------------------------------------
    RequestPermissions { agent: String, permissions: PermissionMask },
    TakeControls { controls: i32, accept: bool, pass_on: bool },
    ReleaseControls,

    // --- HTTP & data -------------------------------------------------
    HttpRequest { url: String, parameters: Vec<Value>, body: String },
    HttpResponse { request_id: String, status: i32, body: String },
    LinksetDataWrite { name: String, value: String },
    LinksetDataRead { name: String },
    LinksetDataDelete { name: String },
    LinksetDataReset,
    MessageObject { target: String, message: String },

    // --- camera ------------------------------------------------------
    SetCameraParams { rules: Vec<Value> },
    ClearCameraParams,

    // --- land / agents -----------------------------------------------
    TeleportAgent { agent: String, destination: String, position: Vec3, look_at: Vec3 },
    EjectAgent { agent: String },
    OverMyLand { id: String },
}

impl ScriptCommand {
    /// Wire discriminant for logging and metrics.
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptCommand::SetPosition { .. } => "setPosition",
            ScriptCommand::SetRotation { .. } => "setRotation",
            ScriptCommand::SetScale { .. } => "setScale",
            ScriptCommand::SetLocalPosition { .. } => "setLocalPosition",
            ScriptCommand::SetLocalRotation { .. } => "setLocalRotation",
            ScriptCommand::SetRegionPosition { .. } => "setRegionPosition",
            ScriptCommand::SetTargetOmega { .. } => "setTargetOmega",
            ScriptCommand::LookAt { .. } => "lookAt",
            ScriptCommand::StopLookAt => "stopLookAt",
            ScriptCommand::MoveToTarget { .. } => "moveToTarget",
            ScriptCommand::StopMoveToTarget => "stopMoveToTarget",
            ScriptCommand::Target { .. } => "target",
            ScriptCommand::TargetRemove { .. } => "targetRemove",
            ScriptCommand::SetColor { .. } => "setColor",
            ScriptCommand::SetAlpha { .. } => "setAlpha",
            ScriptCommand::SetTexture { .. } => "setTexture",
            ScriptCommand::SetTextureScale { .. } => "setTextureScale",
            ScriptCommand::SetTextureOffset { .. } => "setTextureOffset",
            ScriptCommand::SetTextureRotation { .. } => "setTextureRotation",
            ScriptCommand::SetText { .. } => "setText",
            ScriptCommand::SetName { .. } => "setName",
            ScriptCommand::SetDescription { .. } => "setDescription",
            ScriptCommand::SetPrimitiveParams { .. } => "setPrimitiveParams",
            ScriptCommand::SetClickAction { .. } => "setClickAction",
            ScriptCommand::SetSitText { .. } => "setSitText",
            ScriptCommand::SetTouchText { .. } => "setTouchText",
            ScriptCommand::SitTarget { .. } => "sitTarget",
            ScriptCommand::Unsit { .. } => "unsit",
            ScriptCommand::Say { .. } => "say",
            ScriptCommand::Whisper { .. } => "whisper",
            ScriptCommand::Shout { .. } => "shout",
            ScriptCommand::RegionSay { .. } => "regionSay",
            ScriptCommand::RegionSayTo { .. } => "regionSayTo",
            ScriptCommand::OwnerSay { .. } => "ownerSay",
            ScriptCommand::InstantMessage { .. } => "instantMessage",
            ScriptCommand::Email { .. } => "email",
            ScriptCommand::Dialog { .. } => "dialog",
            ScriptCommand::TextBox { .. } => "textBox",
            ScriptCommand::LoadUrl { .. } => "loadUrl",
            ScriptCommand::MapDestination { .. } => "mapDestination",
            ScriptCommand::PlaySound { .. } => "playSound",
            ScriptCommand::TriggerSound { .. } => "triggerSound",
            ScriptCommand::StopSound => "stopSound",
            ScriptCommand::PreloadSound { .. } => "preloadSound",
            ScriptCommand::AdjustVolume { .. } => "adjustVolume",
            ScriptCommand::SetSoundQueueing { .. } => "setSoundQueueing",
            ScriptCommand::ParticleSystem { .. } => "particleSystem",
            ScriptCommand::LinkParticleSystem { .. } => "linkParticleSystem",
            ScriptCommand::StartAnimation { .. } => "startAnimation",
            ScriptCommand::StopAnimation { .. } => "stopAnimation",
            ScriptCommand::SetStatus { .. } => "setStatus",
            ScriptCommand::GetStatus { .. } => "getStatus",
            ScriptCommand::SetPhysics { .. } => "setPhysics",
            ScriptCommand::ApplyImpulse { .. } => "applyImpulse",
            ScriptCommand::ApplyTorque { .. } => "applyTorque",
            ScriptCommand::SetVelocity { .. } => "setVelocity",
            ScriptCommand::SetBuoyancy { .. } => "setBuoyancy",
            ScriptCommand::SetForce { .. } => "setForce",
            ScriptCommand::SetTorque { .. } => "setTorque",
            ScriptCommand::SetHoverHeight { .. } => "setHoverHeight",
            ScriptCommand::StopHover => "stopHover",
            ScriptCommand::PushObject { .. } => "pushObject",
            ScriptCommand::Sensor { .. } => "sensor",
            ScriptCommand::SensorRepeat { .. } => "sensorRepeat",
            ScriptCommand::SensorRemove => "sensorRemove",
            ScriptCommand::GetAgentInfo { .. } => "getAgentInfo",
            ScriptCommand::GetAgentSize { .. } => "getAgentSize",
            ScriptCommand::GetAgentList { .. } => "getAgentList",
            ScriptCommand::GetObjectDetails { .. } => "getObjectDetails",
            ScriptCommand::GetBoundingBox { .. } => "getBoundingBox",
            ScriptCommand::GetMass => "getMass",
            ScriptCommand::KeyToName { .. } => "keyToName",
            ScriptCommand::GetOwnerKey { .. } => "getOwnerKey",
            ScriptCommand::RequestAgentData { .. } => "requestAgentData",
            ScriptCommand::RequestInventoryData { .. } => "requestInventoryData",
            ScriptCommand::GetPosition => "getPosition",
            ScriptCommand::GetLocalPosition => "getLocalPosition",
            ScriptCommand::GetRotation => "getRotation",
            ScriptCommand::GetLocalRotation => "getLocalRotation",
            ScriptCommand::GetScale => "getScale",
            ScriptCommand::GetVelocity => "getVelocity",
            ScriptCommand::GetOwner => "getOwner",
            ScriptCommand::GetKey => "getKey",
            ScriptCommand::GetCreator => "getCreator",
            ScriptCommand::GetName => "getName",
            ScriptCommand::GetDescription => "getDescription",
            ScriptCommand::GetLinkNumber => "getLinkNumber",
            ScriptCommand::GetPrimCount => "getPrimCount",
            ScriptCommand::GetAttachPoint => "getAttachPoint",
            ScriptCommand::GetRegionName => "getRegionName",
            ScriptCommand::GetRegionCorner => "getRegionCorner",
            ScriptCommand::GetRegionFps => "getRegionFps",
            ScriptCommand::GetRegionTimeDilation => "getRegionTimeDilation",
            ScriptCommand::NpcCreate { .. } => "npcCreate",
            ScriptCommand::NpcRemove { .. } => "npcRemove",
            ScriptCommand::NpcMoveTo { .. } => "npcMoveTo",
            ScriptCommand::NpcMoveToTarget { .. } => "npcMoveToTarget",
            ScriptCommand::NpcStopMoveTo { .. } => "npcStopMoveTo",
            ScriptCommand::NpcSay { .. } => "npcSay",
            ScriptCommand::NpcWhisper { .. } => "npcWhisper",
            ScriptCommand::NpcShout { .. } => "npcShout",
            ScriptCommand::NpcPlayAnimation { .. } => "npcPlayAnimation",
            ScriptCommand::NpcStopAnimation { .. } => "npcStopAnimation",
            ScriptCommand::NpcSit { .. } => "npcSit",
            ScriptCommand::NpcStand { .. } => "npcStand",
            ScriptCommand::NpcTouch { .. } => "npcTouch",
            ScriptCommand::RezObject { .. } => "rezObject",
            ScriptCommand::RezAtRoot { .. } => "rezAtRoot",
            ScriptCommand::Die => "die",
            ScriptCommand::AttachToAvatar { .. } => "attachToAvatar",
            ScriptCommand::DetachFromAvatar => "detachFromAvatar",
            ScriptCommand::RemoteLoadScriptPin { .. } => "remoteLoadScriptPin",
            ScriptCommand::GiveInventory { .. } => "giveInventory",
            ScriptCommand::GiveInventoryList { .. } => "giveInventoryList",
            ScriptCommand::RemoveInventory { .. } => "removeInventory",
            ScriptCommand::InventoryCount { .. } => "inventoryCount",
            ScriptCommand::InventoryName { .. } => "inventoryName",
            ScriptCommand::InventoryType { .. } => "inventoryType",
            ScriptCommand::InventoryKey { .. } => "inventoryKey",
            ScriptCommand::GetNotecardLine { .. } => "getNotecardLine",
            ScriptCommand::GetNotecardLineCount { .. } => "getNotecardLineCount",
            ScriptCommand::ReadNotecard { .. } => "readNotecard",
            ScriptCommand::MakeNotecard { .. } => "makeNotecard",
            ScriptCommand::RequestPermissions { .. } => "requestPermissions",
            ScriptCommand::TakeControls { .. } => "takeControls",
            ScriptCommand::ReleaseControls => "releaseControls",
            ScriptCommand::HttpRequest { .. } => "httpRequest",
            ScriptCommand::HttpResponse { .. } => "httpResponse",
            ScriptCommand::LinksetDataWrite { .. } => "linksetDataWrite",
            ScriptCommand::LinksetDataRead { .. } => "linksetDataRead",
            ScriptCommand::LinksetDataDelete { .. } => "linksetDataDelete",
            ScriptCommand::LinksetDataReset => "linksetDataReset",
            ScriptCommand::MessageObject { .. } => "messageObject",
            ScriptCommand::SetCameraParams { .. } => "setCameraParams",
            ScriptCommand::ClearCameraParams => "clearCameraParams",
            ScriptCommand::TeleportAgent { .. } => "teleportAgent",
            ScriptCommand::EjectAgent { .. } => "ejectAgent",
            ScriptCommand::OverMyLand { .. } => "overMyLand",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tagged_wire_shape() {
        let cmd = ScriptCommand::PlaySound {
            sound: "a.ogg".into(),
            volume: 0.5,
            looped: true,
        };
        let json: Value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "playSound");
        assert_eq!(json["sound"], "a.ogg");
        assert_eq!(json["volume"], 0.5);
        assert_eq!(json["loop"], true);
    }

    #[test]
    fn vector_fields_serialize_as_arrays() {
        let cmd = ScriptCommand::SetPosition {
            position: Vec3::new(128.0, 64.0, 25.5),
        };
        let json: Value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["position"], serde_json::json!([128.0, 64.0, 25.5]));
    }

    #[test]
    fn round_trip_equality() {
        let cmds = vec![
            ScriptCommand::Say {
                channel: 0,
                message: "hello".into(),
            },
            ScriptCommand::RequestPermissions {
                agent: "agent-1".into(),
                permissions: PermissionMask::TAKE_CONTROLS,
            },
            ScriptCommand::Die,
            ScriptCommand::SetTargetOmega {
                axis: Vec3::new(0.0, 0.0, 1.0),
                spin_rate: 1.5,
                gain: 1.0,
            },
        ];
        for cmd in cmds {
            let text = serde_json::to_string(&cmd).unwrap();
            let back: ScriptCommand = serde_json::from_str(&text).unwrap();
            assert_eq!(cmd, back);
        }
    }

    #[test]
    fn type_name_matches_wire_tag() {
        let cmd = ScriptCommand::StopMoveToTarget;
        let json: Value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], cmd.type_name());
    }
}
