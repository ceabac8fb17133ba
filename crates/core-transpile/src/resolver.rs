//! Builtin function resolver.
//!
//! For every `ll*`/`os*` call site the resolver decides the emission shape
//! and the async contract. Three layers are consulted in order:
//!
//! 1. the detected table — `llDetected*` call sites become indexed reads
//!    of the per-event detected array;
//! 2. the special-handler table — calls whose semantics cannot be
//!    expressed as a plain mapping (inclusive-end substring family,
//!    zero-means-clear timer set, the sleep suspension point);
//! 3. the mapping table — name → emission template pairs shared with the
//!    API documentation.
//!
//! Anything spelled like a builtin that misses all three layers resolves
//! to `Unmapped`: the emitter plants a TODO marker and a diagnostic.

use core_syntax::LslType;

/// Emission shape for a resolved builtin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Host-mediated instance call, e.g. `object.setPosition`.
    Method { path: &'static str },
    /// Attribute access with no arguments, e.g. `object.position`.
    Property { path: &'static str },
    /// Indexed access into the detected-info array.
    Detected { field: &'static str },
    /// Pure library call evaluated inside the VM, e.g. `math.sqrt`.
    Static { helper: &'static str },
    /// Handcrafted emission — see [`Special`].
    Special(Special),
    /// Known builtin with no mapping yet.
    Unmapped,
}

/// Builtins with nontrivial handcrafted templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Special {
    /// Inclusive-end substring with negative-index and wrap-around
    /// semantics (`start > end` concatenates suffix + prefix).
    GetSubString,
    /// Inclusive-end delete with outer-range semantics when `start > end`.
    DeleteSubString,
    /// Inclusive-end list slice, same index rules as `GetSubString`.
    ListSlice,
    /// Inclusive-end list delete, same rules as `DeleteSubString`.
    DeleteSubList,
    /// Suspends the calling script only; peers keep running. The emitter
    /// surfaces the divergence as a one-time diagnostic per script.
    Sleep,
    /// Interval 0 clears the timer; the legacy single-timer shape maps to
    /// the "default" timer id.
    SetTimerEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub kind: Resolution,
    /// The call site must be awaited.
    pub needs_await: bool,
    /// The enclosing function must be emitted async.
    pub needs_async: bool,
    /// Mapping is approximate; resolving it warns at transpile time.
    pub partial: bool,
    /// Static return type when known (drives operator-overload dispatch).
    pub returns: Option<LslType>,
}

impl Resolved {
    const fn sync(kind: Resolution, returns: Option<LslType>) -> Self {
        Self {
            kind,
            needs_await: false,
            needs_async: false,
            partial: false,
            returns,
        }
    }

    const fn asynchronous(kind: Resolution, returns: Option<LslType>) -> Self {
        Self {
            kind,
            needs_await: true,
            needs_async: true,
            partial: false,
            returns,
        }
    }

    const fn partial(kind: Resolution, returns: Option<LslType>) -> Self {
        Self {
            kind,
            needs_await: false,
            needs_async: false,
            partial: true,
            returns,
        }
    }
}

/// Layer 1: `llDetected*` call sites → detected-info field names.
const DETECTED_TABLE: &[(&str, &str, LslType)] = &[
    ("llDetectedKey", "id", LslType::Key),
    ("llDetectedName", "name", LslType::String),
    ("llDetectedPos", "position", LslType::Vector),
    ("llDetectedRot", "rotation", LslType::Rotation),
    ("llDetectedVel", "velocity", LslType::Vector),
    ("llDetectedType", "type", LslType::Integer),
    ("llDetectedGroup", "group", LslType::Integer),
    ("llDetectedOwner", "owner", LslType::Key),
    ("llDetectedLinkNumber", "linkNumber", LslType::Integer),
    ("llDetectedTouchFace", "touchFace", LslType::Integer),
    ("llDetectedTouchPos", "touchPosition", LslType::Vector),
    ("llDetectedTouchNormal", "touchNormal", LslType::Vector),
    ("llDetectedTouchBinormal", "touchBinormal", LslType::Vector),
    ("llDetectedTouchST", "touchST", LslType::Vector),
    ("llDetectedTouchUV", "touchUV", LslType::Vector),
];

/// Layer 2: special handlers.
fn special(name: &str) -> Option<Resolved> {
    use LslType::*;
    Some(match name {
        "llGetSubString" => Resolved::sync(Resolution::Special(Special::GetSubString), Some(String)),
        "llDeleteSubString" => {
            Resolved::sync(Resolution::Special(Special::DeleteSubString), Some(String))
        }
        "llList2List" => Resolved::sync(Resolution::Special(Special::ListSlice), Some(List)),
        "llDeleteSubList" => {
            Resolved::sync(Resolution::Special(Special::DeleteSubList), Some(List))
        }
        "llSleep" => Resolved::asynchronous(Resolution::Special(Special::Sleep), None),
        "llSetTimerEvent" => {
            Resolved::sync(Resolution::Special(Special::SetTimerEvent), None)
        }
        _ => return None,
    })
}

struct MapEntry {
    name: &'static str,
    resolved: Resolved,
}

const fn method(name: &'static str, path: &'static str, returns: Option<LslType>) -> MapEntry {
    MapEntry {
        name,
        resolved: Resolved::sync(Resolution::Method { path }, returns),
    }
}

const fn method_async(
    name: &'static str,
    path: &'static str,
    returns: Option<LslType>,
) -> MapEntry {
    MapEntry {
        name,
        resolved: Resolved::asynchronous(Resolution::Method { path }, returns),
    }
}

const fn method_partial(
    name: &'static str,
    path: &'static str,
    returns: Option<LslType>,
) -> MapEntry {
    MapEntry {
        name,
        resolved: Resolved::partial(Resolution::Method { path }, returns),
    }
}

const fn property(name: &'static str, path: &'static str, returns: LslType) -> MapEntry {
    MapEntry {
        name,
        resolved: Resolved::sync(Resolution::Property { path }, Some(returns)),
    }
}

const fn helper(name: &'static str, helper: &'static str, returns: Option<LslType>) -> MapEntry {
    MapEntry {
        name,
        resolved: Resolved::sync(Resolution::Static { helper }, returns),
    }
}

/// Layer 3: the name → template mapping table. Kept sorted by category so
/// the list stays diffable against the API documentation.
const MAPPING_TABLE: &[MapEntry] = &[
    // --- communication -----------------------------------------------------
    method("llSay", "world.say", None),
    method("llWhisper", "world.whisper", None),
    method("llShout", "world.shout", None),
    method("llRegionSay", "world.regionSay", None),
    method("llRegionSayTo", "world.regionSayTo", None),
    method("llOwnerSay", "world.ownerSay", None),
    method("llInstantMessage", "world.instantMessage", None),
    method("llEmail", "world.email", None),
    method("llDialog", "world.dialog", None),
    method("llTextBox", "world.textBox", None),
    method("llLoadURL", "world.loadUrl", None),
    method("llMapDestination", "world.mapDestination", None),
    // --- listeners / sensors ----------------------------------------------
    method("llListen", "script.listen", Some(LslType::Integer)),
    method("llListenRemove", "script.listenRemove", None),
    method("llListenControl", "script.listenControl", None),
    method("llSensor", "world.sensor", None),
    method("llSensorRepeat", "world.sensorRepeat", None),
    method("llSensorRemove", "world.sensorRemove", None),
    // --- script lifecycle --------------------------------------------------
    method("llResetScript", "script.reset", None),
    method("llMessageLinked", "script.linkMessage", None),
    method("llRemoteLoadScriptPin", "script.remoteLoadPin", None),
    // --- transform ---------------------------------------------------------
    method("llSetPos", "object.setPosition", None),
    method("llSetRot", "object.setRotation", None),
    method("llSetScale", "object.setScale", None),
    method("llSetLocalRot", "object.setLocalRotation", None),
    method("llSetRegionPos", "object.setRegionPosition", Some(LslType::Integer)),
    method("llMoveToTarget", "object.moveToTarget", None),
    method("llStopMoveToTarget", "object.stopMoveToTarget", None),
    method("llSetTargetOmega", "object.setTargetOmega", None),
    method("llLookAt", "object.lookAt", None),
    method("llStopLookAt", "object.stopLookAt", None),
    method("llTarget", "object.target", Some(LslType::Integer)),
    method("llTargetRemove", "object.targetRemove", None),
    // --- appearance --------------------------------------------------------
    method("llSetText", "object.setText", None),
    method("llSetColor", "object.setColor", None),
    method("llSetAlpha", "object.setAlpha", None),
    method("llSetTexture", "object.setTexture", None),
    method("llScaleTexture", "object.setTextureScale", None),
    method("llOffsetTexture", "object.setTextureOffset", None),
    method("llRotateTexture", "object.setTextureRotation", None),
    method_partial("llSetPrimitiveParams", "object.setPrimitiveParams", None),
    method_partial("llSetLinkPrimitiveParamsFast", "object.setLinkPrimitiveParams", None),
    method("llSetClickAction", "object.setClickAction", None),
    method("llSetSitText", "object.setSitText", None),
    method("llSetTouchText", "object.setTouchText", None),
    method("llSitTarget", "object.sitTarget", None),
    method("llUnSit", "object.unsit", None),
    // --- sound & media -----------------------------------------------------
    method("llPlaySound", "object.playSound", None),
    method("llLoopSound", "object.loopSound", None),
    method("llStopSound", "object.stopSound", None),
    method("llTriggerSound", "object.triggerSound", None),
    method("llPreloadSound", "object.preloadSound", None),
    method("llAdjustSoundVolume", "object.adjustVolume", None),
    method("llSetSoundQueueing", "object.setSoundQueueing", None),
    // --- effects -----------------------------------------------------------
    method("llParticleSystem", "object.particleSystem", None),
    method("llLinkParticleSystem", "object.linkParticleSystem", None),
    // --- animation ---------------------------------------------------------
    method("llStartAnimation", "world.startAnimation", None),
    method("llStopAnimation", "world.stopAnimation", None),
    // --- physics -----------------------------------------------------------
    method("llApplyImpulse", "object.applyImpulse", None),
    method("llApplyRotationalImpulse", "object.applyTorque", None),
    method("llSetStatus", "object.setStatus", None),
    method_partial("llGetStatus", "object.getStatus", Some(LslType::Integer)),
    method_partial("llSetBuoyancy", "object.setBuoyancy", None),
    method_partial("llSetForce", "object.setForce", None),
    method_partial("llSetTorque", "object.setTorque", None),
    method("llSetVelocity", "object.setVelocity", None),
    method("llSetHoverHeight", "object.setHoverHeight", None),
    method("llStopHover", "object.stopHover", None),
    method("llPushObject", "world.pushObject", None),
    method("llSetPhysics", "object.setPhysics", None),
    // --- permissions / controls -------------------------------------------
    method("llRequestPermissions", "world.requestPermissions", None),
    property("llGetPermissions", "script.permissions", LslType::Integer),
    property("llGetPermissionsKey", "script.permissionsKey", LslType::Key),
    method("llTakeControls", "world.takeControls", None),
    method("llReleaseControls", "world.releaseControls", None),
    // --- object / region queries ------------------------------------------
    property("llGetPos", "object.position", LslType::Vector),
    property("llGetLocalPos", "object.localPosition", LslType::Vector),
    property("llGetRot", "object.rotation", LslType::Rotation),
    property("llGetLocalRot", "object.localRotation", LslType::Rotation),
    property("llGetScale", "object.scale", LslType::Vector),
    property("llGetVel", "object.velocity", LslType::Vector),
    property("llGetOwner", "object.owner", LslType::Key),
    property("llGetKey", "object.key", LslType::Key),
    property("llGetCreator", "object.creator", LslType::Key),
    property("llGetObjectName", "object.name", LslType::String),
    property("llGetObjectDesc", "object.description", LslType::String),
    property("llGetLinkNumber", "object.linkNumber", LslType::Integer),
    property("llGetNumberOfPrims", "object.primCount", LslType::Integer),
    property("llGetAttached", "object.attachPoint", LslType::Integer),
    property("llGetRegionName", "region.name", LslType::String),
    property("llGetRegionCorner", "region.corner", LslType::Vector),
    property("llGetRegionFPS", "region.fps", LslType::Float),
    property("llGetRegionTimeDilation", "region.timeDilation", LslType::Float),
    method("llSetObjectName", "object.setName", None),
    method("llSetObjectDesc", "object.setDescription", None),
    method("llGetObjectDetails", "world.getObjectDetails", Some(LslType::List)),
    method("llGetAgentInfo", "world.getAgentInfo", Some(LslType::Integer)),
    method("llGetAgentSize", "world.getAgentSize", Some(LslType::Vector)),
    method("llGetAgentList", "world.getAgentList", Some(LslType::List)),
    method("llKey2Name", "world.keyToName", Some(LslType::String)),
    method("llGetOwnerKey", "world.getOwnerKey", Some(LslType::Key)),
    method_partial("llGetBoundingBox", "world.getBoundingBox", Some(LslType::List)),
    method_partial("llGetMass", "object.getMass", Some(LslType::Float)),
    // --- inventory ---------------------------------------------------------
    method("llGiveInventory", "object.giveInventory", None),
    method("llGiveInventoryList", "object.giveInventoryList", None),
    method("llRemoveInventory", "object.removeInventory", None),
    method("llGetInventoryNumber", "object.inventoryCount", Some(LslType::Integer)),
    method("llGetInventoryName", "object.inventoryName", Some(LslType::String)),
    method("llGetInventoryType", "object.inventoryType", Some(LslType::Integer)),
    method("llGetInventoryKey", "object.inventoryKey", Some(LslType::Key)),
    method_async("llGetNotecardLine", "object.getNotecardLine", Some(LslType::Key)),
    method_async(
        "llGetNumberOfNotecardLines",
        "object.getNotecardLineCount",
        Some(LslType::Key),
    ),
    // --- rez / lifecycle ---------------------------------------------------
    method("llRezObject", "object.rezObject", None),
    method("llRezAtRoot", "object.rezAtRoot", None),
    method("llDie", "object.die", None),
    method("llAttachToAvatar", "object.attach", None),
    method("llDetachFromAvatar", "object.detach", None),
    // --- land / agents -----------------------------------------------------
    method("llTeleportAgent", "world.teleportAgent", None),
    method("llEjectFromLand", "world.ejectAgent", None),
    method("llOverMyLand", "world.overMyLand", Some(LslType::Integer)),
    // --- HTTP / data -------------------------------------------------------
    method_async("llHTTPRequest", "world.httpRequest", Some(LslType::Key)),
    method("llHTTPResponse", "world.httpResponse", None),
    method("llRequestAgentData", "world.requestAgentData", Some(LslType::Key)),
    method("llRequestInventoryData", "world.requestInventoryData", Some(LslType::Key)),
    method("llLinksetDataWrite", "object.linksetDataWrite", Some(LslType::Integer)),
    method("llLinksetDataRead", "object.linksetDataRead", Some(LslType::String)),
    method("llLinksetDataDelete", "object.linksetDataDelete", Some(LslType::Integer)),
    method("llLinksetDataReset", "object.linksetDataReset", None),
    // --- camera ------------------------------------------------------------
    method("llSetCameraParams", "world.setCameraParams", None),
    method("llClearCameraParams", "world.clearCameraParams", None),
    // --- NPC (OSSL) --------------------------------------------------------
    method_async("osNpcCreate", "npc.create", Some(LslType::Key)),
    method_async("osNpcRemove", "npc.remove", None),
    method_async("osNpcMoveTo", "npc.moveTo", None),
    method_async("osNpcMoveToTarget", "npc.moveToTarget", None),
    method("osNpcStopMoveToTarget", "npc.stopMoveTo", None),
    method("osNpcSay", "npc.say", None),
    method("osNpcShout", "npc.shout", None),
    method("osNpcWhisper", "npc.whisper", None),
    method("osNpcPlayAnimation", "npc.playAnimation", None),
    method("osNpcStopAnimation", "npc.stopAnimation", None),
    method("osNpcSit", "npc.sit", None),
    method("osNpcStand", "npc.stand", None),
    method("osNpcTouch", "npc.touch", None),
    method_async("osGetNotecard", "object.readNotecard", Some(LslType::String)),
    method("osMakeNotecard", "object.makeNotecard", None),
    method("osMessageObject", "world.messageObject", None),
    method("osTeleportAgent", "world.teleportAgent", None),
    // --- math (static helpers) --------------------------------------------
    helper("llAbs", "math.absInt", Some(LslType::Integer)),
    helper("llFabs", "math.abs", Some(LslType::Float)),
    helper("llCeil", "math.ceil", Some(LslType::Integer)),
    helper("llFloor", "math.floor", Some(LslType::Integer)),
    helper("llRound", "math.round", Some(LslType::Integer)),
    helper("llSqrt", "math.sqrt", Some(LslType::Float)),
    helper("llPow", "math.pow", Some(LslType::Float)),
    helper("llLog", "math.log", Some(LslType::Float)),
    helper("llLog10", "math.log10", Some(LslType::Float)),
    helper("llSin", "math.sin", Some(LslType::Float)),
    helper("llCos", "math.cos", Some(LslType::Float)),
    helper("llTan", "math.tan", Some(LslType::Float)),
    helper("llAsin", "math.asin", Some(LslType::Float)),
    helper("llAcos", "math.acos", Some(LslType::Float)),
    helper("llAtan2", "math.atan2", Some(LslType::Float)),
    helper("llFrand", "math.frand", Some(LslType::Float)),
    helper("llModPow", "math.modPow", Some(LslType::Integer)),
    // --- vector / rotation helpers ----------------------------------------
    helper("llVecMag", "vec.mag", Some(LslType::Float)),
    helper("llVecNorm", "vec.norm", Some(LslType::Vector)),
    helper("llVecDist", "vec.dist", Some(LslType::Float)),
    helper("llRot2Euler", "rot.toEuler", Some(LslType::Vector)),
    helper("llEuler2Rot", "rot.fromEuler", Some(LslType::Rotation)),
    helper("llRot2Fwd", "rot.fwd", Some(LslType::Vector)),
    helper("llRot2Left", "rot.left", Some(LslType::Vector)),
    helper("llRot2Up", "rot.up", Some(LslType::Vector)),
    helper("llAxisAngle2Rot", "rot.fromAxisAngle", Some(LslType::Rotation)),
    helper("llRot2Axis", "rot.axis", Some(LslType::Vector)),
    helper("llRot2Angle", "rot.angle", Some(LslType::Float)),
    helper("llAngleBetween", "rot.angleBetween", Some(LslType::Float)),
    helper("llRotBetween", "rot.between", Some(LslType::Rotation)),
    // --- strings -----------------------------------------------------------
    helper("llStringLength", "string.length", Some(LslType::Integer)),
    helper("llToUpper", "string.toUpper", Some(LslType::String)),
    helper("llToLower", "string.toLower", Some(LslType::String)),
    helper("llStringTrim", "string.trim", Some(LslType::String)),
    helper("llSubStringIndex", "string.indexOf", Some(LslType::Integer)),
    helper("llInsertString", "string.insert", Some(LslType::String)),
    helper("llReplaceSubString", "string.replace", Some(LslType::String)),
    helper("llEscapeURL", "string.escapeUrl", Some(LslType::String)),
    helper("llUnescapeURL", "string.unescapeUrl", Some(LslType::String)),
    helper("llStringToBase64", "string.toBase64", Some(LslType::String)),
    helper("llBase64ToString", "string.fromBase64", Some(LslType::String)),
    helper("llIntegerToBase64", "string.intToBase64", Some(LslType::String)),
    helper("llBase64ToInteger", "string.base64ToInt", Some(LslType::Integer)),
    // --- lists -------------------------------------------------------------
    helper("llGetListLength", "list.length", Some(LslType::Integer)),
    helper("llList2String", "list.toString", Some(LslType::String)),
    helper("llList2Integer", "list.toInteger", Some(LslType::Integer)),
    helper("llList2Float", "list.toFloat", Some(LslType::Float)),
    helper("llList2Key", "list.toKey", Some(LslType::Key)),
    helper("llList2Vector", "list.toVector", Some(LslType::Vector)),
    helper("llList2Rot", "list.toRotation", Some(LslType::Rotation)),
    helper("llGetListEntryType", "list.entryType", Some(LslType::Integer)),
    helper("llListSort", "list.sort", Some(LslType::List)),
    helper("llListRandomize", "list.randomize", Some(LslType::List)),
    helper("llListFindList", "list.find", Some(LslType::Integer)),
    helper("llListInsertList", "list.insert", Some(LslType::List)),
    helper("llListReplaceList", "list.replace", Some(LslType::List)),
    helper("llParseString2List", "list.parseString", Some(LslType::List)),
    helper("llParseStringKeepNulls", "list.parseStringKeepNulls", Some(LslType::List)),
    helper("llDumpList2String", "list.dump", Some(LslType::String)),
    helper("llCSV2List", "list.fromCsv", Some(LslType::List)),
    helper("llList2CSV", "list.toCsv", Some(LslType::String)),
    helper("llListStatistics", "list.statistics", Some(LslType::Float)),
    // --- time --------------------------------------------------------------
    helper("llGetTime", "script.time", Some(LslType::Float)),
    helper("llResetTime", "script.resetTime", None),
    helper("llGetAndResetTime", "script.getAndResetTime", Some(LslType::Float)),
    helper("llGetUnixTime", "time.unix", Some(LslType::Integer)),
    helper("llGetTimestamp", "time.timestamp", Some(LslType::String)),
    helper("llGetDate", "time.date", Some(LslType::String)),
    helper("llGetGMTclock", "time.gmtClock", Some(LslType::Float)),
    // --- misc --------------------------------------------------------------
    helper("llGenerateKey", "key.generate", Some(LslType::Key)),
    helper("llGetScriptName", "script.name", Some(LslType::String)),
    helper("llGetFreeMemory", "script.freeMemory", Some(LslType::Integer)),
    helper("llGetUsedMemory", "script.usedMemory", Some(LslType::Integer)),
];

/// Resolve a builtin call site. `None` means the name is not a builtin at
/// all (user function or plain identifier).
pub fn resolve(name: &str) -> Option<Resolved> {
    if let Some((_, field, returns)) = DETECTED_TABLE.iter().find(|(n, _, _)| *n == name) {
        return Some(Resolved::sync(Resolution::Detected { field }, Some(*returns)));
    }
    if let Some(resolved) = special(name) {
        return Some(resolved);
    }
    if let Some(entry) = MAPPING_TABLE.iter().find(|e| e.name == name) {
        return Some(entry.resolved);
    }
    if name.starts_with("ll") || name.starts_with("os") {
        return Some(Resolved {
            kind: Resolution::Unmapped,
            needs_await: false,
            needs_async: false,
            partial: false,
            returns: None,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detected_layer_wins() {
        let r = resolve("llDetectedKey").unwrap();
        assert_eq!(r.kind, Resolution::Detected { field: "id" });
        assert_eq!(r.returns, Some(LslType::Key));
    }

    #[test]
    fn special_layer_flags_sleep_async() {
        let r = resolve("llSleep").unwrap();
        assert_eq!(r.kind, Resolution::Special(Special::Sleep));
        assert!(r.needs_await && r.needs_async);
    }

    #[test]
    fn mapping_layer_resolves_method_and_property() {
        let say = resolve("llSay").unwrap();
        assert_eq!(say.kind, Resolution::Method { path: "world.say" });
        assert!(!say.needs_await);

        let pos = resolve("llGetPos").unwrap();
        assert_eq!(pos.kind, Resolution::Property { path: "object.position" });
        assert_eq!(pos.returns, Some(LslType::Vector));
    }

    #[test]
    fn async_builtins_force_both_flags() {
        for name in [
            "llSleep",
            "llHTTPRequest",
            "llGetNotecardLine",
            "llGetNumberOfNotecardLines",
            "osNpcCreate",
            "osNpcRemove",
            "osNpcMoveTo",
        ] {
            let r = resolve(name).unwrap_or_else(|| panic!("{name} must resolve"));
            assert!(r.needs_await, "{name} must need await");
            assert!(r.needs_async, "{name} must need async");
        }
    }

    #[test]
    fn partial_mappings_are_marked() {
        assert!(resolve("llSetBuoyancy").unwrap().partial);
        assert!(resolve("llGetBoundingBox").unwrap().partial);
        assert!(!resolve("llSay").unwrap().partial);
    }

    #[test]
    fn unknown_builtin_is_unmapped_but_user_functions_are_not() {
        assert_eq!(resolve("llCastRay").unwrap().kind, Resolution::Unmapped);
        assert_eq!(resolve("osConsoleCommand").unwrap().kind, Resolution::Unmapped);
        assert!(resolve("myHelper").is_none());
    }

    #[test]
    fn table_names_are_unique() {
        let mut names: Vec<&str> = MAPPING_TABLE.iter().map(|e| e.name).collect();
        names.extend(DETECTED_TABLE.iter().map(|(n, _, _)| *n));
        let len = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(len, names.len(), "duplicate mapping entries");
    }
}
