//! Permission / change / agent bitmasks carried by events.
//!
//! On the wire every mask is its raw integer bits, matching the legacy
//! constants scripts compare against; the typed flags exist for host-side
//! ergonomics.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! wire_mask {
    ($name:ident) => {
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_i32(self.bits())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let bits = i32::deserialize(deserializer)?;
                Ok(Self::from_bits_retain(bits))
            }
        }
    };
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PermissionMask: i32 {
        const DEBIT = 0x2;
        const TAKE_CONTROLS = 0x4;
        const TRIGGER_ANIMATION = 0x10;
        const ATTACH = 0x20;
        const CHANGE_LINKS = 0x80;
        const TRACK_CAMERA = 0x400;
        const CONTROL_CAMERA = 0x800;
        const TELEPORT = 0x1000;
    }
}
wire_mask!(PermissionMask);

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChangeMask: i32 {
        const INVENTORY = 0x1;
        const COLOR = 0x2;
        const SHAPE = 0x4;
        const SCALE = 0x8;
        const TEXTURE = 0x10;
        const LINK = 0x20;
        const ALLOWED_DROP = 0x40;
        const OWNER = 0x80;
        const REGION = 0x100;
        const TELEPORT = 0x200;
        const REGION_START = 0x400;
        const MEDIA = 0x800;
    }
}
wire_mask!(ChangeMask);

bitflags::bitflags! {
    /// Sensor / detected classification bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DetectedTypeMask: i32 {
        const AGENT = 0x1;
        const ACTIVE = 0x2;
        const PASSIVE = 0x4;
        const SCRIPTED = 0x8;
    }
}
wire_mask!(DetectedTypeMask);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_serialize_as_raw_bits() {
        let mask = PermissionMask::TAKE_CONTROLS | PermissionMask::TRIGGER_ANIMATION;
        assert_eq!(serde_json::to_string(&mask).unwrap(), "20");
        let back: PermissionMask = serde_json::from_str("20").unwrap();
        assert_eq!(back, mask);
    }

    #[test]
    fn unknown_bits_are_retained() {
        let mask: ChangeMask = serde_json::from_str("4097").unwrap();
        assert_eq!(mask.bits(), 4097);
        assert!(mask.contains(ChangeMask::INVENTORY));
    }
}
