//! BLE Characteristic UUIDs.
//!
//! The sampling rig exposes a single read/write/notify characteristic used for
//! both outbound commands and inbound status text.

use uuid::Uuid;

/// Command/status characteristic UUID (Read, Write, Notify).
pub const RELAY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x8765_4321_4321_4321_4321_210987654321);

/// Check if a characteristic UUID is the relay characteristic.
pub fn is_relay_characteristic(uuid: &Uuid) -> bool {
    *uuid == RELAY_CHARACTERISTIC_UUID
}
