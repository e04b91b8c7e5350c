//! Named persisted variables
//!
//! Names, namespaces and encodings of every variable the bootloader reads or
//! writes, plus typed accessors on top of [`VarStore`]. Read failures other
//! than "not found" are logged by the callers and treated as absence.

use alloc::string::String;
use alloc::vec::Vec;
use bitflags::bitflags;
use verdict_api::{DeviceState, EfiTime, Status, VarAttributes, VarNamespace, VarStore};

use crate::error::{BootError, Result};

// Loader namespace
pub const LOADER_ENTRY_ONESHOT: &str = "LoaderEntryOneShot";
pub const LOADER_VERSION_VAR: &str = "LoaderVersion";
pub const LOADER_ENTRY_REBOOT_REASON: &str = "LoaderEntryRebootReason";
pub const SERIAL_PORT_VAR: &str = "SerialPort";
pub const MAGIC_KEY_TIMEOUT_VAR: &str = "MagicKeyTimeout";
pub const HOLD_KEY_STALL_TIME_VAR: &str = "HoldKeyStallTime";
pub const CMDLINE_PREPEND_VAR: &str = "PrependCmdline";
pub const CMDLINE_APPEND_VAR: &str = "AppendCmdline";
pub const CMDLINE_REPLACE_VAR: &str = "ReplaceCmdline";
pub const LOG_VAR: &str = "KernelflingerLogs";

// Fastboot namespace
pub const BOOT_STATE_VAR: &str = "BootState";
pub const OEM_KEY_VAR: &str = "OEMKey";
pub const OEM_LOCK_VAR: &str = "OEMLock";
pub const KEYSTORE_VAR: &str = "KeyStore";
pub const OFF_MODE_CHARGE_VAR: &str = "off-mode-charge";
pub const CRASH_EVENT_MENU_VAR: &str = "crash-event-menu";
pub const OEMVARS_UPDATE_VAR: &str = "OEMVarsUpdate";
pub const WATCHDOG_COUNTER_VAR: &str = "WatchdogCounter";
pub const WATCHDOG_TIME_REF_VAR: &str = "WatchdogTimeReference";

bitflags! {
    /// Encoding of the `OEMLock` variable
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OemLock: u8 {
        const UNLOCKED = 0x1;
        const VERIFIED = 0x2;
    }
}

fn persistent() -> VarAttributes {
    VarAttributes::for_var(true, true)
}

/// Read a variable, mapping "not found" to `None`
pub fn get_optional(vars: &dyn VarStore, ns: VarNamespace, name: &str) -> Result<Option<Vec<u8>>> {
    match vars.get(ns, name) {
        Ok(data) => Ok(Some(data)),
        Err(Status::NotFound) => Ok(None),
        Err(status) => Err(BootError::VariableAccess(status)),
    }
}

/// Delete a variable, ignoring "not found"
pub fn delete(vars: &dyn VarStore, ns: VarNamespace, name: &str) -> Result<()> {
    match vars.delete(ns, name) {
        Ok(()) | Err(Status::NotFound) => Ok(()),
        Err(status) => Err(BootError::VariableAccess(status)),
    }
}

/// Decode UTF-16LE, stopping at the first NUL
pub fn decode_str16(data: &[u8]) -> String {
    let units = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|u| *u != 0);
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Encode as NUL-terminated UTF-16LE
pub fn encode_str16(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity((value.len() + 1) * 2);
    for unit in value.encode_utf16().chain(core::iter::once(0)) {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

/// Decode an 8-bit string, stopping at the first NUL
pub fn decode_str8(data: &[u8]) -> String {
    data.iter().take_while(|b| **b != 0).map(|b| *b as char).collect()
}

/// Strings stored by tools that may write either 8-bit or UTF-16 text
///
/// A zero second byte means UTF-16LE, anything else 8-bit.
pub fn decode_str_any(data: &[u8]) -> String {
    if data.len() >= 2 && data[1] == 0 {
        decode_str16(data)
    } else {
        decode_str8(data)
    }
}

pub fn get_str16(vars: &dyn VarStore, ns: VarNamespace, name: &str) -> Result<Option<String>> {
    Ok(get_optional(vars, ns, name)?.map(|d| decode_str16(&d)))
}

pub fn set_str16(
    vars: &dyn VarStore,
    ns: VarNamespace,
    name: &str,
    value: &str,
    attrs: VarAttributes,
) -> Result<()> {
    vars.set(ns, name, &encode_str16(value), attrs)
        .map_err(BootError::VariableAccess)
}

pub fn get_str8(vars: &dyn VarStore, ns: VarNamespace, name: &str) -> Result<Option<String>> {
    Ok(get_optional(vars, ns, name)?.map(|d| decode_str8(&d)))
}

/// ASCII decimal number, as written by platform provisioning tools
pub fn get_u64_from_str8(vars: &dyn VarStore, ns: VarNamespace, name: &str) -> Result<Option<u64>> {
    match get_str8(vars, ns, name)? {
        None => Ok(None),
        Some(text) => text
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| BootError::InvalidArgument("variable is not a decimal number")),
    }
}

pub fn get_u8(vars: &dyn VarStore, ns: VarNamespace, name: &str) -> Result<Option<u8>> {
    match get_optional(vars, ns, name)? {
        None => Ok(None),
        Some(data) if data.len() == 1 => Ok(Some(data[0])),
        Some(_) => Err(BootError::VariableAccess(Status::BadBufferSize)),
    }
}

pub fn set_u8(vars: &dyn VarStore, ns: VarNamespace, name: &str, value: u8, attrs: VarAttributes) -> Result<()> {
    vars.set(ns, name, &[value], attrs).map_err(BootError::VariableAccess)
}

fn get_bool(vars: &dyn VarStore, name: &str, default: bool) -> bool {
    match get_u8(vars, VarNamespace::Fastboot, name) {
        Ok(Some(v)) => v != 0,
        Ok(None) => default,
        Err(e) => {
            log::error!("Failed to read {}: {}", name, e);
            default
        }
    }
}

fn set_bool(vars: &dyn VarStore, name: &str, value: bool) -> Result<()> {
    set_u8(vars, VarNamespace::Fastboot, name, value as u8, persistent())
}

/// Off-mode charging; enabled unless explicitly turned off
pub fn get_off_mode_charge(vars: &dyn VarStore) -> bool {
    get_bool(vars, OFF_MODE_CHARGE_VAR, true)
}

pub fn set_off_mode_charge(vars: &dyn VarStore, enabled: bool) -> Result<()> {
    set_bool(vars, OFF_MODE_CHARGE_VAR, enabled)
}

/// Crash-loop menu; enabled unless explicitly turned off
pub fn get_crash_event_menu(vars: &dyn VarStore) -> bool {
    get_bool(vars, CRASH_EVENT_MENU_VAR, true)
}

pub fn set_crash_event_menu(vars: &dyn VarStore, enabled: bool) -> Result<()> {
    set_bool(vars, CRASH_EVENT_MENU_VAR, enabled)
}

/// Whether OEM variables must be re-read from the next OS image
pub fn get_oemvars_update(vars: &dyn VarStore) -> bool {
    get_bool(vars, OEMVARS_UPDATE_VAR, true)
}

pub fn set_oemvars_update(vars: &dyn VarStore, update: bool) -> Result<()> {
    set_bool(vars, OEMVARS_UPDATE_VAR, update)
}

/// Decode `OEMLock`; a missing variable means locked
pub fn get_device_state(vars: &dyn VarStore) -> Result<DeviceState> {
    let raw = get_u8(vars, VarNamespace::Fastboot, OEM_LOCK_VAR)?.unwrap_or(0);
    let flags = OemLock::from_bits_truncate(raw);
    Ok(if flags.contains(OemLock::UNLOCKED) {
        DeviceState::Unlocked
    } else if flags.contains(OemLock::VERIFIED) {
        DeviceState::Verified
    } else {
        DeviceState::Locked
    })
}

pub fn set_device_state(vars: &dyn VarStore, state: DeviceState) -> Result<()> {
    let flags = match state {
        DeviceState::Locked => OemLock::empty(),
        DeviceState::Verified => OemLock::VERIFIED,
        DeviceState::Unlocked => OemLock::UNLOCKED,
    };
    set_u8(vars, VarNamespace::Fastboot, OEM_LOCK_VAR, flags.bits(), persistent())
}

/// Persisted crash-loop detector state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchdogStatus {
    pub counter: u8,
    pub time_reference: EfiTime,
}

pub fn get_watchdog_status(vars: &dyn VarStore) -> Result<WatchdogStatus> {
    let counter = get_u8(vars, VarNamespace::Fastboot, WATCHDOG_COUNTER_VAR)?.unwrap_or(0);
    let time_reference = match get_optional(vars, VarNamespace::Fastboot, WATCHDOG_TIME_REF_VAR)? {
        None => EfiTime::default(),
        Some(data) => EfiTime::from_bytes(&data)
            .ok_or(BootError::VariableAccess(Status::BadBufferSize))?,
    };
    Ok(WatchdogStatus { counter, time_reference })
}

pub fn set_watchdog_counter(vars: &dyn VarStore, counter: u8) -> Result<()> {
    set_u8(vars, VarNamespace::Fastboot, WATCHDOG_COUNTER_VAR, counter, persistent())
}

pub fn set_watchdog_time_reference(vars: &dyn VarStore, time: &EfiTime) -> Result<()> {
    vars.set(
        VarNamespace::Fastboot,
        WATCHDOG_TIME_REF_VAR,
        &time.to_bytes(),
        persistent(),
    )
    .map_err(BootError::VariableAccess)
}

pub fn reset_watchdog_status(vars: &dyn VarStore) -> Result<()> {
    set_watchdog_counter(vars, 0)?;
    set_watchdog_time_reference(vars, &EfiTime::default())
}
