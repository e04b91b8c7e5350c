//! Collaborator interfaces
//!
//! The boot core reaches firmware services only through the traits below.
//! Every method takes `&self`: there is exactly one caller per boot, and
//! implementations that need mutation use interior mutability. This keeps the
//! traits usable behind the shared references held by the boot context.

use alloc::string::String;
use alloc::vec::Vec;
use bitflags::bitflags;
use core::fmt;

use crate::boot::BootTarget;
use crate::error::Result;
use crate::state::{DeviceState, EfiTime, ResetSource, ResetType, TrustLevel, WakeSource};

/// Logical label of the OS boot partition
pub const BOOT_LABEL: &str = "boot";
/// Logical label of the recovery partition
pub const RECOVERY_LABEL: &str = "recovery";
/// Logical label of the partition holding the boot control block
pub const MISC_LABEL: &str = "misc";
/// Logical label of the factory-reset-protection partition
pub const PERSISTENT_LABEL: &str = "persistent";

/// Variable namespaces used by the bootloader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarNamespace {
    /// Loader interface variables shared with the OS
    Loader,
    /// Bootloader private variables
    Fastboot,
}

impl VarNamespace {
    /// Vendor GUID backing the namespace
    pub const fn guid(&self) -> &'static str {
        match self {
            VarNamespace::Loader => "4a67b082-0a4c-41cf-b6c7-440b29bb8c4f",
            VarNamespace::Fastboot => "1ac80a82-4f0c-456b-9a99-debeb431fcc1",
        }
    }

    /// Resolve a namespace from its GUID, case-insensitively
    pub fn from_guid(guid: &str) -> Option<Self> {
        [VarNamespace::Loader, VarNamespace::Fastboot]
            .into_iter()
            .find(|ns| ns.guid().eq_ignore_ascii_case(guid))
    }
}

impl fmt::Display for VarNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarNamespace::Loader => write!(f, "loader"),
            VarNamespace::Fastboot => write!(f, "fastboot"),
        }
    }
}

bitflags! {
    /// Storage attributes of a variable
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VarAttributes: u32 {
        const NON_VOLATILE = 0x1;
        const BOOTSERVICE_ACCESS = 0x2;
        const RUNTIME_ACCESS = 0x4;
    }
}

impl VarAttributes {
    /// Attribute set for a bootloader variable
    pub fn for_var(persistent: bool, runtime: bool) -> Self {
        let mut attrs = VarAttributes::BOOTSERVICE_ACCESS;
        if persistent {
            attrs |= VarAttributes::NON_VOLATILE;
        }
        if runtime {
            attrs |= VarAttributes::RUNTIME_ACCESS;
        }
        attrs
    }
}

/// Persistent variable store
///
/// `get` reports an absent variable as `Status::NotFound`.
pub trait VarStore {
    fn get(&self, ns: VarNamespace, name: &str) -> Result<Vec<u8>>;
    fn set(&self, ns: VarNamespace, name: &str, data: &[u8], attrs: VarAttributes) -> Result<()>;
    fn delete(&self, ns: VarNamespace, name: &str) -> Result<()>;
}

/// Raw access to partitions by logical label
pub trait PartitionStore {
    /// Size in bytes, `Status::NotFound` when the label does not exist
    fn partition_size(&self, label: &str) -> Result<u64>;
    fn read_partition(&self, label: &str, offset: u64, len: usize) -> Result<Vec<u8>>;
    fn write_partition(&self, label: &str, offset: u64, data: &[u8]) -> Result<()>;
}

/// Files on the system partition the bootloader was started from
pub trait EspFileSystem {
    fn exists(&self, path: &str) -> bool;
    fn read(&self, path: &str) -> Result<Vec<u8>>;
    fn delete(&self, path: &str) -> Result<()>;
}

/// Key events the bootloader reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    Up,
    Down,
    Select,
    Power,
    Other,
}

/// Console input used for magic-key detection
pub trait KeyInput {
    /// Reset the input controller, dropping buffered keystrokes
    fn reset(&self);
    /// Non-blocking read of one keystroke
    fn read_key(&self) -> Option<UiEvent>;
    /// Whether `event` stays held for `hold_ms` milliseconds
    fn enforce_key_held(&self, hold_ms: u64, event: UiEvent) -> bool;
}

/// Blocking prompts and display-only notifications
///
/// Prompts return once the operator acknowledged them.
pub trait BootUi {
    /// Crash-loop menu, returns the operator's choice
    fn crash_event_prompt(&self) -> BootTarget;
    fn prompt_secure_boot_off(&self);
    fn prompt_keystore_unverified(&self, hash: &[u8]);
    fn prompt_device_unlocked(&self);
    fn prompt_bootimage_unverified(&self);
    fn warn_unverified_recovery(&self);
    fn display_low_battery(&self, seconds: u32);
    fn display_empty_battery(&self);
    /// Ask the operator to confirm a device state change
    fn confirm_device_state(&self, state: DeviceState) -> bool;
}

/// Read-only platform signals
pub trait PlatformSignals {
    fn reset_source(&self) -> ResetSource;
    fn wake_source(&self) -> WakeSource;
    fn now(&self) -> Result<EfiTime>;
    fn battery_below_boot_threshold(&self) -> bool;
    fn charger_plugged_in(&self) -> bool;
    fn secure_boot_enabled(&self) -> bool;
    fn is_provisioning(&self) -> bool;
    fn serial_number(&self) -> Option<String>;
}

/// Power and timing control
///
/// On hardware `halt`, `reboot` and `reset` do not return.
pub trait SystemControl {
    /// Busy-wait for `ms` milliseconds
    fn stall_ms(&self, ms: u64);
    /// Visible pause of `seconds` seconds
    fn pause(&self, seconds: u32);
    fn halt(&self);
    /// Reboot, optionally into a named target
    fn reboot(&self, target: Option<BootTarget>);
    fn reset(&self, kind: ResetType);
    /// Scrub conventional memory before handing over to an untrusted image
    fn clear_memory(&self) -> Result<()>;
    /// Submit a firmware capsule, returns the reset the capsule requires
    fn update_capsule(&self, capsule: &[u8]) -> Result<ResetType>;
}

/// Access to images already resident in RAM
pub trait PhysicalMemory {
    fn read(&self, address: u64, len: usize) -> Result<Vec<u8>>;
}

/// Final control transfer
///
/// Both methods only return when the started image could not run or, for EFI
/// applications, once the application exited.
pub trait ImageLauncher {
    fn start_boot_image(
        &self,
        image: &[u8],
        cmdline: &str,
        target: BootTarget,
        level: TrustLevel,
    ) -> Result<()>;
    fn start_efi_image(&self, image: &[u8]) -> Result<()>;
}

/// One request received by the embedded flashing tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashRequest {
    /// `boot <image>`: run a transient Android boot image
    BootImage(Vec<u8>),
    /// Run a transient EFI application
    EfiImage(Vec<u8>),
    /// Leave the tool and reboot into a target
    Reboot(BootTarget),
    /// `oem lock|unlock|verified`
    ChangeState(DeviceState),
    /// Install a user keystore
    InstallKeystore(Vec<u8>),
    /// `oem off-mode-charge <arg>`
    SetOffModeCharge(String),
    /// `oem crash-event-menu <arg>`
    SetCrashEventMenu(String),
}

/// Transport-independent flashing session
pub trait FlashingSession {
    /// Block until the host sends the next request
    fn next_request(&mut self) -> Result<FlashRequest>;
    fn okay(&mut self, info: &str);
    fn info(&mut self, message: &str);
    fn fail(&mut self, reason: &str);
}
