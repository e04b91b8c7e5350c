//! Boot targets and boot decisions
//!
//! A [`BootTarget`] is produced exactly once per boot attempt by the target
//! selector; the accompanying [`BootDecision`] carries the auxiliary
//! parameters some targets need.

use alloc::string::String;
use core::fmt;

/// Every place the bootloader can hand control to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BootTarget {
    /// Boot the OS from the boot partition
    NormalBoot,
    /// Boot the recovery partition
    Recovery,
    /// Enter the flashing tool
    Fastboot,
    /// Flashing tool image already resident in memory
    Memory,
    /// Android boot image stored on the system partition
    EspBootimage,
    /// EFI application stored on the system partition
    EspEfiBinary,
    /// Charging-only OS boot
    Charger,
    /// Turn the device off
    PowerOff,
    /// Return to the firmware shell
    ExitShell,
    /// Alternate diagnostic loader
    Tdos,
    /// Name that did not resolve to a target
    UnknownTarget,
}

/// Symbolic names accepted by the BCB, the one-shot variable and reboot
/// requests. Several names may map to the same target; the first entry for a
/// target is its canonical name.
const TARGET_NAMES: &[(&str, BootTarget)] = &[
    ("boot", BootTarget::NormalBoot),
    ("normal", BootTarget::NormalBoot),
    ("recovery", BootTarget::Recovery),
    ("fastboot", BootTarget::Fastboot),
    ("bootloader", BootTarget::Fastboot),
    ("memory", BootTarget::Memory),
    ("esp-bootimage", BootTarget::EspBootimage),
    ("esp-efi-binary", BootTarget::EspEfiBinary),
    ("charging", BootTarget::Charger),
    ("charger", BootTarget::Charger),
    ("power-off", BootTarget::PowerOff),
    ("shell", BootTarget::ExitShell),
    ("tdos", BootTarget::Tdos),
];

impl BootTarget {
    /// Resolve a symbolic name, `UnknownTarget` when nothing matches
    pub fn from_name(name: &str) -> Self {
        TARGET_NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| *t)
            .unwrap_or(BootTarget::UnknownTarget)
    }

    /// Canonical symbolic name, if the target has one
    pub fn name(&self) -> Option<&'static str> {
        TARGET_NAMES.iter().find(|(_, t)| t == self).map(|(n, _)| *n)
    }

    /// Human readable description used in log lines
    pub fn description(&self) -> &'static str {
        match self {
            BootTarget::NormalBoot => "Normal Boot",
            BootTarget::Recovery => "Recovery",
            BootTarget::Fastboot => "Fastboot",
            BootTarget::Memory => "Memory",
            BootTarget::EspBootimage => "ESP Boot image",
            BootTarget::EspEfiBinary => "ESP EFI Binary",
            BootTarget::Charger => "Charger",
            BootTarget::PowerOff => "Power Off",
            BootTarget::ExitShell => "Exit Shell",
            BootTarget::Tdos => "TDOS",
            BootTarget::UnknownTarget => "Unknown",
        }
    }
}

impl fmt::Display for BootTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Outcome of target selection for one boot attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootDecision {
    pub target: BootTarget,
    /// Physical address of a resident image, only for `Memory`
    pub target_address: Option<u64>,
    /// Path on the system partition, only for the ESP targets
    pub target_path: Option<String>,
    /// The file behind `target_path` must be deleted once consumed
    pub oneshot: bool,
}

impl BootDecision {
    /// Decision carrying no auxiliary parameters
    pub fn new(target: BootTarget) -> Self {
        Self {
            target,
            target_address: None,
            target_path: None,
            oneshot: false,
        }
    }

    pub fn normal() -> Self {
        Self::new(BootTarget::NormalBoot)
    }

    /// Resident flashing image at `address`
    pub fn memory(address: u64) -> Self {
        Self {
            target_address: Some(address),
            ..Self::new(BootTarget::Memory)
        }
    }

    /// Image on the system partition; `target` must be one of the ESP targets
    pub fn esp(target: BootTarget, path: String, oneshot: bool) -> Self {
        Self {
            target,
            target_address: None,
            target_path: Some(path),
            oneshot,
        }
    }

    pub fn is_normal(&self) -> bool {
        self.target == BootTarget::NormalBoot
    }
}

impl Default for BootDecision {
    fn default() -> Self {
        Self::normal()
    }
}
