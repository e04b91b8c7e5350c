//! Boot Configuration - Pure Value Object
//!
//! Build policy and tunables of the boot core. Does NOT contain business
//! logic beyond validation and construction.
//!
//! # Examples
//!
//! ```
//! # use verdict_bootloader::config::{BootConfig, BuildVariant};
//! let config = BootConfig::default().with_variant(BuildVariant::User);
//! assert!(config.validate().is_ok());
//! ```

use alloc::string::String;
use core::fmt;

/// Build flavour, decides which debug paths and security policies apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BuildVariant {
    /// Production build, every policy enforced
    User,
    /// Verified boot enforced, debug affordances kept
    UserDebug,
    /// No verified boot at all, always RED
    Eng,
}

impl BuildVariant {
    pub fn is_user(&self) -> bool {
        matches!(self, BuildVariant::User)
    }

    /// Whether images and keystores are verified at all
    pub fn enforces_verified_boot(&self) -> bool {
        !matches!(self, BuildVariant::Eng)
    }
}

impl fmt::Display for BuildVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildVariant::User => write!(f, "user"),
            BuildVariant::UserDebug => write!(f, "userdebug"),
            BuildVariant::Eng => write!(f, "eng"),
        }
    }
}

/// How the flashing tool is provided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlashModeKind {
    /// Separate signed boot image (`\fastboot.img` or a resident image)
    BootImage,
    /// Built into the bootloader
    Embedded,
}

/// Well-known paths on the system partition
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WellKnownPaths {
    /// Presence forces the flashing tool
    pub fastboot_sentinel: String,
    /// Flashing tool boot image
    pub fastboot_image: String,
    /// Alternate diagnostic loader image
    pub tdos_image: String,
    /// Firmware capsule consumed at start-up
    pub capsule_update: String,
}

impl Default for WellKnownPaths {
    fn default() -> Self {
        Self {
            fastboot_sentinel: String::from("\\force_fastboot"),
            fastboot_image: String::from("\\fastboot.img"),
            tdos_image: String::from("\\tdos.img"),
            capsule_update: String::from("\\BIOSUPDATE.fv"),
        }
    }
}

/// Bootloader configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BootConfig {
    pub variant: BuildVariant,
    /// Every trust prompt halts instead of asking
    pub no_device_unlock: bool,
    pub flash_mode: FlashModeKind,
    /// Watchdog resets tolerated inside the window
    pub watchdog_counter_max: u8,
    /// Crash-loop window in seconds
    pub watchdog_delay_secs: i64,
    /// Default magic-key wait
    pub magic_key_timeout_ms: u64,
    /// Waits above this are treated as bogus and replaced by the default
    pub magic_key_timeout_ceiling_ms: u64,
    /// Key poll interval while waiting for the magic key
    pub key_poll_interval_ms: u64,
    /// Hold time that selects the flashing tool
    pub fastboot_hold_delay_ms: u64,
    /// Pause before halting on unrecoverable errors
    pub fatal_pause_secs: u32,
    /// Pause before halting when no image bytes were obtained
    pub missing_image_pause_secs: u32,
    /// Pause after an EFI application failed
    pub efi_failure_pause_secs: u32,
    /// Pause after the insecure-build banner
    pub insecure_pause_secs: u32,
    /// Low battery screen duration
    pub low_battery_display_secs: u32,
    /// Pause after applying command-line override variables
    pub cmdline_override_pause_secs: u32,
    pub loader_version: String,
    pub paths: WellKnownPaths,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            variant: BuildVariant::UserDebug,
            no_device_unlock: false,
            flash_mode: FlashModeKind::Embedded,
            watchdog_counter_max: 2,
            watchdog_delay_secs: 10 * 60,
            magic_key_timeout_ms: 200,
            magic_key_timeout_ceiling_ms: 1000,
            key_poll_interval_ms: 1,
            fastboot_hold_delay_ms: 2 * 1000,
            fatal_pause_secs: 30,
            missing_image_pause_secs: 5,
            efi_failure_pause_secs: 3,
            insecure_pause_secs: 1,
            low_battery_display_secs: 3,
            cmdline_override_pause_secs: 1,
            loader_version: String::from(concat!("verdict-", env!("CARGO_PKG_VERSION"))),
            paths: WellKnownPaths::default(),
        }
    }
}

impl BootConfig {
    pub fn with_variant(mut self, variant: BuildVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_flash_mode(mut self, flash_mode: FlashModeKind) -> Self {
        self.flash_mode = flash_mode;
        self
    }

    pub fn with_no_device_unlock(mut self, no_device_unlock: bool) -> Self {
        self.no_device_unlock = no_device_unlock;
        self
    }

    pub fn with_loader_version(mut self, version: &str) -> Self {
        self.loader_version = String::from(version);
        self
    }

    /// Builds whose flashing tool is a separate signed boot image
    pub fn has_fastboot_image(&self) -> bool {
        self.flash_mode == FlashModeKind::BootImage
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.watchdog_counter_max == 0 {
            return Err("Watchdog counter maximum must be at least 1");
        }
        if self.watchdog_delay_secs <= 0 {
            return Err("Watchdog window must be positive");
        }
        if self.magic_key_timeout_ms > self.magic_key_timeout_ceiling_ms {
            return Err("Magic key timeout exceeds its ceiling");
        }
        if self.key_poll_interval_ms == 0 {
            return Err("Key poll interval cannot be zero");
        }
        if self.fastboot_hold_delay_ms == 0 {
            return Err("Fastboot hold delay cannot be zero");
        }
        if self.loader_version.is_empty() {
            return Err("Loader version cannot be empty");
        }

        let paths = [
            &self.paths.fastboot_sentinel,
            &self.paths.fastboot_image,
            &self.paths.tdos_image,
            &self.paths.capsule_update,
        ];
        if paths.iter().any(|p| !p.starts_with('\\')) {
            return Err("Well-known paths must be absolute");
        }

        Ok(())
    }
}

impl fmt::Display for BootConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BootConfig {{ variant: {}, flash_mode: {:?}, no_device_unlock: {} }}",
            self.variant, self.flash_mode, self.no_device_unlock
        )
    }
}
