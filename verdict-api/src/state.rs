//! Platform and trust state
//!
//! Values the boot core reads from the platform (reset and wake sources,
//! wall-clock time) and values it publishes (trust level).

use core::fmt;

/// Verified-boot state, ordered from most to least trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum TrustLevel {
    /// Everything verified
    Green = 0,
    /// Keystore did not verify against the OEM key
    Yellow = 1,
    /// Device unlocked or platform secure boot disabled
    Orange = 2,
    /// Image failed verification or insecure build
    Red = 3,
}

impl TrustLevel {
    /// Byte stored in the `BootState` variable
    pub fn as_byte(&self) -> u8 {
        *self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(TrustLevel::Green),
            1 => Some(TrustLevel::Yellow),
            2 => Some(TrustLevel::Orange),
            3 => Some(TrustLevel::Red),
            _ => None,
        }
    }

    /// Keep the less trusted of two levels
    pub fn degrade(self, other: TrustLevel) -> TrustLevel {
        self.max(other)
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustLevel::Green => write!(f, "green"),
            TrustLevel::Yellow => write!(f, "yellow"),
            TrustLevel::Orange => write!(f, "orange"),
            TrustLevel::Red => write!(f, "red"),
        }
    }
}

/// Administrative lock state of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceState {
    Locked,
    Verified,
    Unlocked,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Locked => write!(f, "locked"),
            DeviceState::Verified => write!(f, "verified"),
            DeviceState::Unlocked => write!(f, "unlocked"),
        }
    }
}

/// Why the platform last reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetSource {
    NotApplicable,
    OsInitiated,
    Forced,
    FirmwareUpdate,
    KernelWatchdog,
    SecurityWatchdog,
    SecurityInitiated,
    PmcWatchdog,
    EcWatchdog,
    PlatformWatchdog,
    Unknown,
}

impl ResetSource {
    /// Resets that count towards the crash-loop detector
    pub fn is_watchdog(&self) -> bool {
        matches!(self, ResetSource::KernelWatchdog | ResetSource::SecurityWatchdog)
    }

    /// `androidboot.bootreason` value, if the source has one
    pub fn boot_reason(&self) -> Option<&'static str> {
        match self {
            ResetSource::KernelWatchdog => Some("watchdog"),
            ResetSource::SecurityWatchdog => Some("security_watchdog"),
            ResetSource::PmcWatchdog => Some("pmc_watchdog"),
            ResetSource::EcWatchdog => Some("ec_watchdog"),
            ResetSource::PlatformWatchdog => Some("platform_watchdog"),
            ResetSource::SecurityInitiated => Some("security_initiated"),
            _ => None,
        }
    }
}

/// What woke the platform up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeSource {
    NotApplicable,
    BatteryInserted,
    UsbChargerInserted,
    AcdcChargerInserted,
    PowerButtonPressed,
    RtcTimer,
    BatteryReachedIaThreshold,
    Unknown,
}

impl WakeSource {
    pub fn is_charger_insertion(&self) -> bool {
        matches!(self, WakeSource::UsbChargerInserted | WakeSource::AcdcChargerInserted)
    }

    /// `androidboot.bootreason` value, if the source has one
    pub fn boot_reason(&self) -> Option<&'static str> {
        match self {
            WakeSource::BatteryInserted => Some("battery_inserted"),
            WakeSource::UsbChargerInserted => Some("usb_charger_inserted"),
            WakeSource::AcdcChargerInserted => Some("acdc_charger_inserted"),
            WakeSource::PowerButtonPressed => Some("power_button_pressed"),
            WakeSource::RtcTimer => Some("rtc_timer"),
            WakeSource::BatteryReachedIaThreshold => Some("battery_reached_ia_threshold"),
            _ => None,
        }
    }
}

/// Reset flavours understood by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetType {
    Cold,
    Warm,
    Shutdown,
}

/// Wall-clock time in the firmware `EFI_TIME` layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EfiTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub nanosecond: u32,
    pub time_zone: i16,
    pub daylight: u8,
}

impl EfiTime {
    /// Serialized size of `EFI_TIME`
    pub const SIZE: usize = 16;

    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            ..Self::default()
        }
    }

    /// Encode with the firmware padding bytes zeroed
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.year.to_le_bytes());
        out[2] = self.month;
        out[3] = self.day;
        out[4] = self.hour;
        out[5] = self.minute;
        out[6] = self.second;
        out[8..12].copy_from_slice(&self.nanosecond.to_le_bytes());
        out[12..14].copy_from_slice(&self.time_zone.to_le_bytes());
        out[14] = self.daylight;
        out
    }

    /// Decode, `None` when the buffer has the wrong size
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            year: u16::from_le_bytes([bytes[0], bytes[1]]),
            month: bytes[2],
            day: bytes[3],
            hour: bytes[4],
            minute: bytes[5],
            second: bytes[6],
            nanosecond: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            time_zone: i16::from_le_bytes([bytes[12], bytes[13]]),
            daylight: bytes[14],
        })
    }
}

impl fmt::Display for EfiTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}
