//! Bootloader control block
//!
//! The BCB lives at the start of the `misc` partition and lets the OS or a
//! recovery flow direct the next boot:
//!
//! - `boot-<name>` persists until something rewrites the block
//! - `bootonce-<name>` is consumed by the read that honours it
//!
//! `<name>` is a symbolic target or an absolute path on the system partition.
//! The status field belongs to the bootloader and is cleared on every read.

use alloc::string::String;
use alloc::vec::Vec;
use verdict_api::interfaces::MISC_LABEL;
use verdict_api::{BootDecision, BootTarget, EspFileSystem, PartitionStore};

use crate::error::{BootError, Result};

pub const BCB_COMMAND_SIZE: usize = 32;
pub const BCB_STATUS_SIZE: usize = 32;
pub const BCB_RECOVERY_SIZE: usize = 768;
pub const BCB_STAGE_SIZE: usize = 32;
pub const BCB_RESERVED_SIZE: usize = 224;
pub const BCB_SIZE: usize =
    BCB_COMMAND_SIZE + BCB_STATUS_SIZE + BCB_RECOVERY_SIZE + BCB_STAGE_SIZE + BCB_RESERVED_SIZE;

const PERSISTENT_PREFIX: &str = "boot-";
const ONESHOT_PREFIX: &str = "bootonce-";

/// Raw `bootloader_message` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootloaderMessage {
    pub command: [u8; BCB_COMMAND_SIZE],
    pub status: [u8; BCB_STATUS_SIZE],
    pub recovery: [u8; BCB_RECOVERY_SIZE],
    pub stage: [u8; BCB_STAGE_SIZE],
    pub reserved: [u8; BCB_RESERVED_SIZE],
}

/// Directive found in the command field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BcbDirective {
    None,
    Persistent(String),
    OneShot(String),
}

impl Default for BootloaderMessage {
    fn default() -> Self {
        Self {
            command: [0; BCB_COMMAND_SIZE],
            status: [0; BCB_STATUS_SIZE],
            recovery: [0; BCB_RECOVERY_SIZE],
            stage: [0; BCB_STAGE_SIZE],
            reserved: [0; BCB_RESERVED_SIZE],
        }
    }
}

fn field_str(field: &[u8]) -> String {
    field
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| *b as char)
        .collect()
}

impl BootloaderMessage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BCB_SIZE {
            return Err(BootError::InvalidArgument("BCB truncated"));
        }
        let mut msg = Self::default();
        let mut offset = 0;
        for field in [
            &mut msg.command[..],
            &mut msg.status[..],
            &mut msg.recovery[..],
            &mut msg.stage[..],
            &mut msg.reserved[..],
        ] {
            let len = field.len();
            field.copy_from_slice(&bytes[offset..offset + len]);
            offset += len;
        }
        // Never trust the writer to terminate the strings
        msg.command[BCB_COMMAND_SIZE - 1] = 0;
        msg.status[BCB_STATUS_SIZE - 1] = 0;
        Ok(msg)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(BCB_SIZE);
        out.extend_from_slice(&self.command);
        out.extend_from_slice(&self.status);
        out.extend_from_slice(&self.recovery);
        out.extend_from_slice(&self.stage);
        out.extend_from_slice(&self.reserved);
        out
    }

    /// Build a block carrying `command`
    pub fn with_command(command: &str) -> Self {
        let mut msg = Self::default();
        let bytes = command.as_bytes();
        let len = bytes.len().min(BCB_COMMAND_SIZE - 1);
        msg.command[..len].copy_from_slice(&bytes[..len]);
        msg
    }

    pub fn command(&self) -> String {
        field_str(&self.command)
    }

    pub fn status(&self) -> String {
        field_str(&self.status)
    }

    pub fn read(partitions: &dyn PartitionStore) -> Result<Self> {
        let bytes = partitions
            .read_partition(MISC_LABEL, 0, BCB_SIZE)
            .map_err(BootError::Storage)?;
        Self::from_bytes(&bytes)
    }

    pub fn write(&self, partitions: &dyn PartitionStore) -> Result<()> {
        partitions
            .write_partition(MISC_LABEL, 0, &self.to_bytes())
            .map_err(BootError::Storage)
    }

    /// Interpret the command field
    ///
    /// Clears the status field and, for one-shot directives, the command
    /// field. The caller writes the block back before acting on the result.
    pub fn take_directive(&mut self) -> BcbDirective {
        self.status[0] = 0;
        let command = self.command();
        if let Some(target) = command.strip_prefix(PERSISTENT_PREFIX) {
            log::debug!("BCB boot target: '{}'", target);
            BcbDirective::Persistent(String::from(target))
        } else if let Some(target) = command.strip_prefix(ONESHOT_PREFIX) {
            log::debug!("BCB oneshot boot target: '{}'", target);
            self.command[0] = 0;
            BcbDirective::OneShot(String::from(target))
        } else {
            BcbDirective::None
        }
    }
}

/// Resolve a BCB target name or path
pub fn resolve_target(esp: &dyn EspFileSystem, target: &str, oneshot: bool) -> BootDecision {
    if target.starts_with('\\') {
        if !esp.exists(target) {
            log::error!("Specified BCB file '{}' doesn't exist", target);
            return BootDecision::normal();
        }
        // BCB bytes above 0x7f decode to two-byte chars, so count chars
        if target.chars().count() <= 4 {
            log::error!("BCB file '{}' appears to be malformed", target);
            return BootDecision::normal();
        }
        let bytes = target.as_bytes();
        let is_efi = bytes[bytes.len() - 4..].eq_ignore_ascii_case(b".efi");
        let kind = if is_efi {
            BootTarget::EspEfiBinary
        } else {
            BootTarget::EspBootimage
        };
        return BootDecision::esp(kind, String::from(target), oneshot);
    }

    match BootTarget::from_name(target) {
        BootTarget::UnknownTarget => {
            log::error!("Unknown boot target in BCB: '{}'", target);
            BootDecision::normal()
        }
        known => BootDecision {
            oneshot,
            ..BootDecision::new(known)
        },
    }
}

/// Read, consume and write back the BCB, then resolve its directive
///
/// The block is rewritten before the directive is acted on, so a power loss
/// cannot replay a one-shot directive. Any storage failure degrades to a
/// normal boot.
pub fn check_bcb(partitions: &dyn PartitionStore, esp: &dyn EspFileSystem) -> BootDecision {
    let mut bcb = match BootloaderMessage::read(partitions) {
        Ok(bcb) => bcb,
        Err(e) => {
            log::error!("Unable to read BCB: {}", e);
            return BootDecision::normal();
        }
    };

    let directive = bcb.take_directive();

    if let Err(e) = bcb.write(partitions) {
        log::error!("Unable to update BCB contents: {}", e);
    }

    match directive {
        BcbDirective::None => BootDecision::normal(),
        BcbDirective::Persistent(target) => resolve_target(esp, &target, false),
        BcbDirective::OneShot(target) => resolve_target(esp, &target, true),
    }
}
