//! Per-boot platform context
//!
//! Bundles every collaborator, the trust store, the configuration and the
//! launch arguments. Built once by the platform glue and passed by reference
//! to the selector, the trust engine and the orchestrator; the boot core keeps
//! no hidden statics besides the log buffer.

use verdict_api::{
    BootUi, EspFileSystem, ImageLauncher, KeyInput, PartitionStore, PhysicalMemory,
    PlatformSignals, SystemControl, VarStore,
};

use crate::cmdline::CmdLine;
use crate::config::BootConfig;
use crate::keystore::TrustStore;

pub struct PlatformContext<'a> {
    pub vars: &'a dyn VarStore,
    pub partitions: &'a dyn PartitionStore,
    pub esp: &'a dyn EspFileSystem,
    pub ui: &'a dyn BootUi,
    pub keys: &'a dyn KeyInput,
    pub signals: &'a dyn PlatformSignals,
    pub system: &'a dyn SystemControl,
    pub memory: &'a dyn PhysicalMemory,
    pub launcher: &'a dyn ImageLauncher,
    pub trust_store: &'a TrustStore,
    pub config: &'a BootConfig,
    /// Load options the bootloader was started with; index 0 may be the
    /// image name
    pub args: &'a CmdLine,
}

impl PlatformContext<'_> {
    /// Device unlock state as recorded in the variable store
    ///
    /// An unreadable state is treated as locked.
    pub fn device_is_unlocked(&self) -> bool {
        match crate::vars::get_device_state(self.vars) {
            Ok(state) => state == verdict_api::DeviceState::Unlocked,
            Err(e) => {
                log::error!("Failed to read device state: {}", e);
                false
            }
        }
    }
}
