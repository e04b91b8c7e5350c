//! Verdict bootloader core
//!
//! Decides what to boot, how far the boot can be trusted, and hands the
//! verified image to the platform. Firmware services are reached through the
//! `verdict_api` traits bundled in a [`context::PlatformContext`].
//!
//! Layout:
//! - selection: `selector`, `watchdog`, `bcb`, `cmdline`
//! - trust: `keystore`, `trust`, `verifier`, `device_state`
//! - images: `bootimage`, `loader`, `oemvars`, `launch`
//! - flow: `orchestrator`, `flash_mode`, `capsule`
//! - support: `config`, `error`, `logger`, `vars`

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod bcb;
pub mod bootimage;
pub mod capsule;
pub mod cmdline;
pub mod config;
pub mod context;
pub mod device_state;
pub mod error;
pub mod flash_mode;
pub mod keystore;
pub mod launch;
pub mod loader;
pub mod logger;
pub mod oemvars;
pub mod orchestrator;
pub mod selector;
pub mod trust;
pub mod vars;
pub mod verifier;
pub mod watchdog;

#[cfg(feature = "signing")]
pub mod signing;

pub use config::{BootConfig, BuildVariant, FlashModeKind};
pub use context::PlatformContext;
pub use error::{BootError, Result};
pub use flash_mode::{BootImageFlashMode, EmbeddedFlashMode, FlashModeEntry};
pub use orchestrator::{BootExit, BootOrchestrator};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
