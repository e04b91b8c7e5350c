//! Verdict API - boot vocabulary and collaborator interfaces
//!
//! This crate holds the types shared between the verified-boot core and the
//! platform that hosts it, plus the narrow interfaces through which the core
//! reaches firmware services.
//!
//! # Architecture
//!
//! - **boot**: boot targets and the per-boot decision record
//! - **state**: trust levels, device lock state, reset/wake sources, time
//! - **error**: firmware status codes used at every collaborator boundary
//! - **interfaces**: variable store, storage, ESP filesystem, UI, platform
//!   signals, system control, physical memory and the flashing session
//!
//! # Design Principles
//!
//! - **Dependency Inversion**: the boot core depends on these traits, never on
//!   concrete firmware bindings
//! - **Interface Segregation**: one small trait per collaborator

#![no_std]

extern crate alloc;

pub mod boot;
pub mod error;
pub mod interfaces;
pub mod state;

// Re-export commonly used types
pub use crate::boot::{BootDecision, BootTarget};
pub use crate::error::{Result, Status};
pub use crate::interfaces::{
    BootUi, EspFileSystem, FlashRequest, FlashingSession, ImageLauncher, KeyInput, PartitionStore,
    PhysicalMemory, PlatformSignals, SystemControl, UiEvent, VarAttributes, VarNamespace,
    VarStore,
};
pub use crate::state::{DeviceState, EfiTime, ResetSource, ResetType, TrustLevel, WakeSource};
