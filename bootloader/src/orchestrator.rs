//! Boot flow
//!
//! SELECT_TARGET -> ESTABLISH_TRUST -> LOAD_IMAGE -> PROMPT_IF_DEGRADED ->
//! TRANSFER_CONTROL
//!
//! Only this module decides whether a failure is fatal. Lower layers return
//! typed outcomes and leave halting to the flow below.

use core::fmt;
use verdict_api::{BootTarget, ResetType, Status, TrustLevel, VarAttributes, VarNamespace};

use crate::bootimage::BootImage;
use crate::capsule;
use crate::context::PlatformContext;
use crate::error::BootError;
use crate::flash_mode::FlashModeEntry;
use crate::launch;
use crate::loader::{self, LoadFailure};
use crate::logger;
use crate::oemvars;
use crate::selector;
use crate::trust::{self, TrustAssessment};
use crate::vars;
use crate::verifier;

/// How the boot flow ended
///
/// On hardware only `ExitShell` and `Failed` are ever observed; the other
/// variants follow a halt, power-off or reset request that did not take
/// effect, as with test platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootExit {
    ExitShell,
    Halted,
    PoweredOff,
    Rebooted,
    Failed(BootError),
}

impl BootExit {
    /// Exit status reported to the firmware
    pub fn status(&self) -> Status {
        match self {
            BootExit::ExitShell | BootExit::PoweredOff | BootExit::Rebooted => Status::Success,
            BootExit::Halted => Status::Aborted,
            BootExit::Failed(e) => e.as_status(),
        }
    }
}

impl fmt::Display for BootExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootExit::ExitShell => write!(f, "exit to shell"),
            BootExit::Halted => write!(f, "halted"),
            BootExit::PoweredOff => write!(f, "powered off"),
            BootExit::Rebooted => write!(f, "rebooted"),
            BootExit::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Persist the boot log and stop the system
pub fn halt_system(ctx: &PlatformContext<'_>) -> BootExit {
    if let Err(e) = logger::LOGGER.persist(ctx.vars) {
        log::error!("Failed to save the boot log: {}", e);
    }
    ctx.system.halt();
    BootExit::Halted
}

/// Leave the error on screen long enough to be read, then halt
pub fn fatal_halt(ctx: &PlatformContext<'_>) -> BootExit {
    ctx.system.pause(ctx.config.fatal_pause_secs);
    halt_system(ctx)
}

/// Publish the loader version for the OS (volatile, runtime access)
pub fn publish_loader_version(ctx: &PlatformContext<'_>) {
    let version = ctx.config.loader_version.as_str();
    log::debug!("{}", version);
    let attrs = VarAttributes::for_var(false, true);
    if let Err(e) = vars::set_str16(ctx.vars, VarNamespace::Loader, vars::LOADER_VERSION_VAR, version, attrs) {
        log::error!("Failed to set {}: {}", vars::LOADER_VERSION_VAR, e);
    }
}

pub struct BootOrchestrator<'a> {
    ctx: &'a PlatformContext<'a>,
    flash_mode: &'a dyn FlashModeEntry,
}

impl<'a> BootOrchestrator<'a> {
    pub fn new(ctx: &'a PlatformContext<'a>, flash_mode: &'a dyn FlashModeEntry) -> Self {
        Self { ctx, flash_mode }
    }

    /// Run one boot attempt
    pub fn run(&self) -> BootExit {
        let ctx = self.ctx;
        publish_loader_version(ctx);

        if let Some(result) = capsule::push_pending_capsule(ctx) {
            let kind = result.unwrap_or_else(|e| {
                log::error!("Capsule update failed: {}", e);
                ResetType::Cold
            });
            log::debug!("I am about to reset the system");
            ctx.system.reset(kind);
            return BootExit::Rebooted;
        }

        // no prompts before this point, they would disturb magic key detection
        let decision = selector::choose_boot_target(ctx);
        match decision.target {
            BootTarget::ExitShell => return BootExit::ExitShell,
            BootTarget::PowerOff => {
                halt_system(ctx);
                return BootExit::PoweredOff;
            }
            BootTarget::Charger => ctx.ui.display_empty_battery(),
            _ => {}
        }

        let mut trust = match trust::establish_trust(ctx) {
            Ok(trust) => trust,
            Err(halt) => {
                log::error!("{}", halt);
                return halt_system(ctx);
            }
        };

        if trust.force_fastboot {
            return self.flash_mode.enter(ctx, trust.level, decision.target_address);
        }

        match decision.target {
            // validated by the firmware
            BootTarget::EspEfiBinary => return self.enter_efi_binary(decision.target_path.as_deref(), decision.oneshot),
            // always validated by the OEM keystore
            BootTarget::Fastboot | BootTarget::Memory => {
                log::debug!("entering Fastboot mode");
                return self.flash_mode.enter(ctx, trust.level, decision.target_address);
            }
            BootTarget::Tdos => return self.enter_tdos(trust.level),
            _ => {}
        }

        if let Err(halt) = trust::enforce_prompts(ctx, &trust) {
            log::error!("{}", halt);
            return halt_system(ctx);
        }

        log::debug!("loading boot image");
        let image = match self.load(&mut trust, decision.target, decision.target_path.as_deref(), decision.oneshot) {
            Ok(image) => image,
            Err(exit) => return exit,
        };

        oemvars::refresh_for_target(ctx, decision.target, &image);

        match launch::start_boot_image(ctx, &image, decision.target, trust.level) {
            Ok(never) => match never {},
            Err(e) => BootExit::Failed(e),
        }
    }

    fn load(
        &self,
        trust: &mut TrustAssessment<'_>,
        target: BootTarget,
        path: Option<&str>,
        oneshot: bool,
    ) -> Result<BootImage, BootExit> {
        let ctx = self.ctx;
        let keystore = trust.keystore.as_deref();
        let LoadFailure { error, image } = match loader::load_boot_image(ctx, target, keystore, path, oneshot) {
            Ok(image) => return Ok(image),
            Err(failure) => failure,
        };

        log::debug!("issue loading boot image: {}", error);
        trust.degrade(TrustLevel::Red);
        if target == BootTarget::Recovery {
            ctx.ui.warn_unverified_recovery();
        } else {
            ctx.ui.prompt_bootimage_unverified();
        }
        if ctx.config.no_device_unlock {
            return Err(halt_system(ctx));
        }
        log::debug!("User accepted bad boot image warning");

        image.ok_or_else(|| {
            log::error!("Unable to load boot image at all; stop.");
            ctx.system.pause(ctx.config.missing_image_pause_secs);
            halt_system(ctx)
        })
    }

    fn enter_efi_binary(&self, path: Option<&str>, oneshot: bool) -> BootExit {
        let ctx = self.ctx;
        log::debug!("entering EFI binary");
        let result = match path {
            Some(path) => launch::start_efi_binary(ctx, path, oneshot),
            None => Err(BootError::InvalidArgument("missing EFI binary path")),
        };
        if let Err(e) = result {
            log::error!("EFI Application exited abnormally: {}", e);
            ctx.system.pause(ctx.config.efi_failure_pause_secs);
        }
        ctx.system.reboot(None);
        BootExit::Rebooted
    }

    fn enter_tdos(&self, level: TrustLevel) -> BootExit {
        let ctx = self.ctx;
        log::debug!("entering TDOS");
        let image = match loader::load_file_image(ctx.esp, &ctx.config.paths.tdos_image, false) {
            Ok(image) => image,
            Err(e) => {
                log::error!("Couldn't load TDOS image: {}", e);
                return fatal_halt(ctx);
            }
        };

        if ctx.config.variant.enforces_verified_boot() {
            log::debug!("verify TDOS boot image");
            if let Err(e) = verifier::verify_for_purpose(&image, ctx.trust_store.oem_keystore(), "/tdos") {
                log::error!("tdos image not verified: {}", e);
                return fatal_halt(ctx);
            }
        }

        let error = match launch::start_boot_image(ctx, &image, BootTarget::Tdos, level) {
            Ok(never) => match never {},
            Err(e) => e,
        };
        log::error!("Couldn't chainload TDOS image: {}", error);
        fatal_halt(ctx)
    }
}
