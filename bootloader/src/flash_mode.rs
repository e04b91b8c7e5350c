//! Flashing tool entry
//!
//! Two ways to reach the flashing tool, picked when the boot core is
//! composed:
//! - [`BootImageFlashMode`]: the tool is a separate boot image, always
//!   verified against the OEM keystore
//! - [`EmbeddedFlashMode`]: the tool runs in-process through a
//!   [`FlashingSession`]
//!
//! Both only come back when the device halts or reboots.

use alloc::string::ToString;
use core::cell::RefCell;
use verdict_api::{BootTarget, DeviceState, FlashRequest, FlashingSession, TrustLevel, VarAttributes, VarNamespace};

use crate::bootimage::BootImage;
use crate::context::PlatformContext;
use crate::device_state::{self, StateChange};
use crate::error::{BootError, Result};
use crate::launch;
use crate::loader;
use crate::oemvars;
use crate::orchestrator::{fatal_halt, BootExit};
use crate::vars;
use crate::verifier;

pub trait FlashModeEntry {
    /// Run the flashing tool at `level`; `address` locates a tool image
    /// already in memory
    fn enter(&self, ctx: &PlatformContext<'_>, level: TrustLevel, address: Option<u64>) -> BootExit;
}

fn rearm_oemvars(ctx: &PlatformContext<'_>) {
    if let Err(e) = vars::set_oemvars_update(ctx.vars, true) {
        log::error!("Failed to set {}: {}", vars::OEMVARS_UPDATE_VAR, e);
    }
}

/// Flashing tool shipped as a boot image signed for `/fastboot`
#[derive(Debug, Default, Clone, Copy)]
pub struct BootImageFlashMode;

impl BootImageFlashMode {
    fn load(&self, ctx: &PlatformContext<'_>, address: Option<u64>) -> Result<BootImage> {
        let image = match address {
            Some(address) => loader::load_memory_image(ctx.memory, address)?,
            None => loader::load_file_image(ctx.esp, &ctx.config.paths.fastboot_image, false)?,
        };
        if ctx.config.variant.enforces_verified_boot() {
            log::debug!("verify Fastboot boot image");
            verifier::verify_for_purpose(&image, ctx.trust_store.oem_keystore(), "/fastboot")?;
        }
        Ok(image)
    }
}

impl FlashModeEntry for BootImageFlashMode {
    fn enter(&self, ctx: &PlatformContext<'_>, level: TrustLevel, address: Option<u64>) -> BootExit {
        // the tool checks flashed bootloader images with this key
        let attrs = VarAttributes::for_var(false, true);
        if let Err(e) = ctx.vars.set(VarNamespace::Fastboot, vars::OEM_KEY_VAR, ctx.trust_store.oem_key_bytes(), attrs) {
            log::error!("Failed to publish {}: {}", vars::OEM_KEY_VAR, e);
        }
        rearm_oemvars(ctx);

        match self.load(ctx, address) {
            Ok(image) => {
                log::debug!("chainloading fastboot, boot state is {}", level);
                let error = match launch::start_boot_image(ctx, &image, BootTarget::Fastboot, level) {
                    Ok(never) => match never {},
                    Err(e) => e,
                };
                log::error!("Couldn't chainload Fastboot image: {}", error);
            }
            Err(e) => log::error!("Fastboot image unusable: {}", e),
        }
        fatal_halt(ctx)
    }
}

/// In-process flashing tool driven by a transport session
pub struct EmbeddedFlashMode<S: FlashingSession> {
    session: RefCell<S>,
}

impl<S: FlashingSession> EmbeddedFlashMode<S> {
    pub fn new(session: S) -> Self {
        Self {
            session: RefCell::new(session),
        }
    }

    pub fn into_session(self) -> S {
        self.session.into_inner()
    }

    fn boot_transient(&self, ctx: &PlatformContext<'_>, session: &mut S, data: alloc::vec::Vec<u8>) {
        // 'fastboot boot' is only honoured on unlocked devices
        if !ctx.device_is_unlocked() {
            session.fail("boot is not allowed on locked devices");
            return;
        }
        let image = match BootImage::from_bytes(data) {
            Ok(image) => image,
            Err(e) => {
                session.fail(&e.to_string());
                return;
            }
        };
        session.okay("");
        if let Err(e) = oemvars::apply_nocheck(ctx.vars, &image) {
            log::error!("Failed to apply OEM variables: {}", e);
        }
        let error = match launch::start_boot_image(ctx, &image, BootTarget::NormalBoot, TrustLevel::Orange) {
            Ok(never) => match never {},
            Err(e) => e,
        };
        log::error!("Couldn't start the received boot image: {}", error);
    }

    fn change_state(&self, ctx: &PlatformContext<'_>, session: &mut S, state: DeviceState) -> Result<()> {
        let change = if state == DeviceState::Unlocked {
            device_state::request_unlock(ctx, &mut |msg| session.info(msg))?
        } else {
            device_state::change_device_state(ctx, state)?
        };
        if change == StateChange::AlreadyInState {
            session.info("Device is already in the required state.");
        }
        Ok(())
    }

    fn handle(&self, ctx: &PlatformContext<'_>, session: &mut S, request: FlashRequest) -> Result<()> {
        match request {
            FlashRequest::ChangeState(state) => self.change_state(ctx, session, state),
            FlashRequest::InstallKeystore(blob) => {
                let state = vars::get_device_state(ctx.vars)?;
                ctx.trust_store.install_user_keystore(ctx.vars, &blob, state)
            }
            FlashRequest::SetOffModeCharge(arg) => {
                vars::set_off_mode_charge(ctx.vars, device_state::parse_toggle(&arg)?)
            }
            FlashRequest::SetCrashEventMenu(arg) => {
                vars::set_crash_event_menu(ctx.vars, device_state::parse_toggle(&arg)?)
            }
            FlashRequest::BootImage(_) | FlashRequest::EfiImage(_) | FlashRequest::Reboot(_) => {
                Err(BootError::InvalidArgument("request is not a setting"))
            }
        }
    }
}

impl<S: FlashingSession> FlashModeEntry for EmbeddedFlashMode<S> {
    fn enter(&self, ctx: &PlatformContext<'_>, level: TrustLevel, _address: Option<u64>) -> BootExit {
        launch::publish_boot_state(ctx, level);
        rearm_oemvars(ctx);

        let mut session = self.session.borrow_mut();
        loop {
            let request = match session.next_request() {
                Ok(request) => request,
                Err(e) => {
                    log::error!("Fastboot mode failed: {}", e);
                    break;
                }
            };

            match request {
                FlashRequest::BootImage(data) => self.boot_transient(ctx, &mut session, data),
                FlashRequest::EfiImage(data) => {
                    session.okay("");
                    if let Err(e) = ctx.launcher.start_efi_image(&data) {
                        log::error!("Unable to start the received EFI image: {}", e);
                    }
                }
                FlashRequest::Reboot(target) => {
                    session.okay("");
                    drop(session);
                    ctx.system.reboot(Some(target));
                    return BootExit::Rebooted;
                }
                other => match self.handle(ctx, &mut session, other) {
                    Ok(()) => session.okay(""),
                    Err(e) => session.fail(&e.to_string()),
                },
            }
        }
        drop(session);
        fatal_halt(ctx)
    }
}
