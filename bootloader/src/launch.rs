//! Control transfer to the selected image

use core::convert::Infallible;
use verdict_api::{BootTarget, TrustLevel, VarAttributes, VarNamespace};

use crate::bootimage::BootImage;
use crate::cmdline;
use crate::context::PlatformContext;
use crate::error::{BootError, Result};
use crate::vars;

/// Publish the trust level for the OS (volatile, runtime access)
pub fn publish_boot_state(ctx: &PlatformContext<'_>, level: TrustLevel) {
    let attrs = VarAttributes::for_var(false, true);
    if let Err(e) = vars::set_u8(ctx.vars, VarNamespace::Fastboot, vars::BOOT_STATE_VAR, level.as_byte(), attrs) {
        log::error!("Failed to set {}: {}", vars::BOOT_STATE_VAR, e);
    }
}

/// Hand `image` over to the platform launcher
///
/// Memory is scrubbed first unless the boot is GREEN. Only returns when the
/// image could not be started or gave control back.
pub fn start_boot_image(
    ctx: &PlatformContext<'_>,
    image: &BootImage,
    target: BootTarget,
    level: TrustLevel,
) -> core::result::Result<Infallible, BootError> {
    if level != TrustLevel::Green {
        if let Err(e) = ctx.system.clear_memory() {
            log::error!("Failed to clear memory: {}", e);
        }
    }
    publish_boot_state(ctx, level);

    let cmdline = cmdline::build_kernel_cmdline(ctx, image.header(), target, level);
    log::debug!("chainloading boot image, boot state is {}", level);
    match ctx.launcher.start_boot_image(image.as_bytes(), &cmdline, target, level) {
        Ok(()) => Err(BootError::ImageReturned),
        Err(e) => {
            log::error!("Couldn't load Boot image: {}", e);
            Err(BootError::Platform(e))
        }
    }
}

/// Chainload an EFI application from the system partition
///
/// One-shot binaries are deleted once read so a crashing application does
/// not come back on the next boot.
pub fn start_efi_binary(ctx: &PlatformContext<'_>, path: &str, delete: bool) -> Result<()> {
    let image = ctx.esp.read(path).map_err(|e| {
        log::error!("Couldn't read '{}': {}", path, e);
        BootError::Storage(e)
    })?;
    if delete {
        if let Err(e) = ctx.esp.delete(path) {
            log::error!("Couldn't delete {}: {}", path, e);
        }
    }
    ctx.launcher.start_efi_image(&image).map_err(BootError::Platform)
}
