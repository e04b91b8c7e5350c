//! Firmware capsule update at start-up

use verdict_api::{ResetType, Status};

use crate::context::PlatformContext;
use crate::error::{BootError, Result};

/// Push the pending capsule file to firmware, if there is one
///
/// Returns the reset the firmware asked for, or `None` when no capsule is
/// pending. The file is deleted before the update because some capsules
/// reset the platform themselves.
pub fn push_pending_capsule(ctx: &PlatformContext<'_>) -> Option<Result<ResetType>> {
    let path = ctx.config.paths.capsule_update.as_str();
    if !ctx.esp.exists(path) {
        return None;
    }
    Some(push_capsule(ctx, path))
}

fn push_capsule(ctx: &PlatformContext<'_>, path: &str) -> Result<ResetType> {
    log::debug!("Trying to load capsule: {}", path);
    let content = ctx.esp.read(path).map_err(|e| {
        log::debug!("Error in reading file");
        BootError::Storage(e)
    })?;
    if content.is_empty() {
        log::debug!("Couldn't load capsule data from disk");
        return Err(BootError::Storage(Status::LoadError));
    }

    ctx.esp.delete(path).map_err(|e| {
        log::error!("Couldn't delete {}: {}", path, e);
        BootError::Storage(e)
    })?;

    log::debug!("Calling UpdateCapsule ({} bytes)", content.len());
    ctx.system.update_capsule(&content).map_err(BootError::Platform)
}
