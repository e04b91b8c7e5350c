//! Device lock state changes
//!
//! Unlock policy:
//! - provisioning devices may always unlock
//! - builds without an unlock path never unlock
//! - otherwise the last byte of the `persistent` partition decides (1 allows
//!   unlocking, a missing partition allows it, an unreadable one forbids it)
//! - non-User builds unlock anyway after warning

use verdict_api::interfaces::PERSISTENT_LABEL;
use verdict_api::{DeviceState, Status, VarNamespace};

use crate::context::PlatformContext;
use crate::error::{BootError, Result};
use crate::vars;

/// Result of a state change request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    AlreadyInState,
    Changed,
}

/// Whether the factory-reset-protection byte permits unlocking
pub fn unlock_allowed(ctx: &PlatformContext<'_>) -> bool {
    if ctx.signals.is_provisioning() {
        return true;
    }
    if ctx.config.no_device_unlock {
        return false;
    }

    let size = match ctx.partitions.partition_size(PERSISTENT_LABEL) {
        Ok(size) => size,
        Err(Status::NotFound) => return true,
        Err(e) => {
            log::error!("Couldn't look up persistent partition: {}", e);
            return false;
        }
    };
    if size == 0 {
        return true;
    }

    match ctx.partitions.read_partition(PERSISTENT_LABEL, size - 1, 1) {
        Ok(byte) => byte.first() == Some(&1),
        Err(e) => {
            log::error!("Couldn't read persistent partition: {}", e);
            false
        }
    }
}

/// Move the device to `new_state`
///
/// Outside provisioning, User builds ask the operator to confirm. A
/// successful change drops the persisted boot log.
pub fn change_device_state(ctx: &PlatformContext<'_>, new_state: DeviceState) -> Result<StateChange> {
    let provisioning = ctx.signals.is_provisioning();
    let current = vars::get_device_state(ctx.vars)?;
    if current == new_state && !provisioning {
        log::error!("Device is already in the required state.");
        return Ok(StateChange::AlreadyInState);
    }

    if ctx.config.variant.is_user() && !provisioning && !ctx.ui.confirm_device_state(new_state)
    {
        return Err(BootError::UserRefused);
    }

    vars::set_device_state(ctx.vars, new_state)?;
    log::info!("Device state changed from {} to {}", current, new_state);

    if let Err(e) = vars::delete(ctx.vars, VarNamespace::Loader, vars::LOG_VAR) {
        log::error!("Failed to delete {}: {}", vars::LOG_VAR, e);
    }
    Ok(StateChange::Changed)
}

/// Unlock request honouring the unlock policy
///
/// `warn` receives the messages shown to the host when a non-User build
/// overrides the policy.
pub fn request_unlock(ctx: &PlatformContext<'_>, warn: &mut dyn FnMut(&str)) -> Result<StateChange> {
    if !unlock_allowed(ctx) {
        if ctx.config.variant.is_user() {
            log::error!("Unlocking device not allowed");
            return Err(BootError::UnlockDenied);
        }
        warn("Unlock protection is set");
        warn("Unlocking anyway since this is not a User build");
    }
    change_device_state(ctx, DeviceState::Unlocked)
}

/// Parse a `1`/`0` toggle argument
pub fn parse_toggle(arg: &str) -> Result<bool> {
    match arg {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(BootError::InvalidArgument("expected 1 or 0")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_arguments() {
        assert_eq!(parse_toggle("1"), Ok(true));
        assert_eq!(parse_toggle("0"), Ok(false));
        assert!(parse_toggle("yes").is_err());
        assert!(parse_toggle("").is_err());
    }
}
