//! Boot target selection
//!
//! The checks run in a fixed order and the first one returning a decision
//! wins:
//! 1. watchdog crash loop
//! 2. launch arguments
//! 3. fastboot sentinel file
//! 4. magic key
//! 5. battery inserted wake
//! 6. bootloader control block
//! 7. one-shot loader variable
//! 8. battery level
//! 9. charger insertion
//!
//! Checks never fail: persisted-state errors are logged and the check
//! declines, so selection falls through to a normal boot.

use verdict_api::{BootDecision, BootTarget, UiEvent, VarNamespace, WakeSource};

use crate::bcb;
use crate::cmdline::CmdLine;
use crate::config::{BootConfig, FlashModeKind};
use crate::context::PlatformContext;
use crate::vars;
use crate::watchdog;

/// A single selection step; `None` lets the next step run
pub type CheckFn = fn(&PlatformContext<'_>) -> Option<BootDecision>;

#[derive(Clone, Copy)]
pub struct BootCheck {
    pub name: &'static str,
    pub run: CheckFn,
}

/// Selection order
pub const BOOT_CHECKS: &[BootCheck] = &[
    BootCheck { name: "watchdog", run: check_watchdog },
    BootCheck { name: "osloader command line", run: check_command_line },
    BootCheck { name: "fastboot sentinel", run: check_fastboot_sentinel },
    BootCheck { name: "magic key", run: check_magic_key },
    BootCheck { name: "battery insertion", run: check_battery_inserted },
    BootCheck { name: "BCB", run: check_bcb },
    BootCheck { name: "reboot target", run: check_loader_entry_one_shot },
    BootCheck { name: "battery level", run: check_battery },
    BootCheck { name: "charger insertion", run: check_charge_mode },
];

fn decided(target: BootTarget) -> Option<BootDecision> {
    (target != BootTarget::NormalBoot).then(|| BootDecision::new(target))
}

fn check_watchdog(ctx: &PlatformContext<'_>) -> Option<BootDecision> {
    match watchdog::check_watchdog(ctx) {
        BootTarget::UnknownTarget => {
            log::error!("Crash event menu returned an unknown target");
            None
        }
        target => decided(target),
    }
}

fn parse_address(text: &str) -> Option<u64> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16).ok()
}

/// Interpret the launch arguments
///
/// - `-f` forces the embedded flashing tool
/// - `-U` exits to the shell (not on User builds)
/// - `-a <addr>` boots an image from memory when the flashing tool is a boot
///   image, otherwise it is accepted for compatibility and enters fastboot
///
/// Argument 0 may be the image name and is ignored when unrecognised. Any
/// other unknown argument stops parsing.
pub fn parse_launch_args(args: &CmdLine, config: &BootConfig) -> Option<BootDecision> {
    let mut decision: Option<BootDecision> = None;
    let mut pos = 0;
    while let Some(arg) = args.get(pos) {
        log::debug!("Argument {}: {}", pos, arg);
        match arg {
            "-f" if config.flash_mode != FlashModeKind::BootImage => {
                decision = Some(BootDecision::new(BootTarget::Fastboot));
            }
            "-U" if !config.variant.is_user() => {
                return Some(BootDecision::new(BootTarget::ExitShell));
            }
            "-a" => {
                pos += 1;
                let Some(value) = args.get(pos) else {
                    log::error!("-a requires a memory address");
                    break;
                };
                decision = Some(match config.flash_mode {
                    FlashModeKind::BootImage => match parse_address(value) {
                        Some(address) => BootDecision::memory(address),
                        None => {
                            log::error!("invalid memory address '{}'", value);
                            break;
                        }
                    },
                    FlashModeKind::Embedded => BootDecision::new(BootTarget::Fastboot),
                });
            }
            _ if pos == 0 => {}
            other => {
                log::error!("unexpected argument {}", other);
                break;
            }
        }
        pos += 1;
    }
    decision
}

fn check_command_line(ctx: &PlatformContext<'_>) -> Option<BootDecision> {
    parse_launch_args(ctx.args, ctx.config)
}

fn check_fastboot_sentinel(ctx: &PlatformContext<'_>) -> Option<BootDecision> {
    let sentinel = ctx.config.paths.fastboot_sentinel.as_str();
    log::debug!("checking ESP for {}", sentinel);
    ctx.esp
        .exists(sentinel)
        .then(|| BootDecision::new(BootTarget::Fastboot))
}

fn read_ms_var(ctx: &PlatformContext<'_>, name: &str) -> Option<u64> {
    match vars::get_u64_from_str8(ctx.vars, VarNamespace::Loader, name) {
        Ok(value) => value,
        Err(e) => {
            log::debug!("Couldn't read {}: {}; assuming default", name, e);
            None
        }
    }
}

fn check_magic_key(ctx: &PlatformContext<'_>) -> Option<BootDecision> {
    let config = ctx.config;
    ctx.keys.reset();

    let mut wait_ms = read_ms_var(ctx, vars::MAGIC_KEY_TIMEOUT_VAR).unwrap_or(config.magic_key_timeout_ms);
    if wait_ms > config.magic_key_timeout_ceiling_ms {
        log::debug!("pathological magic key timeout, use default");
        wait_ms = config.magic_key_timeout_ms;
    }
    log::debug!("Reset wait time: {}", wait_ms);

    let step = config.key_poll_interval_ms.max(1);
    let mut key = None;
    let mut waited = 0;
    loop {
        key = key.or_else(|| ctx.keys.read_key());
        if key.is_some() || waited >= wait_ms {
            break;
        }
        ctx.system.stall_ms(step);
        waited += step;
    }

    let key = key?;
    log::debug!("ReadKeyStroke: ({} ms) {:?}", waited, key);
    if key != UiEvent::Down {
        return None;
    }

    let hold_ms = read_ms_var(ctx, vars::HOLD_KEY_STALL_TIME_VAR).unwrap_or(config.fastboot_hold_delay_ms);
    let held = ctx.keys.enforce_key_held(hold_ms, UiEvent::Down);
    match (config.flash_mode, held) {
        (_, true) => Some(BootDecision::new(BootTarget::Fastboot)),
        (FlashModeKind::BootImage, false) => Some(BootDecision::new(BootTarget::Recovery)),
        (FlashModeKind::Embedded, false) => None,
    }
}

fn check_battery_inserted(ctx: &PlatformContext<'_>) -> Option<BootDecision> {
    (ctx.signals.wake_source() == WakeSource::BatteryInserted)
        .then(|| BootDecision::new(BootTarget::PowerOff))
}

fn check_bcb(ctx: &PlatformContext<'_>) -> Option<BootDecision> {
    let decision = bcb::check_bcb(ctx.partitions, ctx.esp);
    (!decision.is_normal()).then_some(decision)
}

fn check_loader_entry_one_shot(ctx: &PlatformContext<'_>) -> Option<BootDecision> {
    log::debug!("checking {}", vars::LOADER_ENTRY_ONESHOT);
    let stored = vars::get_str16(ctx.vars, VarNamespace::Loader, vars::LOADER_ENTRY_ONESHOT);
    if let Err(e) = vars::delete(ctx.vars, VarNamespace::Loader, vars::LOADER_ENTRY_ONESHOT) {
        log::error!("Failed to delete {}: {}", vars::LOADER_ENTRY_ONESHOT, e);
    }

    let name = match stored {
        Ok(Some(name)) => name,
        Ok(None) => return None,
        Err(e) => {
            log::error!("Failed to read {}: {}", vars::LOADER_ENTRY_ONESHOT, e);
            return None;
        }
    };

    log::debug!("target = {}", name);
    match BootTarget::from_name(&name) {
        BootTarget::UnknownTarget => {
            log::error!("Unknown oneshot boot target: '{}'", name);
            None
        }
        BootTarget::Charger if !vars::get_off_mode_charge(ctx.vars) => {
            log::debug!("Off mode charge is not set, powering off.");
            Some(BootDecision::new(BootTarget::PowerOff))
        }
        target => decided(target),
    }
}

fn check_battery(ctx: &PlatformContext<'_>) -> Option<BootDecision> {
    if !ctx.signals.battery_below_boot_threshold() {
        return None;
    }
    let charger_plugged = ctx.signals.charger_plugged_in();
    log::debug!("Battery is below boot OS threshold");
    log::debug!("Charger is{} plugged", if charger_plugged { "" } else { " not" });
    if charger_plugged {
        Some(BootDecision::new(BootTarget::Charger))
    } else {
        ctx.ui.display_low_battery(ctx.config.low_battery_display_secs);
        Some(BootDecision::new(BootTarget::PowerOff))
    }
}

fn check_charge_mode(ctx: &PlatformContext<'_>) -> Option<BootDecision> {
    if !vars::get_off_mode_charge(ctx.vars) {
        return None;
    }
    let wake = ctx.signals.wake_source();
    if wake.is_charger_insertion() {
        log::debug!("Wake source = {:?}", wake);
        return Some(BootDecision::new(BootTarget::Charger));
    }
    None
}

/// Run `checks` in order and return the first decision, else a normal boot
pub fn resolve_boot_target(ctx: &PlatformContext<'_>, checks: &[BootCheck]) -> BootDecision {
    log::debug!("Bootlogic: Choosing boot target");
    let decision = checks
        .iter()
        .find_map(|check| {
            log::debug!("Bootlogic: Check {}...", check.name);
            (check.run)(ctx)
        })
        .unwrap_or_default();
    log::debug!("Bootlogic: selected '{}'", decision.target.description());
    decision
}

pub fn choose_boot_target(ctx: &PlatformContext<'_>) -> BootDecision {
    resolve_boot_target(ctx, BOOT_CHECKS)
}
