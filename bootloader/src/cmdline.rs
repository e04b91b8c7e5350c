// Command-line handling for the bootloader
//
// Features:
// - Whitespace-separated launch arguments
// - Kernel command line assembly with androidboot.* parameters

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use verdict_api::{BootTarget, TrustLevel, VarNamespace};

use crate::bootimage::BootImageHeader;
use crate::context::PlatformContext;
use crate::vars;

/// Console used when `SerialPort` is absent or unusable
pub const DEFAULT_CONSOLE: &str = "tty0";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdLine {
    args: Vec<String>,
}

impl CmdLine {
    /// Split on ASCII whitespace
    pub fn parse(cmdline: &str) -> Self {
        Self {
            args: cmdline.split_ascii_whitespace().map(String::from).collect(),
        }
    }

    /// Get argument at index
    pub fn get(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(|s| s.as_str())
    }
}

/// `LoaderEntryRebootReason` values may only use `[0-9a-z_]`
fn sanitize_reboot_reason(reason: &str) -> &str {
    let valid = !reason.is_empty()
        && reason
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase() || b == b'_');
    if valid { reason } else { "unknown" }
}

fn valid_console(port: &str) -> bool {
    !port.is_empty() && port.bytes().all(|b| b.is_ascii_alphanumeric() || b == b',')
}

/// Boot reason: wake source, then reset source, then the reason variable
///
/// The reason variable is consumed whenever it is consulted.
pub fn boot_reason(ctx: &PlatformContext<'_>) -> Option<String> {
    if let Some(reason) = ctx.signals.wake_source().boot_reason() {
        return Some(String::from(reason));
    }
    if let Some(reason) = ctx.signals.reset_source().boot_reason() {
        return Some(String::from(reason));
    }

    let stored = vars::get_str16(ctx.vars, VarNamespace::Loader, vars::LOADER_ENTRY_REBOOT_REASON);
    if let Err(e) = vars::delete(ctx.vars, VarNamespace::Loader, vars::LOADER_ENTRY_REBOOT_REASON) {
        log::error!("Failed to delete {}: {}", vars::LOADER_ENTRY_REBOOT_REASON, e);
    }
    match stored {
        Ok(Some(reason)) => Some(String::from(sanitize_reboot_reason(&reason))),
        Ok(None) => None,
        Err(e) => {
            log::error!("Failed to read {}: {}", vars::LOADER_ENTRY_REBOOT_REASON, e);
            None
        }
    }
}

/// Serial console from `SerialPort`, which tools write as 8-bit or UTF-16
pub fn serial_console(ctx: &PlatformContext<'_>) -> String {
    match vars::get_optional(ctx.vars, VarNamespace::Loader, vars::SERIAL_PORT_VAR) {
        Ok(Some(data)) => {
            let port = vars::decode_str_any(&data);
            if valid_console(&port) {
                port
            } else {
                log::error!("Invalid serial port '{}', using {}", port, DEFAULT_CONSOLE);
                String::from(DEFAULT_CONSOLE)
            }
        }
        Ok(None) => String::from(DEFAULT_CONSOLE),
        Err(e) => {
            log::error!("Failed to read {}: {}", vars::SERIAL_PORT_VAR, e);
            String::from(DEFAULT_CONSOLE)
        }
    }
}

fn read_override(ctx: &PlatformContext<'_>, name: &str) -> Option<String> {
    match vars::get_str8(ctx.vars, VarNamespace::Loader, name) {
        Ok(value) => value.filter(|v| !v.is_empty()),
        Err(e) => {
            log::error!("Failed to read {}: {}", name, e);
            None
        }
    }
}

/// Apply the replace/prepend/append override variables
///
/// Only honoured on non-User builds booting the OS normally.
fn apply_overrides(ctx: &PlatformContext<'_>, target: BootTarget, base: String) -> String {
    if ctx.config.variant.is_user() || target != BootTarget::NormalBoot {
        return base;
    }

    let replace = read_override(ctx, vars::CMDLINE_REPLACE_VAR);
    let prepend = read_override(ctx, vars::CMDLINE_PREPEND_VAR);
    let append = read_override(ctx, vars::CMDLINE_APPEND_VAR);
    if replace.is_none() && prepend.is_none() && append.is_none() {
        return base;
    }

    log::warn!("Kernel command line overridden by variables");
    let mut cmdline = replace.unwrap_or(base);
    if let Some(prepend) = prepend {
        cmdline = format!("{} {}", prepend, cmdline);
    }
    if let Some(append) = append {
        cmdline = format!("{} {}", cmdline, append);
    }
    ctx.system.pause(ctx.config.cmdline_override_pause_secs);
    cmdline
}

/// Kernel command line for `header` booted as `target` at `level`
pub fn build_kernel_cmdline(
    ctx: &PlatformContext<'_>,
    header: &BootImageHeader,
    target: BootTarget,
    level: TrustLevel,
) -> String {
    let base = apply_overrides(ctx, target, header.command_line());

    let mut params: Vec<String> = Vec::new();
    if let Some(serial) = ctx.signals.serial_number() {
        params.push(format!("androidboot.serialno={}", serial));
    }
    if target == BootTarget::Charger {
        params.push(String::from("androidboot.mode=charger"));
    }
    if let Some(reason) = boot_reason(ctx) {
        params.push(format!("androidboot.bootreason={}", reason));
    }
    params.push(format!("androidboot.verifiedbootstate={}", level));
    params.push(format!("console={}", serial_console(ctx)));
    params.push(format!("androidboot.bootloader={}", ctx.config.loader_version));

    let mut cmdline = params.join(" ");
    let base = base.trim();
    if !base.is_empty() {
        cmdline.push(' ');
        cmdline.push_str(base);
    }
    log::debug!("kernel command line: {}", cmdline);
    cmdline
}
