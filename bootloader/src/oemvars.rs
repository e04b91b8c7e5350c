//! OEM variables carried in the boot image second stage
//!
//! Blob layout (text):
//! - first line `#OEMVARS`
//! - `#` comment lines and blank lines are ignored
//! - `GUID = <uuid>` switches the namespace for the following lines
//! - `<name> <value>` or `<name> = <value>` sets a variable; `%XX` escapes a raw byte in the value
//!
//! Variables are stored non-volatile with runtime access, in the fastboot
//! namespace unless a `GUID` line says otherwise.

use alloc::string::String;
use alloc::vec::Vec;
use verdict_api::{BootTarget, VarAttributes, VarNamespace, VarStore};

use crate::bootimage::BootImage;
use crate::context::PlatformContext;
use crate::error::{BootError, Result};
use crate::vars;

pub const OEMVARS_MAGIC: &[u8] = b"#OEMVARS\n";

/// One parsed assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OemVar {
    pub namespace: VarNamespace,
    pub name: String,
    pub value: Vec<u8>,
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn unescape(value: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(value.len());
    let mut i = 0;
    while i < value.len() {
        if value[i] == b'%' {
            let hi = value.get(i + 1).copied().and_then(hex_digit);
            let lo = value.get(i + 2).copied().and_then(hex_digit);
            match (hi, lo) {
                (Some(hi), Some(lo)) => out.push((hi << 4) | lo),
                _ => return Err(BootError::InvalidArgument("bad escape in OEM variable value")),
            }
            i += 3;
        } else {
            out.push(value[i]);
            i += 1;
        }
    }
    Ok(out)
}

fn trim(line: &[u8]) -> &[u8] {
    let start = line.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(line.len());
    let end = line.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |p| p + 1);
    &line[start..end]
}

/// Parse an OEM variable blob, magic line included
pub fn parse(blob: &[u8]) -> Result<Vec<OemVar>> {
    let body = blob
        .strip_prefix(OEMVARS_MAGIC)
        .ok_or(BootError::InvalidImage("missing OEM vars magic"))?;
    // padding after the text
    let body = &body[..body.iter().position(|b| *b == 0).unwrap_or(body.len())];

    let mut namespace = VarNamespace::Fastboot;
    let mut out = Vec::new();
    for (lineno, raw) in body.split(|b| *b == b'\n').enumerate() {
        let line = trim(raw);
        if line.is_empty() || line[0] == b'#' {
            continue;
        }

        let split = line.iter().position(|b| b.is_ascii_whitespace() || *b == b'=');
        let (key, rest) = match split {
            Some(pos) => {
                let rest = trim(&line[pos..]);
                (&line[..pos], trim(rest.strip_prefix(b"=").unwrap_or(rest)))
            }
            None => (line, &line[line.len()..]),
        };
        let key = core::str::from_utf8(key)
            .map_err(|_| BootError::InvalidArgument("OEM variable name is not UTF-8"))?;

        if key == "GUID" {
            let guid = core::str::from_utf8(rest).unwrap_or_default();
            namespace = VarNamespace::from_guid(guid).ok_or_else(|| {
                log::error!("line {}: unknown namespace GUID '{}'", lineno + 2, guid);
                BootError::InvalidArgument("unknown OEM vars namespace")
            })?;
            continue;
        }

        if rest.is_empty() {
            log::error!("line {}: OEM variable '{}' has no value", lineno + 2, key);
            return Err(BootError::InvalidArgument("OEM variable without value"));
        }
        out.push(OemVar {
            namespace,
            name: String::from(key),
            value: unescape(rest)?,
        });
    }
    Ok(out)
}

/// Write every assignment of `blob` to the variable store
pub fn apply(vars: &dyn VarStore, blob: &[u8]) -> Result<usize> {
    let parsed = parse(blob)?;
    let attrs = VarAttributes::for_var(true, true);
    for var in &parsed {
        vars.set(var.namespace, &var.name, &var.value, attrs)
            .map_err(BootError::VariableAccess)?;
        log::debug!("set OEM variable {}:{}", var.namespace, var.name);
    }
    Ok(parsed.len())
}

/// Apply the OEM variables of `image` without checking the refresh flag
///
/// Images without a second stage, or whose second stage is not an OEM
/// variable blob, are silently skipped.
pub fn apply_nocheck(vars: &dyn VarStore, image: &BootImage) -> Result<()> {
    let Some(second) = image.second_stage() else {
        return Ok(());
    };
    if second.len() <= OEMVARS_MAGIC.len() || !second.starts_with(OEMVARS_MAGIC) {
        return Ok(());
    }
    let count = apply(vars, second)?;
    log::info!("applied {} OEM variables", count);
    Ok(())
}

/// Apply OEM variables for the image about to boot
///
/// Recovery and ESP boot images always refresh the variables and re-arm the
/// refresh flag. The normal OS image applies them only when the flag is set,
/// clearing it first so a bad blob is not retried forever.
pub fn refresh_for_target(ctx: &PlatformContext<'_>, target: BootTarget, image: &BootImage) {
    match target {
        BootTarget::Recovery | BootTarget::EspBootimage => {
            if let Err(e) = apply_nocheck(ctx.vars, image) {
                log::error!("Failed to apply OEM variables: {}", e);
            }
            if let Err(e) = vars::set_oemvars_update(ctx.vars, true) {
                log::error!("Failed to set {}: {}", vars::OEMVARS_UPDATE_VAR, e);
            }
        }
        BootTarget::NormalBoot | BootTarget::Charger => {
            if !vars::get_oemvars_update(ctx.vars) {
                return;
            }
            if let Err(e) = vars::set_oemvars_update(ctx.vars, false) {
                log::error!("Failed to clear {}: {}", vars::OEMVARS_UPDATE_VAR, e);
                return;
            }
            if let Err(e) = apply_nocheck(ctx.vars, image) {
                log::error!("Failed to apply OEM variables: {}", e);
            }
        }
        _ => {}
    }
}
