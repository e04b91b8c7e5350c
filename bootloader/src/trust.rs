//! Trust state for the current boot
//!
//! The level only ever degrades during a boot:
//! - GREEN: secure boot on, device locked, keystore verified
//! - YELLOW: the selected keystore does not verify against the OEM key
//! - ORANGE: device unlocked or secure boot disabled
//! - RED: insecure build, or the boot image failed verification
//!
//! YELLOW and ORANGE are acknowledged by the operator once per boot. Builds
//! without an unlock path halt instead of asking.

use core::fmt;
use verdict_api::TrustLevel;

use crate::context::PlatformContext;
use crate::keystore::{KeystoreHash, SelectedKeystore};

/// The build forbids continuing past a trust prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyHalt;

impl fmt::Display for PolicyHalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "boot halted by device policy")
    }
}

/// Outcome of the trust evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAssessment<'a> {
    pub level: TrustLevel,
    /// The operator already acknowledged a warning this boot
    pub prompted: bool,
    /// Keystore images are verified against; `None` skips verification
    pub keystore: Option<SelectedKeystore<'a>>,
    /// Hash of the examined keystore, shown when it does not verify
    pub hash: Option<KeystoreHash>,
    /// Provisioning devices go straight to the flashing tool
    pub force_fastboot: bool,
}

impl TrustAssessment<'_> {
    /// Lower the level after a later failure; RED always wins
    pub fn degrade(&mut self, level: TrustLevel) {
        self.level = self.level.degrade(level);
    }
}

/// Evaluate secure boot, the lock state and the keystore
pub fn establish_trust<'a>(ctx: &PlatformContext<'a>) -> Result<TrustAssessment<'a>, PolicyHalt> {
    let mut assessment = TrustAssessment {
        level: TrustLevel::Green,
        prompted: false,
        keystore: None,
        hash: None,
        force_fastboot: false,
    };

    if !ctx.config.variant.enforces_verified_boot() {
        log::error!("INSECURE BOOTLOADER - SYSTEM SECURITY IN RED STATE");
        ctx.system.pause(ctx.config.insecure_pause_secs);
        assessment.level = TrustLevel::Red;
        return Ok(assessment);
    }

    log::debug!("checking device state");
    let provisioning = ctx.signals.is_provisioning();

    if !ctx.signals.secure_boot_enabled() && !provisioning {
        log::debug!("uefi secure boot is disabled");
        assessment.level = TrustLevel::Orange;
        assessment.prompted = true;
        // warned before the flashing tool or EFI binaries can run
        ctx.ui.prompt_secure_boot_off();
        if ctx.config.no_device_unlock {
            return Err(PolicyHalt);
        }
        log::debug!("User accepted UEFI secure boot disabled warning");
    } else if ctx.device_is_unlocked() {
        assessment.level = TrustLevel::Orange;
        log::debug!("Device is unlocked");
    } else {
        log::debug!("examining keystore");
        let keystore = ctx.trust_store.select_keystore(ctx.vars);
        log::debug!("using {} keystore", keystore.origin());
        assessment.hash = Some(keystore.hash());
        if let Err(e) = ctx.trust_store.verify_keystore(&keystore) {
            log::debug!("keystore not validated: {}", e);
            assessment.level = TrustLevel::Yellow;
        }
        assessment.keystore = Some(keystore);
    }

    if provisioning {
        log::debug!("device is provisioning, force Fastboot mode");
        assessment.force_fastboot = true;
    }
    Ok(assessment)
}

/// Show the YELLOW and ORANGE warnings that were not shown yet
pub fn enforce_prompts(ctx: &PlatformContext<'_>, assessment: &TrustAssessment<'_>) -> Result<(), PolicyHalt> {
    match assessment.level {
        TrustLevel::Yellow => {
            let hash = assessment.hash.as_ref().map(|h| h.bytes.as_slice()).unwrap_or_default();
            ctx.ui.prompt_keystore_unverified(hash);
            if ctx.config.no_device_unlock {
                return Err(PolicyHalt);
            }
            log::debug!("User accepted unverified keystore warning");
        }
        TrustLevel::Orange if !assessment.prompted => {
            ctx.ui.prompt_device_unlocked();
            if ctx.config.no_device_unlock {
                return Err(PolicyHalt);
            }
            log::debug!("User accepted unlocked device warning");
        }
        _ => {}
    }
    Ok(())
}
