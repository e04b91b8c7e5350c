//! End-to-end boot flow tests

mod common;

use common::{Harness, ScriptedSession, signed_image, signed_image_with_oemvars, unsigned_image};
use verdict_api::{BootTarget, DeviceState, FlashRequest, TrustLevel, VarNamespace};
use verdict_bootloader::cmdline::CmdLine;
use verdict_bootloader::config::{BootConfig, BuildVariant, FlashModeKind};
use verdict_bootloader::{BootError, BootExit, BootImageFlashMode, BootOrchestrator, EmbeddedFlashMode, vars};

fn run(h: &Harness) -> BootExit {
    let ctx = h.ctx();
    let flash_mode = EmbeddedFlashMode::new(ScriptedSession::default());
    BootOrchestrator::new(&ctx, &flash_mode).run()
}

fn run_with_bootimage_tool(h: &Harness) -> BootExit {
    let ctx = h.ctx();
    BootOrchestrator::new(&ctx, &BootImageFlashMode).run()
}

#[cfg(test)]
mod normal_boot {
    use super::*;

    #[test]
    fn test_verified_boot_is_green() {
        let h = Harness::new();
        h.platform.put_partition("boot", signed_image("/boot"));

        assert_eq!(run(&h), BootExit::Failed(BootError::ImageReturned));
        let launch = h.platform.last_launch().unwrap();
        assert_eq!(launch.target, BootTarget::NormalBoot);
        assert_eq!(launch.level, TrustLevel::Green);
        assert!(launch.cmdline.contains("androidboot.verifiedbootstate=green"));
        assert!(launch.cmdline.contains("androidboot.serialno=SN0001"));
        assert!(launch.cmdline.ends_with("console=ttyS0 quiet"));
        assert!(!h.platform.saw("clear_memory"));

        assert_eq!(
            h.platform.var(VarNamespace::Fastboot, vars::BOOT_STATE_VAR),
            Some(vec![TrustLevel::Green.as_byte()])
        );
        let version = h.platform.var(VarNamespace::Loader, vars::LOADER_VERSION_VAR).unwrap();
        assert_eq!(vars::decode_str16(&version), h.config.loader_version);
    }

    #[test]
    fn test_multistage_recovery_signature_accepted() {
        let h = Harness::new();
        h.platform.put_partition("boot", signed_image("/recovery"));
        run(&h);
        assert_eq!(h.platform.last_launch().unwrap().level, TrustLevel::Green);
    }

    #[test]
    fn test_wrong_purpose_is_red() {
        let h = Harness::new();
        h.platform.put_partition("recovery", signed_image("/boot"));
        h.platform.put_bcb("boot-recovery");

        run(&h);
        assert!(h.platform.saw("warn_unverified_recovery"));
        assert!(h.platform.saw("clear_memory"));
        let launch = h.platform.last_launch().unwrap();
        assert_eq!(launch.target, BootTarget::Recovery);
        assert_eq!(launch.level, TrustLevel::Red);
    }

    #[test]
    fn test_unknown_signer_is_red() {
        let h = Harness::new();
        h.platform
            .put_partition("boot", common::image_signed_by("/boot", common::ROGUE_SEED));
        run(&h);
        assert!(h.platform.saw("prompt_bootimage_unverified"));
        assert_eq!(h.platform.last_launch().unwrap().level, TrustLevel::Red);
    }

    #[test]
    fn test_missing_image_halts() {
        let h = Harness::new();
        assert_eq!(run(&h), BootExit::Halted);
        assert!(h.platform.saw("prompt_bootimage_unverified"));
        assert!(h.platform.saw("pause:5"));
        assert!(h.platform.launches.borrow().is_empty());
        // the boot log survives the halt
        assert!(h.platform.var(VarNamespace::Loader, vars::LOG_VAR).is_some());
    }

    #[test]
    fn test_corrupt_header_size_halts() {
        let h = Harness::new();
        let mut raw = unsigned_image(&[]);
        raw[8..12].copy_from_slice(&0xFFFF_F000u32.to_le_bytes());
        raw[36..40].copy_from_slice(&0x8000_0000u32.to_le_bytes());
        raw.resize(64 * 1024, 0);
        h.platform.put_partition("boot", raw);

        assert_eq!(run(&h), BootExit::Halted);
        assert!(h.platform.saw("prompt_bootimage_unverified"));
        assert!(h.platform.saw("pause:5"));
        assert!(h.platform.launches.borrow().is_empty());
    }

    #[test]
    fn test_no_unlock_build_halts_on_bad_image() {
        let h = Harness::with_config(BootConfig::default().with_no_device_unlock(true));
        h.platform.put_partition("boot", unsigned_image(&[]));
        assert_eq!(run(&h), BootExit::Halted);
        assert!(h.platform.launches.borrow().is_empty());
    }

    #[test]
    fn test_unlocked_device_boots_orange() {
        let h = Harness::new();
        h.platform.set_device_state(DeviceState::Unlocked);
        h.platform.put_partition("boot", unsigned_image(&[]));

        run(&h);
        assert!(h.platform.saw("prompt_device_unlocked"));
        assert!(!h.platform.saw("prompt_bootimage_unverified"));
        assert_eq!(h.platform.last_launch().unwrap().level, TrustLevel::Orange);
    }

    #[test]
    fn test_insecure_build_boots_red_unverified() {
        let h = Harness::with_config(BootConfig::default().with_variant(BuildVariant::Eng));
        h.platform.put_partition("boot", unsigned_image(&[]));

        run(&h);
        let launch = h.platform.last_launch().unwrap();
        assert_eq!(launch.level, TrustLevel::Red);
        assert!(!h.platform.saw("prompt_bootimage_unverified"));
    }

    #[test]
    fn test_launcher_error_is_reported() {
        let h = Harness::new();
        h.platform.put_partition("boot", signed_image("/boot"));
        h.platform.launch_status.set(Some(verdict_api::Status::LoadError));
        assert_eq!(
            run(&h),
            BootExit::Failed(BootError::Platform(verdict_api::Status::LoadError))
        );
    }
}

#[cfg(test)]
mod early_exits {
    use super::*;

    #[test]
    fn test_shell_exit() {
        let mut h = Harness::new();
        h.args = CmdLine::parse("verdict.efi -U");
        let exit = run(&h);
        assert_eq!(exit, BootExit::ExitShell);
        assert_eq!(exit.status(), verdict_api::Status::Success);
        assert!(h.platform.launches.borrow().is_empty());
    }

    #[test]
    fn test_power_off() {
        let h = Harness::new();
        h.platform.battery_low.set(true);
        assert_eq!(run(&h), BootExit::PoweredOff);
        assert!(h.platform.saw("display_low_battery"));
        assert!(h.platform.saw("halt"));
    }

    #[test]
    fn test_charger_boot() {
        let h = Harness::new();
        h.platform.battery_low.set(true);
        h.platform.charger.set(true);
        h.platform.put_partition("boot", signed_image("/boot"));

        run(&h);
        assert!(h.platform.saw("display_empty_battery"));
        let launch = h.platform.last_launch().unwrap();
        assert_eq!(launch.target, BootTarget::Charger);
        assert!(launch.cmdline.contains("androidboot.mode=charger"));
    }

    #[test]
    fn test_capsule_update_resets_before_selection() {
        let h = Harness::new();
        h.platform.put_file("\\BIOSUPDATE.fv", vec![0xca; 64]);
        h.platform.put_bcb("bootonce-recovery");

        assert_eq!(run(&h), BootExit::Rebooted);
        assert!(!h.platform.has_file("\\BIOSUPDATE.fv"));
        assert!(h.platform.saw("update_capsule:64"));
        assert!(h.platform.saw("reset:Warm"));
        // selection never ran
        assert_eq!(h.platform.bcb().command(), "bootonce-recovery");
    }

    #[test]
    fn test_empty_capsule_resets_cold() {
        let h = Harness::new();
        h.platform.put_file("\\BIOSUPDATE.fv", vec![]);
        assert_eq!(run(&h), BootExit::Rebooted);
        assert!(h.platform.saw("reset:Cold"));
    }

    #[test]
    fn test_efi_binary_from_bcb() {
        let h = Harness::new();
        h.platform.put_file("\\tools\\shell.efi", vec![0x4d, 0x5a, 0, 0]);
        h.platform.put_bcb("bootonce-\\tools\\shell.efi");

        assert_eq!(run(&h), BootExit::Rebooted);
        assert!(h.platform.saw("start_efi_image:4"));
        assert!(!h.platform.has_file("\\tools\\shell.efi"));
        assert!(h.platform.saw("reboot"));
    }

    #[test]
    fn test_esp_bootimage_from_bcb() {
        let h = Harness::new();
        h.platform.put_file("\\live.img", signed_image("/boot"));
        h.platform.put_bcb("boot-\\live.img");

        run(&h);
        let launch = h.platform.last_launch().unwrap();
        assert_eq!(launch.target, BootTarget::EspBootimage);
        assert_eq!(launch.level, TrustLevel::Green);
        // persistent directive keeps the file
        assert!(h.platform.has_file("\\live.img"));
    }
}

#[cfg(test)]
mod alternate_targets {
    use super::*;

    #[test]
    fn test_sentinel_enters_embedded_tool() {
        let h = Harness::new();
        h.platform.put_file("\\force_fastboot", vec![]);
        let session = ScriptedSession::new([FlashRequest::Reboot(BootTarget::NormalBoot)]);
        let flash_mode = EmbeddedFlashMode::new(session);

        let ctx = h.ctx();
        assert_eq!(BootOrchestrator::new(&ctx, &flash_mode).run(), BootExit::Rebooted);
        assert!(h.platform.saw("reboot:boot"));
        assert_eq!(
            h.platform.var(VarNamespace::Fastboot, vars::BOOT_STATE_VAR),
            Some(vec![TrustLevel::Green.as_byte()])
        );
        assert_eq!(flash_mode.into_session().okays(), 1);
    }

    #[test]
    fn test_provisioning_forces_tool() {
        let h = Harness::new();
        h.platform.provisioning.set(true);
        h.platform.put_partition("boot", signed_image("/boot"));
        assert_eq!(run(&h), BootExit::Halted);
        assert!(h.platform.saw("pause:30"));
        assert!(h.platform.launches.borrow().is_empty());
    }

    #[test]
    fn test_bootimage_tool_from_file() {
        let h = Harness::with_config(BootConfig::default().with_flash_mode(FlashModeKind::BootImage));
        h.platform.put_file("\\force_fastboot", vec![]);
        h.platform.put_file("\\fastboot.img", signed_image("/fastboot"));

        run_with_bootimage_tool(&h);
        let launch = h.platform.last_launch().unwrap();
        assert_eq!(launch.target, BootTarget::Fastboot);
        assert_eq!(
            h.platform.var(VarNamespace::Fastboot, vars::OEM_KEY_VAR).as_deref(),
            Some(h.trust_store.oem_key_bytes().as_slice())
        );
        assert_eq!(
            h.platform
                .var_attrs(VarNamespace::Fastboot, vars::OEM_KEY_VAR)
                .map(|a| a.contains(verdict_api::VarAttributes::NON_VOLATILE)),
            Some(false)
        );
    }

    #[test]
    fn test_bootimage_tool_from_memory() {
        let mut h = Harness::with_config(BootConfig::default().with_flash_mode(FlashModeKind::BootImage));
        h.args = CmdLine::parse("verdict.efi -a 0x8000000");
        h.platform
            .memory
            .borrow_mut()
            .insert(0x800_0000, signed_image("/fastboot"));

        run_with_bootimage_tool(&h);
        assert_eq!(h.platform.last_launch().unwrap().target, BootTarget::Fastboot);
    }

    #[test]
    fn test_bootimage_tool_rejects_wrong_purpose() {
        let h = Harness::with_config(BootConfig::default().with_flash_mode(FlashModeKind::BootImage));
        h.platform.put_file("\\force_fastboot", vec![]);
        h.platform.put_file("\\fastboot.img", signed_image("/boot"));

        assert_eq!(run_with_bootimage_tool(&h), BootExit::Halted);
        assert!(h.platform.saw("pause:30"));
        assert!(h.platform.launches.borrow().is_empty());
    }

    #[test]
    fn test_tdos_target() {
        let h = Harness::new();
        h.platform.put_file("\\tdos.img", signed_image("/tdos"));
        h.platform.put_str16(VarNamespace::Loader, vars::LOADER_ENTRY_ONESHOT, "tdos");

        run(&h);
        assert_eq!(h.platform.last_launch().unwrap().target, BootTarget::Tdos);
    }

    #[test]
    fn test_tdos_must_be_signed_for_tdos() {
        let h = Harness::new();
        h.platform.put_file("\\tdos.img", signed_image("/boot"));
        h.platform.put_str16(VarNamespace::Loader, vars::LOADER_ENTRY_ONESHOT, "tdos");

        assert_eq!(run(&h), BootExit::Halted);
        assert!(h.platform.saw("pause:30"));
    }
}

#[cfg(test)]
mod oem_variables {
    use super::*;

    const BLOB: &[u8] = b"#OEMVARS\n# factory defaults\noem-color blue\n";

    #[test]
    fn test_recovery_applies_and_rearms() {
        let h = Harness::new();
        vars::set_oemvars_update(&h.platform, false).unwrap();
        h.platform
            .put_partition("recovery", signed_image_with_oemvars("/recovery", BLOB));
        h.platform.put_bcb("boot-recovery");

        run(&h);
        assert_eq!(
            h.platform.var(VarNamespace::Fastboot, "oem-color"),
            Some(b"blue".to_vec())
        );
        assert!(vars::get_oemvars_update(&h.platform));
    }

    #[test]
    fn test_normal_boot_applies_only_when_stale() {
        let h = Harness::new();
        h.platform
            .put_partition("boot", signed_image_with_oemvars("/boot", BLOB));

        vars::set_oemvars_update(&h.platform, false).unwrap();
        run(&h);
        assert_eq!(h.platform.var(VarNamespace::Fastboot, "oem-color"), None);

        vars::set_oemvars_update(&h.platform, true).unwrap();
        run(&h);
        assert_eq!(
            h.platform.var(VarNamespace::Fastboot, "oem-color"),
            Some(b"blue".to_vec())
        );
        assert!(!vars::get_oemvars_update(&h.platform));
    }
}
