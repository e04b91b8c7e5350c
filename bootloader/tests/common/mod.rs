//! Common test utilities
//!
//! An in-memory platform implementing every collaborator trait, plus key
//! material and image builders shared by the integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use ed25519_dalek::SigningKey;
use verdict_api::{
    BootTarget, BootUi, DeviceState, EfiTime, EspFileSystem, FlashRequest, FlashingSession,
    ImageLauncher, KeyInput, PartitionStore, PhysicalMemory, PlatformSignals, ResetSource, ResetType, Status,
    SystemControl, TrustLevel, UiEvent, VarAttributes, VarNamespace, VarStore, WakeSource,
};
use verdict_bootloader::bcb::BootloaderMessage;
use verdict_bootloader::cmdline::CmdLine;
use verdict_bootloader::keystore::TrustStore;
use verdict_bootloader::signing::{build_boot_image, build_keystore, sign_boot_image, signing_key};
use verdict_bootloader::vars;
use verdict_bootloader::{BootConfig, PlatformContext};

pub const OEM_SEED: u8 = 1;
pub const SIGNER_SEED: u8 = 2;
pub const USER_SEED: u8 = 3;
pub const ROGUE_SEED: u8 = 9;

/// One call to the image launcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub target: BootTarget,
    pub level: TrustLevel,
    pub cmdline: String,
    pub len: usize,
}

/// In-memory platform
///
/// Every observable side effect is appended to `events` in call order.
pub struct FakePlatform {
    pub vars: RefCell<HashMap<(VarNamespace, String), (Vec<u8>, VarAttributes)>>,
    pub partitions: RefCell<HashMap<String, Vec<u8>>>,
    pub files: RefCell<HashMap<String, Vec<u8>>>,
    pub memory: RefCell<HashMap<u64, Vec<u8>>>,
    pub keys: RefCell<VecDeque<UiEvent>>,
    pub key_held: Cell<bool>,
    pub reset_source: Cell<ResetSource>,
    pub wake_source: Cell<WakeSource>,
    pub now: Cell<EfiTime>,
    pub battery_low: Cell<bool>,
    pub charger: Cell<bool>,
    pub secure_boot: Cell<bool>,
    pub provisioning: Cell<bool>,
    pub crash_choice: Cell<BootTarget>,
    pub confirm_state: Cell<bool>,
    pub capsule_reset: Cell<ResetType>,
    pub launch_status: Cell<Option<Status>>,
    pub stalled_ms: Cell<u64>,
    pub events: RefCell<Vec<String>>,
    pub launches: RefCell<Vec<Launch>>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            vars: RefCell::default(),
            partitions: RefCell::default(),
            files: RefCell::default(),
            memory: RefCell::default(),
            keys: RefCell::default(),
            key_held: Cell::new(false),
            reset_source: Cell::new(ResetSource::NotApplicable),
            wake_source: Cell::new(WakeSource::NotApplicable),
            now: Cell::new(EfiTime::new(2024, 6, 1, 12, 0, 0)),
            battery_low: Cell::new(false),
            charger: Cell::new(false),
            secure_boot: Cell::new(true),
            provisioning: Cell::new(false),
            crash_choice: Cell::new(BootTarget::Recovery),
            confirm_state: Cell::new(true),
            capsule_reset: Cell::new(ResetType::Warm),
            launch_status: Cell::new(None),
            stalled_ms: Cell::new(0),
            events: RefCell::default(),
            launches: RefCell::default(),
        }
    }
}

impl FakePlatform {
    pub fn record(&self, event: impl Into<String>) {
        self.events.borrow_mut().push(event.into());
    }

    pub fn saw(&self, event: &str) -> bool {
        self.events.borrow().iter().any(|e| e == event)
    }

    pub fn var(&self, ns: VarNamespace, name: &str) -> Option<Vec<u8>> {
        self.vars.borrow().get(&(ns, name.to_string())).map(|(d, _)| d.clone())
    }

    pub fn var_attrs(&self, ns: VarNamespace, name: &str) -> Option<VarAttributes> {
        self.vars.borrow().get(&(ns, name.to_string())).map(|(_, a)| *a)
    }

    pub fn put_var(&self, ns: VarNamespace, name: &str, data: &[u8]) {
        self.vars
            .borrow_mut()
            .insert((ns, name.to_string()), (data.to_vec(), VarAttributes::for_var(true, true)));
    }

    pub fn put_str16(&self, ns: VarNamespace, name: &str, value: &str) {
        self.put_var(ns, name, &vars::encode_str16(value));
    }

    pub fn put_partition(&self, label: &str, data: Vec<u8>) {
        self.partitions.borrow_mut().insert(label.to_string(), data);
    }

    pub fn put_file(&self, path: &str, data: Vec<u8>) {
        self.files.borrow_mut().insert(path.to_string(), data);
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.files.borrow().contains_key(path)
    }

    pub fn put_bcb(&self, command: &str) {
        self.put_partition("misc", BootloaderMessage::with_command(command).to_bytes());
    }

    pub fn bcb(&self) -> BootloaderMessage {
        let data = self.partitions.borrow().get("misc").cloned().unwrap_or_default();
        BootloaderMessage::from_bytes(&data).unwrap()
    }

    pub fn press(&self, event: UiEvent) {
        self.keys.borrow_mut().push_back(event);
    }

    pub fn set_device_state(&self, state: DeviceState) {
        vars::set_device_state(self, state).unwrap();
    }

    pub fn last_launch(&self) -> Option<Launch> {
        self.launches.borrow().last().cloned()
    }
}

impl VarStore for FakePlatform {
    fn get(&self, ns: VarNamespace, name: &str) -> verdict_api::Result<Vec<u8>> {
        self.var(ns, name).ok_or(Status::NotFound)
    }

    fn set(&self, ns: VarNamespace, name: &str, data: &[u8], attrs: VarAttributes) -> verdict_api::Result<()> {
        self.vars
            .borrow_mut()
            .insert((ns, name.to_string()), (data.to_vec(), attrs));
        Ok(())
    }

    fn delete(&self, ns: VarNamespace, name: &str) -> verdict_api::Result<()> {
        self.vars
            .borrow_mut()
            .remove(&(ns, name.to_string()))
            .map(|_| ())
            .ok_or(Status::NotFound)
    }
}

impl PartitionStore for FakePlatform {
    fn partition_size(&self, label: &str) -> verdict_api::Result<u64> {
        self.partitions
            .borrow()
            .get(label)
            .map(|p| p.len() as u64)
            .ok_or(Status::NotFound)
    }

    fn read_partition(&self, label: &str, offset: u64, len: usize) -> verdict_api::Result<Vec<u8>> {
        let parts = self.partitions.borrow();
        let part = parts.get(label).ok_or(Status::NotFound)?;
        let start = usize::try_from(offset).map_err(|_| Status::InvalidParameter)?;
        if start > part.len() {
            return Err(Status::InvalidParameter);
        }
        let end = start.saturating_add(len).min(part.len());
        Ok(part[start..end].to_vec())
    }

    fn write_partition(&self, label: &str, offset: u64, data: &[u8]) -> verdict_api::Result<()> {
        let mut parts = self.partitions.borrow_mut();
        let part = parts.entry(label.to_string()).or_default();
        let start = offset as usize;
        if part.len() < start + data.len() {
            part.resize(start + data.len(), 0);
        }
        part[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl EspFileSystem for FakePlatform {
    fn exists(&self, path: &str) -> bool {
        self.has_file(path)
    }

    fn read(&self, path: &str) -> verdict_api::Result<Vec<u8>> {
        self.files.borrow().get(path).cloned().ok_or(Status::NotFound)
    }

    fn delete(&self, path: &str) -> verdict_api::Result<()> {
        self.record(format!("delete:{}", path));
        self.files.borrow_mut().remove(path).map(|_| ()).ok_or(Status::NotFound)
    }
}

impl KeyInput for FakePlatform {
    fn reset(&self) {}

    fn read_key(&self) -> Option<UiEvent> {
        self.keys.borrow_mut().pop_front()
    }

    fn enforce_key_held(&self, _hold_ms: u64, _event: UiEvent) -> bool {
        self.key_held.get()
    }
}

impl BootUi for FakePlatform {
    fn crash_event_prompt(&self) -> BootTarget {
        self.record("crash_event_prompt");
        self.crash_choice.get()
    }

    fn prompt_secure_boot_off(&self) {
        self.record("prompt_secure_boot_off");
    }

    fn prompt_keystore_unverified(&self, _hash: &[u8]) {
        self.record("prompt_keystore_unverified");
    }

    fn prompt_device_unlocked(&self) {
        self.record("prompt_device_unlocked");
    }

    fn prompt_bootimage_unverified(&self) {
        self.record("prompt_bootimage_unverified");
    }

    fn warn_unverified_recovery(&self) {
        self.record("warn_unverified_recovery");
    }

    fn display_low_battery(&self, _seconds: u32) {
        self.record("display_low_battery");
    }

    fn display_empty_battery(&self) {
        self.record("display_empty_battery");
    }

    fn confirm_device_state(&self, _state: DeviceState) -> bool {
        self.record("confirm_device_state");
        self.confirm_state.get()
    }
}

impl PlatformSignals for FakePlatform {
    fn reset_source(&self) -> ResetSource {
        self.reset_source.get()
    }

    fn wake_source(&self) -> WakeSource {
        self.wake_source.get()
    }

    fn now(&self) -> verdict_api::Result<EfiTime> {
        Ok(self.now.get())
    }

    fn battery_below_boot_threshold(&self) -> bool {
        self.battery_low.get()
    }

    fn charger_plugged_in(&self) -> bool {
        self.charger.get()
    }

    fn secure_boot_enabled(&self) -> bool {
        self.secure_boot.get()
    }

    fn is_provisioning(&self) -> bool {
        self.provisioning.get()
    }

    fn serial_number(&self) -> Option<String> {
        Some("SN0001".to_string())
    }
}

impl SystemControl for FakePlatform {
    fn stall_ms(&self, ms: u64) {
        self.stalled_ms.set(self.stalled_ms.get() + ms);
    }

    fn pause(&self, seconds: u32) {
        self.record(format!("pause:{}", seconds));
    }

    fn halt(&self) {
        self.record("halt");
    }

    fn reboot(&self, target: Option<BootTarget>) {
        match target {
            Some(t) => self.record(format!("reboot:{}", t.name().unwrap_or("?"))),
            None => self.record("reboot"),
        }
    }

    fn reset(&self, kind: ResetType) {
        self.record(format!("reset:{:?}", kind));
    }

    fn clear_memory(&self) -> verdict_api::Result<()> {
        self.record("clear_memory");
        Ok(())
    }

    fn update_capsule(&self, capsule: &[u8]) -> verdict_api::Result<ResetType> {
        self.record(format!("update_capsule:{}", capsule.len()));
        Ok(self.capsule_reset.get())
    }
}

impl PhysicalMemory for FakePlatform {
    fn read(&self, address: u64, len: usize) -> verdict_api::Result<Vec<u8>> {
        let mem = self.memory.borrow();
        let data = mem.get(&address).ok_or(Status::InvalidParameter)?;
        let mut out = data.clone();
        out.resize(len, 0);
        Ok(out)
    }
}

impl ImageLauncher for FakePlatform {
    fn start_boot_image(
        &self,
        image: &[u8],
        cmdline: &str,
        target: BootTarget,
        level: TrustLevel,
    ) -> verdict_api::Result<()> {
        self.record("start_boot_image");
        self.launches.borrow_mut().push(Launch {
            target,
            level,
            cmdline: cmdline.to_string(),
            len: image.len(),
        });
        match self.launch_status.get() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    fn start_efi_image(&self, image: &[u8]) -> verdict_api::Result<()> {
        self.record(format!("start_efi_image:{}", image.len()));
        Ok(())
    }
}

/// Flashing session replaying a fixed list of host requests
///
/// Runs out with `Status::Aborted`, as when the host goes away.
#[derive(Debug, Default)]
pub struct ScriptedSession {
    pub requests: VecDeque<FlashRequest>,
    pub replies: Vec<String>,
}

impl ScriptedSession {
    pub fn new(requests: impl IntoIterator<Item = FlashRequest>) -> Self {
        Self {
            requests: requests.into_iter().collect(),
            replies: Vec::new(),
        }
    }

    pub fn okays(&self) -> usize {
        self.replies.iter().filter(|r| r.starts_with("OKAY")).count()
    }

    pub fn fails(&self) -> usize {
        self.replies.iter().filter(|r| r.starts_with("FAIL")).count()
    }
}

impl FlashingSession for ScriptedSession {
    fn next_request(&mut self) -> verdict_api::Result<FlashRequest> {
        self.requests.pop_front().ok_or(Status::Aborted)
    }

    fn okay(&mut self, info: &str) {
        self.replies.push(format!("OKAY{}", info));
    }

    fn info(&mut self, message: &str) {
        self.replies.push(format!("INFO{}", message));
    }

    fn fail(&mut self, reason: &str) {
        self.replies.push(format!("FAIL{}", reason));
    }
}

pub fn oem_key() -> SigningKey {
    signing_key(OEM_SEED)
}

/// Trust store whose OEM keystore lists the image signer
pub fn trust_store() -> TrustStore {
    let oem = oem_key();
    let blob = build_keystore(&oem, &[signing_key(SIGNER_SEED).verifying_key()]);
    TrustStore::new(&blob, oem.verifying_key().as_bytes()).unwrap()
}

/// User keystore signed by the OEM key, listing the user key
pub fn verified_user_keystore() -> Vec<u8> {
    build_keystore(&oem_key(), &[signing_key(USER_SEED).verifying_key()])
}

/// User keystore the OEM never signed
pub fn rogue_user_keystore() -> Vec<u8> {
    build_keystore(&signing_key(ROGUE_SEED), &[signing_key(USER_SEED).verifying_key()])
}

pub fn unsigned_image(second: &[u8]) -> Vec<u8> {
    build_boot_image(&[0x4b; 6000], &[0x52; 1500], second, 2048, "console=ttyS0 quiet")
}

pub fn image_signed_by(target: &str, seed: u8) -> Vec<u8> {
    sign_boot_image(&unsigned_image(&[]), target, &signing_key(seed)).unwrap()
}

/// Image signed by the OEM keystore's signer
pub fn signed_image(target: &str) -> Vec<u8> {
    image_signed_by(target, SIGNER_SEED)
}

pub fn signed_image_with_oemvars(target: &str, oemvars: &[u8]) -> Vec<u8> {
    sign_boot_image(&unsigned_image(oemvars), target, &signing_key(SIGNER_SEED)).unwrap()
}

/// Platform, trust anchor, configuration and arguments for one boot
pub struct Harness {
    pub platform: FakePlatform,
    pub trust_store: TrustStore,
    pub config: BootConfig,
    pub args: CmdLine,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            platform: FakePlatform::default(),
            trust_store: trust_store(),
            config: BootConfig::default(),
            args: CmdLine::default(),
        }
    }

    pub fn with_config(config: BootConfig) -> Self {
        Self {
            config,
            ..Self::new()
        }
    }

    pub fn ctx(&self) -> PlatformContext<'_> {
        PlatformContext {
            vars: &self.platform,
            partitions: &self.platform,
            esp: &self.platform,
            ui: &self.platform,
            keys: &self.platform,
            signals: &self.platform,
            system: &self.platform,
            memory: &self.platform,
            launcher: &self.platform,
            trust_store: &self.trust_store,
            config: &self.config,
            args: &self.args,
        }
    }
}
