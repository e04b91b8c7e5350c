//! Boot image signature verification
//!
//! The signature trailer sits right after the declared image:
//!
//! | offset | size | field                              |
//! |--------|------|------------------------------------|
//! | 0      | 4    | magic `VBSG`                       |
//! | 4      | 1    | format version (1)                 |
//! | 5      | 1    | target name length (1..=32)        |
//! | 6      | 2    | reserved                           |
//! | 8      | 8    | signed image length                |
//! | 16     | n    | target name, e.g. `/boot`          |
//! | 16+n   | 64   | ed25519 signature                  |
//!
//! The signed message is `SHA-256(image[..len]) || target || len`, so the
//! purpose name is bound to the image bytes.

use alloc::string::String;
use alloc::vec::Vec;
use sha2::{Digest, Sha256};
use static_assertions::const_assert;
use verdict_api::BootTarget;
use ed25519_dalek::Signature;

use crate::bootimage::BootImage;
use crate::config::BootConfig;
use crate::error::{BootError, Result, VerificationError};
use crate::keystore::{Keystore, SIGNATURE_SIZE};

pub const TRAILER_MAGIC: [u8; 4] = *b"VBSG";
pub const TRAILER_VERSION: u8 = 1;
pub const TRAILER_HEADER_SIZE: usize = 16;
/// Longest target name a signer may embed
pub const BOOT_TARGET_SIZE: usize = 32;
/// Room reserved after every loaded image for the trailer
pub const BOOT_SIGNATURE_MAX_SIZE: usize = 4096;

const_assert!(TRAILER_HEADER_SIZE + BOOT_TARGET_SIZE + SIGNATURE_SIZE <= BOOT_SIGNATURE_MAX_SIZE);

/// Decoded signature trailer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureTrailer {
    pub target: String,
    pub image_length: u64,
    pub signature: [u8; SIGNATURE_SIZE],
}

impl SignatureTrailer {
    pub fn parse(bytes: &[u8]) -> core::result::Result<Self, VerificationError> {
        if bytes.len() < TRAILER_HEADER_SIZE || bytes[0..4] != TRAILER_MAGIC {
            return Err(VerificationError::MissingTrailer);
        }
        if bytes[4] != TRAILER_VERSION {
            return Err(VerificationError::UnsupportedVersion(bytes[4]));
        }
        let target_len = bytes[5] as usize;
        if target_len == 0 || target_len > BOOT_TARGET_SIZE {
            return Err(VerificationError::InvalidTargetName);
        }
        let mut len_raw = [0u8; 8];
        len_raw.copy_from_slice(&bytes[8..16]);
        let image_length = u64::from_le_bytes(len_raw);

        let target_end = TRAILER_HEADER_SIZE + target_len;
        let sig_end = target_end + SIGNATURE_SIZE;
        if bytes.len() < sig_end {
            return Err(VerificationError::TruncatedTrailer);
        }
        let target_bytes = &bytes[TRAILER_HEADER_SIZE..target_end];
        if target_bytes[0] != b'/' || !target_bytes.iter().all(|b| b.is_ascii_graphic()) {
            return Err(VerificationError::InvalidTargetName);
        }
        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(&bytes[target_end..sig_end]);

        Ok(Self {
            target: target_bytes.iter().map(|b| *b as char).collect(),
            image_length,
            signature,
        })
    }

    /// Serialize, used by signing tools
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TRAILER_HEADER_SIZE + self.target.len() + SIGNATURE_SIZE);
        out.extend_from_slice(&TRAILER_MAGIC);
        out.push(TRAILER_VERSION);
        out.push(self.target.len() as u8);
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&self.image_length.to_le_bytes());
        out.extend_from_slice(self.target.as_bytes());
        out.extend_from_slice(&self.signature);
        out
    }
}

/// Message covered by the trailer signature
pub fn signed_message(payload: &[u8], target: &str) -> Vec<u8> {
    let mut msg = Vec::with_capacity(32 + target.len() + 8);
    msg.extend_from_slice(&Sha256::digest(payload));
    msg.extend_from_slice(target.as_bytes());
    msg.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    msg
}

/// Verify an image against every key of a keystore, first match wins
///
/// Returns the target name the signer embedded.
pub fn verify(image: &BootImage, keystore: &Keystore) -> core::result::Result<String, VerificationError> {
    let trailer = SignatureTrailer::parse(image.trailer())?;
    if trailer.image_length != image.image_size() as u64 {
        return Err(VerificationError::LengthMismatch);
    }
    if keystore.keys().is_empty() {
        return Err(VerificationError::EmptyKeystore);
    }

    let message = signed_message(image.payload(), &trailer.target);
    let signature = Signature::from_bytes(&trailer.signature);
    let matched = keystore
        .keys()
        .iter()
        .position(|key| key.verify_strict(&message, &signature).is_ok());

    match matched {
        Some(index) => {
            log::debug!("boot image signed by key {} for '{}'", index, trailer.target);
            Ok(trailer.target)
        }
        None => Err(VerificationError::NoMatchingKey),
    }
}

/// Target names an image must be signed for to boot as `target`
pub fn expected_targets(target: BootTarget, config: &BootConfig) -> &'static [&'static str] {
    match target {
        // "/recovery" is accepted for multistage updates
        BootTarget::NormalBoot => &["/boot", "/recovery"],
        BootTarget::Charger => &["/boot"],
        BootTarget::Recovery => &["/recovery"],
        BootTarget::EspBootimage if config.has_fastboot_image() => &["/boot", "/fastboot"],
        BootTarget::EspBootimage => &["/boot"],
        _ => &[],
    }
}

/// Verify signature and purpose for a requested boot target
///
/// A good signature for the wrong purpose is refused exactly like a bad
/// signature.
pub fn validate_bootimage(
    target: BootTarget,
    image: &BootImage,
    keystore: &Keystore,
    config: &BootConfig,
) -> Result<String> {
    let name = verify(image, keystore).map_err(|e| {
        log::debug!("boot image doesn't verify: {}", e);
        BootError::Verification(e)
    })?;

    let expected = expected_targets(target, config);
    if expected.is_empty() {
        log::error!("Unknown boot target for validation: {}", target);
        return Err(BootError::UnsupportedTarget(target));
    }
    if !expected.iter().any(|e| *e == name) {
        log::error!("boot image has unexpected target name '{}'", name);
        return Err(BootError::TargetMismatch);
    }
    Ok(name)
}

/// Verify an image that must have been signed for one specific purpose
pub fn verify_for_purpose(image: &BootImage, keystore: &Keystore, purpose: &str) -> Result<()> {
    let name = verify(image, keystore)?;
    if name != purpose {
        log::error!("This does not appear to be a {} image", purpose);
        return Err(BootError::TargetMismatch);
    }
    Ok(())
}

#[cfg(all(test, feature = "signing"))]
mod tests {
    use super::*;
    use crate::config::FlashModeKind;
    use crate::signing::{build_boot_image, build_keystore, sign_boot_image, signing_key};

    fn keystore_for(seeds: &[u8]) -> Keystore {
        let oem = signing_key(100);
        let keys: Vec<_> = seeds.iter().map(|s| signing_key(*s).verifying_key()).collect();
        Keystore::parse(&build_keystore(&oem, &keys)).unwrap()
    }

    fn signed(target: &str, seed: u8) -> BootImage {
        let raw = build_boot_image(&[7u8; 5000], &[8u8; 300], &[], 2048, "console=ttyS0");
        BootImage::from_bytes(sign_boot_image(&raw, target, &signing_key(seed)).unwrap()).unwrap()
    }

    #[test]
    fn test_first_matching_key_wins() {
        let image = signed("/boot", 3);
        assert_eq!(verify(&image, &keystore_for(&[1, 2, 3])), Ok(String::from("/boot")));
        assert_eq!(
            verify(&image, &keystore_for(&[1, 2])),
            Err(VerificationError::NoMatchingKey)
        );
    }

    #[test]
    fn test_multistage_recovery_accepted_for_normal_boot() {
        let config = BootConfig::default();
        let image = signed("/recovery", 1);
        let ks = keystore_for(&[1]);
        assert!(validate_bootimage(BootTarget::NormalBoot, &image, &ks, &config).is_ok());
        assert!(validate_bootimage(BootTarget::Recovery, &image, &ks, &config).is_ok());
        assert_eq!(
            validate_bootimage(BootTarget::Charger, &image, &ks, &config),
            Err(BootError::TargetMismatch)
        );
    }

    #[test]
    fn test_boot_image_refused_as_recovery() {
        let config = BootConfig::default();
        let image = signed("/boot", 1);
        assert_eq!(
            validate_bootimage(BootTarget::Recovery, &image, &keystore_for(&[1]), &config),
            Err(BootError::TargetMismatch)
        );
    }

    #[test]
    fn test_fastboot_name_only_with_fastboot_image() {
        let image = signed("/fastboot", 1);
        let ks = keystore_for(&[1]);
        let embedded = BootConfig::default().with_flash_mode(FlashModeKind::Embedded);
        let image_based = BootConfig::default().with_flash_mode(FlashModeKind::BootImage);
        assert!(validate_bootimage(BootTarget::EspBootimage, &image, &ks, &embedded).is_err());
        assert!(validate_bootimage(BootTarget::EspBootimage, &image, &ks, &image_based).is_ok());
    }

    #[test]
    fn test_tampered_payload() {
        let image = signed("/boot", 1);
        let mut raw = image.into_bytes();
        raw[3000] ^= 0xFF;
        let image = BootImage::from_bytes(raw).unwrap();
        assert_eq!(
            verify(&image, &keystore_for(&[1])),
            Err(VerificationError::NoMatchingKey)
        );
    }

    #[test]
    fn test_unsigned_image() {
        let raw = build_boot_image(&[7u8; 100], &[], &[], 2048, "");
        let mut padded = raw.clone();
        padded.resize(raw.len() + BOOT_SIGNATURE_MAX_SIZE, 0);
        let image = BootImage::from_bytes(padded).unwrap();
        assert_eq!(verify(&image, &keystore_for(&[1])), Err(VerificationError::MissingTrailer));
    }

    #[test]
    fn test_trailer_target_name_checks() {
        let trailer = SignatureTrailer {
            target: String::from("/boot"),
            image_length: 4096,
            signature: [0u8; SIGNATURE_SIZE],
        };
        let bytes = trailer.to_bytes();
        assert_eq!(SignatureTrailer::parse(&bytes), Ok(trailer));
        let mut bad = bytes.clone();
        bad[TRAILER_HEADER_SIZE] = b'x';
        assert_eq!(SignatureTrailer::parse(&bad), Err(VerificationError::InvalidTargetName));
        assert_eq!(
            SignatureTrailer::parse(&bytes[..30]),
            Err(VerificationError::TruncatedTrailer)
        );
    }

    #[test]
    fn test_purpose_binding() {
        let image = signed("/tdos", 1);
        let ks = keystore_for(&[1]);
        assert!(verify_for_purpose(&image, &ks, "/tdos").is_ok());
        assert_eq!(verify_for_purpose(&image, &ks, "/fastboot"), Err(BootError::TargetMismatch));
    }
}
