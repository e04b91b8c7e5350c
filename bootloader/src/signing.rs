//! Signing helpers for host tooling
//!
//! Produce keystore blobs and signed boot images in the formats the
//! verifier accepts.

use alloc::vec::Vec;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::bootimage::{BOOT_ARGS_SIZE, BOOT_HEADER_SIZE, BOOT_MAGIC, BootImage};
use crate::error::{BootError, Result};
use crate::keystore::{KEYSTORE_MAGIC, KEYSTORE_MAX_KEYS, KEYSTORE_VERSION};
use crate::verifier::{BOOT_TARGET_SIZE, SignatureTrailer, signed_message};

/// Deterministic key for tests and reproducible tooling
pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

/// Keystore blob listing `keys`, signed by `oem`
///
/// Key lists longer than the format allows are truncated.
pub fn build_keystore(oem: &SigningKey, keys: &[VerifyingKey]) -> Vec<u8> {
    let keys = &keys[..keys.len().min(KEYSTORE_MAX_KEYS)];
    let mut blob = Vec::new();
    blob.extend_from_slice(&KEYSTORE_MAGIC);
    blob.extend_from_slice(&KEYSTORE_VERSION.to_le_bytes());
    blob.extend_from_slice(&(keys.len() as u16).to_le_bytes());
    for key in keys {
        blob.extend_from_slice(key.as_bytes());
    }
    let digest = Sha256::digest(&blob);
    let signature = oem.sign(&digest);
    blob.extend_from_slice(&signature.to_bytes());
    blob
}

fn pad_to_page(out: &mut Vec<u8>, page_size: usize) {
    let rem = out.len() % page_size;
    if rem != 0 {
        out.resize(out.len() + page_size - rem, 0);
    }
}

/// Unsigned boot image with the given regions
pub fn build_boot_image(
    kernel: &[u8],
    ramdisk: &[u8],
    second: &[u8],
    page_size: u32,
    cmdline: &str,
) -> Vec<u8> {
    let page = page_size as usize;
    let mut out = Vec::with_capacity(page * 4 + kernel.len() + ramdisk.len() + second.len());
    out.extend_from_slice(BOOT_MAGIC);
    for value in [
        kernel.len() as u32,
        0x1000_8000,
        ramdisk.len() as u32,
        0x1100_0000,
        second.len() as u32,
        0x10f0_0000,
        0x1000_0100,
        page_size,
        0,
        0,
    ] {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.resize(out.len() + 16, 0);
    let args = cmdline.as_bytes();
    let args = &args[..args.len().min(BOOT_ARGS_SIZE - 1)];
    let mut field = [0u8; BOOT_ARGS_SIZE];
    field[..args.len()].copy_from_slice(args);
    out.extend_from_slice(&field);
    out.resize(BOOT_HEADER_SIZE, 0);
    pad_to_page(&mut out, page);

    for region in [kernel, ramdisk, second] {
        out.extend_from_slice(region);
        pad_to_page(&mut out, page);
    }
    out
}

/// Append a signature trailer binding `image` to `target`
pub fn sign_boot_image(image: &[u8], target: &str, key: &SigningKey) -> Result<Vec<u8>> {
    if target.is_empty() || target.len() > BOOT_TARGET_SIZE || !target.starts_with('/') {
        return Err(BootError::InvalidArgument("bad target name"));
    }
    let parsed = BootImage::from_bytes(image.to_vec())?;
    let payload = parsed.payload();
    let signature = key.sign(&signed_message(payload, target));
    let trailer = SignatureTrailer {
        target: target.into(),
        image_length: payload.len() as u64,
        signature: signature.to_bytes(),
    };

    let mut out = payload.to_vec();
    out.extend_from_slice(&trailer.to_bytes());
    Ok(out)
}
