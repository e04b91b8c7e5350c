//! Trust store and keystores
//!
//! Provides keystore handling including:
//! - Keystore blob parsing and structural validation
//! - Keystore self-verification against the OEM root key
//! - Selection between the OEM keystore and a user-installed keystore
//! - User keystore installation while the device is unlocked
//!
//! Blob layout (little-endian):
//!
//! | offset | size   | field                                  |
//! |--------|--------|----------------------------------------|
//! | 0      | 4      | magic `KSTO`                           |
//! | 4      | 2      | format version (1)                     |
//! | 6      | 2      | key count (at most 16)                 |
//! | 8      | 32 * n | ed25519 public keys                    |
//! | 8+32n  | 64     | OEM signature over SHA-256 of [0, 8+32n) |

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Write;
use core::ops::Deref;
use ed25519_dalek::{Signature, VerifyingKey};
use sha2::{Digest, Sha256};
use verdict_api::{DeviceState, VarNamespace, VarStore};

use crate::error::{BootError, Result};
use crate::vars;

pub const KEYSTORE_MAGIC: [u8; 4] = *b"KSTO";
pub const KEYSTORE_VERSION: u16 = 1;
pub const KEYSTORE_HEADER_SIZE: usize = 8;
pub const KEYSTORE_MAX_KEYS: usize = 16;
pub const PUBLIC_KEY_SIZE: usize = 32;
pub const SIGNATURE_SIZE: usize = 64;
pub const KEYSTORE_HASH_SIZE: usize = 32;

/// SHA-256 digest of a whole keystore blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeystoreHash {
    pub bytes: [u8; KEYSTORE_HASH_SIZE],
}

impl KeystoreHash {
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(KEYSTORE_HASH_SIZE * 2);
        for byte in self.bytes.iter() {
            let _ = write!(out, "{:02x}", byte);
        }
        out
    }
}

impl fmt::Display for KeystoreHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "{}", &hex[..16])
    }
}

/// A structurally valid keystore
///
/// Parsing checks layout only. Whether the OEM key signed it is decided by
/// [`TrustStore::verify_keystore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keystore {
    blob: Vec<u8>,
    keys: Vec<VerifyingKey>,
}

impl Keystore {
    pub fn parse(blob: &[u8]) -> Result<Self> {
        if blob.len() < KEYSTORE_HEADER_SIZE + SIGNATURE_SIZE {
            return Err(BootError::MalformedKeystore("too short"));
        }
        if blob[0..4] != KEYSTORE_MAGIC {
            return Err(BootError::MalformedKeystore("bad magic"));
        }
        let version = u16::from_le_bytes([blob[4], blob[5]]);
        if version != KEYSTORE_VERSION {
            return Err(BootError::MalformedKeystore("unsupported version"));
        }
        let count = u16::from_le_bytes([blob[6], blob[7]]) as usize;
        if count > KEYSTORE_MAX_KEYS {
            return Err(BootError::MalformedKeystore("too many keys"));
        }
        let expected = KEYSTORE_HEADER_SIZE + count * PUBLIC_KEY_SIZE + SIGNATURE_SIZE;
        if blob.len() != expected {
            return Err(BootError::MalformedKeystore("size does not match key count"));
        }

        let mut keys = Vec::with_capacity(count);
        for chunk in blob[KEYSTORE_HEADER_SIZE..KEYSTORE_HEADER_SIZE + count * PUBLIC_KEY_SIZE]
            .chunks_exact(PUBLIC_KEY_SIZE)
        {
            let mut raw = [0u8; PUBLIC_KEY_SIZE];
            raw.copy_from_slice(chunk);
            let key = VerifyingKey::from_bytes(&raw)
                .map_err(|_| BootError::MalformedKeystore("invalid public key"))?;
            keys.push(key);
        }

        Ok(Self {
            blob: blob.to_vec(),
            keys,
        })
    }

    pub fn keys(&self) -> &[VerifyingKey] {
        &self.keys
    }

    pub fn size(&self) -> usize {
        self.blob.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.blob
    }

    pub fn hash(&self) -> KeystoreHash {
        KeystoreHash {
            bytes: Sha256::digest(&self.blob).into(),
        }
    }

    fn signed_region(&self) -> &[u8] {
        &self.blob[..self.blob.len() - SIGNATURE_SIZE]
    }

    fn signature(&self) -> Signature {
        let mut raw = [0u8; SIGNATURE_SIZE];
        raw.copy_from_slice(&self.blob[self.blob.len() - SIGNATURE_SIZE..]);
        Signature::from_bytes(&raw)
    }
}

/// Where the selected keystore came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeystoreOrigin {
    Oem,
    User,
}

impl fmt::Display for KeystoreOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeystoreOrigin::Oem => write!(f, "OEM"),
            KeystoreOrigin::User => write!(f, "User-supplied"),
        }
    }
}

/// Keystore chosen for this boot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectedKeystore<'a> {
    Oem(&'a Keystore),
    User(Keystore),
}

impl SelectedKeystore<'_> {
    pub fn origin(&self) -> KeystoreOrigin {
        match self {
            SelectedKeystore::Oem(_) => KeystoreOrigin::Oem,
            SelectedKeystore::User(_) => KeystoreOrigin::User,
        }
    }
}

impl Deref for SelectedKeystore<'_> {
    type Target = Keystore;

    fn deref(&self) -> &Keystore {
        match self {
            SelectedKeystore::Oem(ks) => ks,
            SelectedKeystore::User(ks) => ks,
        }
    }
}

/// The OEM root of trust embedded at build time
pub struct TrustStore {
    oem_keystore: Keystore,
    oem_key: VerifyingKey,
}

impl TrustStore {
    /// Build from the OEM keystore blob and the raw OEM root key
    pub fn new(oem_keystore: &[u8], oem_key: &[u8]) -> Result<Self> {
        let raw: [u8; PUBLIC_KEY_SIZE] = oem_key
            .try_into()
            .map_err(|_| BootError::MalformedKeystore("OEM key has the wrong size"))?;
        let oem_key = VerifyingKey::from_bytes(&raw)
            .map_err(|_| BootError::MalformedKeystore("invalid OEM key"))?;
        let oem_keystore = Keystore::parse(oem_keystore)?;
        log::debug!(
            "oem key size {} keystore size {}",
            PUBLIC_KEY_SIZE,
            oem_keystore.size()
        );
        Ok(Self {
            oem_keystore,
            oem_key,
        })
    }

    pub fn oem_keystore(&self) -> &Keystore {
        &self.oem_keystore
    }

    pub fn oem_key_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        self.oem_key.as_bytes()
    }

    /// User keystore from the variable store, if present and well formed
    pub fn user_keystore(&self, vars: &dyn VarStore) -> Result<Option<Keystore>> {
        match vars::get_optional(vars, VarNamespace::Fastboot, vars::KEYSTORE_VAR)? {
            None => Ok(None),
            Some(blob) => Keystore::parse(&blob).map(Some),
        }
    }

    /// Prefer a well-formed user keystore, else the OEM keystore
    ///
    /// Selection is independent of verification.
    pub fn select_keystore(&self, vars: &dyn VarStore) -> SelectedKeystore<'_> {
        match self.user_keystore(vars) {
            Ok(Some(ks)) => {
                log::debug!("selected User-supplied keystore");
                SelectedKeystore::User(ks)
            }
            Ok(None) => {
                log::debug!("selected OEM keystore");
                SelectedKeystore::Oem(&self.oem_keystore)
            }
            Err(e) => {
                log::warn!("ignoring user keystore: {}", e);
                log::debug!("selected OEM keystore");
                SelectedKeystore::Oem(&self.oem_keystore)
            }
        }
    }

    /// Check the keystore signature against the OEM root key
    pub fn verify_keystore(&self, keystore: &Keystore) -> Result<KeystoreHash> {
        let digest = Sha256::digest(keystore.signed_region());
        self.oem_key
            .verify_strict(&digest, &keystore.signature())
            .map_err(|_| BootError::KeystoreUnverified)?;
        Ok(keystore.hash())
    }

    /// Install a user keystore, only allowed while unlocked
    pub fn install_user_keystore(
        &self,
        vars: &dyn VarStore,
        blob: &[u8],
        state: DeviceState,
    ) -> Result<()> {
        if state != DeviceState::Unlocked {
            return Err(BootError::UnlockDenied);
        }
        Keystore::parse(blob)?;
        vars.set(
            VarNamespace::Fastboot,
            vars::KEYSTORE_VAR,
            blob,
            verdict_api::VarAttributes::for_var(true, false),
        )
        .map_err(BootError::VariableAccess)?;
        log::info!("user keystore installed ({} bytes)", blob.len());
        Ok(())
    }
}

#[cfg(all(test, feature = "signing"))]
mod tests {
    use super::*;
    use crate::signing::{build_keystore, signing_key};

    #[test]
    fn test_parse_and_verify() {
        let oem = signing_key(1);
        let signer = signing_key(2);
        let blob = build_keystore(&oem, &[signer.verifying_key()]);
        let store = TrustStore::new(&blob, oem.verifying_key().as_bytes()).unwrap();
        assert_eq!(store.oem_keystore().keys().len(), 1);
        assert!(store.verify_keystore(store.oem_keystore()).is_ok());
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let oem = signing_key(1);
        let rogue = signing_key(9);
        let blob = build_keystore(&rogue, &[rogue.verifying_key()]);
        let ks = Keystore::parse(&blob).unwrap();
        let store = TrustStore::new(
            &build_keystore(&oem, &[oem.verifying_key()]),
            oem.verifying_key().as_bytes(),
        )
        .unwrap();
        assert_eq!(store.verify_keystore(&ks), Err(BootError::KeystoreUnverified));
    }

    #[test]
    fn test_malformed_blobs() {
        let oem = signing_key(1);
        let mut blob = build_keystore(&oem, &[oem.verifying_key()]);
        assert!(Keystore::parse(&blob[..20]).is_err());
        blob[0] = b'X';
        assert_eq!(Keystore::parse(&blob), Err(BootError::MalformedKeystore("bad magic")));
    }

    #[test]
    fn test_hash_is_of_whole_blob() {
        let oem = signing_key(1);
        let blob = build_keystore(&oem, &[oem.verifying_key()]);
        let ks = Keystore::parse(&blob).unwrap();
        let expected: [u8; 32] = Sha256::digest(&blob).into();
        assert_eq!(ks.hash().bytes, expected);
        assert_eq!(ks.hash().to_hex().len(), 64);
    }
}
