//! Boot image loading
//!
//! Reads boot images from a partition, a file on the system partition or a
//! resident memory buffer into an owned [`BootImage`]. Every path reserves
//! room for the signature trailer so images that were never signed still
//! load. When a keystore is supplied the image is validated, and a failed
//! validation hands the bytes back alongside the error.

use alloc::vec::Vec;
use verdict_api::interfaces::{BOOT_LABEL, RECOVERY_LABEL};
use verdict_api::{BootTarget, EspFileSystem, PartitionStore, PhysicalMemory, Status};

use crate::bootimage::{BOOT_HEADER_SIZE, BootImage, BootImageHeader};
use crate::context::PlatformContext;
use crate::error::{BootError, Result};
use crate::keystore::Keystore;
use crate::verifier::{BOOT_SIGNATURE_MAX_SIZE, validate_bootimage};

/// A load that did not produce a trusted image
///
/// `image` is set when bytes were read but did not validate.
#[derive(Debug)]
pub struct LoadFailure {
    pub error: BootError,
    pub image: Option<BootImage>,
}

impl From<BootError> for LoadFailure {
    fn from(error: BootError) -> Self {
        Self { error, image: None }
    }
}

/// Bytes to read for an image whose header is `header`
fn padded_size(header: &BootImageHeader) -> Result<usize> {
    header
        .image_size()?
        .checked_add(BOOT_SIGNATURE_MAX_SIZE)
        .ok_or(BootError::InvalidImage("image size overflow"))
}

/// Zero-fill `data` up to `wanted`
///
/// The signature area is allocated fallibly so an oversized image reports
/// `OutOfResources` instead of aborting.
fn into_image(mut data: Vec<u8>, wanted: usize) -> Result<BootImage> {
    if data.len() < wanted {
        data.try_reserve_exact(wanted - data.len()).map_err(|_| {
            log::error!("Couldn't allocate {} bytes for the boot image", wanted);
            BootError::Platform(Status::OutOfResources)
        })?;
        data.resize(wanted, 0);
    }
    BootImage::from_bytes(data)
}

/// Load from a partition by label
pub fn load_partition_image(partitions: &dyn PartitionStore, label: &str) -> Result<BootImage> {
    let header_bytes = partitions
        .read_partition(label, 0, BOOT_HEADER_SIZE)
        .map_err(|e| {
            log::error!("Failed to read {} partition header: {}", label, e);
            BootError::Storage(e)
        })?;
    let header = BootImageHeader::parse(&header_bytes).map_err(|e| {
        log::error!("{} partition does not hold a boot image", label);
        e
    })?;

    let partition_size = partitions.partition_size(label).map_err(|e| {
        log::error!("Failed to get {} partition size: {}", label, e);
        BootError::Storage(e)
    })?;
    let partition_size = usize::try_from(partition_size).unwrap_or(usize::MAX);
    if header.image_size()? > partition_size {
        log::error!("{} image header declares more than the partition holds", label);
        return Err(BootError::InvalidImage("image larger than partition"));
    }

    let wanted = padded_size(&header)?;
    let data = partitions
        .read_partition(label, 0, partition_size.min(wanted))
        .map_err(BootError::Storage)?;
    log::debug!("read {} bytes from {}", data.len(), label);
    into_image(data, wanted)
}

/// Load a file from the system partition, deleting it first if one-shot
pub fn load_file_image(esp: &dyn EspFileSystem, path: &str, delete: bool) -> Result<BootImage> {
    let data = esp.read(path).map_err(|e| {
        log::error!("Couldn't read {}: {}", path, e);
        BootError::Storage(e)
    })?;

    if delete {
        if let Err(e) = esp.delete(path) {
            log::error!("Couldn't delete {}: {}", path, e);
        }
    }

    let header = BootImageHeader::parse(&data)?;
    if header.image_size()? > data.len() {
        log::error!("{} is shorter than its image header declares", path);
        return Err(BootError::InvalidImage("image larger than file"));
    }
    let wanted = padded_size(&header)?;
    into_image(data, wanted)
}

/// Load an image already resident in memory
pub fn load_memory_image(memory: &dyn PhysicalMemory, address: u64) -> Result<BootImage> {
    if address == 0 {
        return Err(BootError::InvalidArgument("null image address"));
    }
    let header_bytes = memory.read(address, BOOT_HEADER_SIZE).map_err(BootError::Platform)?;
    let header = BootImageHeader::parse(&header_bytes)?;
    let wanted = padded_size(&header)?;
    let data = memory.read(address, wanted).map_err(BootError::Platform)?;
    into_image(data, wanted)
}

/// Load the image for `target`, validating it when a keystore is given
pub fn load_boot_image(
    ctx: &PlatformContext<'_>,
    target: BootTarget,
    keystore: Option<&Keystore>,
    path: Option<&str>,
    oneshot: bool,
) -> core::result::Result<BootImage, LoadFailure> {
    let image = match target {
        BootTarget::NormalBoot | BootTarget::Charger => {
            load_partition_image(ctx.partitions, BOOT_LABEL)?
        }
        BootTarget::Recovery => load_partition_image(ctx.partitions, RECOVERY_LABEL)?,
        BootTarget::EspBootimage => {
            let path = path.ok_or(BootError::InvalidArgument("missing image path"))?;
            load_file_image(ctx.esp, path, oneshot)?
        }
        other => {
            log::error!("Cannot load a boot image for {}", other);
            return Err(BootError::UnsupportedTarget(other).into());
        }
    };

    let Some(keystore) = keystore else {
        return Ok(image);
    };

    match validate_bootimage(target, &image, keystore, ctx.config) {
        Ok(name) => {
            log::debug!("boot image verified for '{}'", name);
            Ok(image)
        }
        Err(error) => Err(LoadFailure {
            error,
            image: Some(image),
        }),
    }
}
