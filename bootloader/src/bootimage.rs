//! Android boot image handling
//!
//! Header layout (all integers little-endian):
//!
//! - magic `ANDROID!`
//! - kernel, ramdisk and second-stage sizes and load addresses
//! - tags address and page size
//! - product name, command line, id and extra command line
//!
//! Payload regions follow the header page, each aligned to `page_size`. The
//! signature trailer starts right after the last region.

use alloc::string::String;
use alloc::vec::Vec;
use static_assertions::const_assert_eq;

use crate::error::{BootError, Result};

pub const BOOT_MAGIC: &[u8; 8] = b"ANDROID!";
pub const BOOT_NAME_SIZE: usize = 16;
pub const BOOT_ARGS_SIZE: usize = 512;
pub const BOOT_ID_SIZE: usize = 32;
pub const BOOT_EXTRA_ARGS_SIZE: usize = 1024;
pub const BOOT_HEADER_SIZE: usize = 1632;

const_assert_eq!(
    BOOT_HEADER_SIZE,
    8 + 10 * 4 + BOOT_NAME_SIZE + BOOT_ARGS_SIZE + BOOT_ID_SIZE + BOOT_EXTRA_ARGS_SIZE
);

const NAME_OFFSET: usize = 48;
const CMDLINE_OFFSET: usize = NAME_OFFSET + BOOT_NAME_SIZE;
const ID_OFFSET: usize = CMDLINE_OFFSET + BOOT_ARGS_SIZE;
const EXTRA_CMDLINE_OFFSET: usize = ID_OFFSET + BOOT_ID_SIZE;

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn nul_terminated(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

/// Parsed boot image header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootImageHeader {
    pub kernel_size: u32,
    pub kernel_addr: u32,
    pub ramdisk_size: u32,
    pub ramdisk_addr: u32,
    pub second_size: u32,
    pub second_addr: u32,
    pub tags_addr: u32,
    pub page_size: u32,
    pub name: [u8; BOOT_NAME_SIZE],
    pub cmdline: [u8; BOOT_ARGS_SIZE],
    pub id: [u8; BOOT_ID_SIZE],
    pub extra_cmdline: [u8; BOOT_EXTRA_ARGS_SIZE],
}

impl BootImageHeader {
    /// Parse a header, rejecting anything without the boot magic
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BOOT_HEADER_SIZE {
            return Err(BootError::InvalidImage("header truncated"));
        }
        if &bytes[..BOOT_MAGIC.len()] != BOOT_MAGIC {
            return Err(BootError::InvalidImage("bad magic"));
        }

        let mut name = [0u8; BOOT_NAME_SIZE];
        name.copy_from_slice(&bytes[NAME_OFFSET..CMDLINE_OFFSET]);
        let mut cmdline = [0u8; BOOT_ARGS_SIZE];
        cmdline.copy_from_slice(&bytes[CMDLINE_OFFSET..ID_OFFSET]);
        let mut id = [0u8; BOOT_ID_SIZE];
        id.copy_from_slice(&bytes[ID_OFFSET..EXTRA_CMDLINE_OFFSET]);
        let mut extra_cmdline = [0u8; BOOT_EXTRA_ARGS_SIZE];
        extra_cmdline.copy_from_slice(&bytes[EXTRA_CMDLINE_OFFSET..BOOT_HEADER_SIZE]);

        let header = Self {
            kernel_size: read_u32(bytes, 8),
            kernel_addr: read_u32(bytes, 12),
            ramdisk_size: read_u32(bytes, 16),
            ramdisk_addr: read_u32(bytes, 20),
            second_size: read_u32(bytes, 24),
            second_addr: read_u32(bytes, 28),
            tags_addr: read_u32(bytes, 32),
            page_size: read_u32(bytes, 36),
            name,
            cmdline,
            id,
            extra_cmdline,
        };

        if header.page_size == 0 || !header.page_size.is_power_of_two() {
            return Err(BootError::InvalidImage("bad page size"));
        }
        Ok(header)
    }

    fn page_align(&self, size: u32) -> Option<usize> {
        let page = self.page_size as usize;
        (size as usize).checked_add(page - 1).map(|s| s / page * page)
    }

    /// Size of header page plus all aligned payload regions
    pub fn image_size(&self) -> Result<usize> {
        let overflow = BootError::InvalidImage("image size overflow");
        let kernel = self.page_align(self.kernel_size).ok_or(overflow)?;
        let ramdisk = self.page_align(self.ramdisk_size).ok_or(overflow)?;
        let second = self.page_align(self.second_size).ok_or(overflow)?;
        kernel
            .checked_add(ramdisk)
            .and_then(|s| s.checked_add(second))
            .and_then(|s| s.checked_add(self.page_size as usize))
            .ok_or(overflow)
    }

    /// Offset of the second-stage region
    pub fn second_offset(&self) -> Result<usize> {
        let overflow = BootError::InvalidImage("image size overflow");
        let kernel = self.page_align(self.kernel_size).ok_or(overflow)?;
        let ramdisk = self.page_align(self.ramdisk_size).ok_or(overflow)?;
        Ok(self.page_size as usize + kernel + ramdisk)
    }

    /// Embedded command line, extended by the extra field when the first
    /// field is full
    pub fn command_line(&self) -> String {
        let mut out = String::from_utf8_lossy(nul_terminated(&self.cmdline)).into_owned();
        if self.cmdline[BOOT_ARGS_SIZE - 2] != 0 {
            out.push_str(&String::from_utf8_lossy(nul_terminated(&self.extra_cmdline)));
        }
        out
    }
}

/// Owning handle over a loaded boot image
///
/// The buffer holds the declared image followed by the signature area and
/// is released when the handle is dropped, whichever path drops it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootImage {
    data: Vec<u8>,
    header: BootImageHeader,
    image_size: usize,
}

impl BootImage {
    /// Take ownership of a buffer holding a complete image
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let header = BootImageHeader::parse(&data)?;
        let image_size = header.image_size()?;
        if data.len() < image_size {
            return Err(BootError::InvalidImage("image truncated"));
        }
        Ok(Self {
            data,
            header,
            image_size,
        })
    }

    pub fn header(&self) -> &BootImageHeader {
        &self.header
    }

    /// Declared image size, excluding the signature area
    pub fn image_size(&self) -> usize {
        self.image_size
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Declared image bytes, header included
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.image_size]
    }

    /// Bytes following the declared image
    pub fn trailer(&self) -> &[u8] {
        &self.data[self.image_size..]
    }

    /// Second-stage region, `None` when the image has none
    pub fn second_stage(&self) -> Option<&[u8]> {
        let size = self.header.second_size as usize;
        if size == 0 {
            return None;
        }
        let start = self.header.second_offset().ok()?;
        self.data.get(start..start.checked_add(size)?)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
