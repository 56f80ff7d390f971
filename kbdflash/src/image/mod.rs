//! Firmware image handling.
//!
//! A dump is the full flash address space, `0x00000..0x20000`, read in
//! 64-byte regions and concatenated in ascending address order.
//!
//! ```text
//! offset 0x00000 +------------------+
//!                |   region 0 (64B) |
//!        0x00040 +------------------+
//!                |   region 1 (64B) |
//!                +------------------+
//!                |       ...        |
//!        0x1FFC0 +------------------+
//!                | region 2047 (64B)|
//!        0x20000 +------------------+
//! ```

use crate::error::{Error, Result};
use crate::protocol::{FLASH_SIZE, FRAME_SIZE, REGION_SIZE, VERSION_ADDRESS};
use log::debug;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Size of a complete image in bytes.
pub const IMAGE_SIZE: usize = FLASH_SIZE as usize;

/// Number of 64-byte regions in a complete image.
pub const REGION_COUNT: usize = (FLASH_SIZE / REGION_SIZE) as usize;

/// Full-flash firmware image.
#[derive(Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    data: Vec<u8>,
}

impl std::fmt::Debug for FirmwareImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirmwareImage")
            .field("len", &self.data.len())
            .finish()
    }
}

impl FirmwareImage {
    /// Wrap a complete image.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() != IMAGE_SIZE {
            return Err(Error::InvalidImage(format!(
                "expected {IMAGE_SIZE} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self { data })
    }

    /// Load an image previously written by [`FirmwareImage::write_to_file`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading image from: {}", path.display());
        Self::from_bytes(fs::read(path)?)
    }

    /// Build an image from regions in ascending address order.
    pub(crate) fn from_regions(regions: Vec<[u8; FRAME_SIZE]>) -> Result<Self> {
        Self::from_bytes(regions.concat())
    }

    /// The 64-byte region starting at `addr`, if it is region-aligned and in range.
    pub fn block(&self, addr: u32) -> Option<&[u8]> {
        if addr % REGION_SIZE != 0 {
            return None;
        }
        let start = usize::try_from(addr).ok()?;
        let end = start.checked_add(FRAME_SIZE)?;
        self.data.get(start..end)
    }

    /// Iterate over `(address, region)` pairs in ascending order.
    pub fn blocks(&self) -> impl Iterator<Item = (u32, &[u8])> {
        self.data
            .chunks_exact(FRAME_SIZE)
            .zip((0..FLASH_SIZE).step_by(REGION_SIZE as usize))
            .map(|(chunk, addr)| (addr, chunk))
    }

    /// The region holding the firmware version.
    pub fn version_block(&self) -> Option<&[u8]> {
        self.block(VERSION_ADDRESS)
    }

    /// Raw image bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Image length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false for a valid image.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the raw image to `path`, replacing any existing file.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&self.data)?;
        writer.flush()?;
        debug!("Wrote {} bytes to {}", self.data.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn patterned() -> Vec<u8> {
        (0..IMAGE_SIZE).map(|i| (i / FRAME_SIZE) as u8).collect()
    }

    #[test]
    fn test_image_geometry() {
        assert_eq!(IMAGE_SIZE, 131_072);
        assert_eq!(REGION_COUNT, 2048);
    }

    #[test]
    fn test_from_bytes_rejects_wrong_size() {
        assert!(matches!(
            FirmwareImage::from_bytes(vec![0; 64]),
            Err(Error::InvalidImage(_))
        ));
        assert!(FirmwareImage::from_bytes(vec![0; IMAGE_SIZE + 1]).is_err());
    }

    #[test]
    fn test_block_lookup() {
        let image = FirmwareImage::from_bytes(patterned()).unwrap();
        assert_eq!(image.block(0).unwrap(), &[0u8; 64][..]);
        assert_eq!(image.block(0x40).unwrap(), &[1u8; 64][..]);
        assert_eq!(image.version_block().unwrap(), &[0xA0u8; 64][..]);
        assert!(image.block(0x41).is_none());
        assert!(image.block(FLASH_SIZE).is_none());
        assert!(image.block(u32::MAX - 63).is_none());
    }

    #[test]
    fn test_blocks_ascending() {
        let image = FirmwareImage::from_bytes(patterned()).unwrap();
        let blocks: Vec<_> = image.blocks().collect();
        assert_eq!(blocks.len(), REGION_COUNT);
        assert_eq!(blocks[0].0, 0);
        assert_eq!(blocks[1].0, 0x40);
        assert_eq!(blocks[REGION_COUNT - 1].0, 0x1FFC0);
        assert!(blocks.windows(2).all(|w| w[0].0 + 64 == w[1].0));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flash.img");
        let image = FirmwareImage::from_bytes(patterned()).unwrap();

        image.write_to_file(&path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), IMAGE_SIZE as u64);
        assert_eq!(FirmwareImage::from_file(&path).unwrap(), image);
    }

    #[test]
    fn test_from_file_rejects_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.img");
        fs::write(&path, [0u8; 100]).unwrap();
        assert!(FirmwareImage::from_file(&path).is_err());
    }
}
