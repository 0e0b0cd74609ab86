//! Pixel buffers
//!
//! A [`PixelBuffer`] is one frame of XRGB8888 pixels in a shared region. It is
//! filled once when created and never written again; attaching it hands the
//! region to the compositor.

use crate::config::ShmConfig;
use crate::error::{EngineError, Result};
use crate::shm::{self, ShmRegion};
use std::os::fd::{AsFd, BorrowedFd};

/// Bytes per pixel for the only supported format
pub const BYTES_PER_PIXEL: usize = 4;

/// Pixel layout of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 32-bit native-endian words, top byte ignored, then red, green, blue
    Xrgb8888,
}

/// Number of bytes a `width`×`height` frame occupies, if it fits a shm pool
pub fn frame_len(width: u32, height: u32) -> Result<usize> {
    let invalid = EngineError::InvalidDimensions { width, height };
    if width == 0 || height == 0 {
        return Err(invalid);
    }
    let len = (width as u64) * (height as u64) * BYTES_PER_PIXEL as u64;
    // wl_shm pool sizes and strides are i32 on the wire
    if len > i32::MAX as u64 {
        return Err(invalid);
    }
    Ok(len as usize)
}

/// One frame of pixels ready to be handed to the compositor
#[derive(Debug)]
pub struct PixelBuffer {
    region: ShmRegion,
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
}

impl PixelBuffer {
    /// Allocate a buffer and fill it from `content`, or opaque black when `None`
    pub fn new(width: u32, height: u32, content: Option<&[u8]>, config: &ShmConfig) -> Result<Self> {
        let len = frame_len(width, height)?;
        let mut region = shm::allocate(len, config)?;
        region.fill(content);

        Ok(Self {
            region,
            width,
            height,
            stride: width * BYTES_PER_PIXEL as u32,
            format: PixelFormat::Xrgb8888,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Total size in bytes, always `stride * height`
    pub fn byte_len(&self) -> usize {
        self.region.len()
    }

    /// The pixel bytes as written at creation
    pub fn pixels(&self) -> &[u8] {
        self.region.as_bytes()
    }
}

impl AsFd for PixelBuffer {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.region.as_fd()
    }
}
