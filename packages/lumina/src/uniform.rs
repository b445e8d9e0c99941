//! CPU-side staging of uniform-block contents.
//!
//! A [`UniformObject`] owns the padded byte image of one uniform-block
//! instance plus the device buffer it uploads to. Values come in packed
//! (no padding) and are scattered to their padded offsets through the
//! block's [`Structure`]; `push` uploads the image when it changed.

use crate::{
    device::{
        BufferId,
        BufferKind,
        Device,
    },
    layout::{
        Structure,
        UniformLayout,
        resolve_element_path,
    },
};
use std::sync::Arc;
use anyhow::{
    Result,
    bail,
};


/// Value that can serialize itself into the packed (unpadded) uniform
/// image.
pub trait Pack {
    fn pack(&self, dst: &mut Vec<u8>);
}

impl Pack for f32 {
    fn pack(&self, dst: &mut Vec<u8>) {
        dst.extend(self.to_le_bytes());
    }
}

impl Pack for i32 {
    fn pack(&self, dst: &mut Vec<u8>) {
        dst.extend(self.to_le_bytes());
    }
}

impl Pack for u32 {
    fn pack(&self, dst: &mut Vec<u8>) {
        dst.extend(self.to_le_bytes());
    }
}

impl<T: Pack, const LEN: usize> Pack for [T; LEN] {
    fn pack(&self, dst: &mut Vec<u8>) {
        for element in self {
            element.pack(dst);
        }
    }
}

pub fn pack_bytes<T: Pack>(value: &T) -> Vec<u8> {
    let mut bytes = Vec::new();
    value.pack(&mut bytes);
    bytes
}

#[derive(Debug)]
pub struct UniformObject {
    structure: Arc<Structure>,
    binding: usize,
    buffer: BufferId,
    image: Vec<u8>,
    dirty: bool,
}

impl UniformObject {
    pub(crate) fn new(device: &mut dyn Device, layout: &UniformLayout) -> Result<Self> {
        let buffer = device.create_buffer(BufferKind::Uniform, layout.structure.size_padded)?;
        device.bind_uniform_buffer(buffer, layout.binding)?;
        Ok(UniformObject {
            structure: layout.structure.clone(),
            binding: layout.binding,
            buffer,
            image: vec![0; layout.structure.size_padded],
            dirty: false,
        })
    }

    pub fn binding(&self) -> usize {
        self.binding
    }

    pub fn structure(&self) -> &Arc<Structure> {
        &self.structure
    }

    /// Writes the whole block from a packed byte image.
    pub fn set_bytes(&mut self, packed: &[u8]) -> Result<()> {
        if packed.len() != self.structure.size_unpadded {
            bail!(
                "unexpected data size: expected [{}] received [{}]",
                self.structure.size_unpadded,
                packed.len(),
            );
        }
        self.structure.write(&mut self.image, packed);
        self.dirty = true;
        Ok(())
    }

    /// Writes the whole block from a packable value.
    pub fn set<T: Pack>(&mut self, value: &T) -> Result<()> {
        self.set_bytes(&pack_bytes(value))
    }

    /// Writes one element, addressed by dotted path, from a packed byte
    /// image.
    pub fn set_element_bytes(&mut self, path: &str, packed: &[u8]) -> Result<()> {
        let (offset, structure, len) = resolve_element_path(&self.structure, path)?;
        let expected = structure.size_unpadded * len;
        if packed.len() != expected {
            bail!(
                "unexpected data size for element [{}]: expected [{}] received [{}]",
                path,
                expected,
                packed.len(),
            );
        }
        let (size_padded, size_unpadded) = (structure.size_padded, structure.size_unpadded);
        let structure = structure.clone();
        for index in 0..len {
            let padded = offset + size_padded * index;
            let unpadded = size_unpadded * index;
            structure.write(
                &mut self.image[padded..padded + size_padded],
                &packed[unpadded..unpadded + size_unpadded],
            );
        }
        self.dirty = true;
        Ok(())
    }

    /// Writes one element, addressed by dotted path, from a packable value.
    pub fn set_element<T: Pack>(&mut self, path: &str, value: &T) -> Result<()> {
        self.set_element_bytes(path, &pack_bytes(value))
    }

    pub fn needs_update(&self) -> bool {
        self.dirty
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Uploads the staged image to the device buffer when it changed since
    /// the last push.
    pub fn push(&mut self, device: &mut dyn Device) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        trace!(binding = self.binding, "uploading uniform image");
        device.write_buffer(self.buffer, &self.image)?;
        self.dirty = false;
        Ok(())
    }
}
