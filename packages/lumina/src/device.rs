//! Seam between the pipeline and the GPU runtime.
//!
//! The pipeline only ever talks to a [`Device`]: program compilation,
//! buffer creation and upload, and the draw call itself. [`HeadlessDevice`]
//! is the bundled implementation; it checks each stage source with naga's
//! GLSL frontend and validator instead of a real driver and keeps buffer
//! contents in memory, which is enough for tests, tooling and offline
//! shader checking.

use std::collections::HashMap;
use anyhow::{
    Result,
    anyhow,
    bail,
};


pub type ProgramId = usize;
pub type BufferId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
    Uniform,
}

/// GPU collaborator consumed by the pipeline. Handles returned by a device
/// are only meaningful to the device that created them and are released
/// with it.
pub trait Device {
    /// Compiles and links the two stage sources into a program. Failure is
    /// fatal for the compile and the error message carries a line-numbered
    /// dump of the offending source.
    fn create_program(&mut self, vertex_source: &str, fragment_source: &str)
        -> Result<ProgramId>;

    fn create_buffer(&mut self, kind: BufferKind, size: usize) -> Result<BufferId>;

    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<()>;

    /// Attaches a uniform buffer to a uniform-block binding slot.
    fn bind_uniform_buffer(&mut self, buffer: BufferId, binding: usize) -> Result<()>;

    fn draw_triangles(
        &mut self,
        program: ProgramId,
        vertex_buffer: BufferId,
        index_buffer: BufferId,
        nb_triangles: usize,
    ) -> Result<()>;
}

/// Prefixes every line of `source` with its 1-based line number, for
/// compile-fault diagnostics.
pub fn add_line_numbers(source: &str) -> String {
    source
        .lines()
        .enumerate()
        .map(|(number, line)| format!("[{:4}] {}\n", number + 1, line))
        .collect()
}

fn check_stage(source: &str, stage: naga::ShaderStage, label: &str) -> Result<()> {
    let mut frontend = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options::from(stage);

    let module = frontend.parse(&options, source).map_err(|errors| {
        let messages: Vec<String> = errors
            .errors
            .iter()
            .map(|error| format!("  {:?}", error.kind))
            .collect();
        anyhow!(
            "error compiling {} shader\nshader code:\n{}\nerrors:\n{}",
            label,
            add_line_numbers(source),
            messages.join("\n"),
        )
    })?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|error| {
        anyhow!(
            "error validating {} shader\nshader code:\n{}\nerror: {:?}",
            label,
            add_line_numbers(source),
            error,
        )
    })?;

    Ok(())
}

#[derive(Debug, Clone)]
struct StoredBuffer {
    kind: BufferKind,
    data: Vec<u8>,
}

/// Record of one draw issued through a [`HeadlessDevice`], kept for
/// inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRecord {
    pub program: ProgramId,
    pub nb_triangles: usize,
}

/// Driverless [`Device`]: naga stands in for the shader compiler, buffers
/// live in host memory, draws are recorded instead of rasterized.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    programs: usize,
    buffers: Vec<StoredBuffer>,
    uniform_bindings: HashMap<usize, BufferId>,
    draws: Vec<DrawRecord>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        HeadlessDevice::default()
    }

    pub fn buffer_data(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(buffer).map(|stored| stored.data.as_slice())
    }

    pub fn bound_uniform_buffer(&self, binding: usize) -> Option<BufferId> {
        self.uniform_bindings.get(&binding).copied()
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    fn buffer_mut(&mut self, buffer: BufferId) -> Result<&mut StoredBuffer> {
        self.buffers
            .get_mut(buffer)
            .ok_or_else(|| anyhow!("unknown buffer handle [{}]", buffer))
    }
}

impl Device for HeadlessDevice {
    fn create_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramId> {
        check_stage(vertex_source, naga::ShaderStage::Vertex, "vertex")?;
        check_stage(fragment_source, naga::ShaderStage::Fragment, "fragment")?;
        let program = self.programs;
        self.programs += 1;
        debug!(program, "compiled shader program");
        Ok(program)
    }

    fn create_buffer(&mut self, kind: BufferKind, size: usize) -> Result<BufferId> {
        let buffer = self.buffers.len();
        self.buffers.push(StoredBuffer { kind, data: vec![0; size] });
        Ok(buffer)
    }

    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<()> {
        let stored = self.buffer_mut(buffer)?;
        stored.data = data.to_vec();
        Ok(())
    }

    fn bind_uniform_buffer(&mut self, buffer: BufferId, binding: usize) -> Result<()> {
        let stored = self.buffer_mut(buffer)?;
        if stored.kind != BufferKind::Uniform {
            bail!("buffer [{}] is not a uniform buffer", buffer);
        }
        self.uniform_bindings.insert(binding, buffer);
        Ok(())
    }

    fn draw_triangles(
        &mut self,
        program: ProgramId,
        vertex_buffer: BufferId,
        index_buffer: BufferId,
        nb_triangles: usize,
    ) -> Result<()> {
        if program >= self.programs {
            bail!("unknown program handle [{}]", program);
        }
        self.buffer_mut(vertex_buffer)?;
        self.buffer_mut(index_buffer)?;
        trace!(program, nb_triangles, "recording draw");
        self.draws.push(DrawRecord { program, nb_triangles });
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_numbers_are_one_based_and_padded() {
        let numbered = add_line_numbers("first\nsecond");
        assert_eq!(numbered, "[   1] first\n[   2] second\n");
    }

    #[test]
    fn invalid_stage_source_reports_numbered_dump() {
        let mut device = HeadlessDevice::new();
        let error = device
            .create_program("#version 450\nthis is not glsl\n", "#version 450\nvoid main() {}\n")
            .unwrap_err()
            .to_string();
        assert!(error.contains("error compiling vertex shader"));
        assert!(error.contains("[   2] this is not glsl"));
    }

    #[test]
    fn buffers_round_trip_their_contents() {
        let mut device = HeadlessDevice::new();
        let buffer = device.create_buffer(BufferKind::Uniform, 8).unwrap();
        device.write_buffer(buffer, &[1, 2, 3, 4]).unwrap();
        assert_eq!(device.buffer_data(buffer), Some([1, 2, 3, 4].as_slice()));
    }

    #[test]
    fn only_uniform_buffers_accept_uniform_bindings() {
        let mut device = HeadlessDevice::new();
        let vertex = device.create_buffer(BufferKind::Vertex, 0).unwrap();
        assert!(device.bind_uniform_buffer(vertex, 0).is_err());

        let uniform = device.create_buffer(BufferKind::Uniform, 16).unwrap();
        device.bind_uniform_buffer(uniform, 3).unwrap();
        assert_eq!(device.bound_uniform_buffer(3), Some(uniform));
    }
}
