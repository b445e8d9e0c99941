//! The pipeline façade: one dialect source compiled into a program plus the
//! reflected layouts driving every runtime accessor.
//!
//! Construction runs the whole text pipeline up front (include expansion,
//! stage derivation, reflection); the GPU program and the uniform objects
//! are created lazily on first activation, first object creation or first
//! named-accessor lookup, and the pipeline never reverts to the unloaded
//! state.

use crate::{
    blocks::{
        ATTRIBUTE_BLOCK_PREFIX,
        CONSTANT_BLOCK_PREFIX,
    },
    context::ShaderContext,
    device::{
        BufferId,
        BufferKind,
        Device,
        ProgramId,
    },
    include::expand_includes,
    instruction::parse_instructions,
    layout::{
        SamplerLayout,
        StorageLayout,
        UniformLayout,
        build_structures,
        sampler_layouts,
        storage_layout,
        uniform_layouts,
    },
    stage::{
        compose_fragment_source,
        compose_vertex_source,
    },
    uniform::{
        Pack,
        UniformObject,
    },
};
use std::collections::HashMap;
use anyhow::{
    Result,
    anyhow,
    bail,
};


/// Opaque handle of an external texture resource attached to a sampler.
pub type TextureId = u64;

/// Sampler slot of a loaded pipeline: a fixed texture unit plus whatever
/// texture the caller attached to it.
#[derive(Debug)]
pub struct TextureSlot {
    unit: usize,
    attached: Option<TextureId>,
}

impl TextureSlot {
    fn new(unit: usize) -> Self {
        TextureSlot { unit, attached: None }
    }

    pub fn unit(&self) -> usize {
        self.unit
    }

    pub fn attach(&mut self, texture: TextureId) {
        self.attached = Some(texture);
    }

    pub fn attached(&self) -> Option<TextureId> {
        self.attached
    }
}

#[derive(Debug)]
struct LoadedProgram {
    program: ProgramId,
    textures: HashMap<String, TextureSlot>,
}

/// Drawable unit created by a pipeline: vertex and index storage laid out
/// by the reflected storage layout, plus one uniform object per attribute
/// block.
#[derive(Debug)]
pub struct Object {
    stride: usize,
    vertex_buffer: BufferId,
    index_buffer: BufferId,
    nb_indices: usize,
    attributes: HashMap<String, UniformObject>,
}

impl Object {
    fn new(
        device: &mut dyn Device,
        storage: &StorageLayout,
        attribute_layouts: &HashMap<String, UniformLayout>,
    ) -> Result<Self> {
        let vertex_buffer = device.create_buffer(BufferKind::Vertex, 0)?;
        let index_buffer = device.create_buffer(BufferKind::Index, 0)?;
        let mut attributes = HashMap::new();
        for (name, layout) in attribute_layouts {
            attributes.insert(name.clone(), UniformObject::new(device, layout)?);
        }
        Ok(Object {
            stride: storage.stride,
            vertex_buffer,
            index_buffer,
            nb_indices: 0,
            attributes,
        })
    }

    /// Uploads packed vertex data. `vertex_size` is the size of one vertex
    /// in `data` and must match the reflected stride; 0 skips the check for
    /// callers feeding pre-validated data.
    pub fn set_vertices_bytes(
        &mut self,
        device: &mut dyn Device,
        data: &[u8],
        vertex_size: usize,
    ) -> Result<()> {
        if vertex_size != self.stride && vertex_size != 0 {
            bail!(
                "unexpected vertex size: expected [{}] received [{}]",
                self.stride,
                vertex_size,
            );
        }
        device.write_buffer(self.vertex_buffer, data)
    }

    /// Uploads vertices given as packable values, one per vertex.
    pub fn set_vertices<V: Pack>(
        &mut self,
        device: &mut dyn Device,
        vertices: &[V],
    ) -> Result<()> {
        let mut data = Vec::new();
        for vertex in vertices {
            vertex.pack(&mut data);
        }
        let vertex_size = if vertices.is_empty() { 0 } else { data.len() / vertices.len() };
        self.set_vertices_bytes(device, &data, vertex_size)
    }

    pub fn set_indices(&mut self, device: &mut dyn Device, indices: &[u32]) -> Result<()> {
        self.nb_indices = indices.len();
        let mut data = Vec::with_capacity(indices.len() * 4);
        for index in indices {
            index.pack(&mut data);
        }
        device.write_buffer(self.index_buffer, &data)
    }

    pub fn nb_vertices(&self) -> usize {
        self.nb_indices
    }

    pub fn nb_triangles(&self) -> usize {
        self.nb_indices / 3
    }

    /// Per-object uniform block, by instance name.
    pub fn attribute(&mut self, name: &str) -> Result<&mut UniformObject> {
        self.attributes
            .get_mut(name)
            .ok_or_else(|| anyhow!("object has no attribute [{}]", name))
    }

    fn push_attributes(&mut self, device: &mut dyn Device) -> Result<()> {
        for attribute in self.attributes.values_mut() {
            attribute.push(device)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Pipeline {
    vertex_source: String,
    fragment_source: String,
    storage_layout: StorageLayout,
    constants_layout: HashMap<String, UniformLayout>,
    attributes_layout: HashMap<String, UniformLayout>,
    samplers_layout: HashMap<String, SamplerLayout>,
    loaded: Option<LoadedProgram>,
}

impl Pipeline {
    /// Runs the dialect source through include expansion, stage derivation
    /// and reflection. No device work happens here; the program is
    /// compiled on first use.
    pub fn new(context: &mut ShaderContext, code: &str) -> Result<Self> {
        let unified = expand_includes(code)?;

        let vertex_source = compose_vertex_source(&unified, &mut context.registry)?;
        let fragment_source = compose_fragment_source(&unified, &mut context.registry)?;

        let instructions = parse_instructions(&vertex_source);
        let structures = build_structures(&instructions)?;

        let storage = storage_layout(&instructions, &structures)?;
        let constants_layout =
            uniform_layouts(&instructions, &structures, CONSTANT_BLOCK_PREFIX)?;
        let attributes_layout =
            uniform_layouts(&instructions, &structures, ATTRIBUTE_BLOCK_PREFIX)?;
        let samplers_layout = sampler_layouts(&instructions);

        debug!(
            constants = constants_layout.len(),
            attributes = attributes_layout.len(),
            samplers = samplers_layout.len(),
            stride = storage.stride,
            "reflected pipeline layouts"
        );

        Ok(Pipeline {
            vertex_source,
            fragment_source,
            storage_layout: storage,
            constants_layout,
            attributes_layout,
            samplers_layout,
            loaded: None,
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn vertex_source(&self) -> &str {
        &self.vertex_source
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment_source
    }

    pub fn storage_layout(&self) -> &StorageLayout {
        &self.storage_layout
    }

    fn load(&mut self, context: &mut ShaderContext, device: &mut dyn Device) -> Result<()> {
        if self.loaded.is_some() {
            return Ok(());
        }
        debug!("loading shader program");

        let program = device.create_program(&self.vertex_source, &self.fragment_source)?;

        for (name, layout) in &self.constants_layout {
            if !context.constants.contains_key(name) {
                context
                    .constants
                    .insert(name.clone(), UniformObject::new(device, layout)?);
            }
        }

        let mut textures = HashMap::new();
        for (name, layout) in &self.samplers_layout {
            textures.insert(name.clone(), TextureSlot::new(layout.binding));
        }

        self.loaded = Some(LoadedProgram { program, textures });
        Ok(())
    }

    /// Compiles the program if this is the first use.
    pub fn activate(
        &mut self,
        context: &mut ShaderContext,
        device: &mut dyn Device,
    ) -> Result<()> {
        self.load(context, device)
    }

    /// Named constant block. The uniform object lives in the context and is
    /// shared with every other pipeline declaring the same block.
    pub fn constant<'c>(
        &mut self,
        context: &'c mut ShaderContext,
        device: &mut dyn Device,
        name: &str,
    ) -> Result<&'c mut UniformObject> {
        self.load(context, device)?;
        if !self.constants_layout.contains_key(name) {
            bail!("pipeline has no constant [{}]", name);
        }
        context
            .constants
            .get_mut(name)
            .ok_or_else(|| anyhow!("constant [{}] missing from context", name))
    }

    /// Named texture slot.
    pub fn texture(
        &mut self,
        context: &mut ShaderContext,
        device: &mut dyn Device,
        name: &str,
    ) -> Result<&mut TextureSlot> {
        self.load(context, device)?;
        let loaded = self
            .loaded
            .as_mut()
            .ok_or_else(|| anyhow!("pipeline failed to load"))?;
        loaded
            .textures
            .get_mut(name)
            .ok_or_else(|| anyhow!("pipeline has no texture [{}]", name))
    }

    /// Creates a drawable object laid out by this pipeline's reflected
    /// storage and attribute layouts.
    pub fn create_object(
        &mut self,
        context: &mut ShaderContext,
        device: &mut dyn Device,
    ) -> Result<Object> {
        self.load(context, device)?;
        Object::new(device, &self.storage_layout, &self.attributes_layout)
    }

    /// Uploads every dirty uniform attached to this pipeline and issues the
    /// draw for `object`.
    pub fn render(
        &mut self,
        context: &mut ShaderContext,
        device: &mut dyn Device,
        object: &mut Object,
    ) -> Result<()> {
        self.load(context, device)?;

        for name in self.constants_layout.keys() {
            let constant = context
                .constants
                .get_mut(name)
                .ok_or_else(|| anyhow!("constant [{}] missing from context", name))?;
            constant.push(device)?;
        }
        object.push_attributes(device)?;

        let loaded = self
            .loaded
            .as_ref()
            .ok_or_else(|| anyhow!("pipeline failed to load"))?;
        device.draw_triangles(
            loaded.program,
            object.vertex_buffer,
            object.index_buffer,
            object.nb_triangles(),
        )
    }
}
