//! Compilation pipeline for the Lumina shading dialect.
//!
//! Lumina is a GLSL superset carrying both shader stages in one source
//! document: `Input -> Geometry` and `Geometry -> Render` declarations
//! describe the data flowing between stages, `geometryPass` and
//! `renderPass` are the two entry points, and `ConstantBlock`,
//! `AttributeBlock` and `Texture` declarations replace raw uniform
//! plumbing. One dialect source is include-expanded, split into a vertex
//! and a fragment GLSL source, and reflected into typed, padded layouts
//! that drive every runtime buffer.

#[macro_use]
extern crate tracing;

mod blocks;
mod context;
mod device;
mod include;
mod instruction;
mod layout;
mod pipeline;
mod stage;
mod text;
mod uniform;

pub use crate::{
    blocks::{
        ATTRIBUTE_BLOCK_PREFIX,
        BindingRegistry,
        CONSTANT_BLOCK_PREFIX,
    },
    context::ShaderContext,
    device::{
        BufferId,
        BufferKind,
        Device,
        DrawRecord,
        HeadlessDevice,
        ProgramId,
        add_line_numbers,
    },
    include::expand_includes,
    instruction::{
        Field,
        Instruction,
        parse_instructions,
    },
    layout::{
        SamplerLayout,
        ScalarKind,
        StorageElement,
        StorageLayout,
        Structure,
        StructureField,
        UniformLayout,
        build_structures,
        sampler_layouts,
        storage_layout,
        uniform_layouts,
    },
    pipeline::{
        Object,
        Pipeline,
        TextureId,
        TextureSlot,
    },
    stage::{
        compose_fragment_source,
        compose_vertex_source,
    },
    text::{
        argument_list,
        compose_layout_lines,
        extract_version_line,
        insert_before_main_end,
        remove_argument_list,
        remove_function,
        replace_function_declaration,
        swap_word,
    },
    uniform::{
        Pack,
        UniformObject,
        pack_bytes,
    },
};
