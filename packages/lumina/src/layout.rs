//! Reflection of the instruction list into typed, padded layouts.
//!
//! The structure table maps each GLSL type name to a [`Structure`]
//! describing its fields, their byte offsets with GPU uniform-buffer
//! alignment padding, and the total padded size. Offsets follow the
//! 16-byte slot rule: a field whose padded size does not fit the remainder
//! of the current slot starts a new one, and the total padded size rounds
//! up to a slot boundary. The same table feeds both the vertex-attribute
//! stride computation and the uniform-block byte layout, so the two can
//! never disagree about the shape of a type.

use crate::instruction::{
    Field,
    Instruction,
};
use std::{
    collections::HashMap,
    sync::Arc,
};
use anyhow::{
    Result,
    anyhow,
    bail,
};


const SLOT_SIZE: i64 = 16;

/// Component type of a scalar or vector structure. `Byte` marks aggregate
/// structures whose components are described by their fields instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Float,
    Int,
    Uint,
    Byte,
}

/// One named field within a [`Structure`].
#[derive(Debug, Clone)]
pub struct StructureField {
    pub name: String,
    /// Byte offset in the padded GPU image.
    pub offset_padded: usize,
    /// Byte offset in the packed CPU image.
    pub offset_unpadded: usize,
    /// Declared array length, 1 for plain fields.
    pub len: usize,
    pub structure: Arc<Structure>,
}

/// Field layout of a named type: sizes with and without alignment padding
/// and the ordered field list. Built once per pipeline compile, shared by
/// reference from every layout that mentions the type.
#[derive(Debug)]
pub struct Structure {
    pub scalar: ScalarKind,
    pub nb_element: usize,
    pub size_padded: usize,
    pub size_unpadded: usize,
    pub fields: Vec<StructureField>,
}

impl Structure {
    fn leaf(scalar: ScalarKind, nb_element: usize, size: usize) -> Arc<Self> {
        Arc::new(Structure {
            scalar,
            nb_element,
            size_padded: size,
            size_unpadded: size,
            fields: Vec::new(),
        })
    }

    /// Builds an aggregate structure from declared fields, resolving field
    /// types against `table` and assigning slot-padded offsets.
    fn from_fields(
        table: &HashMap<String, Arc<Structure>>,
        fields: &[Field],
    ) -> Result<Self> {
        let mut offset_padded: i64 = 0;
        let mut offset_unpadded: i64 = 0;
        let mut bytes_left = SLOT_SIZE;
        let mut elements = Vec::new();

        for field in fields {
            let structure = table
                .get(&field.type_name)
                .ok_or_else(|| anyhow!("no structure [{}] found", field.type_name))?
                .clone();

            if bytes_left != SLOT_SIZE && structure.size_padded as i64 > bytes_left {
                offset_padded += bytes_left;
                bytes_left = SLOT_SIZE;
            }

            elements.push(StructureField {
                name: field.name.clone(),
                offset_padded: offset_padded as usize,
                offset_unpadded: offset_unpadded as usize,
                len: field.len,
                structure: structure.clone(),
            });

            for _ in 0..field.len {
                if bytes_left != SLOT_SIZE && structure.size_padded as i64 > bytes_left {
                    offset_padded += bytes_left;
                    bytes_left = SLOT_SIZE;
                }
                offset_padded += structure.size_padded as i64;
                offset_unpadded += structure.size_unpadded as i64;
                bytes_left -= structure.size_padded as i64;
                while bytes_left < 0 {
                    bytes_left += SLOT_SIZE;
                }
            }
        }

        let mut size_padded = offset_padded as usize;
        if size_padded % SLOT_SIZE as usize != 0 {
            size_padded += SLOT_SIZE as usize - size_padded % SLOT_SIZE as usize;
        }

        Ok(Structure {
            scalar: ScalarKind::Byte,
            nb_element: 1,
            size_padded,
            size_unpadded: offset_unpadded as usize,
            fields: elements,
        })
    }

    pub fn field(&self, name: &str) -> Option<&StructureField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Scatters a packed source image into a padded destination image,
    /// recursing through nested structures. `src` must be exactly
    /// `size_unpadded` bytes and `dst` at least `size_padded` bytes.
    pub fn write(&self, dst: &mut [u8], src: &[u8]) {
        if self.fields.is_empty() {
            dst[..src.len()].copy_from_slice(src);
            return;
        }
        for field in &self.fields {
            for index in 0..field.len {
                let padded = field.offset_padded + field.structure.size_padded * index;
                let unpadded = field.offset_unpadded + field.structure.size_unpadded * index;
                field.structure.write(
                    &mut dst[padded..padded + field.structure.size_padded],
                    &src[unpadded..unpadded + field.structure.size_unpadded],
                );
            }
        }
    }
}

/// Structure table seeded with the built-in scalar, vector and matrix
/// types.
fn builtin_structures() -> HashMap<String, Arc<Structure>> {
    let float = std::mem::size_of::<f32>();
    HashMap::from([
        ("int".to_string(), Structure::leaf(ScalarKind::Int, 1, float)),
        ("uint".to_string(), Structure::leaf(ScalarKind::Uint, 1, float)),
        ("float".to_string(), Structure::leaf(ScalarKind::Float, 1, float)),

        ("vec2".to_string(), Structure::leaf(ScalarKind::Float, 2, float * 2)),
        ("ivec2".to_string(), Structure::leaf(ScalarKind::Int, 2, float * 2)),
        ("uvec2".to_string(), Structure::leaf(ScalarKind::Uint, 2, float * 2)),

        ("vec3".to_string(), Structure::leaf(ScalarKind::Float, 3, float * 3)),
        ("ivec3".to_string(), Structure::leaf(ScalarKind::Int, 3, float * 3)),
        ("uvec3".to_string(), Structure::leaf(ScalarKind::Uint, 3, float * 3)),

        ("vec4".to_string(), Structure::leaf(ScalarKind::Float, 4, float * 4)),
        ("ivec4".to_string(), Structure::leaf(ScalarKind::Int, 4, float * 4)),
        ("uvec4".to_string(), Structure::leaf(ScalarKind::Uint, 4, float * 4)),

        ("mat4".to_string(), Structure::leaf(ScalarKind::Float, 16, float * 16)),
    ])
}

/// Builds the full structure table for a compiled stage: built-in types,
/// then declared structs, then uniform-block types (in that order, so block
/// fields can reference declared structs).
pub fn build_structures(
    instructions: &[Instruction],
) -> Result<HashMap<String, Arc<Structure>>> {
    let mut table = builtin_structures();

    for instruction in instructions {
        if let Instruction::Struct { type_name, fields } = instruction {
            let structure = Structure::from_fields(&table, fields)?;
            table.insert(type_name.clone(), Arc::new(structure));
        }
    }
    for instruction in instructions {
        if let Instruction::UniformBlock { type_name, fields, .. } = instruction {
            let structure = Structure::from_fields(&table, fields)?;
            table.insert(type_name.clone(), Arc::new(structure));
        }
    }
    Ok(table)
}

/// One vertex attribute within a [`StorageLayout`].
#[derive(Debug, Clone)]
pub struct StorageElement {
    pub location: u32,
    pub nb_element: usize,
    pub scalar: ScalarKind,
    pub offset: usize,
}

/// Interleaved vertex-buffer layout derived from the stage's declared
/// inputs: attribute offsets are the running stride in ascending location
/// order and the stride is the packed vertex size.
#[derive(Debug, Clone, Default)]
pub struct StorageLayout {
    pub stride: usize,
    pub elements: Vec<StorageElement>,
}

pub fn storage_layout(
    instructions: &[Instruction],
    table: &HashMap<String, Arc<Structure>>,
) -> Result<StorageLayout> {
    let mut inputs: Vec<(u32, &str)> = instructions
        .iter()
        .filter_map(|instruction| match instruction {
            Instruction::Input { location, type_name, .. } => {
                Some((*location, type_name.as_str()))
            }
            _ => None,
        })
        .collect();
    inputs.sort_by_key(|&(location, _)| location);

    let mut layout = StorageLayout::default();
    for (location, type_name) in inputs {
        let structure = table
            .get(type_name)
            .ok_or_else(|| anyhow!("no structure [{}] found", type_name))?;
        layout.elements.push(StorageElement {
            location,
            nb_element: structure.nb_element,
            scalar: structure.scalar,
            offset: layout.stride,
        });
        layout.stride += structure.size_unpadded;
    }
    Ok(layout)
}

/// Binding of one uniform-block instance: its synthesized block-type name,
/// binding slot and resolved structure.
#[derive(Debug, Clone)]
pub struct UniformLayout {
    pub type_name: String,
    pub binding: usize,
    pub structure: Arc<Structure>,
}

/// Collects the uniform-block instances whose block-type name starts with
/// `prefix`, keyed by instance name.
pub fn uniform_layouts(
    instructions: &[Instruction],
    table: &HashMap<String, Arc<Structure>>,
    prefix: &str,
) -> Result<HashMap<String, UniformLayout>> {
    let mut layouts = HashMap::new();
    for instruction in instructions {
        let Instruction::UniformBlock { binding, type_name, instance_name, .. } = instruction
        else {
            continue;
        };
        if !type_name.starts_with(prefix) {
            continue;
        }
        let structure = table
            .get(type_name)
            .ok_or_else(|| anyhow!("no structure [{}] found", type_name))?;
        layouts.insert(instance_name.clone(), UniformLayout {
            type_name: type_name.clone(),
            binding: *binding,
            structure: structure.clone(),
        });
    }
    Ok(layouts)
}

/// Texture-unit assignment of one sampler uniform.
#[derive(Debug, Clone)]
pub struct SamplerLayout {
    pub binding: usize,
}

/// Assigns sequential texture units to the stage's sampler uniforms in
/// encounter order, keyed by sampler name.
pub fn sampler_layouts(instructions: &[Instruction]) -> HashMap<String, SamplerLayout> {
    let mut layouts = HashMap::new();
    let mut unit = 0;
    for instruction in instructions {
        if let Instruction::Sampler { type_name, name } = instruction {
            if type_name != "sampler2D" {
                continue;
            }
            layouts.insert(name.clone(), SamplerLayout { binding: unit });
            unit += 1;
        }
    }
    layouts
}

/// Resolves a dotted element path (`"field"` or `"field.sub"`) to its
/// padded offset, structure and array length.
pub(crate) fn resolve_element_path<'a>(
    structure: &'a Structure,
    path: &str,
) -> Result<(usize, &'a Arc<Structure>, usize)> {
    let mut current = structure;
    let mut offset = 0;
    let mut resolved: Option<(usize, &Arc<Structure>, usize)> = None;

    for segment in path.split('.') {
        let field = current
            .field(segment)
            .ok_or_else(|| anyhow!("no element [{}] in structure", path))?;
        offset += field.offset_padded;
        resolved = Some((offset, &field.structure, field.len));
        current = field.structure.as_ref();
    }
    match resolved {
        Some(element) => Ok(element),
        None => bail!("no element [{}] in structure", path),
    }
}
