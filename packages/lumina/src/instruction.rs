//! Extraction of a flat instruction list from a composed vertex-stage
//! source: declared inputs, uniform blocks, sampler uniforms and struct
//! declarations. The layout reflector consumes this list to build the
//! structure table and the storage, uniform and sampler layouts.

use regex::Regex;


/// One field of a struct or uniform-block body. `len` is the declared array
/// length, 1 for non-array fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub type_name: String,
    pub name: String,
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Input {
        location: u32,
        type_name: String,
        name: String,
    },
    UniformBlock {
        binding: usize,
        type_name: String,
        instance_name: String,
        fields: Vec<Field>,
    },
    Sampler {
        type_name: String,
        name: String,
    },
    Struct {
        type_name: String,
        fields: Vec<Field>,
    },
}

/// Collapses runs of spaces and tabs and removes every newline past the
/// first line, so that multi-line declarations match single-line patterns.
/// The first line is kept verbatim; a leading `#version` directive must stay
/// on its own line.
fn sanitize(source: &str) -> String {
    let (first_line, rest) = match source.find('\n') {
        Some(index) => source.split_at(index + 1),
        None => (source, ""),
    };
    let collapsed = Regex::new(r"[ \t]+").unwrap().replace_all(rest, " ");
    let collapsed = Regex::new(r"\n+").unwrap().replace_all(&collapsed, "");
    format!("{}{}", first_line, collapsed)
}

fn parse_fields(body: &str) -> Vec<Field> {
    let pattern = Regex::new(r"(\w+)\s+(\w+)(?:\[(\d+)\])?").unwrap();
    pattern
        .captures_iter(body)
        .map(|captures| Field {
            type_name: captures[1].to_string(),
            name: captures[2].to_string(),
            len: captures
                .get(3)
                .and_then(|len| len.as_str().parse().ok())
                .unwrap_or(1),
        })
        .collect()
}

/// Parses the composed stage source into its instruction list. Declarations
/// of each kind are returned in source order.
pub fn parse_instructions(source: &str) -> Vec<Instruction> {
    let clean = sanitize(source);
    let mut result = Vec::new();

    let struct_pattern =
        Regex::new(r"struct\s+(\w+)\s*\{([^}]*)\}\s*;").unwrap();
    for captures in struct_pattern.captures_iter(&clean) {
        result.push(Instruction::Struct {
            type_name: captures[1].to_string(),
            fields: parse_fields(&captures[2]),
        });
    }

    let uniform_block_pattern = Regex::new(
        r"layout\s*\(\s*binding\s*=\s*(\d+)\s*\)\s*uniform\s+(\w+)\s*\{([^}]*)\}\s*(\w+)\s*;",
    ).unwrap();
    for captures in uniform_block_pattern.captures_iter(&clean) {
        let Ok(binding) = captures[1].parse() else {
            continue;
        };
        result.push(Instruction::UniformBlock {
            binding,
            type_name: captures[2].to_string(),
            instance_name: captures[4].to_string(),
            fields: parse_fields(&captures[3]),
        });
    }

    let sampler_pattern = Regex::new(r"\buniform\s+(\w+)\s+(\w+)\s*;").unwrap();
    for captures in sampler_pattern.captures_iter(&clean) {
        result.push(Instruction::Sampler {
            type_name: captures[1].to_string(),
            name: captures[2].to_string(),
        });
    }

    let input_pattern = Regex::new(
        r"layout\s*\(\s*location\s*=\s*(\d+)\s*\)\s*in\s+(\w+)\s+(\w+)\s*;",
    ).unwrap();
    for captures in input_pattern.captures_iter(&clean) {
        let Ok(location) = captures[1].parse() else {
            continue;
        };
        result.push(Instruction::Input {
            location,
            type_name: captures[2].to_string(),
            name: captures[3].to_string(),
        });
    }

    result
}


#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX_SOURCE: &'static str = "\
#version 450

layout (location = 0) in vec3 position;
layout (location = 1) in vec2 uv;

struct Transform
{
    vec3 translation;
    vec3 scale;
    vec4 rotation;
};

layout(binding = 0) uniform ConstantBlock_camera
{
    mat4 view;
    mat4 projection;
} camera;

layout(binding = 1) uniform AttributeBlock_model
{
    Transform transforms[4];
} model;

uniform sampler2D diffuse;

void main()
{
    gl_Position = vec4(position, 1.0);
}
";

    fn inputs(instructions: &[Instruction]) -> Vec<(u32, String, String)> {
        instructions
            .iter()
            .filter_map(|instruction| match instruction {
                Instruction::Input { location, type_name, name } => {
                    Some((*location, type_name.clone(), name.clone()))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn inputs_are_parsed_with_locations() {
        let instructions = parse_instructions(VERTEX_SOURCE);
        assert_eq!(inputs(&instructions), vec![
            (0, "vec3".to_string(), "position".to_string()),
            (1, "vec2".to_string(), "uv".to_string()),
        ]);
    }

    #[test]
    fn struct_declaration_is_parsed_with_fields() {
        let instructions = parse_instructions(VERTEX_SOURCE);
        let fields = instructions.iter().find_map(|instruction| match instruction {
            Instruction::Struct { type_name, fields } if type_name == "Transform" => {
                Some(fields.clone())
            }
            _ => None,
        }).unwrap();
        assert_eq!(fields, vec![
            Field { type_name: "vec3".to_string(), name: "translation".to_string(), len: 1 },
            Field { type_name: "vec3".to_string(), name: "scale".to_string(), len: 1 },
            Field { type_name: "vec4".to_string(), name: "rotation".to_string(), len: 1 },
        ]);
    }

    #[test]
    fn uniform_blocks_carry_binding_type_and_instance_name() {
        let instructions = parse_instructions(VERTEX_SOURCE);
        let blocks: Vec<_> = instructions
            .iter()
            .filter_map(|instruction| match instruction {
                Instruction::UniformBlock { binding, type_name, instance_name, .. } => {
                    Some((*binding, type_name.as_str(), instance_name.as_str()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(blocks, vec![
            (0, "ConstantBlock_camera", "camera"),
            (1, "AttributeBlock_model", "model"),
        ]);
    }

    #[test]
    fn array_fields_carry_their_length() {
        let instructions = parse_instructions(VERTEX_SOURCE);
        let field = instructions
            .iter()
            .find_map(|instruction| match instruction {
                Instruction::UniformBlock { instance_name, fields, .. }
                    if instance_name == "model" => fields.first().cloned(),
                _ => None,
            })
            .unwrap();
        assert_eq!(field, Field {
            type_name: "Transform".to_string(),
            name: "transforms".to_string(),
            len: 4,
        });
    }

    #[test]
    fn sampler_uniform_is_parsed() {
        let instructions = parse_instructions(VERTEX_SOURCE);
        assert!(instructions.iter().any(|instruction| matches!(
            instruction,
            Instruction::Sampler { type_name, name }
                if type_name == "sampler2D" && name == "diffuse"
        )));
    }

    #[test]
    fn block_instance_names_do_not_register_as_samplers() {
        let instructions = parse_instructions(VERTEX_SOURCE);
        let samplers = instructions
            .iter()
            .filter(|instruction| matches!(instruction, Instruction::Sampler { .. }))
            .count();
        assert_eq!(samplers, 1);
    }
}
