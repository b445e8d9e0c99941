//! Derivation of the two GLSL stage sources from one unified dialect
//! source.
//!
//! The dialect carries both stages in a single document: `geometryPass` is
//! the vertex-stage entry point, `renderPass` the fragment-stage entry
//! point, and `Input -> Geometry` / `Geometry -> Render` declarations name
//! the data flowing between stages. Each derivation keeps the half that
//! belongs to its stage, synthesizes the `in`/`out` interface from the
//! declared argument lists and wires an interpolated `pixelDepth` value
//! from the vertex stage into the fragment stage's depth output.

use crate::{
    blocks::{
        BindingRegistry,
        convert_attribute_blocks,
        convert_constant_blocks,
        convert_textures,
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
};
use anyhow::Result;


/// Derives the vertex-stage GLSL source from the include-expanded dialect
/// source.
pub fn compose_vertex_source(
    input_code: &str,
    registry: &mut BindingRegistry,
) -> Result<String> {
    let mut result = input_code.to_string();

    let version = extract_version_line(&mut result);

    convert_textures(&mut result);

    let input_arguments = argument_list(&result, "Input", "Geometry");
    let mut output_arguments = argument_list(&result, "Geometry", "Render");
    output_arguments.push(("float".to_string(), "pixelDepth".to_string()));
    remove_argument_list(&mut result);
    remove_function(&mut result, "renderPass");

    let input_lines = compose_layout_lines(&input_arguments, "in");
    let output_lines = compose_layout_lines(&output_arguments, "out");

    replace_function_declaration(&mut result, "void geometryPass()", "void main()");
    swap_word(&mut result, "pixelPosition", "gl_Position");
    insert_before_main_end(&mut result, "pixelDepth = gl_Position.z;");

    let first_free_binding = convert_constant_blocks(&mut result, registry)?;
    convert_attribute_blocks(&mut result, first_free_binding)?;

    debug!(
        inputs = input_arguments.len(),
        outputs = output_arguments.len(),
        "composed vertex stage"
    );
    Ok(format!("{}\n{}\n{}\n{}", version, input_lines, output_lines, result))
}

/// Derives the fragment-stage GLSL source from the include-expanded dialect
/// source.
pub fn compose_fragment_source(
    input_code: &str,
    registry: &mut BindingRegistry,
) -> Result<String> {
    let mut result = input_code.to_string();

    let version = extract_version_line(&mut result);

    convert_textures(&mut result);

    let mut input_arguments = argument_list(&result, "Geometry", "Render");
    input_arguments.push(("float".to_string(), "pixelDepth".to_string()));
    remove_argument_list(&mut result);
    remove_function(&mut result, "geometryPass");

    let input_lines = compose_layout_lines(&input_arguments, "in");
    let output_lines = compose_layout_lines(
        &[("vec4".to_string(), "pixelColor".to_string())],
        "out",
    );

    replace_function_declaration(&mut result, "void renderPass()", "void main()");
    insert_before_main_end(&mut result, "gl_FragDepth = pixelDepth;");

    let first_free_binding = convert_constant_blocks(&mut result, registry)?;
    convert_attribute_blocks(&mut result, first_free_binding)?;
    // textures declared past the blocks are still picked up by this second
    // pass; it is a no-op when the first pass already converted everything
    convert_textures(&mut result);

    debug!(inputs = input_arguments.len(), "composed fragment stage");
    Ok(format!("{}\n{}\n{}\n{}", version, input_lines, output_lines, result))
}
