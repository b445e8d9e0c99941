//! End-to-end checks of the dialect pipeline: one source in, two compiling
//! stage sources and reflected layouts out.

use lumina::{
    HeadlessDevice,
    Pipeline,
    ScalarKind,
    ShaderContext,
};


const MINIMAL: &str = "\
#version 450

Input -> Geometry: vec3 position;
Geometry -> Render: vec2 uv;

void geometryPass()
{
    uv = position.xy;
    pixelPosition = vec4(position, 1.0);
}

void renderPass()
{
    pixelColor = vec4(uv, 0.0, 1.0);
}
";

#[test]
fn minimal_source_compiles_to_the_documented_interface() {
    let mut context = ShaderContext::new();
    let pipeline = Pipeline::new(&mut context, MINIMAL).unwrap();

    let vertex = pipeline.vertex_source();
    assert!(vertex.contains("layout (location = 0) in vec3 position;"));
    assert!(vertex.contains("layout (location = 0) out vec2 uv;"));
    assert!(vertex.contains("layout (location = 1) out float pixelDepth;"));

    let fragment = pipeline.fragment_source();
    assert!(fragment.contains("layout (location = 0) in vec2 uv;"));
    assert!(fragment.contains("layout (location = 1) in float pixelDepth;"));
    assert!(fragment.contains("layout (location = 0) out vec4 pixelColor;"));
}

#[test]
fn minimal_source_passes_stage_validation() {
    let mut context = ShaderContext::new();
    let mut device = HeadlessDevice::new();
    let mut pipeline = Pipeline::new(&mut context, MINIMAL).unwrap();
    pipeline.activate(&mut context, &mut device).unwrap();
}

#[test]
fn full_featured_source_compiles_and_draws() {
    let source = "\
#version 450

#include <cameraConstants>

Input -> Geometry: vec3 position;
Input -> Geometry: vec2 vertexUv;
Geometry -> Render: vec2 uv;

AttributeBlock model
{
    mat4 transform;
};

Texture diffuse;

void geometryPass()
{
    uv = vertexUv;
    pixelPosition = cameraConstants.projection * cameraConstants.view * model.transform * vec4(position, 1.0);
}

void renderPass()
{
    pixelColor = texture(diffuse, uv);
}
";
    let mut context = ShaderContext::new();
    let mut device = HeadlessDevice::new();
    let mut pipeline = Pipeline::new(&mut context, source).unwrap();

    let storage = pipeline.storage_layout();
    assert_eq!(storage.stride, 12 + 8);
    assert_eq!(storage.elements.len(), 2);
    assert_eq!(storage.elements[0].offset, 0);
    assert_eq!(storage.elements[0].scalar, ScalarKind::Float);
    assert_eq!(storage.elements[1].offset, 12);

    let mut object = pipeline.create_object(&mut context, &mut device).unwrap();
    object
        .set_vertices(&mut device, &[
            [0.0f32, 0.0, 0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0, 1.0, 0.0],
            [0.0, 1.0, 0.0, 0.0, 1.0],
        ])
        .unwrap();
    object.set_indices(&mut device, &[0, 1, 2]).unwrap();

    let identity = [
        [1.0f32, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];
    pipeline
        .constant(&mut context, &mut device, "cameraConstants")
        .unwrap()
        .set(&[identity, identity])
        .unwrap();
    object.attribute("model").unwrap().set(&identity).unwrap();
    pipeline
        .texture(&mut context, &mut device, "diffuse")
        .unwrap()
        .attach(1);

    pipeline.render(&mut context, &mut device, &mut object).unwrap();
    assert_eq!(device.draws().len(), 1);
    assert_eq!(device.draws()[0].nb_triangles, 1);
}

#[test]
fn shared_constant_blocks_keep_their_binding_across_pipelines() {
    let first_source = "\
#version 450

#include <cameraConstants>

void geometryPass() { pixelPosition = vec4(0.0); }
void renderPass() { pixelColor = vec4(1.0); }
";
    let second_source = "\
#version 450

ConstantBlock localData { vec4 tint; };

#include <cameraConstants>

void geometryPass() { pixelPosition = vec4(0.0); }
void renderPass() { pixelColor = localData.tint; }
";
    let mut context = ShaderContext::new();
    let mut device = HeadlessDevice::new();

    let mut first = Pipeline::new(&mut context, first_source).unwrap();
    let mut second = Pipeline::new(&mut context, second_source).unwrap();

    let first_binding = first
        .constant(&mut context, &mut device, "cameraConstants")
        .unwrap()
        .binding();
    let second_binding = second
        .constant(&mut context, &mut device, "cameraConstants")
        .unwrap()
        .binding();
    assert_eq!(first_binding, second_binding);

    // a body unseen before lands strictly above every assigned slot
    let local_binding = second
        .constant(&mut context, &mut device, "localData")
        .unwrap()
        .binding();
    assert!(local_binding > first_binding);
}

#[test]
fn shared_constants_are_backed_by_one_uniform_object() {
    let source = "\
#version 450

#include <timeConstants>

void geometryPass() { pixelPosition = vec4(0.0); }
void renderPass() { pixelColor = vec4(1.0); }
";
    let mut context = ShaderContext::new();
    let mut device = HeadlessDevice::new();

    let mut first = Pipeline::new(&mut context, source).unwrap();
    let mut second = Pipeline::new(&mut context, source).unwrap();

    first
        .constant(&mut context, &mut device, "timeConstants")
        .unwrap()
        .set(&42i32)
        .unwrap();

    // the second pipeline reads the value staged through the first
    let epoch = second
        .constant(&mut context, &mut device, "timeConstants")
        .unwrap();
    assert!(epoch.needs_update());
}

#[test]
fn compile_fault_carries_a_line_numbered_dump() {
    // renderPass returns a value of the wrong type, which only the stage
    // validator can notice
    let source = "\
#version 450

void geometryPass()
{
    pixelPosition = vec4(0.0);
}

void renderPass()
{
    pixelColor = notDeclaredAnywhere;
}
";
    let mut context = ShaderContext::new();
    let mut device = HeadlessDevice::new();
    let mut pipeline = Pipeline::new(&mut context, source).unwrap();

    let error = pipeline
        .activate(&mut context, &mut device)
        .unwrap_err()
        .to_string();
    assert!(error.contains("fragment"));
    assert!(error.contains("[   1] #version 450"));
}
