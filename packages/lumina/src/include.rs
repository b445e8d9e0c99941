//! Recursive expansion of `#include "key"` and `#include <key>` directives.
//!
//! A key resolves against a small table of built-in snippets first and falls
//! back to a file read. The single highest `#version` seen anywhere in the
//! inclusion tree is hoisted to the top of the output and every per-file
//! version line is stripped along the way. Quoted directives are expanded to
//! completion before any bracket directive is considered; a bracket include
//! pulled in by a quoted include is therefore still resolved, while
//! top-level bracket includes wait for the quoted pass to finish.

use std::fs;
use anyhow::{
    Context,
    Result,
    bail,
};
use regex::Regex;


/// Built-in snippet table: utility structs, functions and shared blocks
/// available to every shader without a file on disk.
fn builtin_snippet(key: &str) -> Option<&'static str> {
    match key {
        "widgetAttribute" => Some(
            "AttributeBlock widgetAttribute { float layer; };",
        ),
        "screenConstants" => Some(
            "ConstantBlock screenConstants { mat4 canvasMVP; };",
        ),
        "cameraConstants" => Some(
            "ConstantBlock cameraConstants { mat4 view; mat4 projection; };",
        ),
        "timeConstants" => Some(
            "ConstantBlock timeConstants { int epoch; };",
        ),
        "transform" => Some(
            "struct Transform { vec3 translation; vec3 scale; vec4 rotation; };",
        ),
        "transformUtils" => Some(r"#include <transform>

vec4 quatMultiply(vec4 a, vec4 b)
{
    return vec4(a.w * b.xyz + b.w * a.xyz + cross(a.xyz, b.xyz), a.w * b.w - dot(a.xyz, b.xyz));
}

vec3 rotatePointByQuaternion(vec3 point, vec4 q)
{
    vec4 qConjugate = vec4(-q.x, -q.y, -q.z, q.w);
    vec4 rotated = quatMultiply(quatMultiply(q, vec4(point, 0.0)), qConjugate);
    return rotated.xyz;
}

vec3 applyTransform(vec3 position, Transform transform)
{
    vec3 rotatedPosition = rotatePointByQuaternion(position, transform.rotation);
    return transform.translation + (rotatedPosition * transform.scale);
}"),
        "spriteAnimation" => Some(
            "struct SpriteAnimation { int duration; ivec2 firstFrame; ivec2 frameOffset; int frameCount; };",
        ),
        _ => None,
    }
}

/// Parses the first `#version N` directive out of `source`, or 0 when there
/// is none.
pub(crate) fn extract_version(source: &str) -> u32 {
    let pattern = Regex::new(r"#version\s+(\d+)").unwrap();
    pattern
        .captures(source)
        .and_then(|captures| captures[1].parse().ok())
        .unwrap_or(0)
}

fn resolve_include(key: &str) -> Result<String> {
    if let Some(snippet) = builtin_snippet(key) {
        return Ok(snippet.to_string());
    }
    fs::read_to_string(key)
        .with_context(|| format!("failed to load include file [{}]", key))
}

/// Expands every directive matched by `include_pattern` in `source`,
/// recursively. `include_path` is the stack of keys currently being
/// expanded; a key already on the stack is a circular include and fails the
/// whole expansion.
fn expand_pass(
    include_path: &mut Vec<String>,
    highest_version: &mut u32,
    include_pattern: &Regex,
    version_pattern: &Regex,
    source: &mut String,
) -> Result<()> {
    loop {
        let (match_start, match_end, key) = {
            let Some(captures) = include_pattern.captures(source) else {
                break;
            };
            let Some(whole) = captures.get(0) else {
                break;
            };
            (whole.start(), whole.end(), captures[1].to_string())
        };

        if include_path.iter().any(|entry| entry == &key) {
            bail!("circular include detected: {}", key);
        }
        trace!("expanding include [{}]", key);

        let mut included = resolve_include(&key)? + "\n";
        include_path.push(key);

        let version = extract_version(&included);
        if version > *highest_version {
            *highest_version = version;
        }
        included = version_pattern.replace_all(&included, "").into_owned();

        expand_pass(
            include_path,
            highest_version,
            include_pattern,
            version_pattern,
            &mut included,
        )?;
        include_path.pop();

        included.push_str("\n\n");
        source.replace_range(match_start..match_end, &included);
    }
    Ok(())
}

/// Replaces every include directive in `source` by its resolved content and
/// hoists the highest version directive seen to the top of the result.
pub fn expand_includes(source: &str) -> Result<String> {
    let version_pattern = Regex::new(r"#version\s+\d+\s*\n").unwrap();
    let quoted_pattern = Regex::new(r#"#include\s*"([^"]+)"[ \t]*\n?"#).unwrap();
    let bracket_pattern = Regex::new(r"#include\s*<([^>]+)>[ \t]*\n?").unwrap();

    let mut include_path = Vec::new();
    let mut highest_version = extract_version(source);
    let mut code = version_pattern.replace_all(source, "").into_owned();

    expand_pass(
        &mut include_path,
        &mut highest_version,
        &quoted_pattern,
        &version_pattern,
        &mut code,
    )?;
    expand_pass(
        &mut include_path,
        &mut highest_version,
        &bracket_pattern,
        &version_pattern,
        &mut code,
    )?;

    if highest_version > 0 {
        code = format!("#version {}\n{}", highest_version, code);
    }
    Ok(code)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn source_without_includes_is_unchanged_modulo_version_hoisting() {
        let source = "void geometryPass()\n{\n}\n#version 450\nvoid renderPass()\n{\n}\n";
        let expanded = expand_includes(source).unwrap();
        assert_eq!(
            expanded,
            "#version 450\nvoid geometryPass()\n{\n}\nvoid renderPass()\n{\n}\n",
        );
    }

    #[test]
    fn source_without_version_gains_no_version_line() {
        let source = "void renderPass()\n{\n}\n";
        let expanded = expand_includes(source).unwrap();
        assert!(!expanded.contains("#version"));
    }

    #[test]
    fn builtin_snippet_is_spliced_in_place() {
        let source = "#include <screenConstants>\nvoid renderPass()\n{\n}\n";
        let expanded = expand_includes(source).unwrap();
        assert!(expanded.contains("ConstantBlock screenConstants"));
        assert!(!expanded.contains("#include"));
    }

    #[test]
    fn nested_builtin_include_resolves_recursively() {
        // transformUtils itself includes <transform>
        let source = "#include <transformUtils>\n";
        let expanded = expand_includes(source).unwrap();
        assert!(expanded.contains("struct Transform"));
        assert!(expanded.contains("vec3 applyTransform"));
        assert!(!expanded.contains("#include"));
    }

    #[test]
    fn bracket_include_nested_in_quoted_include_is_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let outer = dir.path().join("outer.lum");
        let mut file = std::fs::File::create(&outer).unwrap();
        writeln!(file, "#include <screenConstants>").unwrap();
        drop(file);

        let source = format!("#include \"{}\"\n", outer.display());
        let expanded = expand_includes(&source).unwrap();
        assert!(expanded.contains("ConstantBlock screenConstants"));
    }

    #[test]
    fn highest_version_wins_across_the_inclusion_tree() {
        let dir = tempfile::tempdir().unwrap();
        let newer = dir.path().join("newer.lum");
        std::fs::write(&newer, "#version 460\nfloat helper() { return 1.0; }\n").unwrap();

        let source = format!("#version 450\n#include \"{}\"\n", newer.display());
        let expanded = expand_includes(&source).unwrap();
        assert!(expanded.starts_with("#version 460\n"));
        assert_eq!(expanded.matches("#version").count(), 1);
    }

    #[test]
    fn circular_include_fails_naming_a_participant() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.lum");
        let second = dir.path().join("second.lum");
        std::fs::write(&first, format!("#include \"{}\"\n", second.display())).unwrap();
        std::fs::write(&second, format!("#include \"{}\"\n", first.display())).unwrap();

        let source = format!("#include \"{}\"\n", first.display());
        let error = expand_includes(&source).unwrap_err().to_string();
        assert!(error.contains("circular include detected"));
        assert!(
            error.contains("first.lum") || error.contains("second.lum"),
            "fault should name a cycle participant: {}",
            error,
        );
    }

    #[test]
    fn self_include_is_detected_as_circular() {
        let dir = tempfile::tempdir().unwrap();
        let selfish = dir.path().join("selfish.lum");
        std::fs::write(&selfish, format!("#include \"{}\"\n", selfish.display())).unwrap();

        let source = format!("#include \"{}\"\n", selfish.display());
        let error = expand_includes(&source).unwrap_err().to_string();
        assert!(error.contains("circular include detected"));
    }

    #[test]
    fn unresolvable_key_is_a_fatal_fault_naming_the_key() {
        let source = "#include \"does/not/exist.lum\"\n";
        let error = format!("{:#}", expand_includes(source).unwrap_err());
        assert!(error.contains("failed to load include file [does/not/exist.lum]"));
    }

    #[test]
    fn repeated_sibling_include_is_not_circular() {
        let source = "#include <transform>\n#include <transform>\n";
        let expanded = expand_includes(source).unwrap();
        assert_eq!(expanded.matches("struct Transform").count(), 2);
    }
}
