//! Rewrites the dialect's custom declaration forms into standard GLSL:
//! `Texture name;` into a sampler uniform, and `ConstantBlock` /
//! `AttributeBlock` declarations into bound uniform blocks.
//!
//! Constant blocks with a textually identical body (ignoring whitespace)
//! always receive the same binding slot, so a uniform buffer holding shared
//! data such as the camera or the clock can stay bound across program
//! switches. The registry handing out those slots is owned by the caller
//! and scoped to one rendering context; it is append-only for its whole
//! lifetime.

use crate::text::braced_span;
use std::collections::HashMap;
use anyhow::{
    Result,
    bail,
};
use regex::Regex;


/// Prefix given to the synthesized uniform-block type of a converted
/// `ConstantBlock`.
pub const CONSTANT_BLOCK_PREFIX: &'static str = "ConstantBlock";
/// Prefix given to the synthesized uniform-block type of a converted
/// `AttributeBlock`.
pub const ATTRIBUTE_BLOCK_PREFIX: &'static str = "AttributeBlock";


/// Map from normalized constant-block body to its assigned binding slot.
/// First-seen order determines assignment; entries are never removed.
#[derive(Debug, Default)]
pub struct BindingRegistry {
    bindings: HashMap<String, usize>,
    next_binding: usize,
}

impl BindingRegistry {
    pub fn new() -> Self {
        BindingRegistry::default()
    }

    /// Returns the stable binding slot for a normalized block body,
    /// assigning the next free slot on first sight.
    fn binding_for(&mut self, normalized_body: &str) -> usize {
        if let Some(&binding) = self.bindings.get(normalized_body) {
            return binding;
        }
        let binding = self.next_binding;
        self.next_binding += 1;
        trace!("assigning binding {} to new constant block body", binding);
        self.bindings.insert(normalized_body.to_string(), binding);
        binding
    }
}

/// Converts every `Texture name;` declaration to a sampler uniform.
/// Idempotent: re-running on already converted text changes nothing.
pub(crate) fn convert_textures(source: &mut String) {
    let pattern = Regex::new(r"\bTexture\s+(\w+)\s*;").unwrap();
    *source = pattern.replace_all(source, "uniform sampler2D $1;").into_owned();
}

struct BlockMatch {
    start: usize,
    end: usize,
    name: String,
    body: String,
}

/// Finds the next `<keyword> <name> { body }` declaration at or after
/// `from`. The body is extracted by brace-depth scanning; a body containing
/// nested braces is unsupported input and fails the conversion.
fn next_block(source: &str, keyword: &str, from: usize) -> Result<Option<BlockMatch>> {
    let head = Regex::new(&format!(r"\b{}\s+(\w+)\s*\{{", keyword)).unwrap();
    let (head_start, name, open) = {
        let Some(captures) = head.captures(&source[from..]) else {
            return Ok(None);
        };
        let Some(whole) = captures.get(0) else {
            return Ok(None);
        };
        (
            from + whole.start(),
            captures[1].to_string(),
            from + whole.end() - 1,
        )
    };

    let Some((_, close)) = braced_span(source, open) else {
        bail!("unterminated {} [{}]", keyword, name);
    };
    let body = source[open + 1..close].to_string();
    if body.contains('{') {
        bail!("nested braces in {} [{}] are not supported", keyword, name);
    }

    // consume an optional trailing `;`
    let mut end = close + 1;
    let trailing = source[end..].trim_start();
    if trailing.starts_with(';') {
        end += source[end..].len() - trailing.len() + 1;
    }

    Ok(Some(BlockMatch { start: head_start, end, name, body }))
}

fn rewrite_block(prefix: &str, name: &str, body: &str, binding: usize) -> String {
    format!(
        "layout(binding = {}) uniform {}_{}\n{{{}}} {};",
        binding, prefix, name, body, name,
    )
}

/// Rewrites every `ConstantBlock` declaration into a bound uniform block,
/// deduplicating identical bodies through `registry`. Returns the highest
/// binding index used plus one, so attribute blocks can be numbered above
/// it without collision.
pub(crate) fn convert_constant_blocks(
    source: &mut String,
    registry: &mut BindingRegistry,
) -> Result<usize> {
    let mut highest: Option<usize> = None;
    let mut search_from = 0;
    while let Some(block) = next_block(source, CONSTANT_BLOCK_PREFIX, search_from)? {
        let normalized: String = block.body.split_whitespace().collect();
        let binding = registry.binding_for(&normalized);
        highest = Some(highest.map_or(binding, |used| used.max(binding)));

        let rewritten = rewrite_block(
            CONSTANT_BLOCK_PREFIX,
            &block.name,
            &block.body,
            binding,
        );
        source.replace_range(block.start..block.end, &rewritten);
        search_from = block.start + rewritten.len();
    }
    Ok(highest.map_or(0, |used| used + 1))
}

/// Rewrites every `AttributeBlock` declaration into a bound uniform block,
/// numbering bindings sequentially from `first_binding`. Attribute blocks
/// are per-object and never deduplicated.
pub(crate) fn convert_attribute_blocks(
    source: &mut String,
    first_binding: usize,
) -> Result<()> {
    let mut binding = first_binding;
    let mut search_from = 0;
    while let Some(block) = next_block(source, ATTRIBUTE_BLOCK_PREFIX, search_from)? {
        let rewritten = rewrite_block(
            ATTRIBUTE_BLOCK_PREFIX,
            &block.name,
            &block.body,
            binding,
        );
        binding += 1;
        source.replace_range(block.start..block.end, &rewritten);
        search_from = block.start + rewritten.len();
    }
    Ok(())
}
