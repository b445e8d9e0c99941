//! Primitive source-text transforms shared by the stage compiler.
//!
//! Every function here is a plain string-to-string operation on shader
//! source. Malformed input (unbalanced braces, missing markers) degrades to
//! a silent no-op rather than an error; the stage compiler relies on that
//! when a dialect source legitimately lacks one of the markers.

use regex::Regex;


/// Scans forward from `start` for the first `{` and returns the byte offsets
/// of that brace and of its matching `}`. Returns `None` if no opening brace
/// exists or the braces never balance before the end of input.
///
/// Brace characters inside string or comment literals are counted like any
/// other; shader sources containing those inside function bodies are
/// unsupported input.
pub(crate) fn braced_span(code: &str, start: usize) -> Option<(usize, usize)> {
    let open = code[start..].find('{')? + start;
    let mut depth = 0usize;
    for (index, byte) in code[open..].bytes().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((open, open + index));
                }
            }
            _ => {}
        }
    }
    None
}

/// Removes the first `#version` line from `code` and returns it, newline
/// terminated. Returns an empty string if the buffer has no version line.
pub fn extract_version_line(code: &mut String) -> String {
    let Some(position) = code.find("#version") else {
        return String::new();
    };
    let line_end = code[position..]
        .find('\n')
        .map(|offset| position + offset)
        .unwrap_or(code.len());
    let line = code[position..line_end].to_string();
    let removal_end = (line_end + 1).min(code.len());
    code.replace_range(position..removal_end, "");
    line + "\n"
}

/// Collects the `(type, name)` pairs declared by
/// `<first_stage> -> <second_stage> : <type> <name>;` lines, in source
/// order. Duplicate declarations are preserved as separate entries.
pub fn argument_list(
    code: &str,
    first_stage: &str,
    second_stage: &str,
) -> Vec<(String, String)> {
    let pattern = Regex::new(&format!(
        r"{}\s*->\s*{}\s*:\s*(\w+)\s+(\w+);",
        regex::escape(first_stage),
        regex::escape(second_stage),
    )).unwrap();

    code.lines()
        .filter_map(|line| pattern.captures(line))
        .map(|captures| (captures[1].to_string(), captures[2].to_string()))
        .collect()
}

/// Strips every stage-transition declaration from the buffer, regardless of
/// which stage names it carries.
pub fn remove_argument_list(code: &mut String) {
    let pattern = Regex::new(r"\w+\s*->\s*\w+\s*:\s*\w+\s+\w+;").unwrap();
    *code = pattern.replace_all(code, "").into_owned();
}

/// Emits one `layout (location = N) <qualifier> <type> <name>;` line per
/// argument, locations assigned 0-based in list order.
pub fn compose_layout_lines(
    arguments: &[(String, String)],
    qualifier: &str,
) -> String {
    let mut result = String::new();
    for (location, (type_name, name)) in arguments.iter().enumerate() {
        result += &format!(
            "layout (location = {}) {} {} {};\n",
            location, qualifier, type_name, name,
        );
    }
    result
}

/// Erases the full definition of the named function, from the start of the
/// line containing its name through the matching closing brace. No-op when
/// the function is absent or its braces never balance.
pub fn remove_function(code: &mut String, function_name: &str) {
    let Some(name_position) = code.find(function_name) else {
        return;
    };
    let line_start = code[..name_position]
        .rfind('\n')
        .map(|index| index + 1)
        .unwrap_or(0);
    let Some((_, close)) = braced_span(code, name_position) else {
        return;
    };
    code.replace_range(line_start..=close, "");
}

/// Replaces the text from the start of the line containing `signature` up to
/// (not including) the function's opening brace with `new_declaration`.
pub fn replace_function_declaration(
    code: &mut String,
    signature: &str,
    new_declaration: &str,
) {
    let Some(position) = code.find(signature) else {
        return;
    };
    let line_start = code[..position]
        .rfind('\n')
        .map(|index| index + 1)
        .unwrap_or(0);
    let Some(brace) = code[position..].find('{').map(|offset| position + offset) else {
        return;
    };
    code.replace_range(line_start..brace, new_declaration);
}

/// Whole-word substitution of every occurrence of `token` with
/// `replacement`.
pub fn swap_word(code: &mut String, token: &str, replacement: &str) {
    let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(token))).unwrap();
    *code = pattern.replace_all(code, replacement).into_owned();
}

/// Inserts `snippet` immediately before the closing brace of the `main`
/// function's body. No-op when `main` is absent or unbalanced.
pub fn insert_before_main_end(code: &mut String, snippet: &str) {
    let Some(main_position) = code.find("void main()") else {
        return;
    };
    let Some((_, close)) = braced_span(code, main_position) else {
        return;
    };
    code.insert_str(close, snippet);
}
