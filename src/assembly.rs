//! Template Assembler - line-positioned fragment splicing
//!
//! Offsets always refer to the ORIGINAL template. The factory relies on two
//! of them: the spec injection goes to line 1 (right after the bundle's
//! header line) and the DNA constant is appended at the end.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hashing::Fingerprint;

/// Line the spec injection fragment is spliced at.
pub const INJECTION_LINE: usize = 1;

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("Fragment offset {offset} is past the end of a {lines}-line template")]
    OffsetOutOfRange { offset: usize, lines: usize },

    #[error("Assembled module does not export a name")]
    MissingName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InsertAt {
    /// Before original line `n`; `0` is the first line.
    Line(usize),
    /// After the last original line.
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub at: InsertAt,
    pub text: String,
}

impl Fragment {
    pub fn at_line(line: usize, text: impl Into<String>) -> Self {
        Self {
            at: InsertAt::Line(line),
            text: text.into(),
        }
    }

    pub fn append(text: impl Into<String>) -> Self {
        Self {
            at: InsertAt::End,
            text: text.into(),
        }
    }
}

/// `var TEMPLATE_INFO=<payload>; var TEMPLATE_UUID="<fingerprint>";`
///
/// `payload` must be compact JSON, which keeps the fragment on one line.
pub fn injection_fragment(payload: &str, fingerprint: &Fingerprint) -> String {
    format!("var TEMPLATE_INFO={payload}; var TEMPLATE_UUID=\"{fingerprint}\";")
}

/// Splice `fragments` into `template` in a single pass.
///
/// Fragments sharing an offset keep the order they were given in.
pub fn assemble(template: &str, fragments: &[Fragment]) -> Result<String, AssemblyError> {
    let lines: Vec<&str> = template.split('\n').collect();
    let len = lines.len();

    let mut positioned = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        let offset = match fragment.at {
            InsertAt::Line(n) if n > len => {
                return Err(AssemblyError::OffsetOutOfRange { offset: n, lines: len })
            }
            InsertAt::Line(n) => n,
            InsertAt::End => len,
        };
        positioned.push((offset, fragment.text.as_str()));
    }
    // stable: equal offsets keep caller order
    positioned.sort_by_key(|(offset, _)| *offset);

    let mut out: Vec<&str> = Vec::with_capacity(len + positioned.len());
    let mut pending = positioned.into_iter().peekable();
    for (index, line) in lines.into_iter().enumerate() {
        while let Some((_, text)) = pending.next_if(|(offset, _)| *offset == index) {
            out.push(text);
        }
        out.push(line);
    }
    out.extend(pending.map(|(_, text)| text));

    Ok(out.join("\n"))
}

/// Metadata a template exports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedMetadata {
    pub name: String,
    pub description: Option<String>,
}

/// A JS string literal; the value is in one of groups 1..=3.
const LITERAL: &str = r#"(?:"([^"\\]*)"|'([^'\\]*)'|`([^`\\]*)`)"#;
const IDENT: &str = r"[A-Za-z_$][A-Za-z0-9_$]*";

fn compile(pattern: &str) -> Regex {
    // patterns are built from fixed field names or escaped identifiers
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid export pattern {pattern:?}: {e}"))
}

/// Ways a bundle can export one metadata field.
struct ExportPatterns {
    field: &'static str,
    /// `exports.name = "x"`, `export const name = "x"`
    literal: Regex,
    /// `exports.name = name` (rollup CJS output)
    binding: Regex,
}

impl ExportPatterns {
    fn new(field: &'static str) -> Self {
        Self {
            field,
            literal: compile(&format!(
                r"(?m)^\s*(?:export\s+(?:const|let|var)\s+|(?:module\.)?exports\.){field}\s*=\s*{LITERAL}"
            )),
            binding: compile(&format!(
                r"(?m)^\s*(?:module\.)?exports\.{field}\s*=\s*({IDENT})\s*(?:;|$)"
            )),
        }
    }

    fn find(&self, source: &str) -> Option<String> {
        literal_value(&self.literal, source)
            .or_else(|| {
                self.binding
                    .captures(source)
                    .and_then(|caps| resolve_binding(source, &caps[1]))
            })
            .or_else(|| {
                listed_export(source, self.field).and_then(|local| resolve_binding(source, &local))
            })
    }
}

fn name_patterns() -> &'static ExportPatterns {
    static PATTERNS: OnceLock<ExportPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| ExportPatterns::new("name"))
}

fn description_patterns() -> &'static ExportPatterns {
    static PATTERNS: OnceLock<ExportPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| ExportPatterns::new("description"))
}

fn export_list_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| compile(r"export\s*\{([^}]*)\}"))
}

fn literal_value(pattern: &Regex, source: &str) -> Option<String> {
    pattern.captures(source).and_then(|caps| {
        (1..=3)
            .find_map(|group| caps.get(group))
            .map(|m| m.as_str().to_string())
    })
}

/// Value of a top-level `const|let|var <ident> = "<literal>"` declaration.
fn resolve_binding(source: &str, ident: &str) -> Option<String> {
    let declaration = compile(&format!(
        r"(?m)^\s*(?:export\s+)?(?:const|let|var)\s+{}\s*=\s*{LITERAL}",
        regex::escape(ident)
    ));
    literal_value(&declaration, source)
}

/// Local binding exported as `field` by an `export { ... }` list.
fn listed_export(source: &str, field: &str) -> Option<String> {
    for caps in export_list_pattern().captures_iter(source) {
        for specifier in caps[1].split(',') {
            let mut parts = specifier.split_whitespace();
            let Some(local) = parts.next() else { continue };
            match (parts.next(), parts.next()) {
                (None, _) if local == field => return Some(local.to_string()),
                (Some("as"), Some(exported)) if exported == field => return Some(local.to_string()),
                _ => {}
            }
        }
    }
    None
}

/// Read the exported `name` (required) and `description` from module source.
///
/// Exports by identifier are resolved to the identifier's string literal
/// declaration.
pub fn extract_metadata(source: &str) -> Result<ExportedMetadata, AssemblyError> {
    let name = name_patterns()
        .find(source)
        .filter(|name| !name.trim().is_empty())
        .ok_or(AssemblyError::MissingName)?;
    Ok(ExportedMetadata {
        name,
        description: description_patterns().find(source),
    })
}
