//! Path pattern compilation (§4.E "Compilation").

use crate::concat::{CommaSpace, ConcatList};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("path pattern must start with '/'")]
    MissingLeadingSlash,
    #[error("path pattern contains an empty segment")]
    EmptySegment,
    #[error("'*' wildcard must be the last segment")]
    WildcardNotTerminal,
    #[error("a pattern cannot mix named and unnamed parameters")]
    MixedParamNaming,
    #[error("consecutive parameters within a segment require a literal separator")]
    ConsecutiveParams,
    #[error("unterminated '{{' in path pattern")]
    UnterminatedBrace,
    #[error("route already registered with a different set of parameter names")]
    ParamNameMismatch,
    #[error("{0}")]
    HandlerConflict(&'static str),
}

/// One piece of a (possibly) dynamic path segment: a literal run of bytes or
/// a captured parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegPart {
    Literal(String),
    Param(String),
}

/// A single compiled path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledSegment {
    /// No braces anywhere in the segment: eligible for the hash-map literal
    /// child lookup.
    Literal(String),
    /// Contains at least one parameter capture.
    Dynamic(Vec<SegPart>),
    /// The terminal `*` segment.
    Wildcard,
}

impl CompiledSegment {
    /// The segment's source text, reconstructed from its compiled parts —
    /// used as the dynamic-edge sharing key (§4.E "Structural insert": edges
    /// are shared only when the full compiled pattern is equal).
    pub fn edge_key(&self) -> String {
        match self {
            CompiledSegment::Literal(s) => s.clone(),
            CompiledSegment::Wildcard => "*".to_string(),
            CompiledSegment::Dynamic(parts) => {
                let mut s = String::new();
                for p in parts {
                    match p {
                        SegPart::Literal(l) => s.push_str(l),
                        SegPart::Param(name) => {
                            s.push('{');
                            s.push_str(name);
                            s.push('}');
                        }
                    }
                }
                s
            }
        }
    }
}

/// A fully compiled path pattern.
#[derive(Debug, Clone)]
pub struct CompiledRoute {
    pub segments: Vec<CompiledSegment>,
    pub param_names: ConcatList<CommaSpace>,
    pub has_wildcard: bool,
    pub has_no_slash_registered: bool,
    pub has_with_slash_registered: bool,
}

/// Compiles a raw path pattern into its segment list plus the ordered
/// parameter name list.
pub fn compile(pattern: &str) -> Result<(Vec<CompiledSegment>, ConcatList<CommaSpace>), PatternError> {
    if !pattern.starts_with('/') {
        return Err(PatternError::MissingLeadingSlash);
    }
    if pattern == "/" {
        return Ok((vec![CompiledSegment::Literal(String::new())], ConcatList::new()));
    }

    let raw_segments: Vec<&str> = pattern[1..].split('/').collect();
    let mut segments = Vec::with_capacity(raw_segments.len());
    let mut param_names = ConcatList::new();
    let mut unnamed_index = 0usize;
    let mut naming: Option<bool> = None; // Some(true) = named, Some(false) = unnamed

    for (i, raw) in raw_segments.iter().enumerate() {
        if raw.is_empty() {
            return Err(PatternError::EmptySegment);
        }
        if *raw == "*" {
            if i != raw_segments.len() - 1 {
                return Err(PatternError::WildcardNotTerminal);
            }
            segments.push(CompiledSegment::Wildcard);
            continue;
        }
        let parts = compile_segment(raw)?;
        let is_literal_only = parts.len() == 1 && matches!(parts[0], SegPart::Literal(_));
        if is_literal_only {
            let SegPart::Literal(lit) = parts.into_iter().next().unwrap() else { unreachable!() };
            segments.push(CompiledSegment::Literal(lit));
            continue;
        }

        let mut last_was_param = false;
        for (pi, part) in parts.iter().enumerate() {
            match part {
                SegPart::Param(name) => {
                    if pi > 0 && last_was_param {
                        return Err(PatternError::ConsecutiveParams);
                    }
                    last_was_param = true;
                    let named = !name.is_empty();
                    match naming {
                        None => naming = Some(named),
                        Some(expected) if expected != named => {
                            return Err(PatternError::MixedParamNaming)
                        }
                        _ => {}
                    }
                    if named {
                        param_names.append(name);
                    } else {
                        param_names.append(&unnamed_index.to_string());
                        unnamed_index += 1;
                    }
                }
                SegPart::Literal(_) => last_was_param = false,
            }
        }
        segments.push(CompiledSegment::Dynamic(parts));
    }

    Ok((segments, param_names))
}

/// Compiles one raw (non-wildcard) segment into literal/param parts,
/// resolving `{{`/`}}` escapes and `{name}`/`{}` captures.
fn compile_segment(raw: &str) -> Result<Vec<SegPart>, PatternError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = raw.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        match c {
            '{' => {
                if chars.peek().map(|&(_, c2)| c2) == Some('{') {
                    chars.next();
                    literal.push('{');
                    continue;
                }
                if !literal.is_empty() {
                    parts.push(SegPart::Literal(std::mem::take(&mut literal)));
                }
                let mut name = String::new();
                let mut closed = false;
                for (_, c2) in chars.by_ref() {
                    if c2 == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c2);
                }
                if !closed {
                    return Err(PatternError::UnterminatedBrace);
                }
                parts.push(SegPart::Param(name));
            }
            '}' => {
                if chars.peek().map(|&(_, c2)| c2) == Some('}') {
                    chars.next();
                    literal.push('}');
                    continue;
                }
                literal.push('}');
            }
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        parts.push(SegPart::Literal(literal));
    }
    Ok(parts)
}
