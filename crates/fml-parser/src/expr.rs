//! Expression compiler for FML.
//!
//! Classifies an expression string into a [`CompiledExpr`] without ever
//! building an evaluator for arbitrary code. The grammar is a closed
//! whitelist: property chains, literals, indexing, comparisons, logical
//! connectives, and zero-argument method calls. Everything else — arithmetic,
//! multi-argument calls, ternaries, arrow functions — is classified
//! [`CompiledExpr::Unsafe`] and is never executed; at most its raw text is
//! shown as an inert diagnostic string.
//!
//! Classification never fails: malformed input degrades to `Unsafe`.

/// A literal value appearing directly in expression source.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

/// Comparison operators, longest forms first for scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    StrictEq,
    StrictNeq,
    Eq,
    Neq,
    Gte,
    Lte,
    Gt,
    Lt,
}

impl CompareOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::StrictEq => "===",
            CompareOp::StrictNeq => "!==",
            CompareOp::Eq => "==",
            CompareOp::Neq => "!=",
            CompareOp::Gte => ">=",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
        }
    }
}

/// Logical connectives with short-circuit resolution semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// A classified expression.
///
/// Invariant (security-critical): every variant except `Unsafe` resolves by
/// pure data lookup. `Unsafe` carries raw source for display purposes only
/// and must never be evaluated as code under any configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledExpr {
    /// `"text"`, `42`, `true`, `null`
    Literal(LiteralValue),

    /// `user.profile.name` — ordered path walked through the context.
    Property(Vec<String>),

    /// `items[0]`, `rows[cursor.index]` — index recursively compiled.
    ArrayAccess {
        base: Box<CompiledExpr>,
        index: Box<CompiledExpr>,
    },

    /// `left OP right` with OP in `=== !== == != >= <= > <`.
    Comparison {
        left: Box<CompiledExpr>,
        op: CompareOp,
        right: Box<CompiledExpr>,
    },

    /// `left && right`, `left || right` — right side resolved only if needed.
    Logical {
        left: Box<CompiledExpr>,
        op: LogicalOp,
        right: Box<CompiledExpr>,
    },

    /// `path.to.method()` — zero-arg; resolved against a fixed built-in table.
    /// The last path segment is the method name.
    MethodCall { path: Vec<String> },

    /// `{key: value, ...}` prop-object shorthand, constrained grammar.
    /// Values are themselves whitelisted expressions.
    Object(Vec<(String, CompiledExpr)>),

    /// `[a, b, c]` array literal from the prop-object grammar.
    Array(Vec<CompiledExpr>),

    /// Everything outside the whitelist. Display-only; never evaluated.
    Unsafe(String),
}

impl CompiledExpr {
    /// True for the one variant that may never be evaluated.
    pub fn is_unsafe(&self) -> bool {
        matches!(self, CompiledExpr::Unsafe(_))
    }
}

/// Classify an expression string. First match wins:
/// property chain, literal, array access, comparison, logical connective,
/// zero-arg method call, object/array literal, then `Unsafe`.
///
/// A top-level logical connective takes precedence over a comparison split so
/// `count > 1 && ok` groups as `(count > 1) && ok`.
pub fn compile(source: &str) -> CompiledExpr {
    let src = source.trim();
    if src.is_empty() {
        return CompiledExpr::Unsafe(String::new());
    }

    if let Some(path) = parse_property_chain(src) {
        return CompiledExpr::Property(path);
    }

    if let Some(lit) = parse_literal(src) {
        return CompiledExpr::Literal(lit);
    }

    // Arrow functions are never in the grammar; reject them before operator
    // splitting can misread `=>` as a comparison.
    if find_top_level_op(src, &["=>"]).is_some() {
        return CompiledExpr::Unsafe(src.to_string());
    }

    // Logical connectives bind loosest, so split on them before comparisons.
    if let Some((left, op, right)) = split_logical(src) {
        return CompiledExpr::Logical {
            left: Box::new(compile(left)),
            op,
            right: Box::new(compile(right)),
        };
    }

    if let Some((base, index)) = parse_array_access(src) {
        return CompiledExpr::ArrayAccess {
            base: Box::new(compile(base)),
            index: Box::new(compile(index)),
        };
    }

    if let Some((left, op, right)) = split_comparison(src) {
        return CompiledExpr::Comparison {
            left: Box::new(compile(left)),
            op,
            right: Box::new(compile(right)),
        };
    }

    if let Some(path) = parse_method_call(src) {
        return CompiledExpr::MethodCall { path };
    }

    if let Some(expr) = parse_object_literal(src) {
        return expr;
    }

    if let Some(expr) = parse_array_literal(src) {
        return expr;
    }

    CompiledExpr::Unsafe(src.to_string())
}

// --- Classification helpers ---

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// `a.b.c` — every dot-separated segment is a plain identifier.
/// The literal keywords are carved out so `true`/`false`/`null` classify as
/// literals rather than one-segment property chains.
fn parse_property_chain(src: &str) -> Option<Vec<String>> {
    if matches!(src, "true" | "false" | "null") {
        return None;
    }
    let segments: Vec<&str> = src.split('.').collect();
    if segments.iter().all(|s| is_ident(s)) {
        Some(segments.iter().map(|s| s.to_string()).collect())
    } else {
        None
    }
}

fn parse_literal(src: &str) -> Option<LiteralValue> {
    match src {
        "true" => return Some(LiteralValue::Bool(true)),
        "false" => return Some(LiteralValue::Bool(false)),
        "null" => return Some(LiteralValue::Null),
        _ => {}
    }

    if src.len() >= 2 {
        let first = src.chars().next().unwrap();
        let last = src.chars().last().unwrap();
        if (first == '"' || first == '\'') && last == first {
            let inner = &src[1..src.len() - 1];
            // Reject strings whose closing quote is not actually at the end,
            // e.g. `"a" === "b"`.
            if scan_string_end(src, 0) == Some(src.len() - 1) {
                return Some(LiteralValue::Str(unescape(inner)));
            }
            return None;
        }
    }

    src.parse::<f64>().ok().map(LiteralValue::Num)
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some('\'') => out.push('\''),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Given the byte index of an opening quote, return the byte index of its
/// closing quote. Scanning is byte-wise: the delimiters are ASCII, so UTF-8
/// continuation bytes can never false-match.
fn scan_string_end(src: &str, start: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] == quote {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// `base[index]` where the brackets close at the very end of the source.
fn parse_array_access(src: &str) -> Option<(&str, &str)> {
    if !src.ends_with(']') {
        return None;
    }
    let open = find_top_level_char(src, '[')?;
    if open == 0 {
        return None; // `[...]` is an array literal, not an access
    }
    let close = matching_bracket(src, open)?;
    if close != src.len() - 1 {
        return None; // trailing content, e.g. `a[0][1]` or `a[0] == b`
    }
    let base = src[..open].trim();
    let index = src[open + 1..close].trim();
    if base.is_empty() || index.is_empty() {
        return None;
    }
    Some((base, index))
}

/// Find the first top-level occurrence of `target` (ASCII), skipping strings
/// and bracketed groups. Returns a byte index.
fn find_top_level_char(src: &str, target: char) -> Option<usize> {
    let bytes = src.as_bytes();
    let target = target as u8;
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\'' | b'"' => {
                i = scan_string_end(src, i)?;
            }
            b'[' | b'(' | b'{' => {
                if b == target && depth == 0 {
                    return Some(i);
                }
                depth += 1;
            }
            b']' | b')' | b'}' => {
                depth = depth.saturating_sub(1);
            }
            _ if b == target && depth == 0 => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Byte index of the bracket matching the one at `open`.
fn matching_bracket(src: &str, open: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let (open_b, close_b) = match bytes[open] {
        b'[' => (b'[', b']'),
        b'(' => (b'(', b')'),
        b'{' => (b'{', b'}'),
        _ => return None,
    };
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' => {
                i = scan_string_end(src, i)?;
            }
            b if b == open_b => depth += 1,
            b if b == close_b => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split at the first top-level `&&` or `||`.
fn split_logical(src: &str) -> Option<(&str, LogicalOp, &str)> {
    let idx = find_top_level_op(src, &["&&", "||"])?;
    let op = if src[idx.0..].starts_with("&&") {
        LogicalOp::And
    } else {
        LogicalOp::Or
    };
    let left = src[..idx.0].trim();
    let right = src[idx.0 + 2..].trim();
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some((left, op, right))
}

/// Split at the first top-level comparison operator, longest match first.
fn split_comparison(src: &str) -> Option<(&str, CompareOp, &str)> {
    const OPS: &[(&str, CompareOp)] = &[
        ("===", CompareOp::StrictEq),
        ("!==", CompareOp::StrictNeq),
        ("==", CompareOp::Eq),
        ("!=", CompareOp::Neq),
        (">=", CompareOp::Gte),
        ("<=", CompareOp::Lte),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
    ];
    let pats: Vec<&str> = OPS.iter().map(|(p, _)| *p).collect();
    let (idx, matched) = find_top_level_op(src, &pats)?;
    let op = OPS
        .iter()
        .find(|(p, _)| *p == matched)
        .map(|(_, op)| *op)
        .expect("matched operator is in table");
    let left = src[..idx].trim();
    let right = src[idx + matched.len()..].trim();
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some((left, op, right))
}

/// Find the first top-level occurrence of any pattern, preferring the
/// earliest listed pattern at each position (callers list longest forms
/// first). Returns (byte index, matched pattern).
fn find_top_level_op<'p>(src: &str, patterns: &[&'p str]) -> Option<(usize, &'p str)> {
    let bytes = src.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' => {
                i = scan_string_end(src, i)?;
            }
            b'[' | b'(' | b'{' => depth += 1,
            b']' | b')' | b'}' => depth = depth.saturating_sub(1),
            _ if depth == 0 => {
                for pat in patterns {
                    if bytes[i..].starts_with(pat.as_bytes()) {
                        return Some((i, *pat));
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// `ident.path.method()` — zero-argument call on a dotted receiver.
fn parse_method_call(src: &str) -> Option<Vec<String>> {
    let stem = src.strip_suffix("()")?;
    let path = parse_property_chain(stem.trim())?;
    if path.len() < 2 {
        return None; // a bare `f()` has no receiver; out of grammar
    }
    Some(path)
}

// --- Constrained prop-object grammar ---
//
// `{key: value, ...}` with identifier keys and values limited to
// string/number/bool/null/array-literal/object-literal/bare-identifier
// (dotted chains allowed). Not a general expression parser: any value
// outside that set poisons the whole literal to None.

fn parse_object_literal(src: &str) -> Option<CompiledExpr> {
    let inner = delimited(src, '{', '}')?;
    let mut entries = Vec::new();
    for part in split_top_level_commas(inner) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let colon = find_top_level_char(part, ':')?;
        let key = part[..colon].trim();
        let value = part[colon + 1..].trim();
        if !is_ident(key) {
            return None;
        }
        let compiled = compile_object_value(value)?;
        entries.push((key.to_string(), compiled));
    }
    Some(CompiledExpr::Object(entries))
}

fn parse_array_literal(src: &str) -> Option<CompiledExpr> {
    let inner = delimited(src, '[', ']')?;
    let mut items = Vec::new();
    for part in split_top_level_commas(inner) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        items.push(compile_object_value(part)?);
    }
    Some(CompiledExpr::Array(items))
}

/// A value inside an object/array literal: literal, bare identifier chain,
/// or a nested literal. Anything else rejects the whole construct.
fn compile_object_value(src: &str) -> Option<CompiledExpr> {
    if let Some(lit) = parse_literal(src) {
        return Some(CompiledExpr::Literal(lit));
    }
    if let Some(path) = parse_property_chain(src) {
        return Some(CompiledExpr::Property(path));
    }
    if let Some(obj) = parse_object_literal(src) {
        return Some(obj);
    }
    if let Some(arr) = parse_array_literal(src) {
        return Some(arr);
    }
    None
}

/// The source must be exactly `open ... close` with the close at the end.
fn delimited(src: &str, open: char, close: char) -> Option<&str> {
    if !src.starts_with(open) || !src.ends_with(close) {
        return None;
    }
    if matching_bracket(src, 0)? != src.len() - 1 {
        return None;
    }
    Some(src[open.len_utf8()..src.len() - close.len_utf8()].trim())
}

fn split_top_level_commas(src: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = src;
    while let Some(idx) = find_top_level_char(rest, ',') {
        parts.push(&rest[..idx]);
        rest = &rest[idx + 1..];
    }
    parts.push(rest);
    parts
}
