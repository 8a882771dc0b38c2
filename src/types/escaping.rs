// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Words that cannot be used as identifiers and are escaped as `__word__`.
const RESERVED_SYMBOLS: [&str; 21] = [
    "true",
    "false",
    "null",
    "in",
    "as",
    "break",
    "const",
    "continue",
    "else",
    "for",
    "function",
    "if",
    "import",
    "let",
    "loop",
    "package",
    "namespace",
    "return",
    "var",
    "void",
    "while",
];

/// Names that would shadow type identifiers at the root scope.
const ROOT_RESERVED: [&str; 10] = [
    "int",
    "uint",
    "double",
    "bool",
    "string",
    "bytes",
    "list",
    "map",
    "null_type",
    "type",
];

const SUBSTITUTIONS: [(&str, &str); 4] = [
    ("__", "__underscores__"),
    (".", "__dot__"),
    ("-", "__dash__"),
    ("/", "__slash__"),
];

pub fn is_root_reserved(name: &str) -> bool {
    ROOT_RESERVED.contains(&name)
}

/// Escapes a property name into an expression identifier.
///
/// Returns `None` if the name contains characters outside `[a-zA-Z0-9_.\-/]` or starts with a
/// digit.
pub fn escape(name: &str) -> Option<String> {
    match name.chars().next() {
        None => return None,
        Some(c) if c.is_ascii_digit() => return None,
        _ => (),
    }
    if RESERVED_SYMBOLS.contains(&name) {
        return Some(format!("__{name}__"));
    }

    let mut out = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(ch) = rest.chars().next() {
        if let Some((from, to)) = SUBSTITUTIONS.iter().find(|(from, _)| rest.starts_with(from)) {
            out.push_str(to);
            rest = &rest[from.len()..];
            continue;
        }
        if !(ch.is_ascii_alphanumeric() || ch == '_') {
            return None;
        }
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }
    Some(out)
}

/// Reverses [`escape`].
pub fn unescape(escaped: &str) -> String {
    if let Some(inner) = escaped
        .strip_prefix("__")
        .and_then(|s| s.strip_suffix("__"))
    {
        if RESERVED_SYMBOLS.contains(&inner) {
            return inner.to_string();
        }
    }

    let mut out = String::with_capacity(escaped.len());
    let mut rest = escaped;
    'outer: while let Some(ch) = rest.chars().next() {
        if rest.starts_with("__") {
            for (from, to) in SUBSTITUTIONS {
                if rest.starts_with(to) {
                    out.push_str(from);
                    rest = &rest[to.len()..];
                    continue 'outer;
                }
            }
        }
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }
    out
}
