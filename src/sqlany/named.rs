//! Named parameter rewriting.
//!
//! SQL Anywhere only understands positional `?` placeholders, so `:name`
//! style parameters are collapsed to `?` before the text reaches the library
//! and the names are kept, in order, to resolve named values at bind time.

const QUOTE: char = '\'';
const ESCAPE: char = '\\';
const MARKER: char = ':';
const PLACEHOLDER: char = '?';

#[inline]
fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Split named parameters out of `sql`.
///
/// Returns the text with every parameter replaced by a single placeholder,
/// and the parameter names in order of appearance (duplicates kept).
/// Nothing inside a single-quoted literal is touched; a quote preceded by a
/// backslash does not open or close a literal.
pub fn split_named(sql: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(sql.len());
    let mut names = Vec::new();

    let mut chars = sql.chars().peekable();
    let mut prior: Option<char> = None;
    let mut quoted = false;

    while let Some(c) = chars.next() {
        if c == QUOTE && prior != Some(ESCAPE) {
            quoted = !quoted;
        }

        if !quoted && c == MARKER && chars.peek().copied().is_some_and(is_ident) {
            let mut name = String::new();
            while let Some(&next) = chars.peek() {
                if !is_ident(next) {
                    break;
                }
                name.push(next);
                chars.next();
            }

            out.push(PLACEHOLDER);
            prior = name.chars().last();
            names.push(name);
            continue;
        }

        out.push(c);
        prior = Some(c);
    }

    (out, names)
}
