//! Model bytes embedded in C source as `0xNN` literals.

use std::fmt::Write;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{ParityError, Result};

const BYTES_PER_LINE: usize = 12;

fn hex_literal() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"0x([0-9a-fA-F]{2})").expect("static pattern"))
}

/// Collects every `0xNN` literal in `text`, in order of appearance.
///
/// Everything else in the text (declarations, commas, comments) is ignored.
/// Only the first two digits after `0x` are taken, so `0x1a2b` yields `0x1a`.
pub fn extract_bytes(text: &str) -> Result<Vec<u8>> {
    let bytes: Vec<u8> = hex_literal()
        .captures_iter(text)
        .map(|caps| {
            // two hex digits always fit a u8
            u8::from_str_radix(&caps[1], 16).unwrap_or_default()
        })
        .collect();

    if bytes.is_empty() {
        return Err(ParityError::Integrity(
            "no 0xNN byte literals found in source text".into(),
        ));
    }
    Ok(bytes)
}

/// Options for rendering an artifact as a C array.
#[derive(Debug, Clone)]
pub struct CArrayOptions {
    /// A C identifier that must not itself contain a `0xNN` literal, or
    /// extraction would pick it up as a byte.
    pub name: String,
    /// Emitted as `#include "<header>"` when set.
    pub header: Option<String>,
}

impl Default for CArrayOptions {
    fn default() -> Self {
        CArrayOptions {
            name: "model_data".into(),
            header: None,
        }
    }
}

impl CArrayOptions {
    pub fn validate(&self) -> Result<()> {
        let mut chars = self.name.chars();
        let identifier = matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
            && chars.all(|c| c == '_' || c.is_ascii_alphanumeric());
        if !identifier {
            return Err(ParityError::Domain(format!(
                "array name `{}` is not a C identifier",
                self.name
            )));
        }
        if hex_literal().is_match(&self.name) {
            return Err(ParityError::Domain(format!(
                "array name `{}` contains a 0xNN literal",
                self.name
            )));
        }
        if let Some(header) = &self.header {
            if header.is_empty() || header.contains(['"', '\n', '\r']) || hex_literal().is_match(header) {
                return Err(ParityError::Domain(format!(
                    "header {header:?} cannot be included verbatim"
                )));
            }
        }
        Ok(())
    }
}

/// Renders `bytes` as an aligned C array plus a length constant.
pub fn to_c_array(bytes: &[u8], options: &CArrayOptions) -> Result<String> {
    options.validate()?;
    let mut out = String::with_capacity(bytes.len() * 6 + 128);
    if let Some(header) = &options.header {
        let _ = writeln!(out, "#include \"{header}\"\n");
    }
    let _ = write!(out, "alignas(16) const unsigned char {}[] = {{", options.name);
    for (i, byte) in bytes.iter().enumerate() {
        if i % BYTES_PER_LINE == 0 {
            out.push_str("\n  ");
        }
        let _ = write!(out, "0x{byte:02x}, ");
    }
    out.push_str("\n};\n");
    let _ = writeln!(out, "const int {}_len = {};", options.name, bytes.len());
    Ok(out)
}
