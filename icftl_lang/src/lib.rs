//! Parsers for iCFTL specification files.
//!
//! Two formats are supported:
//! a textual syntax (`.icftl` files, or any extension other than `.json`)
//! and a JSON syntax (`.json` files).
//! Both are lowered to [`RawSpecification`]s and compiled one by one,
//! so that an ill-formed specification does not prevent the others from loading.

pub mod json;
mod lexer;
mod parser;

use anyhow::Context;
use icftl_core::{RawSpecification, Specification, SpecificationError, compile};
use log::{info, warn};
use std::{path::Path, time::Instant};
use thiserror::Error;

pub use json::JsonError;
pub use parser::parse;

/// Syntax errors in the textual format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Input that is not a token.
    #[error("unrecognized input at byte {0}")]
    Lex(usize),
    /// Unexpected token.
    #[error("unexpected '{found}' at byte {offset}, expected {expected}")]
    Unexpected {
        /// Byte offset of the token.
        offset: usize,
        /// The token found.
        found: String,
        /// Description of what was expected instead.
        expected: &'static str,
    },
    /// Input ended too early.
    #[error("unexpected end of input, expected {0}")]
    Eof(&'static str),
    /// Literal out of range.
    #[error("invalid literal '{literal}' at byte {offset}")]
    Literal {
        /// Byte offset of the literal.
        offset: usize,
        /// The literal.
        literal: String,
    },
}

/// Formats of specification files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// The textual format.
    #[default]
    Text,
    /// The JSON format.
    Json,
}

impl Format {
    /// The format of a file, based on its extension.
    pub fn from_path(path: &Path) -> Format {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Text,
        }
    }
}

/// The outcome of loading a specification file.
#[derive(Debug, Default)]
pub struct Loaded {
    /// Successfully compiled specifications, in file order.
    pub specifications: Vec<Specification>,
    /// Specifications rejected by the compiler.
    pub errors: Vec<SpecificationError>,
}

/// Parses a source in the given format.
pub fn parse_str(source: &str, format: Format) -> anyhow::Result<Vec<RawSpecification>> {
    let raw = match format {
        Format::Text => parser::parse(source)?,
        Format::Json => json::parse(source)?,
    };
    Ok(raw)
}

/// Compiles each specification independently.
pub fn compile_all(raw: Vec<RawSpecification>) -> Loaded {
    let mut loaded = Loaded::default();
    for spec in raw {
        if loaded
            .specifications
            .iter()
            .any(|s: &Specification| s.name().as_ref() == spec.name)
        {
            warn!(target: "build", "specification name '{}' is used more than once", spec.name);
        }
        match compile(spec) {
            Ok(spec) => loaded.specifications.push(spec),
            Err(err) => {
                warn!(target: "build", "{err}");
                loaded.errors.push(err);
            }
        }
    }
    loaded
}

/// Parses and compiles every specification in the file at the given path,
/// with the format given by the file extension.
///
/// Fails only if the file cannot be read or parsed;
/// specifications that do not compile are reported in [`Loaded::errors`].
pub fn load(path: &Path) -> anyhow::Result<Loaded> {
    load_as(path, Format::from_path(path))
}

/// Like [`load`], with an explicit format.
pub fn load_as(path: &Path, format: Format) -> anyhow::Result<Loaded> {
    let time = Instant::now();
    info!(target: "parser", "parsing specification file '{}'", path.display());
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read file '{}' to string", path.display()))?;
    let raw = parse_str(&source, format).with_context(|| {
        format!(
            "failed to parse specifications in '{}'",
            path.display()
        )
    })?;
    info!("parsing complete in {:?}", time.elapsed());

    let time = Instant::now();
    info!(target: "build", "compiling {} specifications", raw.len());
    let loaded = compile_all(raw);
    info!(
        "compiling completed in {:?}: {} compiled, {} rejected",
        time.elapsed(),
        loaded.specifications.len(),
        loaded.errors.len()
    );
    Ok(loaded)
}
