use std::collections::HashMap;

use encoding_rs::UTF_8;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::RebuildError;
use crate::fields::{FieldEdit, FieldKey};
use crate::hwpx::package::HwpxPackage;
use crate::hwpx::reflow::reflow_address;
use crate::hwpx::substitute::{substitute, substitute_address};
use crate::hwpx::xml::{parse_document, write_document};
use crate::metrics::LayoutConstants;
use crate::progress::ConsoleProgress;

pub const DEFAULT_XML_DECLARATION: &str =
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes" ?>"#;

static XML_DECL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(<\?xml[^>]*\?>)").expect("xml decl regex"));

/// Inputs shared by every section of one rebuild.
pub struct RebuildContext<'a> {
    pub edits: &'a [FieldEdit],
    /// Guards the issuer's address line against the bare address fallback.
    pub company_address: &'a str,
    pub layout: &'a LayoutConstants,
}

/// Builds the edited archive. Section XML entries are rewritten, everything else is copied
/// byte for byte. Any failure discards the whole archive.
pub fn rebuild_archive(
    package: &HwpxPackage,
    ctx: &RebuildContext<'_>,
    progress: &ConsoleProgress,
) -> Result<Vec<u8>, RebuildError> {
    let sections = package.section_entries();
    if sections.is_empty() {
        return Err(RebuildError::MalformedArchive);
    }

    let mut replacements: HashMap<String, Vec<u8>> = HashMap::new();
    for (i, ent) in sections.iter().enumerate() {
        progress.step("sections", i + 1, sections.len(), &ent.name);
        let bytes = rewrite_section(&ent.name, &ent.data, ctx, progress)?;
        replacements.insert(ent.name.clone(), bytes);
    }

    package
        .to_bytes_with_replacements(&replacements)
        .map_err(|e| RebuildError::Archive {
            detail: format!("{e:#}"),
        })
}

/// Substitutes every effective edit into one section, re-flows the address block when the
/// address changed, and re-attaches the original XML declaration.
pub fn rewrite_section(
    entry: &str,
    data: &[u8],
    ctx: &RebuildContext<'_>,
    progress: &ConsoleProgress,
) -> Result<Vec<u8>, RebuildError> {
    let (text, had_errors) = UTF_8.decode_with_bom_removal(data);
    if had_errors {
        return Err(RebuildError::Encoding {
            entry: entry.to_string(),
        });
    }
    let declaration = capture_declaration(&text);

    let mut root = parse_document(&text).map_err(|e| RebuildError::Parse {
        entry: entry.to_string(),
        detail: format!("{e:#}"),
    })?;

    let mut new_address: Option<&str> = None;
    for edit in ctx.edits.iter().filter(|e| e.is_effective()) {
        let hits = if edit.key == FieldKey::Address {
            let hits =
                substitute_address(&mut root, &edit.original, &edit.current, ctx.company_address);
            // Segments describe the text actually in the paragraph.
            if hits > 0 {
                new_address = Some(edit.current.as_str());
            }
            hits
        } else {
            substitute(&mut root, &edit.original, &edit.current)
        };
        progress.info(format!(
            "{entry}: {} replaced {hits} occurrence(s)",
            edit.key.label()
        ));
    }

    if let Some(address) = new_address {
        match reflow_address(&mut root, address, ctx.layout) {
            Some(outcome) => progress.info(format!(
                "{entry}: address re-flowed into {} line(s), {} paragraph(s) moved down",
                outcome.line_count, outcome.shifted_paragraphs
            )),
            None => progress.info(format!(
                "{entry}: no paragraph labelled {:?}; address re-flow skipped",
                ctx.layout.label_marker
            )),
        }
    }

    let body = write_document(&root).map_err(|e| RebuildError::Serialize {
        entry: entry.to_string(),
        detail: format!("{e:#}"),
    })?;
    Ok(join_declaration(declaration, &body).into_bytes())
}

pub fn capture_declaration(text: &str) -> &str {
    XML_DECL_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(DEFAULT_XML_DECLARATION)
}

fn join_declaration(declaration: &str, body: &str) -> String {
    if body.trim_start().starts_with("<?xml") {
        body.to_string()
    } else {
        format!("{declaration}\r\n{body}")
    }
}
