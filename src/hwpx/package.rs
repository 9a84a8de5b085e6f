use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

static SECTION_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Contents/section\d+\.xml$").expect("section path regex"));

pub fn is_section_path(name: &str) -> bool {
    SECTION_PATH_RE.is_match(name)
}

/// An HWPX archive held in memory. Entry order, compression and timestamps are kept so a
/// rewritten archive differs from the source only in replaced entries (`mimetype` stays first
/// and stored).
pub struct HwpxPackage {
    pub entries: Vec<HwpxEntry>,
}

pub struct HwpxEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl HwpxPackage {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let f = File::open(path).with_context(|| format!("open hwpx: {}", path.display()))?;
        Self::from_reader(f)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> anyhow::Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> anyhow::Result<Self> {
        let mut zip = ZipArchive::new(reader).context("read zip")?;
        let mut entries = Vec::new();
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).context("zip entry")?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data).context("read zip entry")?;
            entries.push(HwpxEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    /// Writes every entry, substituting the data of entries named in `replacements`.
    pub fn write_with_replacements<W: Write + Seek>(
        &self,
        writer: W,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> anyhow::Result<W> {
        let mut zout = ZipWriter::new(writer);
        for ent in &self.entries {
            let data = replacements.get(&ent.name).unwrap_or(&ent.data);
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(&ent.name, opts)
                    .with_context(|| format!("add zip dir: {}", ent.name))?;
            } else {
                zout.start_file(&ent.name, opts)
                    .with_context(|| format!("start zip file: {}", ent.name))?;
                zout.write_all(data)
                    .with_context(|| format!("write zip file: {}", ent.name))?;
            }
        }
        zout.finish().context("finish zip")
    }

    pub fn to_bytes_with_replacements(
        &self,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> anyhow::Result<Vec<u8>> {
        let cursor = self.write_with_replacements(Cursor::new(Vec::new()), replacements)?;
        Ok(cursor.into_inner())
    }

    /// Section XML entries in archive order.
    pub fn section_entries(&self) -> Vec<&HwpxEntry> {
        self.entries
            .iter()
            .filter(|e| !e.is_dir && is_section_path(&e.name))
            .collect()
    }

    /// The first section, which holds the certificate body.
    pub fn primary_section(&self) -> Option<&HwpxEntry> {
        self.section_entries().into_iter().next()
    }
}
