//! Bilingual sentence table loading.
//!
//! Tables are CSV with `english` and `chinese` header columns. Files exported
//! from spreadsheet tools on Chinese-locale systems are often GB18030/GBK
//! rather than UTF-8, so decoding falls back through a fixed list.

use std::path::Path;

use anyhow::{Context, Result};
use encoding_rs::{Encoding, GB18030, GBK, UTF_8};

use crate::error::DrillError;
use crate::types::DialogueRow;

/// Encodings tried in order, by the label reported on success.
pub const ENCODING_FALLBACK: [&str; 4] = ["utf-8-sig", "utf-8", "gb18030", "gbk"];

const ENGLISH_COLUMN: &str = "english";
const CHINESE_COLUMN: &str = "chinese";

#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub rows: Vec<DialogueRow>,
    /// Label from [`ENCODING_FALLBACK`] that decoded the file
    pub encoding: &'static str,
}

/// Decode raw table bytes, returning the text and the encoding label that worked.
pub fn decode_with_fallback(bytes: &[u8]) -> Option<(String, &'static str)> {
    for label in ENCODING_FALLBACK {
        let decoded = match label {
            // BOM optional: any valid UTF-8 reports this label
            "utf-8-sig" => {
                let body = match Encoding::for_bom(bytes) {
                    Some((enc, bom_len)) if enc == UTF_8 => &bytes[bom_len..],
                    _ => bytes,
                };
                UTF_8.decode_without_bom_handling_and_without_replacement(body)
            }
            "utf-8" => UTF_8.decode_without_bom_handling_and_without_replacement(bytes),
            "gb18030" => GB18030.decode_without_bom_handling_and_without_replacement(bytes),
            "gbk" => GBK.decode_without_bom_handling_and_without_replacement(bytes),
            _ => None,
        };
        if let Some(text) = decoded {
            return Some((text.into_owned(), label));
        }
    }
    None
}

/// Parse CSV text into rows. Missing columns read as empty; fields are trimmed.
pub fn parse_rows(text: &str) -> Result<Vec<DialogueRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers().context("Failed to read CSV header")?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);
    let en_idx = column(ENGLISH_COLUMN);
    let zh_idx = column(CHINESE_COLUMN);
    if en_idx.is_none() && zh_idx.is_none() {
        log::warn!(
            "CSV has neither an '{}' nor a '{}' column; every row will be empty",
            ENGLISH_COLUMN,
            CHINESE_COLUMN
        );
    }

    let field = |record: &csv::StringRecord, idx: Option<usize>| {
        idx.and_then(|i| record.get(i))
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed CSV record {}", i + 1))?;
        rows.push(DialogueRow {
            english: field(&record, en_idx),
            chinese: field(&record, zh_idx),
        });
    }
    Ok(rows)
}

/// Read and decode a sentence table.
///
/// Undecodable files fail with [`DrillError::EncodingDetection`].
pub fn load_rows(path: &Path) -> Result<LoadedTable> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read table: {}", path.display()))?;

    let (text, encoding) = decode_with_fallback(&bytes).ok_or_else(|| DrillError::EncodingDetection {
        path: path.to_path_buf(),
        tried: ENCODING_FALLBACK.to_vec(),
    })?;
    log::info!("CSV encoding detected: {}", encoding);

    let rows = parse_rows(&text)
        .with_context(|| format!("Failed to parse table: {}", path.display()))?;
    Ok(LoadedTable { rows, encoding })
}

/// Replace typographic quotes the synthesizer's text frontend stumbles on.
pub fn speakable_text(text: &str) -> String {
    text.replace('\u{2019}', "'")
        .replace('\u{201c}', "\"")
        .replace('\u{201d}', "\"")
}
