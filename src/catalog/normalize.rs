//! Cleanup of raw scraped product records

use super::Product;
use crate::error::{AssistError, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Hardware fields copied from raw records
pub const SPEC_FIELDS: &[&str] = &[
    "man_hinh",
    "camera_sau",
    "camera_truoc",
    "pin_sac",
    "he_dieu_hanh_cpu",
    "ket_noi",
    "thiet_ke_trong_luong",
    "tien_ich",
    "thong_tin_chung",
    "bao_hanh",
    "khuyen_mai",
];

/// Boilerplate removed from every text field (licence numbers, addresses, filler)
pub const DEFAULT_NOISE_PATTERNS: &[&str] = &[
    r"GP số\s*\d+[/A-Z\-\s0-9]*",
    r"Địa chỉ[:\s].*",
    r"Chịu trách nhiệm.*",
    r"mình tham khảo",
    r"Xem trung tâm bảo hành",
];

/// Joins chunks of one long hardware field
pub const CHUNK_SEPARATOR: &str = "\n---chunk---\n";

const MAX_CHUNK_CHARS: usize = 1000;

/// Turns raw records into [`Product`]s
pub struct Normalizer {
    noise: Vec<Regex>,
    whitespace: Regex,
    list_separator: Regex,
    max_chunk_chars: usize,
}

impl Normalizer {
    pub fn new(noise_patterns: &[&str]) -> Result<Self> {
        let noise = noise_patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("(?i){}", p)).map_err(|e| {
                    AssistError::Catalog(format!("Invalid noise pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let whitespace = Regex::new(r"\s+")
            .map_err(|e| AssistError::Catalog(format!("Invalid whitespace pattern: {}", e)))?;
        let list_separator = Regex::new(r"[;,/]+")
            .map_err(|e| AssistError::Catalog(format!("Invalid separator pattern: {}", e)))?;

        Ok(Self {
            noise,
            whitespace,
            list_separator,
            max_chunk_chars: MAX_CHUNK_CHARS,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(DEFAULT_NOISE_PATTERNS)
    }

    /// Collapse whitespace, turn `;` into sentence breaks and strip noise
    pub fn clean_text(&self, text: &str) -> String {
        let text = text.replace(';', ". ");
        let mut text = self.whitespace.replace_all(&text, " ").trim().to_string();
        for pattern in &self.noise {
            text = pattern.replace_all(&text, "").into_owned();
        }
        self.whitespace.replace_all(&text, " ").trim().to_string()
    }

    /// Keep the digits of a price string ("19.990.000₫" -> 19990000)
    pub fn normalize_price(&self, raw: &str) -> Option<u64> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            None
        } else {
            digits.parse().ok()
        }
    }

    pub fn split_list_field(&self, raw: &str) -> Vec<String> {
        self.list_separator
            .split(raw)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Split text into pieces of at most `max_chunk_chars` characters, breaking on spaces
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.trim().chars().collect();
        let max = self.max_chunk_chars;
        if chars.len() <= max {
            return vec![chars.into_iter().collect()];
        }

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let mut end = (start + max).min(chars.len());
            if end < chars.len() {
                if let Some(space) = chars[start + 1..end].iter().rposition(|c| *c == ' ') {
                    end = start + 1 + space;
                }
            }
            let chunk: String = chars[start..end].iter().collect();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }
            start = end;
        }
        chunks
    }

    /// Normalize one raw record; records without a product name are dropped
    pub fn normalize_record(&self, record: &Map<String, Value>) -> Option<Product> {
        let name = field(record, "ten_san_pham")?.trim().to_string();
        if name.is_empty() {
            return None;
        }

        let mut specs = BTreeMap::new();
        for key in SPEC_FIELDS {
            let value = field(record, key)
                .filter(|v| !v.trim().is_empty())
                .map(|v| self.chunk_text(&self.clean_text(&v)).join(CHUNK_SEPARATOR))
                .unwrap_or_default();
            specs.insert(key.to_string(), value);
        }

        let image = field(record, "hinh_anh")
            .filter(|v| !v.is_empty())
            .or_else(|| field(record, "url_anh"))
            .unwrap_or_default();

        Some(Product {
            name,
            price: field(record, "gia").and_then(|v| self.normalize_price(&v)),
            image,
            url: field(record, "url").unwrap_or_default(),
            brand: field(record, "thuong_hieu").unwrap_or_default(),
            colors: field(record, "mau_sac")
                .map(|v| self.split_list_field(&v))
                .unwrap_or_default(),
            status: self.clean_text(&field(record, "tinh_trang").unwrap_or_default()),
            specs,
            branches: field(record, "chi_nhanh")
                .map(|v| self.split_list_field(&v))
                .unwrap_or_default(),
        })
    }

    /// Normalize every object in a JSON array, skipping non-objects and unnamed records
    pub fn normalize_records(&self, records: &[Value]) -> Vec<Product> {
        records
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|r| self.normalize_record(r))
            .collect()
    }

    /// Read raw records from `input` and write cleaned products to `output`
    pub fn normalize_file(&self, input: &Path, output: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(input).map_err(|e| AssistError::Io {
            source: e,
            context: format!("Failed to read raw catalog: {}", input.display()),
        })?;
        let raw: Vec<Value> = serde_json::from_str(&content).map_err(|e| AssistError::Json {
            source: e,
            context: format!("Raw catalog must be a JSON array: {}", input.display()),
        })?;

        let products = self.normalize_records(&raw);
        let json = serde_json::to_string_pretty(&products).map_err(|e| AssistError::Json {
            source: e,
            context: "Failed to serialize products".to_string(),
        })?;
        std::fs::write(output, json).map_err(|e| AssistError::Io {
            source: e,
            context: format!("Failed to write catalog: {}", output.display()),
        })?;

        tracing::info!(
            input = raw.len(),
            output = products.len(),
            "Normalized catalog written to {}",
            output.display()
        );
        Ok(products.len())
    }
}

/// Field as text; null and missing fields are absent, numbers are stringified
fn field(record: &Map<String, Value>, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
