//! ToUnicode CMap parsing
//!
//! Only the `bfchar` and `bfrange` sections matter for text extraction.
//! Destinations are UTF-16BE hex strings, which covers surrogate pairs and
//! ligature mappings in one decode.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref BFCHAR: Regex = Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]*)>").unwrap();
    static ref BFRANGE_SEQ: Regex =
        Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>").unwrap();
    static ref BFRANGE_ARRAY: Regex =
        Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>\s*\[([^\]]*)\]").unwrap();
    static ref HEX: Regex = Regex::new(r"<([0-9A-Fa-f]*)>").unwrap();
}

/// Upper bound on a single bfrange, guards against hostile ranges like `<0000> <FFFFFFFF>`.
const MAX_RANGE_LEN: u32 = 0x1_0000;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToUnicodeMap {
    map: HashMap<u32, String>,
}

impl ToUnicodeMap {
    pub fn parse(data: &[u8]) -> Self {
        let content = String::from_utf8_lossy(data);
        let mut cmap = ToUnicodeMap::default();

        for section in sections(&content, "beginbfchar", "endbfchar") {
            for caps in BFCHAR.captures_iter(section) {
                if let (Some(code), Some(dst)) = (parse_code(&caps[1]), utf16_hex(&caps[2])) {
                    cmap.map.insert(code, dst);
                }
            }
        }

        for section in sections(&content, "beginbfrange", "endbfrange") {
            // Array form first, its destinations would otherwise match the sequential form.
            let mut consumed = Vec::new();
            for caps in BFRANGE_ARRAY.captures_iter(section) {
                if let Some(m) = caps.get(0) {
                    consumed.push(m.range());
                }
                let (Some(start), Some(end)) = (parse_code(&caps[1]), parse_code(&caps[2])) else {
                    continue;
                };
                let dsts = HEX.captures_iter(&caps[3]).filter_map(|c| utf16_hex(&c[1]));
                for (code, dst) in (start..=end).take(MAX_RANGE_LEN as usize).zip(dsts) {
                    cmap.map.insert(code, dst);
                }
            }

            for caps in BFRANGE_SEQ.captures_iter(section) {
                let Some(m) = caps.get(0) else { continue };
                if consumed.iter().any(|r| r.contains(&m.start())) {
                    continue;
                }
                let (Some(start), Some(end)) = (parse_code(&caps[1]), parse_code(&caps[2])) else {
                    continue;
                };
                let Some(base) = utf16_units(&caps[3]) else {
                    continue;
                };
                if end < start || end - start >= MAX_RANGE_LEN {
                    continue;
                }
                for offset in 0..=(end - start) {
                    // Only the last UTF-16 unit increments across the range.
                    let mut units = base.clone();
                    if let Some(last) = units.last_mut() {
                        *last = last.wrapping_add(offset as u16);
                    }
                    cmap.map.insert(start + offset, String::from_utf16_lossy(&units));
                }
            }
        }

        cmap
    }

    pub fn get(&self, code: u32) -> Option<&str> {
        self.map.get(&code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

fn sections<'a>(content: &'a str, begin: &str, end: &str) -> Vec<&'a str> {
    let mut found = Vec::new();
    let mut rest = content;
    while let Some(start) = rest.find(begin) {
        let body = &rest[start + begin.len()..];
        match body.find(end) {
            Some(stop) => {
                found.push(&body[..stop]);
                rest = &body[stop + end.len()..];
            }
            None => break,
        }
    }
    found
}

fn parse_code(hex: &str) -> Option<u32> {
    if hex.len() > 8 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

fn utf16_units(hex: &str) -> Option<Vec<u16>> {
    if hex.is_empty() || hex.len() % 4 != 0 {
        // Some producers write single-byte destinations like <41>.
        if !hex.is_empty() && hex.len() <= 4 {
            return u16::from_str_radix(hex, 16).ok().map(|u| vec![u]);
        }
        return None;
    }
    (0..hex.len())
        .step_by(4)
        .map(|i| u16::from_str_radix(&hex[i..i + 4], 16).ok())
        .collect()
}

fn utf16_hex(hex: &str) -> Option<String> {
    utf16_units(hex).map(|units| String::from_utf16_lossy(&units))
}
