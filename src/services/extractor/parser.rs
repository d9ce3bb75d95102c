//! Parser for makemkvcon's robot-mode output.
//!
//! Robot mode emits line-based records behind keyed prefixes: `CINFO:` for
//! disc attributes, `TINFO:` for per-title attributes, `PRGV:` for progress
//! bar values, `MSG:` for log messages. All strings are quoted with
//! backslash escaping. The parser tolerates unknown prefixes and malformed
//! records by skipping them; a best-effort structure always comes back.

use std::collections::BTreeMap;

use crate::core::progress::parse_hms;

/// Attribute id carrying a human-readable name.
pub const ATTR_NAME: u32 = 2;
/// Attribute id carrying the chapter count.
pub const ATTR_CHAPTER_COUNT: u32 = 8;
/// Attribute id carrying the duration as `H:MM:SS`.
pub const ATTR_DURATION: u32 = 9;

/// One parsed robot-mode record.
#[derive(Debug, Clone, PartialEq)]
pub enum RobotRecord {
    /// `CINFO:attr,code,"value"` — disc-level attribute.
    DiscAttr {
        attr: u32,
        value: String,
    },
    /// `TINFO:title,attr,code,"value"` — per-title attribute.
    TitleAttr {
        title: u32,
        attr: u32,
        value: String,
    },
    /// `PRGV:current,total,max` — progress bar values.
    Progress {
        current: u64,
        total: u64,
        max: u64,
    },
    /// `MSG:code,flags,count,"message",...` — log message.
    Message {
        code: u32,
        text: String,
    },
    /// `TCOUT:count` — announced title count.
    TitleCount(u32),
}

/// Parse one output line. Unknown or malformed lines yield `None`.
pub fn parse_line(line: &str) -> Option<RobotRecord> {
    let (prefix, rest) = line.split_once(':')?;
    let fields = split_fields(rest);
    match prefix {
        "CINFO" => Some(RobotRecord::DiscAttr {
            attr: fields.first()?.parse().ok()?,
            value: fields.get(2).cloned().unwrap_or_default(),
        }),
        "TINFO" => Some(RobotRecord::TitleAttr {
            title: fields.first()?.parse().ok()?,
            attr: fields.get(1)?.parse().ok()?,
            value: fields.get(3).cloned().unwrap_or_default(),
        }),
        "PRGV" => Some(RobotRecord::Progress {
            current: fields.first()?.parse().ok()?,
            total: fields.get(1)?.parse().ok()?,
            max: fields.get(2)?.parse().ok()?,
        }),
        "MSG" => Some(RobotRecord::Message {
            code: fields.first()?.parse().ok()?,
            text: fields.get(3).cloned().unwrap_or_default(),
        }),
        "TCOUT" => Some(RobotRecord::TitleCount(fields.first()?.parse().ok()?)),
        _ => None,
    }
}

/// Split a comma-separated record respecting quoted, backslash-escaped
/// strings. Quotes are stripped from the returned fields.
fn split_fields(rest: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    for ch in rest.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

/// One title enumerated during a disc scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Title {
    /// Title index used to address the title during extraction.
    pub index: u32,
    /// Duration as `H:MM:SS`.
    pub duration: String,
    /// Number of chapters.
    pub chapter_count: u32,
    /// Human-readable title description.
    pub description: String,
}

impl Title {
    /// Duration in seconds; malformed durations count as 0.
    pub fn duration_seconds(&self) -> f64 {
        parse_hms(&self.duration)
    }
}

/// Result of scanning a disc or disc image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscInfo {
    /// Disc name reported by the extractor.
    pub disc_name: String,
    /// Enumerated titles, ordered by index.
    pub titles: Vec<Title>,
}

impl DiscInfo {
    /// Index of the main feature: the title with the greatest duration,
    /// ties broken by the smaller index.
    pub fn main_title(&self) -> Option<u32> {
        let mut best: Option<&Title> = None;
        for title in &self.titles {
            match best {
                Some(current) if title.duration_seconds() <= current.duration_seconds() => {}
                _ => best = Some(title),
            }
        }
        best.map(|t| t.index)
    }
}

/// Assemble a `DiscInfo` from scan output lines.
pub fn parse_disc_info<'a, I: IntoIterator<Item = &'a str>>(lines: I) -> DiscInfo {
    let mut disc_name = String::new();
    let mut titles: BTreeMap<u32, Title> = BTreeMap::new();
    for line in lines {
        match parse_line(line) {
            Some(RobotRecord::DiscAttr { attr, value }) if attr == ATTR_NAME => {
                disc_name = value;
            }
            Some(RobotRecord::TitleAttr { title, attr, value }) => {
                let entry = titles.entry(title).or_insert_with(|| Title {
                    index: title,
                    duration: String::new(),
                    chapter_count: 0,
                    description: String::new(),
                });
                match attr {
                    ATTR_DURATION => entry.duration = value,
                    ATTR_CHAPTER_COUNT => entry.chapter_count = value.parse().unwrap_or(0),
                    ATTR_NAME => entry.description = value,
                    _ => {}
                }
            }
            _ => {}
        }
    }
    DiscInfo {
        disc_name,
        titles: titles.into_values().collect(),
    }
}
