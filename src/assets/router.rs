use std::fmt;

use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use time::OffsetDateTime;

/// Destination directory for an upload, chosen from its content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Image,
    Document,
    Video,
    Other,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [Bucket::Image, Bucket::Document, Bucket::Video, Bucket::Other];

    pub fn dir(self) -> &'static str {
        match self {
            Bucket::Image => "images",
            Bucket::Document => "pdfs",
            Bucket::Video => "videos",
            Bucket::Other => "others",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Bucket::Image => "image",
            Bucket::Document => "pdf",
            Bucket::Video => "video",
            Bucket::Other => "file",
        })
    }
}

pub fn route(mime_type: &str) -> Bucket {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if essence.starts_with("image/") {
        Bucket::Image
    } else if essence == "application/pdf" {
        Bucket::Document
    } else if essence.starts_with("video/") {
        Bucket::Video
    } else {
        Bucket::Other
    }
}

/// `<unix-millis>-<6 hex>-<sanitized original name>`.
pub fn name_for(original_name: &str) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!("{millis}-{suffix:06x}-{}", sanitize(original_name))
}

fn sanitize(original_name: &str) -> String {
    lazy_static! {
        static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
        static ref UNSAFE: Regex = Regex::new(r"[^A-Za-z0-9._-]").unwrap();
    }
    // Only the last path segment survives, whichever separator the client used.
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let collapsed = WHITESPACE.replace_all(base, "_");
    let cleaned = UNSAFE.replace_all(&collapsed, "");
    let cleaned = cleaned.trim_start_matches('.');
    let cleaned: String = cleaned.chars().take(100).collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}
