//! Note field encoding
//!
//! Fields are stored in one text column joined by `0x1f`. The sort field and
//! checksum columns are derived from the first field with markup removed.

use sha1::{Digest, Sha1};

/// Separator between note fields
pub const FIELD_SEPARATOR: char = '\x1f';

const BASE91_TABLE: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!#$%&()*+,-./:;<=>?@[]^_`{|}~";

/// Join fields for the `flds` column
pub fn join_fields<S: AsRef<str>>(fields: &[S]) -> String {
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(FIELD_SEPARATOR);
        }
        out.push_str(field.as_ref());
    }
    out
}

/// Split a `flds` column into its fields
pub fn split_fields(flds: &str) -> Vec<&str> {
    flds.split(FIELD_SEPARATOR).collect()
}

/// Front and back of a note; missing fields read as empty
pub fn front_back(flds: &str) -> (String, String) {
    let mut parts = flds.split(FIELD_SEPARATOR);
    let front = parts.next().unwrap_or_default().to_string();
    let back = parts.next().unwrap_or_default().to_string();
    (front, back)
}

/// Remove HTML tags and decode the common entities
pub fn strip_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// Sort field: the first field without markup
pub fn sort_field(first_field: &str) -> String {
    strip_html(first_field)
}

/// Checksum column: the first 32 bits of the SHA-1 of the stripped first field
pub fn field_checksum(first_field: &str) -> i64 {
    let digest = Sha1::digest(strip_html(first_field).as_bytes());
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    i64::from(prefix)
}

/// Random base91 note guid
pub fn new_guid() -> String {
    let (high, low) = uuid::Uuid::new_v4().as_u64_pair();
    base91(high ^ low)
}

fn base91(mut value: u64) -> String {
    let base = BASE91_TABLE.len() as u64;
    let mut out = Vec::new();
    loop {
        out.push(BASE91_TABLE[(value % base) as usize]);
        value /= base;
        if value == 0 {
            break;
        }
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Tags in the stored form: space-separated with surrounding spaces
pub fn tags_to_column(tags: &str) -> String {
    let joined = tags.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        String::new()
    } else {
        format!(" {joined} ")
    }
}

/// Tags as callers see them
pub fn tags_from_column(column: &str) -> String {
    column.split_whitespace().collect::<Vec<_>>().join(" ")
}
