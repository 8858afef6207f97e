use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

static UNICODE_ESCAPE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\\u([0-9a-fA-F]{4})").ok());

/// Replaces `\uXXXX` escapes in streamed answer text with the characters
/// they encode.
///
/// Only escapes with exactly four hex digits are touched. Adjacent escapes
/// forming a UTF-16 surrogate pair decode to one character; a lone surrogate
/// is not a valid `char` and stays as written. Text without escapes is
/// returned borrowed and unchanged.
pub fn decode_stream_content(content: &str) -> Cow<'_, str> {
    let Some(pattern) = UNICODE_ESCAPE.as_ref() else {
        return Cow::Borrowed(content);
    };
    if !pattern.is_match(content) {
        return Cow::Borrowed(content);
    }

    let mut out = String::with_capacity(content.len());
    let mut run: Vec<(u32, &str)> = Vec::new();
    let mut cursor = 0;
    for caps in pattern.captures_iter(content) {
        let (Some(whole), Some(hex)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Ok(unit) = u32::from_str_radix(hex.as_str(), 16) else {
            return Cow::Borrowed(content);
        };
        if whole.start() != cursor {
            flush_escapes(&mut out, &mut run);
            out.push_str(&content[cursor..whole.start()]);
        }
        run.push((unit, whole.as_str()));
        cursor = whole.end();
    }
    flush_escapes(&mut out, &mut run);
    out.push_str(&content[cursor..]);
    Cow::Owned(out)
}

/// Writes a run of back-to-back escapes, pairing surrogates where possible.
fn flush_escapes(out: &mut String, run: &mut Vec<(u32, &str)>) {
    let mut i = 0;
    while i < run.len() {
        let (unit, raw) = run[i];
        if (0xD800..0xDC00).contains(&unit)
            && let Some(&(low, _)) = run.get(i + 1)
            && (0xDC00..0xE000).contains(&low)
            && let Some(ch) = char::from_u32(0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00))
        {
            out.push(ch);
            i += 2;
            continue;
        }
        match char::from_u32(unit) {
            Some(ch) => out.push(ch),
            None => out.push_str(raw),
        }
        i += 1;
    }
    run.clear();
}
