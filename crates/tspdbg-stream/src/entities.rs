//! Attribute extraction and entity decoding for control payloads.

/// Decode predefined XML entities and numeric character references.
///
/// Trackback text arrives with `&#10;` and `&#9;` standing in for newline
/// and tab. Unknown or malformed references are kept verbatim.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .and_then(|semi| decode_reference(&tail[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix('x').or_else(|| number.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Return the raw (still encoded) value of `name="..."` inside `block`.
///
/// Quotes inside values are always entity-encoded on the wire, so the value
/// runs to the next `"`.
pub fn raw_attribute<'a>(block: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{name}=\"");
    let start = block.find(&needle)? + needle.len();
    let len = block[start..].find('"')?;
    Some(&block[start..start + len])
}
