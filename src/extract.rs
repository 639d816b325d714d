//! Locate the JSON array in free-form LM output.
//!
//! Models wrap their answer in prose or code fences often enough that parsing
//! stdout directly is unreliable. The scanner starts at the first `[` and walks
//! forward tracking nesting and string state, so brackets inside string values
//! never close the array early.

/// Return the first balanced `[...]` span in `text`, verbatim.
///
/// Returns `None` when there is no `[` or the array never closes. Only bracket
/// balance is checked; the span may still fail to parse as JSON.
pub fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in text.as_bytes()[start..].iter().copied().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' => stack.push(b']'),
            b'{' => stack.push(b'}'),
            b']' | b'}' => {
                if stack.pop() != Some(byte) {
                    return None;
                }
                if stack.is_empty() {
                    // `]` is ASCII, so the end offset is a char boundary.
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
