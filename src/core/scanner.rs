// Element scanning over a normalized byte stream, including the 'z'-run escape.

pub const SENTINEL: u8 = b'_';
pub const RUN_LETTER: u8 = b'z';
pub const RUN_STEP: u64 = 26;

/// One scanned element: its value and the cursor just past it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Element {
    pub value: u64,
    pub next: usize,
}

/// Value of a single character outside run handling: sentinel is 0, letters are 1-based.
pub fn simple_value(byte: u8) -> u64 {
    if byte == SENTINEL {
        return 0;
    }
    u64::from(byte.wrapping_sub(b'a')) + 1
}

/// Scans one element starting at `cursor`.
///
/// At end of stream the result is `{ value: 0, next: cursor }`. A run of
/// 'z' contributes 26 per letter and absorbs exactly one following
/// character at its simple value, if one remains.
pub fn scan_element(stream: &[u8], cursor: usize) -> Element {
    let Some(&byte) = stream.get(cursor) else {
        return Element {
            value: 0,
            next: cursor,
        };
    };
    if byte != RUN_LETTER {
        return Element {
            value: simple_value(byte),
            next: cursor + 1,
        };
    }

    let mut value = 0u64;
    let mut next = cursor;
    while stream.get(next) == Some(&RUN_LETTER) {
        value = value.saturating_add(RUN_STEP);
        next += 1;
    }
    if let Some(&trailing) = stream.get(next) {
        value = value.saturating_add(simple_value(trailing));
        next += 1;
    }
    Element { value, next }
}
