// Sequence decoding: alternating count and value elements folded into package sums.
use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::scanner::{SENTINEL, scan_element};

/// Input that has been trimmed, lowercased, and checked against `a-z` plus `_`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Normalized(String);

impl Normalized {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Trims and lowercases `input`, rejecting the first character outside `a-z` and `_`.
pub fn normalize(input: &str) -> Result<Normalized, Error> {
    let lowered = input.trim().to_lowercase();
    if let Some((offset, ch)) = lowered
        .chars()
        .enumerate()
        .find(|(_, ch)| !is_alphabet(*ch))
    {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid character {ch:?} in input"))
            .with_hint("Input may only contain letters a-z and '_'.")
            .with_offset(offset as u64));
    }
    Ok(Normalized(lowered))
}

fn is_alphabet(ch: char) -> bool {
    ch.is_ascii_lowercase() || ch == SENTINEL as char
}

/// Decodes a normalized stream into package sums.
///
/// Each iteration reads one count element and then up to that many value
/// elements. A sentinel or zero count yields a zero package without
/// consuming values; a group cut short by end of input sums what it read.
pub fn decode_normalized(input: &Normalized) -> Vec<u64> {
    let stream = input.as_bytes();
    let mut packages = Vec::new();
    let mut cursor = 0;
    while cursor < stream.len() {
        let count = scan_element(stream, cursor);
        cursor = count.next;

        let mut sum = 0u64;
        let mut read = 0u64;
        while read < count.value && cursor < stream.len() {
            let element = scan_element(stream, cursor);
            sum = sum.saturating_add(element.value);
            cursor = element.next;
            read += 1;
        }
        packages.push(sum);
    }
    packages
}

pub fn decode(input: &str) -> Result<Vec<u64>, Error> {
    let normalized = normalize(input)?;
    let packages = decode_normalized(&normalized);
    debug!(
        input_len = normalized.len(),
        packages = packages.len(),
        "decoded input"
    );
    Ok(packages)
}
