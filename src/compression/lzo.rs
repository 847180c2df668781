//! LZO1X, the block codec of compressed GBX bodies.
//!
//! The decoder accepts the complete LZO1X instruction set. The encoder is a greedy
//! single-probe matcher that only emits literal runs and `M3` matches (distance up to
//! 16 KiB), which every LZO1X decoder reads.

use crate::error::{GbxError, Result};

const M2_MAX_OFFSET: usize = 0x0800;
const M3_MAX_OFFSET: usize = 0x4000;
const MIN_MATCH: usize = 3;
const HASH_BITS: u32 = 14;
const END_MARKER: [u8; 3] = [0x11, 0x00, 0x00];

fn corrupt(msg: impl Into<String>) -> GbxError {
    GbxError::Compression(format!("LZO1X: {}", msg.into()))
}

struct Input<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Input<'a> {
    fn byte(&mut self) -> Result<usize> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| corrupt("input ends inside an instruction"))?;
        self.pos += 1;
        Ok(b as usize)
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn le16(&mut self) -> Result<usize> {
        let lo = self.byte()?;
        let hi = self.byte()?;
        Ok(lo | hi << 8)
    }

    /// A length whose short field was zero: every following zero byte adds 255, the
    /// first non-zero byte ends the run.
    fn extended(&mut self, base: usize) -> Result<usize> {
        let mut zeros = 0usize;
        while self.peek() == Some(0) {
            self.pos += 1;
            zeros += 1;
        }
        let last = self.byte()?;
        zeros
            .checked_mul(255)
            .and_then(|n| n.checked_add(base + last))
            .ok_or_else(|| corrupt("run length overflows"))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| corrupt(format!("literal run of {n} bytes past the end of input")))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }
}

struct Output {
    buf: Vec<u8>,
    limit: usize,
}

impl Output {
    fn reserve(&self, n: usize) -> Result<()> {
        if self.buf.len() + n > self.limit {
            return Err(corrupt(format!(
                "output exceeds the announced {} bytes",
                self.limit
            )));
        }
        Ok(())
    }

    fn literals(&mut self, input: &mut Input<'_>, n: usize) -> Result<()> {
        self.reserve(n)?;
        self.buf.extend_from_slice(input.take(n)?);
        Ok(())
    }

    fn copy_match(&mut self, distance: usize, len: usize) -> Result<()> {
        if distance == 0 || distance > self.buf.len() {
            return Err(corrupt(format!(
                "match distance {distance} reaches before the start of output"
            )));
        }
        self.reserve(len)?;
        let start = self.buf.len() - distance;
        // Overlapping copies repeat the most recent bytes.
        for i in 0..len {
            let b = self.buf[start + i];
            self.buf.push(b);
        }
        Ok(())
    }
}

/// Decodes one LZO1X block into exactly `expected` bytes.
pub(crate) fn decompress(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut input = Input { data, pos: 0 };
    let mut out = Output {
        buf: Vec::with_capacity(expected),
        limit: expected,
    };

    // 0: after a match with no trailing literals. 1..=3: after that many trailing
    // literals. 4: after a literal run.
    let mut state = 0usize;
    if let Some(first) = input.peek().filter(|&b| b > 17) {
        input.pos += 1;
        let n = first as usize - 17;
        out.literals(&mut input, n)?;
        state = if n < 4 { n } else { 4 };
    }

    loop {
        let t = input.byte()?;
        let (distance, len, next) = if t < 16 {
            match state {
                0 => {
                    let n = 3 + if t == 0 { input.extended(15)? } else { t };
                    out.literals(&mut input, n)?;
                    state = 4;
                    continue;
                }
                4 => {
                    let distance = 1 + M2_MAX_OFFSET + (t >> 2) + (input.byte()? << 2);
                    (distance, 3, t & 3)
                }
                _ => {
                    let distance = 1 + (t >> 2) + (input.byte()? << 2);
                    (distance, 2, t & 3)
                }
            }
        } else if t >= 64 {
            let distance = 1 + ((t >> 2) & 7) + (input.byte()? << 3);
            (distance, (t >> 5) + 1, t & 3)
        } else if t >= 32 {
            let len = match t & 31 {
                0 => input.extended(31)? + 2,
                n => n + 2,
            };
            let word = input.le16()?;
            (1 + (word >> 2), len, word & 3)
        } else {
            let len = match t & 7 {
                0 => input.extended(7)? + 2,
                n => n + 2,
            };
            let word = input.le16()?;
            let distance = ((t & 8) << 11) + (word >> 2);
            if distance == 0 {
                if len != 3 {
                    return Err(corrupt("malformed end-of-stream marker"));
                }
                break;
            }
            (distance + M3_MAX_OFFSET, len, word & 3)
        };

        out.copy_match(distance, len)?;
        out.literals(&mut input, next)?;
        state = next;
    }

    if input.pos != data.len() {
        return Err(corrupt(format!(
            "{} bytes after the end-of-stream marker",
            data.len() - input.pos
        )));
    }
    if out.buf.len() != expected {
        return Err(corrupt(format!(
            "inflated to {} bytes, header announces {expected}",
            out.buf.len()
        )));
    }
    Ok(out.buf)
}

/// A run of literals followed by an optional back-reference.
struct Sequence {
    literals: (usize, usize),
    copy: Option<(usize, usize)>,
}

fn hash(bytes: &[u8]) -> usize {
    let v = u32::from(bytes[0]) | u32::from(bytes[1]) << 8 | u32::from(bytes[2]) << 16;
    (v.wrapping_mul(0x9E37_79B1) >> (32 - HASH_BITS)) as usize
}

fn find_sequences(data: &[u8]) -> Vec<Sequence> {
    let mut table = vec![usize::MAX; 1 << HASH_BITS];
    let mut sequences = Vec::new();
    let mut lit_start = 0;
    let mut pos = 0;

    while pos + MIN_MATCH <= data.len() {
        let slot = hash(&data[pos..]);
        let candidate = table[slot];
        table[slot] = pos;

        let found = candidate != usize::MAX
            && pos - candidate <= M3_MAX_OFFSET
            && data[candidate..candidate + MIN_MATCH] == data[pos..pos + MIN_MATCH];
        if !found {
            pos += 1;
            continue;
        }

        let mut len = MIN_MATCH;
        while pos + len < data.len() && data[candidate + len] == data[pos + len] {
            len += 1;
        }
        sequences.push(Sequence {
            literals: (lit_start, pos),
            copy: Some((pos - candidate, len)),
        });
        for p in pos + 1..(pos + len).min(data.len().saturating_sub(MIN_MATCH - 1)) {
            table[hash(&data[p..])] = p;
        }
        pos += len;
        lit_start = pos;
    }

    sequences.push(Sequence {
        literals: (lit_start, data.len()),
        copy: None,
    });
    sequences
}

/// Writes a run length that did not fit its short field.
fn push_extended(out: &mut Vec<u8>, mut rest: usize) {
    while rest > 255 {
        out.push(0);
        rest -= 255;
    }
    out.push(rest as u8);
}

/// Encodes `data` as one LZO1X block.
pub(crate) fn compress(data: &[u8]) -> Vec<u8> {
    let sequences = find_sequences(data);
    let mut out = Vec::with_capacity(data.len() + data.len() / 16 + 16);

    for (k, seq) in sequences.iter().enumerate() {
        let (start, end) = seq.literals;
        let n = end - start;
        if k == 0 && (1..=238).contains(&n) {
            out.push(17 + n as u8);
        } else if n > 3 {
            // A literal run instruction. Shorter runs ride in the previous match.
            match n - 3 {
                t @ 1..=15 => out.push(t as u8),
                t => {
                    out.push(0);
                    push_extended(&mut out, t - 15);
                }
            }
        }
        out.extend_from_slice(&data[start..end]);

        if let Some((distance, len)) = seq.copy {
            let following = sequences
                .get(k + 1)
                .map(|s| s.literals.1 - s.literals.0)
                .filter(|n| (1..=3).contains(n))
                .unwrap_or(0);
            if len <= 33 {
                out.push(32 | (len - 2) as u8);
            } else {
                out.push(32);
                push_extended(&mut out, len - 33);
            }
            let word = (distance - 1) << 2 | following;
            out.push((word & 0xFF) as u8);
            out.push((word >> 8) as u8);
        }
    }

    out.extend_from_slice(&END_MARKER);
    out
}
