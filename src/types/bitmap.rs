//! Bit-level operations over string values.
//!
//! Bits are addressed most-significant first: bit 0 is the high bit of byte 0,
//! matching Redis bit ordering.

/// Largest addressable bit offset (`2^32 - 1`).
pub const MAX_BIT_OFFSET: u64 = (1 << 32) - 1;

/// Whether `start`/`end` bounds count bytes or bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeUnit {
    Byte,
    Bit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    And,
    Or,
    Xor,
    Not,
}

impl BitOp {
    pub fn parse(name: &str) -> Option<BitOp> {
        match name.to_ascii_uppercase().as_str() {
            "AND" => Some(BitOp::And),
            "OR" => Some(BitOp::Or),
            "XOR" => Some(BitOp::Xor),
            "NOT" => Some(BitOp::Not),
            _ => None,
        }
    }
}

/// Set the bit at `offset`, zero-extending the string as needed.
/// Returns the previous bit.
pub fn setbit(data: &mut Vec<u8>, offset: usize, value: bool) -> bool {
    let byte = offset / 8;
    let mask = 0x80u8 >> (offset % 8);
    if byte >= data.len() {
        data.resize(byte + 1, 0);
    }
    let old = data[byte] & mask != 0;
    if value {
        data[byte] |= mask;
    } else {
        data[byte] &= !mask;
    }
    old
}

/// Bits past the end of the string read as 0.
pub fn getbit(data: &[u8], offset: usize) -> bool {
    data.get(offset / 8)
        .is_some_and(|b| b & (0x80 >> (offset % 8)) != 0)
}

/// Resolve Redis-style inclusive bounds (negative counts from the end)
/// against a length. Returns None for an empty range.
fn resolve_range(start: i64, end: i64, len: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let start = if start < 0 { (len + start).max(0) } else { start };
    let end = if end < 0 { (len + end).max(0) } else { end.min(len - 1) };
    if start > end || start >= len {
        return None;
    }
    Some((start as usize, end as usize))
}

fn unit_len(data: &[u8], unit: RangeUnit) -> i64 {
    match unit {
        RangeUnit::Byte => data.len() as i64,
        RangeUnit::Bit => data.len() as i64 * 8,
    }
}

/// Convert a resolved range into an inclusive bit range.
fn to_bit_range((start, end): (usize, usize), unit: RangeUnit) -> (usize, usize) {
    match unit {
        RangeUnit::Byte => (start * 8, end * 8 + 7),
        RangeUnit::Bit => (start, end),
    }
}

/// Count set bits, optionally within an inclusive range.
pub fn bitcount(data: &[u8], range: Option<(i64, i64)>, unit: RangeUnit) -> u64 {
    let (first, last) = match range {
        None => return data.iter().map(|b| b.count_ones() as u64).sum(),
        Some((start, end)) => match resolve_range(start, end, unit_len(data, unit)) {
            Some(r) => to_bit_range(r, unit),
            None => return 0,
        },
    };

    let (first_byte, last_byte) = (first / 8, last / 8);
    let head_mask = 0xffu8 >> (first % 8);
    let tail_mask = 0xffu8 << (7 - last % 8);
    if first_byte == last_byte {
        return (data[first_byte] & head_mask & tail_mask).count_ones() as u64;
    }
    let middle: u64 = data[first_byte + 1..last_byte]
        .iter()
        .map(|b| b.count_ones() as u64)
        .sum();
    (data[first_byte] & head_mask).count_ones() as u64
        + middle
        + (data[last_byte] & tail_mask).count_ones() as u64
}

/// Position of the first bit equal to `bit`, or -1.
///
/// When looking for a clear bit without an explicit end and every bit in
/// range is set, the string is treated as padded with zeros on the right,
/// so the answer is the first bit past the end.
pub fn bitpos(data: &[u8], bit: bool, start: Option<i64>, end: Option<i64>, unit: RangeUnit) -> i64 {
    if data.is_empty() {
        return if bit { -1 } else { 0 };
    }
    let len = unit_len(data, unit);
    let resolved = resolve_range(start.unwrap_or(0), end.unwrap_or(len - 1), len);
    let Some((first, last)) = resolved.map(|r| to_bit_range(r, unit)) else {
        return -1;
    };

    let mut pos = first;
    while pos <= last {
        // Skip whole bytes that cannot contain the target bit.
        if pos % 8 == 0 && pos + 7 <= last {
            let byte = data[pos / 8];
            let skip = if bit { byte == 0 } else { byte == 0xff };
            if skip {
                pos += 8;
                continue;
            }
        }
        if getbit(data, pos) == bit {
            return pos as i64;
        }
        pos += 1;
    }

    if !bit && end.is_none() {
        return data.len() as i64 * 8;
    }
    -1
}

/// Combine sources byte by byte. Shorter sources are zero-padded; the
/// result is as long as the longest source.
pub fn bitop(op: BitOp, sources: &[Vec<u8>]) -> Vec<u8> {
    let len = sources.iter().map(Vec::len).max().unwrap_or(0);
    let byte_at = |src: &Vec<u8>, i: usize| src.get(i).copied().unwrap_or(0);

    if op == BitOp::Not {
        return sources
            .first()
            .map(|src| src.iter().map(|b| !b).collect())
            .unwrap_or_default();
    }

    (0..len)
        .map(|i| {
            let mut iter = sources.iter().map(|s| byte_at(s, i));
            let first = iter.next().unwrap_or(0);
            iter.fold(first, |acc, b| match op {
                BitOp::And => acc & b,
                BitOp::Or => acc | b,
                BitOp::Xor => acc ^ b,
                BitOp::Not => acc,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setbit_returns_previous_and_grows() {
        let mut data = Vec::new();
        assert!(!setbit(&mut data, 7, true));
        assert_eq!(data, vec![0x01]);
        assert!(setbit(&mut data, 7, true));
        assert!(getbit(&data, 7));
        assert!(!setbit(&mut data, 100, false));
        assert_eq!(data.len(), 13);
    }

    #[test]
    fn test_getbit_out_of_range() {
        assert!(!getbit(b"\xff", 8));
        assert!(getbit(b"\xff", 0));
    }

    #[test]
    fn test_bitcount_byte_ranges() {
        let data = b"foobar";
        assert_eq!(bitcount(data, None, RangeUnit::Byte), 26);
        assert_eq!(bitcount(data, Some((0, 0)), RangeUnit::Byte), 4);
        assert_eq!(bitcount(data, Some((1, 1)), RangeUnit::Byte), 6);
        assert_eq!(bitcount(data, Some((-2, -1)), RangeUnit::Byte), 7);
        assert_eq!(bitcount(data, Some((3, 1)), RangeUnit::Byte), 0);
    }

    #[test]
    fn test_bitcount_bit_ranges() {
        let data = b"foobar";
        assert_eq!(bitcount(data, Some((5, 30)), RangeUnit::Bit), 17);
        assert_eq!(bitcount(data, Some((1, 1)), RangeUnit::Bit), 1);
        assert_eq!(bitcount(data, Some((0, 0)), RangeUnit::Bit), 0);
    }

    #[test]
    fn test_bitpos_clear_bit_past_end() {
        assert_eq!(bitpos(b"\xff\xff", false, None, None, RangeUnit::Byte), 16);
        assert_eq!(bitpos(b"\xff\xff", false, Some(0), Some(-1), RangeUnit::Byte), -1);
        assert_eq!(bitpos(b"\xc0", false, None, None, RangeUnit::Byte), 2);
    }

    #[test]
    fn test_bitpos_ranges() {
        let data = b"\x00\xff\xf0";
        assert_eq!(bitpos(data, true, None, None, RangeUnit::Byte), 8);
        assert_eq!(bitpos(data, true, Some(2), Some(-1), RangeUnit::Byte), 16);
        assert_eq!(bitpos(data, true, Some(7), Some(15), RangeUnit::Bit), 8);
        assert_eq!(bitpos(data, false, Some(8), Some(15), RangeUnit::Bit), -1);
        assert_eq!(bitpos(b"", true, None, None, RangeUnit::Byte), -1);
        assert_eq!(bitpos(b"", false, None, None, RangeUnit::Byte), 0);
    }

    #[test]
    fn test_bitop() {
        let a = vec![0b1100_0000, 0xff];
        let b = vec![0b1010_0000];
        assert_eq!(bitop(BitOp::And, &[a.clone(), b.clone()]), vec![0b1000_0000, 0x00]);
        assert_eq!(bitop(BitOp::Or, &[a.clone(), b.clone()]), vec![0b1110_0000, 0xff]);
        assert_eq!(bitop(BitOp::Xor, &[a.clone(), b]), vec![0b0110_0000, 0xff]);
        assert_eq!(bitop(BitOp::Not, &[a]), vec![0b0011_1111, 0x00]);
    }
}
