//! Fixed-width bit fields and the 6-bit text alphabet.

use crate::error::TcfError;

pub const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Most-significant-bit-first field writer.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bits: Vec<bool>,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the low `width` bits of `value`. Wider values are truncated.
    pub fn push(&mut self, value: u64, width: u8) -> &mut Self {
        for shift in (0..width).rev() {
            self.bits.push((value >> shift) & 1 == 1);
        }
        self
    }

    pub fn push_bool(&mut self, value: bool) -> &mut Self {
        self.bits.push(value);
        self
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Zero-pads to a multiple of 6 and maps each sextet through [`ALPHABET`].
    pub fn to_text(&self) -> String {
        self.bits
            .chunks(6)
            .map(|chunk| {
                let index = (0..6).fold(0usize, |acc, i| (acc << 1) | usize::from(chunk.get(i).copied().unwrap_or(false)));
                char::from(ALPHABET[index])
            })
            .collect()
    }
}

/// Reader over a text segment decoded back into bits.
#[derive(Debug, Clone)]
pub struct BitReader {
    bits: Vec<bool>,
    pos: usize,
}

impl BitReader {
    /// Accepts the web-safe alphabet and, leniently, `+` and `/`.
    pub fn from_text(text: &str) -> Result<Self, TcfError> {
        let mut bits = Vec::with_capacity(text.len() * 6);
        for (offset, c) in text.char_indices() {
            let index = match c {
                'A'..='Z' => c as u32 - 'A' as u32,
                'a'..='z' => c as u32 - 'a' as u32 + 26,
                '0'..='9' => c as u32 - '0' as u32 + 52,
                '-' | '+' => 62,
                '_' | '/' => 63,
                _ => return Err(TcfError::InvalidCharacter { character: c, offset }),
            };
            for shift in (0..6).rev() {
                bits.push((index >> shift) & 1 == 1);
            }
        }
        Ok(Self { bits, pos: 0 })
    }

    pub fn read(&mut self, width: u8, field: &'static str) -> Result<u64, TcfError> {
        let end = self.pos + usize::from(width);
        if end > self.bits.len() {
            return Err(TcfError::Truncated { field, needed: end, available: self.bits.len() });
        }
        let value = self.bits[self.pos..end].iter().fold(0u64, |acc, bit| (acc << 1) | u64::from(*bit));
        self.pos = end;
        Ok(value)
    }

    pub fn read_bool(&mut self, field: &'static str) -> Result<bool, TcfError> {
        Ok(self.read(1, field)? == 1)
    }

    /// Positions (1-based) of set bits in the next `width` bits.
    pub fn read_bitfield(&mut self, width: usize, field: &'static str) -> Result<Vec<u32>, TcfError> {
        let end = self.pos + width;
        if end > self.bits.len() {
            return Err(TcfError::Truncated { field, needed: end, available: self.bits.len() });
        }
        let set = self.bits[self.pos..end]
            .iter()
            .enumerate()
            .filter(|(_, bit)| **bit)
            .map(|(i, _)| i as u32 + 1)
            .collect();
        self.pos = end;
        Ok(set)
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_msb_first_and_pads() {
        let mut w = BitWriter::new();
        w.push(2, 6).push(1, 1);
        assert_eq!(w.len(), 7);
        // 000010 | 1 00000
        assert_eq!(w.to_text(), "Cg");
    }

    #[test]
    fn reader_reports_truncation() {
        let mut r = BitReader::from_text("C").unwrap();
        assert_eq!(r.read(6, "version").unwrap(), 2);
        assert!(matches!(r.read(1, "created"), Err(TcfError::Truncated { field: "created", .. })));
    }

    #[test]
    fn rejects_foreign_characters() {
        assert!(matches!(BitReader::from_text("CP=="), Err(TcfError::InvalidCharacter { character: '=', offset: 2 })));
    }
}
