//! One-bit sign quantization
//!
//! Each coordinate becomes a single bit (1 iff the value is strictly
//! positive), using the coordinate axes as hashing hyperplanes. Four
//! consecutive bits pack MSB-first into one hex nibble, so a D-dimensional
//! vector yields a D/4 character code.

use crate::{Error, Result};

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Converts vectors of a fixed dimensionality to and from sign-bit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryQuantizer {
    dimension: usize,
}

impl BinaryQuantizer {
    /// Rejects dimensions that would leave a partial final nibble.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 || dimension % 4 != 0 {
            return Err(Error::InvalidDimension(format!(
                "dimension must be a positive multiple of 4, got {}",
                dimension
            )));
        }

        Ok(Self { dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Length of a hex code produced by this quantizer
    pub fn code_len(&self) -> usize {
        self.dimension / 4
    }

    /// Quantize a vector into its uppercase hex sign code.
    pub fn to_binary_code(&self, vector: &[f32]) -> Result<String> {
        self.check_dimension(vector)?;

        let code = vector
            .chunks_exact(4)
            .map(|quad| {
                let nibble = quad
                    .iter()
                    .fold(0usize, |acc, &v| (acc << 1) | usize::from(v > 0.0));
                HEX_DIGITS[nibble] as char
            })
            .collect();

        Ok(code)
    }

    /// Expand a hex code into its bit string, four zero-padded bits per
    /// character.
    pub fn decode(&self, hex: &str) -> Result<String> {
        self.check_code_len(hex)?;

        let mut bits = String::with_capacity(self.dimension);
        for ch in hex.chars() {
            let nibble = hex_value(ch)?;
            bits.push_str(&format!("{:04b}", nibble));
        }

        Ok(bits)
    }

    /// Quantize a vector straight into packed form for distance computation.
    pub fn quantize(&self, vector: &[f32]) -> Result<BinaryCode> {
        let hex = self.to_binary_code(vector)?;
        self.parse(&hex)
    }

    /// Parse a hex code into packed bits.
    pub fn parse(&self, hex: &str) -> Result<BinaryCode> {
        self.check_code_len(hex)?;

        let mut words = vec![0u64; self.dimension.div_ceil(64)];
        for (pos, ch) in hex.chars().enumerate() {
            let nibble = hex_value(ch)?;
            for offset in 0..4 {
                if (nibble >> (3 - offset)) & 1 == 1 {
                    let bit = pos * 4 + offset;
                    words[bit / 64] |= 1u64 << (63 - bit % 64);
                }
            }
        }

        Ok(BinaryCode {
            words,
            bits: self.dimension,
        })
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::dimension_mismatch(self.dimension, vector.len()));
        }
        Ok(())
    }

    fn check_code_len(&self, hex: &str) -> Result<()> {
        if hex.len() != self.code_len() {
            return Err(Error::InvalidBinaryCode(format!(
                "expected {} hex characters, got {}",
                self.code_len(),
                hex.len()
            )));
        }
        Ok(())
    }
}

fn hex_value(ch: char) -> Result<u32> {
    ch.to_digit(16)
        .ok_or_else(|| Error::InvalidBinaryCode(format!("'{}' is not a hex digit", ch)))
}

/// Packed sign bits, MSB-first within each 64-bit word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryCode {
    words: Vec<u64>,
    bits: usize,
}

impl BinaryCode {
    pub fn len(&self) -> usize {
        self.bits
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Sign bit at position `i`
    pub fn bit(&self, i: usize) -> bool {
        i < self.bits && (self.words[i / 64] >> (63 - i % 64)) & 1 == 1
    }

    /// Number of differing bit positions. Both codes must come from the same
    /// quantizer.
    pub fn hamming(&self, other: &BinaryCode) -> u32 {
        debug_assert_eq!(self.bits, other.bits);
        self.words
            .iter()
            .zip(other.words.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}
