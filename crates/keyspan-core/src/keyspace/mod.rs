//! Deterministic enumeration of a fixed-length keyspace.
//!
//! A [`Keyspace`] of length `L` over an [`Alphabet`] of `N` symbols is a
//! mixed-radix counter with `L` digits, digit 0 being the most significant.
//! Offset `o` maps to the base-`N` representation of `o`, left-padded with the
//! alphabet's first symbol. Identical `(alphabet, length, offset)` always
//! produce the identical candidate, which is what lets independent workers be
//! handed disjoint ranges with nothing but an offset and a count.
//!
//! ```
//! use keyspan_core::{Alphabet, Keyspace, Position};
//!
//! let keyspace = Keyspace::new(Alphabet::new("0123456789").unwrap(), 3).unwrap();
//! assert_eq!(keyspace.generate(&Position::from(123u32)).unwrap(), "123");
//! assert!(keyspace.generate(&Position::from(1000u32)).is_err());
//! ```

mod alphabet;

pub use alphabet::*;

use crate::{Error, Position, Result, arith};
use num_traits::{ToPrimitive, Zero};

/// Longest candidate a [`Keyspace`] accepts.
///
/// Lengths arrive from peers inside task frames, and the keyspace size is
/// `alphabet_size ^ length`, so the bound keeps that computation small.
pub const MAX_LENGTH: u32 = 1024;

/// All candidates of one fixed length over one alphabet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keyspace {
    alphabet: Alphabet,
    length: u32,
    size: Position,
}

impl Keyspace {
    /// # Errors
    ///
    /// Returns [`Error::InvalidLength`] if `length` is zero or above
    /// [`MAX_LENGTH`].
    pub fn new(alphabet: Alphabet, length: u32) -> Result<Self> {
        if length == 0 {
            return Err(Error::InvalidLength {
                reason: "length must be at least 1".to_string(),
            });
        }
        if length > MAX_LENGTH {
            return Err(Error::InvalidLength {
                reason: format!("length {length} exceeds the maximum of {MAX_LENGTH}"),
            });
        }
        let size = arith::pow(&Position::from(alphabet.len()), length);
        Ok(Self {
            alphabet,
            length,
            size,
        })
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub const fn length(&self) -> u32 {
        self.length
    }

    /// `alphabet_size ^ length`, the number of addressable candidates.
    pub fn size(&self) -> &Position {
        &self.size
    }

    /// Returns `true` if `offset` addresses a candidate.
    pub fn contains(&self, offset: &Position) -> bool {
        arith::lt(offset, &self.size)
    }

    /// Maps `offset` to its candidate string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if `offset >= size()`. The result is
    /// never truncated or wrapped.
    pub fn generate(&self, offset: &Position) -> Result<String> {
        let digits = self.digits(offset)?;
        Ok(digits.iter().map(|&d| self.alphabet.symbol(d)).collect())
    }

    /// Iterates over `count` consecutive candidates starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] unless the whole range
    /// `offset..offset + count` lies within the keyspace.
    pub fn candidates(&self, offset: &Position, count: u64) -> Result<Candidates<'_>> {
        if count > 0 {
            let last = arith::add(offset, &Position::from(count - 1));
            if !self.contains(&last) {
                return Err(self.out_of_range(&last));
            }
        }
        let digits = if count > 0 {
            self.digits(offset)?
        } else {
            Vec::new()
        };
        Ok(Candidates {
            alphabet: &self.alphabet,
            digits,
            remaining: count,
        })
    }

    fn digits(&self, offset: &Position) -> Result<Vec<usize>> {
        if !self.contains(offset) {
            return Err(self.out_of_range(offset));
        }

        let radix = Position::from(self.alphabet.len());
        let mut digits = vec![0_usize; self.length as usize];
        let mut remaining = offset.clone();

        // Least-significant digit is the last position.
        for slot in digits.iter_mut().rev() {
            if remaining.is_zero() {
                break;
            }
            *slot = (&remaining % &radix)
                .to_usize()
                .ok_or_else(|| self.out_of_range(offset))?;
            remaining /= &radix;
        }

        Ok(digits)
    }

    fn out_of_range(&self, offset: &Position) -> Error {
        Error::OutOfRange {
            offset: offset.to_string(),
            size: self.size.to_string(),
        }
    }
}

/// Convenience wrapper around [`Keyspace::generate`].
///
/// # Errors
///
/// See [`Keyspace::new`] and [`Keyspace::generate`].
pub fn generate(alphabet: &Alphabet, length: u32, offset: &Position) -> Result<String> {
    Keyspace::new(alphabet.clone(), length)?.generate(offset)
}

/// Odometer over a contiguous range of candidates.
///
/// Each step increments the least-significant digit and carries, which is far
/// cheaper than re-running base conversion for every offset.
#[derive(Debug)]
pub struct Candidates<'a> {
    alphabet: &'a Alphabet,
    digits: Vec<usize>,
    remaining: u64,
}

impl Iterator for Candidates<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let current: String = self
            .digits
            .iter()
            .map(|&d| self.alphabet.symbol(d))
            .collect();

        if self.remaining > 0 {
            let radix = self.alphabet.len();
            for digit in self.digits.iter_mut().rev() {
                *digit += 1;
                if *digit < radix {
                    break;
                }
                *digit = 0;
            }
        }

        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.remaining) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}
