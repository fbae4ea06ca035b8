use crate::{Error, Result};
use core::{fmt, str::FromStr};

/// An ordered set of unique symbols candidates are drawn from.
///
/// Construction from user input collapses duplicates, keeping the first
/// occurrence of each symbol, so `"aabca"` becomes `"abc"`. Symbol order is
/// significant: the symbol at index 0 is digit value 0.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Alphabet {
    symbols: Vec<char>,
}

impl Alphabet {
    /// Builds an alphabet from the characters of `input`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyAlphabet`] if `input` has no characters.
    pub fn new(input: &str) -> Result<Self> {
        let mut symbols: Vec<char> = Vec::with_capacity(input.len());
        for symbol in input.chars() {
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        if symbols.is_empty() {
            return Err(Error::EmptyAlphabet);
        }
        Ok(Self { symbols })
    }

    /// The ten ASCII digits.
    pub fn decimal() -> Self {
        Self {
            symbols: ('0'..='9').collect(),
        }
    }

    /// Number of distinct symbols (the radix of the keyspace).
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Always `false`; kept for API symmetry with [`Alphabet::len`].
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    #[inline]
    pub(crate) fn symbol(&self, digit: usize) -> char {
        self.symbols[digit]
    }
}

impl FromStr for Alphabet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for symbol in &self.symbols {
            write!(f, "{symbol}")?;
        }
        Ok(())
    }
}
