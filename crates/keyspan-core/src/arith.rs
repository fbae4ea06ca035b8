//! Arbitrary-precision arithmetic over keyspace positions.
//!
//! Keyspaces routinely exceed 64-bit range (`62^16` already does), so every
//! offset, size and running total is a [`Position`]. The helpers here are pure:
//! they borrow their inputs and return fresh values. Operations that can fail
//! for non-negative integers (subtraction below zero, division by zero) return
//! a [`Result`] instead of panicking.

use crate::{Error, Result};
use core::cmp::Ordering;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

/// A non-negative arbitrary-precision keyspace position.
pub type Position = BigUint;

#[inline]
pub fn lt(a: &Position, b: &Position) -> bool {
    a.cmp(b) == Ordering::Less
}

#[inline]
pub fn le(a: &Position, b: &Position) -> bool {
    a.cmp(b) != Ordering::Greater
}

#[inline]
pub fn gt(a: &Position, b: &Position) -> bool {
    a.cmp(b) == Ordering::Greater
}

#[inline]
pub fn ge(a: &Position, b: &Position) -> bool {
    a.cmp(b) != Ordering::Less
}

#[inline]
pub fn eq(a: &Position, b: &Position) -> bool {
    a == b
}

#[inline]
pub fn copy(a: &Position) -> Position {
    a.clone()
}

#[inline]
pub fn add(a: &Position, b: &Position) -> Position {
    a + b
}

/// Returns `a - b`.
///
/// # Errors
///
/// Returns [`Error::Underflow`] if `b > a`.
pub fn sub(a: &Position, b: &Position) -> Result<Position> {
    if lt(a, b) {
        return Err(Error::Underflow {
            lhs: a.to_string(),
            rhs: b.to_string(),
        });
    }
    Ok(a - b)
}

#[inline]
pub fn mul(a: &Position, b: &Position) -> Position {
    a * b
}

/// Truncating division.
///
/// # Errors
///
/// Returns [`Error::DivisionByZero`] if `b` is zero.
pub fn div(a: &Position, b: &Position) -> Result<Position> {
    if b.is_zero() {
        return Err(Error::DivisionByZero);
    }
    Ok(a / b)
}

/// Remainder of truncating division.
///
/// # Errors
///
/// Returns [`Error::DivisionByZero`] if `b` is zero.
pub fn modulo(a: &Position, b: &Position) -> Result<Position> {
    if b.is_zero() {
        return Err(Error::DivisionByZero);
    }
    Ok(a % b)
}

#[inline]
pub fn pow(base: &Position, exponent: u32) -> Position {
    base.pow(exponent)
}

/// Returns `current / total * 100`, or `0.0` when `total` is zero.
///
/// Values too large for an `f64` saturate to infinity before the division.
/// For progress reporting that is fine: both operands are of similar
/// magnitude in practice.
pub fn percentage(total: &Position, current: &Position) -> f64 {
    if total.is_zero() {
        return 0.0;
    }
    let total = total.to_f64().unwrap_or(f64::INFINITY);
    let current = current.to_f64().unwrap_or(f64::INFINITY);
    current / total * 100.0
}

/// Parses a base-10 string into a [`Position`].
///
/// Leading and trailing whitespace is ignored.
///
/// # Errors
///
/// Returns [`Error::InvalidNumber`] for empty input, signs, or non-digit
/// characters.
pub fn parse_decimal(input: &str) -> Result<Position> {
    let trimmed = input.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidNumber {
            input: input.to_string(),
        });
    }
    BigUint::parse_bytes(trimmed.as_bytes(), 10).ok_or_else(|| Error::InvalidNumber {
        input: input.to_string(),
    })
}

/// Big-endian bytes for transport; zero encodes as an empty slice.
pub fn to_be_bytes(value: &Position) -> Vec<u8> {
    if value.is_zero() {
        return Vec::new();
    }
    value.to_bytes_be()
}

pub fn from_be_bytes(bytes: &[u8]) -> Position {
    BigUint::from_bytes_be(bytes)
}
