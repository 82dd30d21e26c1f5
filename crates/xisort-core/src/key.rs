//! IEEE-754 key encoding.
//!
//! Finite doubles map to `u64` keys whose unsigned order matches numeric
//! order: positive values get the sign bit set, negative values are
//! bitwise-complemented (their raw IEEE order runs backwards relative to
//! numeric order). Five sentinel codes above the finite range separate
//! signed zeros and non-finite values, so `-0.0` orders strictly before
//! `+0.0` and NaN/±inf never collide with a finite key.

const SIGN_BIT: u64 = 0x8000_0000_0000_0000;

/// Base of the sentinel block; every finite key is strictly below this.
pub const SENTINEL_BASE: u64 = 0xFFFF_FFFF_FFFF_FFF8;

/// Key for `-inf`.
pub const K_NEGINF: u64 = SENTINEL_BASE;
/// Key for `+inf`.
pub const K_POSINF: u64 = SENTINEL_BASE + 1;
/// Key for `-0.0`.
pub const K_NEG0: u64 = SENTINEL_BASE + 2;
/// Key for `+0.0`.
pub const K_POS0: u64 = SENTINEL_BASE + 3;
/// Key for any NaN bit pattern.
pub const K_NAN: u64 = SENTINEL_BASE + 4;

/// Map a double to its sort key.
#[must_use]
pub fn ieee_key(x: f64) -> u64 {
    if x.is_nan() {
        return K_NAN;
    }
    if x == f64::INFINITY {
        return K_POSINF;
    }
    if x == f64::NEG_INFINITY {
        return K_NEGINF;
    }
    if x == 0.0 {
        return if x.is_sign_negative() { K_NEG0 } else { K_POS0 };
    }
    let bits = x.to_bits();
    if bits & SIGN_BIT != 0 { !bits } else { bits | SIGN_BIT }
}
