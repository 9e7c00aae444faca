//! 16-bit word primitives.
//!
//! Every value the machine touches is a [`Word`]: registers, memory cells,
//! instructions and addresses. Arithmetic on words always wraps modulo 2^16.

/// A 16-bit machine word.
pub type Word = u16;

/// Sign-extend the low `bit_count` bits of `value` to a full word.
///
/// The field is treated as a `bit_count`-wide two's-complement number: when
/// bit `bit_count - 1` is set, every higher bit is filled with ones.
/// Bits of `value` above the field must already be zero.
///
/// ```
/// use lc3::word::sign_extend;
///
/// assert_eq!(sign_extend(0b10000, 5), 0xFFF0);
/// assert_eq!(sign_extend(0b01111, 5), 0x000F);
/// ```
#[inline]
pub fn sign_extend(value: Word, bit_count: u32) -> Word {
    debug_assert!((1..=16).contains(&bit_count), "bad field width {bit_count}");
    if bit_count < 16 && (value >> (bit_count - 1)) & 1 != 0 {
        value | (0xFFFF << bit_count)
    } else {
        value
    }
}

/// Extract bits `[hi:lo]` of `word`, right-aligned.
#[inline]
pub fn field(word: Word, hi: u32, lo: u32) -> Word {
    debug_assert!(hi >= lo && hi < 16);
    let width = hi - lo + 1;
    let mask = if width == 16 { 0xFFFF } else { (1 << width) - 1 };
    (word >> lo) & mask
}

/// Bit 15, the two's-complement sign bit.
#[inline]
pub fn sign_of(word: Word) -> bool {
    word & 0x8000 != 0
}
