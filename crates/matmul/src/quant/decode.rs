//! Block decoders: unpack one quantised block into a 32-lane `i8` vector
//! suitable for [`super::dot::updot`].
//!
//! Every decoder here is a pure function of a single block reference - no
//! decoder touches the delta field, which the tile engine applies
//! separately after the dot reduction (spec §4.5's `f32(A.delta · B.delta)
//! · updot(...)` split).

use crate::dtype::{Iq4NlBlock, Q4_0Block, Q5_0Block, Q8_0Block, IQ4NL_LUT};

/// Verbatim payload: `q8_0` already stores signed bytes.
#[must_use]
pub fn load_q8(blk: &Q8_0Block) -> [i8; 32] {
    blk.qs
}

/// Splits each packed byte into low/high nibble, zero-extends, subtracts 8.
#[must_use]
pub fn load_q4(blk: &Q4_0Block) -> [i8; 32] {
    let mut out = [0i8; 32];
    for (byte_idx, &byte) in blk.qs.iter().enumerate() {
        out[byte_idx] = (i32::from(byte & 0x0F) - 8) as i8;
        out[byte_idx + 16] = (i32::from(byte >> 4) - 8) as i8;
    }
    out
}

/// As [`load_q4`], but ORs in the 5th bit from `qh` before rebasing to a
/// signed range of [-16, 15].
#[must_use]
pub fn load_q5(blk: &Q5_0Block) -> [i8; 32] {
    let mut out = [0i8; 32];
    for lane in 0..32 {
        let low = if lane < 16 {
            blk.qs[lane] & 0x0F
        } else {
            blk.qs[lane - 16] >> 4
        };
        let high_bit = (blk.qh[lane / 8] >> (lane % 8)) & 1;
        let five_bit = u32::from(low) | (u32::from(high_bit) << 4);
        out[lane] = (five_bit as i32 - 16) as i8;
    }
    out
}

/// Gathers through [`IQ4NL_LUT`] using each nibble as index.
#[must_use]
pub fn load_iq4nl(blk: &Iq4NlBlock) -> [i8; 32] {
    let mut out = [0i8; 32];
    for (byte_idx, &byte) in blk.qs.iter().enumerate() {
        out[byte_idx] = IQ4NL_LUT[(byte & 0x0F) as usize];
        out[byte_idx + 16] = IQ4NL_LUT[(byte >> 4) as usize];
    }
    out
}

/// Low 16 lanes of a 32-lane decoded block, for backends without a
/// 256-bit-wide register group to hold the full block at once.
#[must_use]
pub fn load0(full: &[i8; 32]) -> [i8; 16] {
    full[..16].try_into().expect("slice is exactly 16 long")
}

/// High 16 lanes of a 32-lane decoded block.
#[must_use]
pub fn load1(full: &[i8; 32]) -> [i8; 16] {
    full[16..].try_into().expect("slice is exactly 16 long")
}
