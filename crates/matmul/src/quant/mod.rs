//! Quantised block decoders and the unsigned-by-signed dot primitive
//! (spec §4.2, §4.3), shared by [`crate::tile_q`].

mod decode;
mod dot;

pub use decode::{load0, load1, load_iq4nl, load_q4, load_q5, load_q8};
pub use dot::{sign_fold, updot};
