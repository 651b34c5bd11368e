pub mod codec;
pub mod types;

pub use codec::{decode, encode, CodecError};
pub use types::*;
