pub mod epmd;
pub use epmd::*;

pub mod error;
pub use error::Error;

/// Serializes a request into a writer, outer length prefix included.
pub trait Encoder {
    type Error;
    fn encode<W: std::io::Write>(&self, w: &mut W) -> Result<(), Self::Error>;
}

/// The number of bytes counted by a request's length prefix, i.e. the
/// opcode byte plus the payload.
#[allow(clippy::len_without_is_empty)]
pub trait Len {
    fn len(&self) -> usize;
}
