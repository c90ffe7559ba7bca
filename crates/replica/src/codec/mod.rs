mod reader;
mod writer;

pub use reader::BitReader;
pub use writer::BitWriter;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("read of {requested} bits past end of buffer at bit {position}")]
    UnexpectedEnd { position: usize, requested: u8 },
    #[error("variable-length integer exceeds 32 bits")]
    VarIntOverflow,
}
