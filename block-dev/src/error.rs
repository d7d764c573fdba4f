use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("block {block_id} is beyond the end of the device ({blocks} blocks)")]
    OutOfRange { block_id: usize, blocks: usize },

    #[error("buffer of {len} bytes does not match the block size {block_size}")]
    BadBuffer { len: usize, block_size: usize },

    #[error("device is closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),
}
