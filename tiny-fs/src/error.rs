use thiserror::Error;

use crate::{BlockId, BlockKind, Fd, NAME_MAX_LEN};

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("block device error: {0}")]
    Device(#[from] block_dev::Error),

    #[error("malformed block: {0}")]
    Codec(#[from] binrw::Error),

    #[error("not a tiny-fs image, or its superblock is damaged")]
    BadMount,

    #[error("file system is corrupted: {0}")]
    Corrupted(String),

    #[error("block {0} is out of range")]
    InvalidBlock(BlockId),

    #[error("block {block} is a {found:?} block, expected {expected:?}")]
    WrongKind {
        block: BlockId,
        expected: BlockKind,
        found: BlockKind,
    },

    #[error("a file system is already mounted")]
    AlreadyMounted,

    #[error("no file system is mounted")]
    NotMounted,

    #[error("bad file descriptor {0}")]
    BadDescriptor(Fd),

    #[error("file descriptor {0} is already closed")]
    AlreadyClosed(Fd),

    #[error("file descriptor {0} is not open")]
    NotOpen(Fd),

    #[error("no such file: {0:?}")]
    BadFile(String),

    #[error("file is read-only")]
    NoWriteAccess,

    #[error("no free blocks left")]
    OutOfSpace,

    #[error("inode directory is full")]
    DirectoryFull,

    #[error("end of file")]
    EndOfFile,

    #[error("offset {offset} is past the end of file ({size} bytes)")]
    SeekPastEnd { offset: usize, size: usize },

    #[error("file name {0:?} is longer than {max} bytes", max = NAME_MAX_LEN)]
    NameTooLong(String),

    #[error("invalid file name {0:?}")]
    InvalidName(String),

    #[error("file {0:?} already exists")]
    DuplicateName(String),

    #[error("{0} is not a usable disk size")]
    InvalidSize(usize),
}
