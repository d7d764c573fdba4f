use std::io::Cursor;

use binrw::{binrw, BinRead, BinResult, BinWrite};

use super::{BlockHeader, BlockId, BlockKind, DiskBlock};

/// 空闲块，借由`next`串成单链表
#[binrw]
#[derive(Debug, Clone)]
pub struct FreeBlock {
    header: BlockHeader,
    _reserved: [u8; 2],
    pub next: BlockId,
}

impl FreeBlock {
    #[inline]
    pub fn new(next: BlockId) -> Self {
        Self {
            header: BlockHeader::new(BlockKind::FreeBlock),
            _reserved: [0; 2],
            next,
        }
    }
}

impl DiskBlock for FreeBlock {
    const KIND: BlockKind = BlockKind::FreeBlock;

    fn decode(buf: &[u8]) -> BinResult<Self> {
        Self::read_le(&mut Cursor::new(buf))
    }

    fn encode(&self, buf: &mut [u8]) -> BinResult<()> {
        self.write_le(&mut Cursor::new(buf))
    }
}
