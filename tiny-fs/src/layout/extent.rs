use std::io::Cursor;

use binrw::{binrw, BinRead, BinResult, BinWrite};

use super::{BlockHeader, BlockId, BlockKind, DiskBlock};

/// 数据块中负载之前的字节数
pub(crate) const EXTENT_HEADER_SIZE: usize = 8;

/// 文件数据块：一段文件内容，外加指向下一块的指针
#[binrw]
#[br(import(payload_len: usize))]
#[derive(Debug, Clone)]
pub struct FileExtent {
    header: BlockHeader,
    _reserved: [u8; 2],
    /// 为0表示链的最后一块
    pub next: BlockId,
    #[br(count = payload_len)]
    pub payload: Vec<u8>,
}

impl FileExtent {
    /// `data`不足`capacity`的部分补零
    pub fn new(next: BlockId, data: &[u8], capacity: usize) -> Self {
        let mut payload = vec![0; capacity];
        payload[..data.len()].copy_from_slice(data);

        Self {
            header: BlockHeader::new(BlockKind::FileExtent),
            _reserved: [0; 2],
            next,
            payload,
        }
    }

    /// 一块能装下多少字节的文件内容
    #[inline]
    pub fn capacity(block_size: usize) -> usize {
        block_size - EXTENT_HEADER_SIZE
    }
}

impl DiskBlock for FileExtent {
    const KIND: BlockKind = BlockKind::FileExtent;

    fn decode(buf: &[u8]) -> BinResult<Self> {
        let payload_len = buf.len().saturating_sub(EXTENT_HEADER_SIZE);
        Self::read_le_args(&mut Cursor::new(buf), (payload_len,))
    }

    fn encode(&self, buf: &mut [u8]) -> BinResult<()> {
        self.write_le(&mut Cursor::new(buf))
    }
}
