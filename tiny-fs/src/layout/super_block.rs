use std::io::Cursor;

use binrw::{binrw, BinRead, BinResult, BinWrite};

use super::{BlockHeader, BlockId, BlockKind, DiskBlock};

/// 索引节点目录之前的字节数
pub(crate) const SUPER_BLOCK_HEADER_SIZE: usize = 24;

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 记录空闲链表的表头与计数；
/// - 以索引节点目录登记所有文件
#[binrw]
#[br(import(directory_capacity: usize))]
#[derive(Debug, Clone)]
pub struct SuperBlock {
    header: BlockHeader,
    _reserved: [u8; 2],
    /// 空闲链表的第一块，为0表示没有空闲块
    pub free_head: BlockId,
    /// 文件系统占据块数
    pub total_blocks: u32,
    pub free_blocks: u32,
    // 超出块内容量的计数说明超级块已损坏
    #[br(assert(file_count as usize <= directory_capacity, "{} files exceed the directory", file_count))]
    file_count: u32,
    /// 格式化时的块大小，挂载时须与设备一致
    pub block_size: u32,
    /// 每个文件的索引节点块号
    #[br(count = file_count as usize)]
    inodes: Vec<BlockId>,
}

impl SuperBlock {
    /// 刚格式化的超级块：其余各块全部空闲，且依次相连
    pub fn new(block_size: usize, total_blocks: u32) -> Self {
        let free_head = if total_blocks > 1 {
            BlockId::new(1)
        } else {
            BlockId::NULL
        };

        Self {
            header: BlockHeader::new(BlockKind::SuperBlock),
            _reserved: [0; 2],
            free_head,
            total_blocks,
            free_blocks: total_blocks.saturating_sub(1),
            file_count: 0,
            block_size: block_size as u32,
            inodes: Vec::new(),
        }
    }

    /// 索引节点目录最多能登记多少个文件
    #[inline]
    pub fn capacity(block_size: usize) -> usize {
        block_size.saturating_sub(SUPER_BLOCK_HEADER_SIZE) / 4
    }

    #[inline]
    pub fn file_count(&self) -> u32 {
        self.file_count
    }

    #[inline]
    pub fn inodes(&self) -> &[BlockId] {
        &self.inodes
    }

    pub fn set_inodes(&mut self, inodes: Vec<BlockId>) {
        self.file_count = inodes.len() as u32;
        self.inodes = inodes;
    }
}

impl DiskBlock for SuperBlock {
    const KIND: BlockKind = BlockKind::SuperBlock;

    fn decode(buf: &[u8]) -> BinResult<Self> {
        Self::read_le_args(&mut Cursor::new(buf), (Self::capacity(buf.len()),))
    }

    fn encode(&self, buf: &mut [u8]) -> BinResult<()> {
        self.write_le(&mut Cursor::new(buf))
    }
}
