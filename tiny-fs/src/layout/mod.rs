//! # 磁盘数据结构层
//!
//! tiny-fs 的磁盘布局：
//! 超级块(#0) | 索引节点块、文件数据块、空闲块交错分布于其余各块
//!
//! 每个块都以[`BlockHeader`]开头，标明块的种类并携带魔数。
//! 块与块之间靠块号相连，块号0保留给超级块，在链中表示“无”。

use std::io::Cursor;

use binrw::{binrw, BinRead, BinResult};
use derive_more::{Display, From, Into};

use crate::MAGIC;

mod super_block;
pub use super_block::SuperBlock;

mod inode;
pub use inode::{DiskInode, Permission};

mod extent;
pub use extent::FileExtent;

mod free_block;
pub use free_block::FreeBlock;

/// 块的逻辑编号
#[binrw]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
#[display(fmt = "#{}", _0)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// 链的终点，也是超级块的位置
    pub const NULL: Self = Self(0);

    pub const SUPER: Self = Self(0);

    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl From<BlockId> for usize {
    fn from(id: BlockId) -> Self {
        id.0 as usize
    }
}

#[binrw]
#[brw(repr = u8)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    SuperBlock = 1,
    Inode = 2,
    FileExtent = 3,
    FreeBlock = 4,
}

/// 所有块共有的头部
#[binrw]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub kind: BlockKind,
    pub magic: u8,
}

impl BlockHeader {
    #[inline]
    pub const fn new(kind: BlockKind) -> Self {
        Self { kind, magic: MAGIC }
    }

    /// 只解析块头，不关心块的其余部分
    pub fn peek(buf: &[u8]) -> BinResult<Self> {
        Self::read_le(&mut Cursor::new(buf))
    }
}

/// 能够整块编解码的磁盘结构
pub trait DiskBlock: Sized {
    const KIND: BlockKind;

    /// `buf`为整块数据
    fn decode(buf: &[u8]) -> BinResult<Self>;

    /// `buf`为全零的整块缓冲区，未写到的部分保持为零
    fn encode(&self, buf: &mut [u8]) -> BinResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::extent::EXTENT_HEADER_SIZE;
    use crate::layout::inode::INODE_SIZE;
    use crate::layout::super_block::SUPER_BLOCK_HEADER_SIZE;
    use crate::{DEFAULT_BLOCK_SIZE, MIN_BLOCK_SIZE};

    fn encoded<T: DiskBlock>(block: &T, block_size: usize) -> Vec<u8> {
        let mut buf = vec![0; block_size];
        block.encode(&mut buf).unwrap();
        buf
    }

    #[test]
    fn header_layout() {
        let buf = encoded(&FreeBlock::new(BlockId::new(0x0102_0304)), 16);
        assert_eq!(
            &buf[..EXTENT_HEADER_SIZE],
            &[4, MAGIC, 0, 0, 0x04, 0x03, 0x02, 0x01]
        );
        assert_eq!(
            BlockHeader::new(BlockKind::FreeBlock),
            BlockHeader::peek(&buf).unwrap()
        );
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(BlockHeader::peek(&[0; 8]).is_err());
        assert!(BlockHeader::peek(&[9, MAGIC]).is_err());
    }

    #[test]
    fn inode_fits_smallest_block() {
        let inode = DiskInode::new("abcdefgh", BlockId::new(3), 42);
        let buf = encoded(&inode, MIN_BLOCK_SIZE);
        assert!(buf[INODE_SIZE..].iter().all(|&b| b == 0));

        let mut short = vec![0; INODE_SIZE - 1];
        assert!(inode.encode(&mut short).is_err());

        let decoded = DiskInode::decode(&buf).unwrap();
        assert_eq!("abcdefgh", decoded.name());
        assert_eq!(BlockId::new(3), decoded.head_extent);
        assert_eq!(Permission::ReadWrite, decoded.permission());
    }

    #[test]
    fn super_block_directory() {
        let mut sb = SuperBlock::new(DEFAULT_BLOCK_SIZE, 10);
        assert_eq!(BlockId::new(1), sb.free_head);
        assert_eq!(9, sb.free_blocks);
        assert_eq!(
            (DEFAULT_BLOCK_SIZE - SUPER_BLOCK_HEADER_SIZE) / 4,
            SuperBlock::capacity(DEFAULT_BLOCK_SIZE)
        );

        sb.set_inodes(vec![BlockId::new(1), BlockId::new(5)]);
        let decoded = SuperBlock::decode(&encoded(&sb, DEFAULT_BLOCK_SIZE)).unwrap();
        assert_eq!(2, decoded.file_count());
        assert_eq!(&[BlockId::new(1), BlockId::new(5)], decoded.inodes());
        assert_eq!(DEFAULT_BLOCK_SIZE as u32, decoded.block_size);
    }

    #[test]
    fn forged_file_count_is_rejected() {
        let mut buf = encoded(&SuperBlock::new(64, 10), 64);
        buf[16..20].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(SuperBlock::decode(&buf).is_err());

        // (64 - 24) / 4 = 10 个登记位，恰好填满是合法的
        buf[16..20].copy_from_slice(&10u32.to_le_bytes());
        assert_eq!(10, SuperBlock::decode(&buf).unwrap().inodes().len());
    }

    #[test]
    fn extent_payload_spans_rest_of_block() {
        let extent = FileExtent::new(BlockId::NULL, b"HELLO", 64 - EXTENT_HEADER_SIZE);
        let buf = encoded(&extent, 64);
        assert_eq!(b"HELLO", &buf[EXTENT_HEADER_SIZE..EXTENT_HEADER_SIZE + 5]);

        let decoded = FileExtent::decode(&buf).unwrap();
        assert_eq!(64 - EXTENT_HEADER_SIZE, decoded.payload.len());
        assert!(decoded.next.is_null());
    }
}
