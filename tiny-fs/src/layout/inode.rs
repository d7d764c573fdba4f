use std::io::Cursor;

use binrw::{binrw, BinRead, BinResult, BinWrite};
use derive_more::Display;
use enumflags2::{bitflags, BitFlags};

use super::{BlockHeader, BlockId, BlockKind, DiskBlock};
use crate::NAME_MAX_LEN;

/// 索引节点在块内实际占用的字节数
pub(crate) const INODE_SIZE: usize = 48;

const _: () = assert!(INODE_SIZE <= crate::MIN_BLOCK_SIZE);

/// 文件的元信息，独占一块
#[binrw]
#[derive(Debug, Clone)]
pub struct DiskInode {
    header: BlockHeader,
    /// [`Access`]的位表示
    access: u8,
    _reserved: u8,
    /// 第一个数据块
    pub head_extent: BlockId,
    /// 链上数据块的个数
    pub block_count: u32,
    /// 文件的逻辑长度(字节)
    pub size: u32,
    pub created: u64,
    pub modified: u64,
    pub accessed: u64,
    // 不足的部分以 \0 填充
    name: [u8; NAME_MAX_LEN],
}

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read = 0b0000_0001,
    Write = 0b0000_0010,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Permission {
    #[display(fmt = "r-")]
    ReadOnly,
    #[display(fmt = "rw")]
    ReadWrite,
}

impl DiskInode {
    /// 新文件：长度为0，可读写，三个时间戳均为创建时间
    pub fn new(name: &str, head_extent: BlockId, now: u64) -> Self {
        let mut inode = Self {
            header: BlockHeader::new(BlockKind::Inode),
            access: BitFlags::<Access>::from(Permission::ReadWrite).bits(),
            _reserved: 0,
            head_extent,
            block_count: 1,
            size: 0,
            created: now,
            modified: now,
            accessed: now,
            name: [0; NAME_MAX_LEN],
        };
        inode.set_name(name);
        inode
    }

    pub fn name(&self) -> String {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(NAME_MAX_LEN);
        String::from_utf8_lossy(&self.name[..len]).into_owned()
    }

    /// 名字须事先校验过长度
    pub fn set_name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_MAX_LEN);
        self.name = [0; NAME_MAX_LEN];
        self.name[..len].copy_from_slice(&bytes[..len]);
    }

    #[inline]
    pub fn permission(&self) -> Permission {
        BitFlags::<Access>::from_bits_truncate(self.access).into()
    }

    #[inline]
    pub fn set_permission(&mut self, permission: Permission) {
        self.access = BitFlags::<Access>::from(permission).bits();
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.permission() == Permission::ReadWrite
    }
}

impl DiskBlock for DiskInode {
    const KIND: BlockKind = BlockKind::Inode;

    fn decode(buf: &[u8]) -> BinResult<Self> {
        Self::read_le(&mut Cursor::new(buf))
    }

    fn encode(&self, buf: &mut [u8]) -> BinResult<()> {
        self.write_le(&mut Cursor::new(buf))
    }
}

impl From<Permission> for BitFlags<Access> {
    fn from(permission: Permission) -> Self {
        match permission {
            Permission::ReadOnly => Access::Read.into(),
            Permission::ReadWrite => Access::Read | Access::Write,
        }
    }
}

impl From<BitFlags<Access>> for Permission {
    fn from(access: BitFlags<Access>) -> Self {
        if access.contains(Access::Write) {
            Self::ReadWrite
        } else {
            Self::ReadOnly
        }
    }
}
