//! # 空闲块管理层
//!
//! 空闲块在盘上串成单链表，表头记在超级块里；
//! 挂载期间在内存中维护一份同序的镜像，表头即镜像的第一个元素。
//!
//! 分配与回收都在表头进行(后进先出)，均为O(1)。

use std::collections::VecDeque;

use crate::disk::Disk;
use crate::layout::{BlockId, FreeBlock};
use crate::{Error, Result};

#[derive(Debug, Default)]
pub struct FreeList {
    blocks: VecDeque<BlockId>,
}

impl FreeList {
    /// 把超级块之外的所有块写成空闲块，依次相连，最后一块指向0
    pub fn format(disk: &Disk) -> Result<Self> {
        let total_blocks = disk.total_blocks();
        for id in 1..total_blocks {
            let next = if id + 1 < total_blocks {
                BlockId::new(id + 1)
            } else {
                BlockId::NULL
            };
            disk.store(BlockId::new(id), &FreeBlock::new(next))?;
        }

        Ok(Self {
            blocks: (1..total_blocks).map(BlockId::new).collect(),
        })
    }

    /// 从`head`出发沿盘上链表重建镜像。
    /// 走过的块数必须恰好等于超级块记录的`expected`，否则视为损坏。
    pub fn load(disk: &Disk, head: BlockId, expected: u32) -> Result<Self> {
        // 超级块本身不可能空闲
        if expected >= disk.total_blocks() {
            log::error!(
                "superblock claims {expected} free blocks out of {}",
                disk.total_blocks()
            );
            return Err(Error::Corrupted(format!(
                "{expected} free blocks recorded, only {} blocks exist",
                disk.total_blocks()
            )));
        }

        let mut blocks = VecDeque::with_capacity(expected as usize);
        let mut current = head;

        while !current.is_null() {
            // 链比记录的还长(或成环)
            if blocks.len() == expected as usize {
                log::error!("free list is longer than the recorded {expected} blocks");
                return Err(Error::Corrupted(format!(
                    "free list does not end after {expected} blocks"
                )));
            }
            let free_block: FreeBlock = disk.load(current)?;
            blocks.push_back(current);
            current = free_block.next;
        }

        if blocks.len() != expected as usize {
            log::error!(
                "free list has {} blocks, superblock says {expected}",
                blocks.len()
            );
            return Err(Error::Corrupted(format!(
                "free list has {} blocks, expected {expected}",
                blocks.len()
            )));
        }

        Ok(Self { blocks })
    }

    #[inline]
    pub fn head(&self) -> BlockId {
        self.blocks.front().copied().unwrap_or(BlockId::NULL)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.iter().copied()
    }

    /// 摘下表头。调用者须在该块对外可见之前写入新的块头。
    pub fn alloc(&mut self) -> Result<BlockId> {
        let id = self.blocks.pop_front().ok_or(Error::OutOfSpace)?;
        log::debug!("alloc block {id}, {} left", self.blocks.len());
        Ok(id)
    }

    /// 把`id`写成指向旧表头的空闲块，再压到表头
    pub fn release(&mut self, disk: &Disk, id: BlockId) -> Result<()> {
        disk.store(id, &FreeBlock::new(self.head()))?;
        self.blocks.push_front(id);
        log::debug!("release block {id}, {} free", self.blocks.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use block_dev::RamDisk;

    use super::*;
    use crate::layout::DiskInode;

    fn disk(blocks: u32) -> Disk {
        Disk::new(Arc::new(RamDisk::new(64, blocks as usize)), blocks)
    }

    #[test]
    fn format_threads_every_block() {
        let disk = disk(6);
        let free = FreeList::format(&disk).unwrap();
        assert_eq!(5, free.len());
        assert_eq!(BlockId::new(1), free.head());

        let reloaded = FreeList::load(&disk, free.head(), 5).unwrap();
        assert_eq!(
            (1..6).map(BlockId::new).collect::<Vec<_>>(),
            reloaded.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn alloc_is_lifo() {
        let disk = disk(6);
        let mut free = FreeList::format(&disk).unwrap();

        let a = free.alloc().unwrap();
        let b = free.alloc().unwrap();
        assert_eq!((BlockId::new(1), BlockId::new(2)), (a, b));

        free.release(&disk, a).unwrap();
        assert_eq!(a, free.head());
        assert_eq!(a, free.alloc().unwrap());

        free.release(&disk, b).unwrap();
        free.release(&disk, a).unwrap();
        let reloaded = FreeList::load(&disk, free.head(), free.len() as u32).unwrap();
        assert_eq!(
            vec![a, b, BlockId::new(3), BlockId::new(4), BlockId::new(5)],
            reloaded.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn exhausted_list_reports_out_of_space() {
        let disk = disk(3);
        let mut free = FreeList::format(&disk).unwrap();
        free.alloc().unwrap();
        free.alloc().unwrap();
        assert!(matches!(free.alloc(), Err(Error::OutOfSpace)));
        assert!(free.head().is_null());
    }

    #[test]
    fn count_mismatch_is_corruption() {
        let disk = disk(6);
        let free = FreeList::format(&disk).unwrap();

        assert!(matches!(
            FreeList::load(&disk, free.head(), 4),
            Err(Error::Corrupted(_))
        ));
        assert!(matches!(
            FreeList::load(&disk, free.head(), 6),
            Err(Error::Corrupted(_))
        ));
    }

    #[test]
    fn forged_free_count_is_rejected_before_walking() {
        let disk = disk(6);
        let free = FreeList::format(&disk).unwrap();

        assert!(matches!(
            FreeList::load(&disk, free.head(), u32::MAX),
            Err(Error::Corrupted(_))
        ));
    }

    #[test]
    fn chain_through_foreign_block_is_rejected() {
        let disk = disk(6);
        let free = FreeList::format(&disk).unwrap();
        disk.store(BlockId::new(3), &DiskInode::new("f", BlockId::new(4), 0))
            .unwrap();

        assert!(matches!(
            FreeList::load(&disk, free.head(), 5),
            Err(Error::WrongKind { .. })
        ));
    }
}
