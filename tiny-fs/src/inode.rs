//! # 索引节点层
//!
//! 一个文件在盘上由一块索引节点和一条数据块链组成：
//! 索引节点记录元信息与链头，数据块依次以`next`相连。
//!
//! 链的长度以索引节点的`block_count`为准，遍历时恰好走这么多块。

use crate::disk::Disk;
use crate::free_list::FreeList;
use crate::layout::{BlockId, DiskInode, FileExtent};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    /// inode所在块
    block_id: BlockId,
}

impl Inode {
    #[inline]
    pub fn new(block_id: BlockId) -> Self {
        Self { block_id }
    }

    #[inline]
    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    /// 分配索引节点与第一个数据块，返回新文件及其链头
    pub fn create(
        name: &str,
        now: u64,
        disk: &Disk,
        free: &mut FreeList,
    ) -> Result<(Self, BlockId)> {
        if free.len() < 2 {
            return Err(Error::OutOfSpace);
        }

        let block_id = free.alloc()?;
        let head = free.alloc()?;
        let capacity = FileExtent::capacity(disk.block_size());

        let written = disk
            .store(head, &FileExtent::new(BlockId::NULL, &[], capacity))
            .and_then(|()| disk.store(block_id, &DiskInode::new(name, head, now)));
        if let Err(err) = written {
            rollback(&[head, block_id], disk, free);
            return Err(err);
        }

        log::debug!("create {name:?}: inode {block_id}, head extent {head}");
        Ok((Self { block_id }, head))
    }

    /// 读取对磁盘的映射并处理
    pub fn on_disk<V>(&self, disk: &Disk, f: impl FnOnce(&DiskInode) -> V) -> Result<V> {
        disk.load(self.block_id)
            .map(|disk_inode: DiskInode| f(&disk_inode))
    }

    /// 以某种方式修改对磁盘的映射，并写回
    pub fn on_disk_mut<V>(&self, disk: &Disk, f: impl FnOnce(&mut DiskInode) -> V) -> Result<V> {
        let mut disk_inode: DiskInode = disk.load(self.block_id)?;
        let value = f(&mut disk_inode);
        disk.store(self.block_id, &disk_inode)?;
        Ok(value)
    }

    /// 数据块链上的所有块号，按链序排列
    pub fn extents(&self, disk: &Disk) -> Result<Vec<BlockId>> {
        let disk_inode: DiskInode = disk.load(self.block_id)?;
        walk(&disk_inode, disk)
    }

    /// 以`data`整体替换文件内容。
    ///
    /// 尽量复用原有的数据块，不够时从空闲链表分配，多余的归还空闲链表。
    pub fn replace(&self, data: &[u8], now: u64, disk: &Disk, free: &mut FreeList) -> Result<()> {
        let mut disk_inode: DiskInode = disk.load(self.block_id)?;
        if !disk_inode.is_writable() {
            return Err(Error::NoWriteAccess);
        }

        let capacity = FileExtent::capacity(disk.block_size());
        // 空文件也保留一个数据块
        let needed = data.len().div_ceil(capacity).max(1);

        let mut chain = walk(&disk_inode, disk)?;
        let extra = needed.saturating_sub(chain.len());
        if extra > free.len() {
            return Err(Error::OutOfSpace);
        }

        let surplus = chain.split_off(chain.len().min(needed));
        let fresh = (0..extra)
            .map(|_| free.alloc())
            .collect::<Result<Vec<_>>>()?;
        chain.extend_from_slice(&fresh);

        // 从尾到头写：新块写好之前，不会有旧块指向它们
        let written = chain.iter().enumerate().rev().try_for_each(|(index, &id)| {
            let next = chain.get(index + 1).copied().unwrap_or(BlockId::NULL);
            let start = index * capacity;
            let end = (start + capacity).min(data.len());
            disk.store(id, &FileExtent::new(next, &data[start..end], capacity))
        });
        if let Err(err) = written {
            rollback(&fresh, disk, free);
            return Err(err);
        }

        disk_inode.block_count = needed as u32;
        disk_inode.size = data.len() as u32;
        disk_inode.modified = now;
        // 索引节点没写成，新块就没有挂上链
        if let Err(err) = disk.store(self.block_id, &disk_inode) {
            rollback(&fresh, disk, free);
            return Err(err);
        }

        for id in surplus {
            free.release(disk, id)?;
        }

        log::debug!(
            "inode {}: {} bytes in {needed} extents ({extra} new)",
            self.block_id,
            data.len()
        );
        Ok(())
    }

    /// 回收整条数据块链，最后回收索引节点本身。
    ///
    /// 中途失败时，索引节点改为指向尚未回收的那段链，文件长度记为0，
    /// 重试删除即可。
    pub fn release(self, disk: &Disk, free: &mut FreeList) -> Result<()> {
        let chain = self.extents(disk)?;
        for (index, &id) in chain.iter().enumerate() {
            if let Err(err) = free.release(disk, id) {
                let rest = (chain.len() - index) as u32;
                self.truncate_chain(id, rest, disk);
                return Err(err);
            }
        }

        if let Err(err) = free.release(disk, self.block_id) {
            self.truncate_chain(BlockId::NULL, 0, disk);
            return Err(err);
        }
        Ok(())
    }

    /// 读取第`offset`个字节，调用者保证`offset`小于文件长度
    pub fn read_byte_at(&self, offset: usize, disk: &Disk) -> Result<u8> {
        let (id, inner) = self.locate(offset, disk)?;
        let extent: FileExtent = disk.load(id)?;
        Ok(extent.payload[inner])
    }

    /// 原地改写第`offset`个字节，不会增长文件
    pub fn write_byte_at(&self, offset: usize, byte: u8, disk: &Disk) -> Result<()> {
        let (id, inner) = self.locate(offset, disk)?;
        let mut extent: FileExtent = disk.load(id)?;
        extent.payload[inner] = byte;
        disk.store(id, &extent)
    }

    /// 从指定位置(字节偏移)读出数据填充`buf`，返回读到的字节数
    pub fn read_at(&self, offset: usize, buf: &mut [u8], disk: &Disk) -> Result<usize> {
        let disk_inode: DiskInode = disk.load(self.block_id)?;
        let capacity = FileExtent::capacity(disk.block_size());
        let end = (offset + buf.len()).min(disk_inode.size as usize);
        if offset >= end {
            return Ok(0);
        }

        let chain = walk(&disk_inode, disk)?;
        let mut start = offset;
        let mut read_size = 0;
        while start < end {
            // 当前块的逻辑索引
            let block_index = start / capacity;
            let current_block_end = ((block_index + 1) * capacity).min(end);
            let block_read_size = current_block_end - start;

            let id = *chain.get(block_index).ok_or_else(|| {
                Error::Corrupted(format!(
                    "inode {}: size {} exceeds its {} extents",
                    self.block_id,
                    disk_inode.size,
                    chain.len()
                ))
            })?;
            let extent: FileExtent = disk.load(id)?;
            let inner = start % capacity;
            buf[read_size..read_size + block_read_size]
                .copy_from_slice(&extent.payload[inner..inner + block_read_size]);

            read_size += block_read_size;
            start = current_block_end;
        }

        Ok(read_size)
    }
}

impl Inode {
    /// 让索引节点只保留从`head`起的`block_count`块
    fn truncate_chain(&self, head: BlockId, block_count: u32, disk: &Disk) {
        let truncated = self.on_disk_mut(disk, |disk_inode| {
            disk_inode.head_extent = head;
            disk_inode.block_count = block_count;
            disk_inode.size = 0;
        });
        if let Err(err) = truncated {
            log::error!("inode {} still points at released extents: {err}", self.block_id);
        }
    }

    /// 字节偏移 -> (所在数据块, 块内偏移)
    fn locate(&self, offset: usize, disk: &Disk) -> Result<(BlockId, usize)> {
        let disk_inode: DiskInode = disk.load(self.block_id)?;
        let capacity = FileExtent::capacity(disk.block_size());
        let block_index = offset / capacity;
        if block_index >= disk_inode.block_count as usize {
            return Err(Error::EndOfFile);
        }

        let mut id = disk_inode.head_extent;
        for _ in 0..block_index {
            let extent: FileExtent = disk.load(id)?;
            id = extent.next;
        }

        Ok((id, offset % capacity))
    }
}

/// 从链头出发恰好走`block_count`块
fn walk(disk_inode: &DiskInode, disk: &Disk) -> Result<Vec<BlockId>> {
    if disk_inode.block_count >= disk.total_blocks() {
        log::error!(
            "inode {:?} claims {} extents",
            disk_inode.name(),
            disk_inode.block_count
        );
        return Err(Error::Corrupted(format!(
            "{:?} claims {} extents, only {} blocks exist",
            disk_inode.name(),
            disk_inode.block_count,
            disk.total_blocks()
        )));
    }

    let mut chain = Vec::with_capacity(disk_inode.block_count as usize);
    let mut current = disk_inode.head_extent;

    for _ in 0..disk_inode.block_count {
        let extent: FileExtent = disk.load(current)?;
        chain.push(current);
        current = extent.next;
    }

    Ok(chain)
}

/// 出错时归还已分配却尚未挂上链的块
fn rollback(blocks: &[BlockId], disk: &Disk, free: &mut FreeList) {
    for &id in blocks {
        if let Err(err) = free.release(disk, id) {
            log::error!("cannot return block {id} to the free list: {err}");
        }
    }
}
