//! # 打开文件表
//!
//! 挂载期间每个文件在表中占一行，无论是否打开。
//! 描述符单调递增、不复用；文件关闭后行仍保留，直到删除或卸载。

use derive_more::{Display, From, Into};

use crate::inode::Inode;
use crate::layout::BlockId;
use crate::{Error, Result};

/// 文件描述符
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
#[display(fmt = "{}", _0)]
pub struct Fd(u32);

#[derive(Debug)]
pub struct OpenFile {
    /// 挂载时载入、尚未打开过的文件没有描述符
    pub fd: Option<Fd>,
    pub inode: Inode,
    /// 链头在文件生命期内不变，缓存于此
    pub head_extent: BlockId,
    pub open: bool,
    /// 文件内的偏移量，不超过文件长度
    pub offset: usize,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct FileTable {
    files: Vec<OpenFile>,
    next_fd: u32,
}

impl OpenFile {
    /// 挂载时载入的文件：关闭状态，偏移为0
    pub fn closed(name: String, inode: Inode, head_extent: BlockId) -> Self {
        Self {
            fd: None,
            inode,
            head_extent,
            open: false,
            offset: 0,
            name,
        }
    }
}

impl FileTable {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_fd(&mut self) -> Fd {
        let fd = Fd(self.next_fd);
        self.next_fd += 1;
        fd
    }

    #[inline]
    pub fn push(&mut self, file: OpenFile) {
        self.files.push(file);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &OpenFile> {
        self.files.iter()
    }

    pub fn position_by_name(&self, name: &str) -> Option<usize> {
        self.files.iter().position(|file| file.name == name)
    }

    pub fn position(&self, fd: Fd) -> Result<usize> {
        self.files
            .iter()
            .position(|file| file.fd == Some(fd))
            .ok_or(Error::BadDescriptor(fd))
    }

    #[inline]
    pub fn get(&self, fd: Fd) -> Result<&OpenFile> {
        self.position(fd).map(|index| &self.files[index])
    }

    #[inline]
    pub fn get_mut(&mut self, fd: Fd) -> Result<&mut OpenFile> {
        self.position(fd).map(|index| &mut self.files[index])
    }

    /// 同[`FileTable::get_mut`]，但要求文件处于打开状态
    pub fn opened_mut(&mut self, fd: Fd) -> Result<&mut OpenFile> {
        let file = self.get_mut(fd)?;
        if !file.open {
            return Err(Error::NotOpen(fd));
        }
        Ok(file)
    }

    #[inline]
    pub fn row_mut(&mut self, index: usize) -> &mut OpenFile {
        &mut self.files[index]
    }

    /// 以最后一行填补被删除的行
    #[inline]
    pub fn remove(&mut self, index: usize) -> OpenFile {
        self.files.swap_remove(index)
    }

    /// 按表序排列的索引节点块号，即超级块中的索引节点目录
    pub fn inodes(&self) -> Vec<BlockId> {
        self.files.iter().map(|file| file.inode.block_id()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, block: u32) -> OpenFile {
        OpenFile::closed(
            name.to_owned(),
            Inode::new(BlockId::new(block)),
            BlockId::new(block + 1),
        )
    }

    #[test]
    fn descriptors_are_never_reused() {
        let mut table = FileTable::new();
        let fds: Vec<u32> = (0..3).map(|_| table.alloc_fd().into()).collect();
        assert_eq!(vec![0, 1, 2], fds);
    }

    #[test]
    fn closed_row_is_found_but_not_open() {
        let mut table = FileTable::new();
        table.push(file("a", 1));
        let fd = table.alloc_fd();
        table.row_mut(0).fd = Some(fd);

        assert!(table.get(fd).is_ok());
        assert!(matches!(table.opened_mut(fd), Err(Error::NotOpen(_))));
        assert!(matches!(
            table.get(Fd::from(7)),
            Err(Error::BadDescriptor(_))
        ));
    }

    #[test]
    fn remove_swaps_last_row_in() {
        let mut table = FileTable::new();
        for (i, name) in ["a", "b", "c"].into_iter().enumerate() {
            table.push(file(name, 1 + 2 * i as u32));
        }

        assert_eq!("a", table.remove(0).name);
        assert_eq!(Some(0), table.position_by_name("c"));
        assert_eq!(vec![BlockId::new(5), BlockId::new(3)], table.inodes());
    }
}
