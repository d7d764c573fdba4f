//! # 会话层
//!
//! [`TinyFileSystem`]是调用者持有的文件系统句柄，状态机只有两态：
//! 未挂载 --mount--> 已挂载 --unmount--> 未挂载。
//!
//! 挂载时从盘上重建空闲链表镜像与打开文件表，卸载时把计数写回超级块。
//! 整个进程同一时刻至多挂载一个文件系统。

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use block_dev::BlockDevice;
use spin::Mutex;

use crate::disk::Disk;
use crate::free_list::FreeList;
use crate::inode::Inode;
use crate::layout::{BlockId, DiskInode, FreeBlock, Permission, SuperBlock};
use crate::table::{Fd, FileTable, OpenFile};
use crate::{Error, Result, MIN_BLOCK_SIZE, NAME_MAX_LEN};

/// 进程内是否已有挂载的文件系统
static MOUNTED: Mutex<bool> = Mutex::new(false);

pub struct TinyFileSystem {
    session: Mutex<Option<Session>>,
}

/// 挂载期间的全部内存状态
struct Session {
    disk: Disk,
    free: FreeList,
    files: FileTable,
    _guard: MountGuard,
}

/// 持有期间独占进程内的挂载权
struct MountGuard;

/// 创建、修改、访问时间，单位为秒(UNIX时间)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamps {
    pub created: u64,
    pub modified: u64,
    pub accessed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub name: String,
    /// 文件长度(字节)
    pub size: usize,
    /// 占用的数据块数
    pub blocks: u32,
    pub permission: Permission,
    pub times: Timestamps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub files: u32,
}

impl TinyFileSystem {
    pub const fn new() -> Self {
        Self {
            session: Mutex::new(None),
        }
    }

    #[inline]
    pub fn is_mounted(&self) -> bool {
        self.session.lock().is_some()
    }

    /// 在`device`上建立全新的文件系统：超级块，以及串起其余所有块的空闲链表。
    /// 任何文件系统处于挂载状态时都不能格式化。
    pub fn format(&self, device: Arc<dyn BlockDevice>) -> Result<()> {
        let _guard = MountGuard::acquire()?;
        format_device(device)
    }

    /// 确认没有任何挂载之后，才调用`create`打开设备并格式化，返回该设备。
    ///
    /// 创建设备往往会毁掉原有内容(例如截断镜像文件)，所以要先持有挂载权。
    pub fn create_and_format<D: BlockDevice + 'static>(
        &self,
        create: impl FnOnce() -> Result<D>,
    ) -> Result<Arc<D>> {
        let _guard = MountGuard::acquire()?;
        let device = Arc::new(create()?);
        format_device(device.clone())?;
        Ok(device)
    }

    pub fn mount(&self, device: Arc<dyn BlockDevice>) -> Result<()> {
        let mut slot = self.session.lock();
        if slot.is_some() {
            return Err(Error::AlreadyMounted);
        }
        let guard = MountGuard::acquire()?;

        let device_blocks = device.num_blocks();
        let super_block = Disk::new(device.clone(), u32::MAX).load_super()?;
        if super_block.block_size as usize != device.block_size()
            || super_block.total_blocks < 2
            || super_block.total_blocks as usize > device_blocks
            || super_block.file_count() as usize > SuperBlock::capacity(device.block_size())
        {
            log::error!(
                "superblock describes {} blocks of {} bytes, device has {device_blocks} of {}",
                super_block.total_blocks,
                super_block.block_size,
                device.block_size()
            );
            return Err(Error::BadMount);
        }

        let disk = Disk::new(device, super_block.total_blocks);
        let free = FreeList::load(&disk, super_block.free_head, super_block.free_blocks)?;

        let mut files = FileTable::new();
        for &block_id in super_block.inodes() {
            let inode = Inode::new(block_id);
            let (name, head_extent) =
                inode.on_disk(&disk, |disk_inode| (disk_inode.name(), disk_inode.head_extent))?;
            if files.position_by_name(&name).is_some() {
                log::error!("inode {block_id} repeats the name {name:?}");
                return Err(Error::Corrupted(format!("duplicate file name {name:?}")));
            }
            files.push(OpenFile::closed(name, inode, head_extent));
        }

        log::info!(
            "mounted: {} files, {} of {} blocks free",
            files.len(),
            free.len(),
            disk.total_blocks()
        );
        *slot = Some(Session {
            disk,
            free,
            files,
            _guard: guard,
        });
        Ok(())
    }

    /// 把空闲链表与文件计数写回超级块，释放内存状态并关闭设备
    pub fn unmount(&self) -> Result<()> {
        let mut slot = self.session.lock();
        slot.as_ref().ok_or(Error::NotMounted)?.sync_super()?;

        let Some(session) = slot.take() else {
            return Err(Error::NotMounted);
        };
        let device = session.disk.device().clone();
        drop(session);
        device.close()?;

        log::info!("unmounted");
        Ok(())
    }

    /// 打开文件，不存在则创建
    pub fn open(&self, name: &str) -> Result<Fd> {
        self.with_session(|session| session.open(name))
    }

    pub fn close(&self, fd: Fd) -> Result<()> {
        self.with_session(|session| session.close(fd))
    }

    /// 以`data`整体替换文件内容，偏移归零
    pub fn write(&self, fd: Fd, data: &[u8]) -> Result<()> {
        self.with_session(|session| session.write(fd, data))
    }

    pub fn read_byte(&self, fd: Fd) -> Result<u8> {
        self.with_session(|session| session.read_byte(fd))
    }

    /// 从当前偏移读满`buf`或读到文件末尾，返回读到的字节数
    pub fn read(&self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        self.with_session(|session| session.read(fd, buf))
    }

    pub fn write_byte(&self, fd: Fd, byte: u8) -> Result<()> {
        self.with_session(|session| session.write_byte(fd, byte))
    }

    pub fn seek(&self, fd: Fd, offset: usize) -> Result<()> {
        self.with_session(|session| session.seek(fd, offset))
    }

    pub fn delete(&self, fd: Fd) -> Result<()> {
        self.with_session(|session| session.delete(fd))
    }

    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.with_session(|session| session.rename(old_name, new_name))
    }

    pub fn set_access(&self, name: &str, permission: Permission) -> Result<()> {
        self.with_session(|session| session.set_access(name, permission))
    }

    #[inline]
    pub fn set_read_only(&self, name: &str) -> Result<()> {
        self.set_access(name, Permission::ReadOnly)
    }

    #[inline]
    pub fn set_read_write(&self, name: &str) -> Result<()> {
        self.set_access(name, Permission::ReadWrite)
    }

    /// 描述符无效时报告[`Error::BadFile`]
    pub fn file_info(&self, fd: Fd) -> Result<Timestamps> {
        self.with_session(|session| match session.stat(fd) {
            Ok(stat) => Ok(stat.times),
            Err(Error::BadDescriptor(fd)) => Err(Error::BadFile(format!("fd {fd}"))),
            Err(err) => Err(err),
        })
    }

    pub fn stat(&self, fd: Fd) -> Result<Stat> {
        self.with_session(|session| session.stat(fd))
    }

    /// 按表序列出所有文件，无论是否打开
    pub fn list(&self) -> Result<Vec<String>> {
        self.with_session(|session| Ok(session.files.iter().map(|file| file.name.clone()).collect()))
    }

    /// 按表序给出所有文件的元信息。不打开文件，也不更新访问时间。
    pub fn stat_all(&self) -> Result<Vec<Stat>> {
        self.with_session(|session| {
            let session = &*session;
            session
                .files
                .iter()
                .map(|file| session.stat_row(file))
                .collect()
        })
    }

    pub fn usage(&self) -> Result<Usage> {
        self.with_session(|session| Ok(session.usage()))
    }

    /// 遍历所有块，确认每一块恰好归属于超级块、某个文件或空闲链表之一
    pub fn verify(&self) -> Result<Usage> {
        self.with_session(|session| session.verify())
    }
}

impl TinyFileSystem {
    fn with_session<V>(&self, f: impl FnOnce(&mut Session) -> Result<V>) -> Result<V> {
        let mut slot = self.session.lock();
        let session = slot.as_mut().ok_or(Error::NotMounted)?;
        f(session)
    }
}

impl Default for TinyFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    fn open(&mut self, name: &str) -> Result<Fd> {
        if let Some(index) = self.files.position_by_name(name) {
            let file = self.files.row_mut(index);
            if let (true, Some(fd)) = (file.open, file.fd) {
                return Ok(fd);
            }

            // 关闭后重新打开，换一个新的描述符
            let fd = self.files.alloc_fd();
            let file = self.files.row_mut(index);
            file.fd = Some(fd);
            file.open = true;
            file.offset = 0;
            log::debug!("reopen {name:?} as fd {fd}");
            return Ok(fd);
        }

        validate_name(name)?;
        if self.files.len() >= SuperBlock::capacity(self.disk.block_size()) {
            return Err(Error::DirectoryFull);
        }

        let (inode, head_extent) = Inode::create(name, now(), &self.disk, &mut self.free)?;
        let fd = self.files.alloc_fd();
        self.files.push(OpenFile {
            fd: Some(fd),
            inode,
            head_extent,
            open: true,
            offset: 0,
            name: name.to_owned(),
        });
        self.sync_super()?;

        log::debug!("open new file {name:?} as fd {fd}");
        Ok(fd)
    }

    fn close(&mut self, fd: Fd) -> Result<()> {
        let file = self.files.get_mut(fd)?;
        if !file.open {
            return Err(Error::AlreadyClosed(fd));
        }
        file.open = false;

        let now = now();
        file.inode
            .on_disk_mut(&self.disk, |disk_inode| disk_inode.accessed = now)
    }

    fn write(&mut self, fd: Fd, data: &[u8]) -> Result<()> {
        let file = self.files.opened_mut(fd)?;
        file.inode.replace(data, now(), &self.disk, &mut self.free)?;
        file.offset = 0;
        self.sync_super()
    }

    fn read_byte(&mut self, fd: Fd) -> Result<u8> {
        let file = self.files.opened_mut(fd)?;
        let size = file.inode.on_disk(&self.disk, |disk_inode| disk_inode.size)?;
        if file.offset >= size as usize {
            return Err(Error::EndOfFile);
        }

        let byte = file.inode.read_byte_at(file.offset, &self.disk)?;
        let now = now();
        file.inode
            .on_disk_mut(&self.disk, |disk_inode| disk_inode.accessed = now)?;
        file.offset += 1;
        Ok(byte)
    }

    fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        let file = self.files.opened_mut(fd)?;
        let read_size = file.inode.read_at(file.offset, buf, &self.disk)?;
        if read_size > 0 {
            let now = now();
            file.inode
                .on_disk_mut(&self.disk, |disk_inode| disk_inode.accessed = now)?;
            file.offset += read_size;
        }
        Ok(read_size)
    }

    fn write_byte(&mut self, fd: Fd, byte: u8) -> Result<()> {
        let file = self.files.opened_mut(fd)?;
        let (writable, size) = file.inode.on_disk(&self.disk, |disk_inode| {
            (disk_inode.is_writable(), disk_inode.size)
        })?;
        if !writable {
            return Err(Error::NoWriteAccess);
        }
        if file.offset >= size as usize {
            return Err(Error::EndOfFile);
        }

        file.inode.write_byte_at(file.offset, byte, &self.disk)?;
        let now = now();
        file.inode
            .on_disk_mut(&self.disk, |disk_inode| disk_inode.modified = now)?;
        file.offset += 1;
        Ok(())
    }

    fn seek(&mut self, fd: Fd, offset: usize) -> Result<()> {
        let file = self.files.opened_mut(fd)?;
        let size = file.inode.on_disk(&self.disk, |disk_inode| disk_inode.size)? as usize;
        // 恰好停在文件末尾是允许的
        if offset > size {
            return Err(Error::SeekPastEnd { offset, size });
        }
        file.offset = offset;
        Ok(())
    }

    fn delete(&mut self, fd: Fd) -> Result<()> {
        let index = self.files.position(fd)?;
        let file = self.files.row_mut(index);
        if !file.open {
            return Err(Error::NotOpen(fd));
        }
        if !file.inode.on_disk(&self.disk, DiskInode::is_writable)? {
            return Err(Error::NoWriteAccess);
        }

        if let Err(err) = file.inode.release(&self.disk, &mut self.free) {
            // 回收中断后链头可能已变，重新缓存
            let head = file
                .inode
                .on_disk(&self.disk, |disk_inode| disk_inode.head_extent);
            if let Ok(head) = head {
                file.head_extent = head;
            }
            return Err(err);
        }
        let file = self.files.remove(index);
        self.sync_super()?;

        log::debug!("deleted {:?} (fd {fd})", file.name);
        Ok(())
    }

    fn rename(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        validate_name(new_name)?;
        let index = self
            .files
            .position_by_name(old_name)
            .ok_or_else(|| Error::BadFile(old_name.to_owned()))?;
        if old_name != new_name && self.files.position_by_name(new_name).is_some() {
            return Err(Error::DuplicateName(new_name.to_owned()));
        }

        let file = self.files.row_mut(index);
        if !file.inode.on_disk(&self.disk, DiskInode::is_writable)? {
            return Err(Error::NoWriteAccess);
        }

        let now = now();
        file.inode.on_disk_mut(&self.disk, |disk_inode| {
            disk_inode.set_name(new_name);
            disk_inode.modified = now;
        })?;
        file.name = new_name.to_owned();
        Ok(())
    }

    fn set_access(&mut self, name: &str, permission: Permission) -> Result<()> {
        let index = self
            .files
            .position_by_name(name)
            .ok_or_else(|| Error::BadFile(name.to_owned()))?;

        self.files
            .row_mut(index)
            .inode
            .on_disk_mut(&self.disk, |disk_inode| disk_inode.set_permission(permission))
    }

    fn stat(&self, fd: Fd) -> Result<Stat> {
        self.stat_row(self.files.get(fd)?)
    }

    fn stat_row(&self, file: &OpenFile) -> Result<Stat> {
        file.inode.on_disk(&self.disk, |disk_inode| Stat {
            name: file.name.clone(),
            size: disk_inode.size as usize,
            blocks: disk_inode.block_count,
            permission: disk_inode.permission(),
            times: Timestamps::from(disk_inode),
        })
    }

    fn usage(&self) -> Usage {
        Usage {
            total_blocks: self.disk.total_blocks(),
            free_blocks: self.free.len() as u32,
            files: self.files.len() as u32,
        }
    }

    fn verify(&self) -> Result<Usage> {
        let mut seen = BTreeSet::from([BlockId::SUPER]);
        let mut claim = |id: BlockId| {
            if seen.insert(id) {
                Ok(())
            } else {
                log::error!("block {id} is referenced twice");
                Err(Error::Corrupted(format!("block {id} is referenced twice")))
            }
        };

        for id in self.free.iter() {
            self.disk.load::<FreeBlock>(id)?;
            claim(id)?;
        }

        for file in self.files.iter() {
            claim(file.inode.block_id())?;
            let extents = file.inode.extents(&self.disk)?;
            if extents.first().copied().unwrap_or(BlockId::NULL) != file.head_extent {
                return Err(Error::Corrupted(format!(
                    "{:?} does not start at its cached head extent",
                    file.name
                )));
            }
            for id in extents {
                claim(id)?;
            }
        }

        let total_blocks = self.disk.total_blocks();
        if seen.len() != total_blocks as usize {
            log::error!("{} of {total_blocks} blocks are accounted for", seen.len());
            return Err(Error::Corrupted(format!(
                "{} blocks are neither used nor free",
                total_blocks as usize - seen.len()
            )));
        }

        Ok(self.usage())
    }

    fn sync_super(&self) -> Result<()> {
        let mut super_block = SuperBlock::new(self.disk.block_size(), self.disk.total_blocks());
        super_block.free_head = self.free.head();
        super_block.free_blocks = self.free.len() as u32;
        super_block.set_inodes(self.files.inodes());
        self.disk.store_super(&super_block)
    }
}

impl MountGuard {
    fn acquire() -> Result<Self> {
        let mut mounted = MOUNTED.lock();
        if *mounted {
            return Err(Error::AlreadyMounted);
        }
        *mounted = true;
        Ok(Self)
    }
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        *MOUNTED.lock() = false;
    }
}

impl From<&DiskInode> for Timestamps {
    fn from(disk_inode: &DiskInode) -> Self {
        Self {
            created: disk_inode.created,
            modified: disk_inode.modified,
            accessed: disk_inode.accessed,
        }
    }
}

/// 写入超级块与空闲链表，调用者须持有挂载权
fn format_device(device: Arc<dyn BlockDevice>) -> Result<()> {
    let block_size = device.block_size();
    let blocks = device.num_blocks();
    let total_blocks = u32::try_from(blocks).map_err(|_| Error::InvalidSize(blocks))?;
    if block_size < MIN_BLOCK_SIZE || total_blocks < 2 {
        return Err(Error::InvalidSize(block_size * blocks));
    }

    let disk = Disk::new(device, total_blocks);
    disk.store_super(&SuperBlock::new(block_size, total_blocks))?;
    FreeList::format(&disk)?;

    log::info!("formatted {total_blocks} blocks of {block_size} bytes");
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('\0') {
        return Err(Error::InvalidName(name.to_owned()));
    }
    if name.len() > NAME_MAX_LEN {
        return Err(Error::NameTooLong(name.to_owned()));
    }
    Ok(())
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
