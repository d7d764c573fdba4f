//! 宿主机一侧的工具：把普通文件当作块设备，并提供按路径格式化、挂载的入口。

#[cfg(test)]
mod tests;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use block_dev::{BlockDevice, Error};
use tiny_fs::{TinyFileSystem, DEFAULT_BLOCK_SIZE, MIN_BLOCK_SIZE};

/// 以宿主机文件模拟的块设备
#[derive(Debug)]
pub struct BlockFile {
    /// 关闭后为空
    file: Mutex<Option<File>>,
    block_size: usize,
    blocks: usize,
}

impl BlockFile {
    /// 创建(或截断)镜像文件，并设置其长度
    pub fn create(path: impl AsRef<Path>, size_bytes: usize, block_size: usize) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size_bytes as u64)?;

        Ok(Self::new(file, block_size, size_bytes / block_size))
    }

    /// 打开已有的镜像文件，不改动其内容
    pub fn open(path: impl AsRef<Path>, block_size: usize) -> Result<Self, Error> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let blocks = file.metadata()?.len() as usize / block_size;

        Ok(Self::new(file, block_size, blocks))
    }

    fn new(file: File, block_size: usize, blocks: usize) -> Self {
        Self {
            file: Mutex::new(Some(file)),
            block_size,
            blocks,
        }
    }

    /// 定位到块`block_id`的起始处再交给`f`
    fn at_block<V>(
        &self,
        block_id: usize,
        f: impl FnOnce(&mut File) -> std::io::Result<V>,
    ) -> Result<V, Error> {
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let file = file.as_mut().ok_or(Error::Closed)?;
        file.seek(SeekFrom::Start((block_id * self.block_size) as u64))?;
        Ok(f(file)?)
    }
}

impl BlockDevice for BlockFile {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn num_blocks(&self) -> usize {
        self.blocks
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), Error> {
        self.check_access(block_id, buf.len())?;
        self.at_block(block_id, |file| file.read_exact(buf))
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), Error> {
        self.check_access(block_id, buf.len())?;
        self.at_block(block_id, |file| file.write_all(buf))
    }

    fn close(&self) -> Result<(), Error> {
        let file = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or(Error::Closed)?;
        file.sync_all()?;
        Ok(())
    }
}

/// 在`path`处建立`size_bytes`字节、默认块大小的镜像
pub fn format(fs: &TinyFileSystem, path: impl AsRef<Path>, size_bytes: usize) -> tiny_fs::Result<()> {
    format_with(fs, path, size_bytes, DEFAULT_BLOCK_SIZE)
}

pub fn format_with(
    fs: &TinyFileSystem,
    path: impl AsRef<Path>,
    size_bytes: usize,
    block_size: usize,
) -> tiny_fs::Result<()> {
    // 镜像文件被截断之前完成所有检查
    if block_size < MIN_BLOCK_SIZE
        || size_bytes < 2 * block_size
        || size_bytes % block_size != 0
    {
        return Err(tiny_fs::Error::InvalidSize(size_bytes));
    }

    let device =
        fs.create_and_format(|| Ok(BlockFile::create(path, size_bytes, block_size)?))?;
    device.close()?;
    Ok(())
}

/// 以默认块大小挂载`path`处的镜像
pub fn mount(fs: &TinyFileSystem, path: impl AsRef<Path>) -> tiny_fs::Result<()> {
    mount_with(fs, path, DEFAULT_BLOCK_SIZE)
}

pub fn mount_with(fs: &TinyFileSystem, path: impl AsRef<Path>, block_size: usize) -> tiny_fs::Result<()> {
    let device = BlockFile::open(path, block_size)?;
    fs.mount(Arc::new(device))
}
