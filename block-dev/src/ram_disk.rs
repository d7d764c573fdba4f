use std::sync::Mutex;

use crate::{BlockDevice, Error};

/// 内存中的块设备，初始全零。
///
/// 关闭不会丢弃内容，同一块内存盘可以反复挂载。
#[derive(Debug)]
pub struct RamDisk {
    block_size: usize,
    blocks: usize,
    data: Mutex<Vec<u8>>,
}

impl RamDisk {
    pub fn new(block_size: usize, blocks: usize) -> Self {
        Self {
            block_size,
            blocks,
            data: Mutex::new(vec![0; block_size * blocks]),
        }
    }

    fn with_data<V>(&self, f: impl FnOnce(&mut [u8]) -> V) -> V {
        let mut data = self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut data)
    }
}

impl BlockDevice for RamDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn num_blocks(&self) -> usize {
        self.blocks
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), Error> {
        self.check_access(block_id, buf.len())?;
        let start = block_id * self.block_size;
        self.with_data(|data| buf.copy_from_slice(&data[start..start + self.block_size]));
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), Error> {
        self.check_access(block_id, buf.len())?;
        let start = block_id * self.block_size;
        self.with_data(|data| data[start..start + self.block_size].copy_from_slice(buf));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_back_written_block() {
        let disk = RamDisk::new(64, 4);
        disk.write_block(2, &[7; 64]).unwrap();

        let mut buf = [0; 64];
        disk.read_block(2, &mut buf).unwrap();
        assert_eq!([7; 64], buf);
        disk.read_block(1, &mut buf).unwrap();
        assert_eq!([0; 64], buf);
    }

    #[test]
    fn reject_out_of_range_and_short_buffer() {
        let disk = RamDisk::new(64, 4);
        let mut buf = [0; 64];

        assert!(matches!(
            disk.read_block(4, &mut buf),
            Err(Error::OutOfRange { block_id: 4, blocks: 4 })
        ));
        assert!(matches!(
            disk.write_block(0, &[0; 32]),
            Err(Error::BadBuffer { len: 32, block_size: 64 })
        ));
    }

    #[test]
    fn close_keeps_contents() {
        let disk = RamDisk::new(64, 2);
        disk.write_block(1, &[3; 64]).unwrap();
        disk.close().unwrap();

        let mut buf = [0; 64];
        disk.read_block(1, &mut buf).unwrap();
        assert_eq!([3; 64], buf);
    }
}
