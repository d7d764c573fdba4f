//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、光盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! `tiny-fs` 通过块设备驱动读写块设备，所有读写均为同步操作：
//! 调用返回时数据已经落到设备上。

mod error;
mod ram_disk;

pub use self::{error::Error, ram_disk::RamDisk};

/// 块设备驱动特质
///
/// 块号从0开始，块`n`位于设备的第`n * block_size`字节处。
/// 越过设备末尾的读写必须报错，不得悄悄扩展设备。
pub trait BlockDevice: Send + Sync {
    /// 每块的字节数
    fn block_size(&self) -> usize;

    /// 设备的总块数
    fn num_blocks(&self) -> usize;

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), Error>;

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), Error>;

    /// 关闭设备，刷出尚未落盘的数据。
    ///
    /// 持有外部资源的设备关闭后读写应返回[`Error::Closed`]。
    fn close(&self) -> Result<(), Error> {
        Ok(())
    }

    /// 检查块号与缓冲区长度是否合法
    fn check_access(&self, block_id: usize, len: usize) -> Result<(), Error> {
        let blocks = self.num_blocks();
        if block_id >= blocks {
            return Err(Error::OutOfRange { block_id, blocks });
        }

        let block_size = self.block_size();
        if len != block_size {
            return Err(Error::BadBuffer { len, block_size });
        }

        Ok(())
    }
}
