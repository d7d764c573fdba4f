//! # 块读写层
//!
//! 对块设备的同步读写，不做缓存：写调用返回时数据已交给设备。
//!
//! 块号本质上是盘上的“指针”，每次解引用都要校验：
//! 先查范围，再查块头的魔数与种类。

use std::sync::Arc;

use block_dev::BlockDevice;

use crate::layout::{BlockHeader, BlockId, DiskBlock, SuperBlock};
use crate::{Error, Result, MAGIC};

pub struct Disk {
    device: Arc<dyn BlockDevice>,
    block_size: usize,
    /// 文件系统占据的块数，不超过设备块数
    total_blocks: u32,
}

impl Disk {
    pub fn new(device: Arc<dyn BlockDevice>, total_blocks: u32) -> Self {
        Self {
            block_size: device.block_size(),
            device,
            total_blocks,
        }
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    #[inline]
    pub fn device(&self) -> &Arc<dyn BlockDevice> {
        &self.device
    }

    /// 读取超级块。块头不对说明不是本文件系统的镜像。
    pub fn load_super(&self) -> Result<SuperBlock> {
        let buf = self.read_raw(BlockId::SUPER)?;
        match BlockHeader::peek(&buf) {
            Ok(header) if header == BlockHeader::new(SuperBlock::KIND) => {
                SuperBlock::decode(&buf).map_err(|err| {
                    log::error!("superblock is unreadable: {err}");
                    Error::BadMount
                })
            }
            _ => Err(Error::BadMount),
        }
    }

    pub fn store_super(&self, super_block: &SuperBlock) -> Result<()> {
        self.store_raw(BlockId::SUPER, super_block)
    }

    /// 读取非超级块，校验其种类
    pub fn load<T: DiskBlock>(&self, id: BlockId) -> Result<T> {
        self.check(id)?;
        let buf = self.read_raw(id)?;
        let header = BlockHeader::peek(&buf)
            .map_err(|_| Error::Corrupted(format!("block {id} has no valid header")))?;

        if header.magic != MAGIC {
            return Err(Error::Corrupted(format!("block {id} has a bad magic")));
        }
        if header.kind != T::KIND {
            return Err(Error::WrongKind {
                block: id,
                expected: T::KIND,
                found: header.kind,
            });
        }

        Ok(T::decode(&buf)?)
    }

    pub fn store<T: DiskBlock>(&self, id: BlockId, block: &T) -> Result<()> {
        self.check(id)?;
        self.store_raw(id, block)
    }

    /// 块号必须落在 1..total_blocks 内
    #[inline]
    pub fn check(&self, id: BlockId) -> Result<()> {
        if id.is_null() || u32::from(id) >= self.total_blocks {
            return Err(Error::InvalidBlock(id));
        }
        Ok(())
    }

    /// 整块读出，不做任何解释
    pub fn read_raw(&self, id: BlockId) -> Result<Vec<u8>> {
        let mut buf = vec![0; self.block_size];
        self.device.read_block(id.into(), &mut buf)?;
        Ok(buf)
    }

    fn store_raw<T: DiskBlock>(&self, id: BlockId, block: &T) -> Result<()> {
        let mut buf = vec![0; self.block_size];
        block.encode(&mut buf)?;
        self.device.write_block(id.into(), &buf)?;
        Ok(())
    }
}
