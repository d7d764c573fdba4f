//! # tiny-fs
//!
//! 建立在单个块设备之上的扁平文件系统：没有目录层级，
//! 所有文件都登记在超级块的索引节点目录里。

/* tiny-fs 的整体架构，自上而下 */

// 会话层：挂载/卸载，以及文件描述符上的全部文件操作
mod tfs;

// 打开文件表：描述符与索引节点的对应关系
mod table;

// 索引节点层：文件的元信息块与数据块链
mod inode;

// 空闲块管理层：盘上单链表 + 内存镜像
mod free_list;

// 磁盘数据结构层：四种块的编解码
mod layout;

// 块读写层：带校验的同步块读写
mod disk;

mod error;

pub use block_dev::BlockDevice;

pub use self::{
    error::{Error, Result},
    layout::{BlockId, BlockKind, Permission},
    table::Fd,
    tfs::{Stat, Timestamps, TinyFileSystem, Usage},
};

/// 所有块头部的魔数
pub const MAGIC: u8 = 0x45;
pub const DEFAULT_BLOCK_SIZE: usize = 256;
/// 块必须装得下一个完整的索引节点
pub const MIN_BLOCK_SIZE: usize = 64;
/// 文件名的最大字节数
pub const NAME_MAX_LEN: usize = 8;
