mod cli;

use std::error::Error;
use std::fs;
use std::io::{self, Write};

use clap::Parser;
use cli::{Cli, Command};
use tiny_fs::TinyFileSystem;
use tiny_fs_fuse::{format_with, mount_with};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let fs = TinyFileSystem::new();

    match &cli.command {
        Command::Mkfs { size } => {
            format_with(&fs, &cli.image, *size, cli.block_size)?;
            println!(
                "{:?}: {} blocks of {} bytes",
                cli.image,
                size / cli.block_size,
                cli.block_size
            );
            Ok(())
        }
        Command::Pack { source } => with_image(&fs, &cli, |tfs| {
            for entry in fs::read_dir(source)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }

                let name = entry.file_name();
                let name = name.to_str().ok_or("file name is not valid UTF-8")?;
                let data = fs::read(entry.path())?;
                log::info!("file={name:?} size={}", data.len());

                let fd = tfs.open(name)?;
                tfs.write(fd, &data)?;
                tfs.close(fd)?;
            }
            Ok(())
        }),
        Command::Ls => with_image(&fs, &cli, |tfs| {
            for stat in tfs.stat_all()? {
                println!("{} {:>8} {:>4} {}", stat.permission, stat.size, stat.blocks, stat.name);
            }

            let usage = tfs.usage()?;
            println!(
                "{} files, {} of {} blocks free",
                usage.files, usage.free_blocks, usage.total_blocks
            );
            Ok(())
        }),
        Command::Cat { name } => with_image(&fs, &cli, |tfs| {
            // 打开不存在的文件会创建它
            if !tfs.list()?.contains(name) {
                return Err(tiny_fs::Error::BadFile(name.clone()).into());
            }

            let fd = tfs.open(name)?;
            let mut stdout = io::stdout().lock();
            let mut buf = [0; 512];
            loop {
                let read_size = tfs.read(fd, &mut buf)?;
                if read_size == 0 {
                    break;
                }
                stdout.write_all(&buf[..read_size])?;
            }
            tfs.close(fd)?;
            Ok(())
        }),
    }
}

/// 挂载镜像执行`f`，无论成败都卸载
fn with_image(
    fs: &TinyFileSystem,
    cli: &Cli,
    f: impl FnOnce(&TinyFileSystem) -> Result<(), Box<dyn Error>>,
) -> Result<(), Box<dyn Error>> {
    mount_with(fs, &cli.image, cli.block_size)?;
    let result = f(fs);
    fs.unmount()?;
    result
}
