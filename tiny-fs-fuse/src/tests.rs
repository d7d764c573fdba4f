use std::fs;
use std::sync::{Mutex, MutexGuard};

use tempfile::tempdir;
use tiny_fs::{Error, Fd};

use super::*;

static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[test]
fn hello_survives_delete_and_remount() {
    let _serial = serial();
    let dir = tempdir().unwrap();
    let image = dir.path().join("d");
    let fs = TinyFileSystem::new();

    format(&fs, &image, 2560).unwrap();
    mount(&fs, &image).unwrap();

    let fd = fs.open("a").unwrap();
    assert_eq!(Fd::from(0), fd);
    fs.write(fd, b"HELLO").unwrap();
    fs.seek(fd, 0).unwrap();
    for &expected in b"HELLO" {
        assert_eq!(expected, fs.read_byte(fd).unwrap());
    }
    assert!(matches!(fs.read_byte(fd), Err(Error::EndOfFile)));

    fs.delete(fd).unwrap();
    fs.unmount().unwrap();

    mount(&fs, &image).unwrap();
    assert!(fs.list().unwrap().is_empty());
    assert_eq!(9, fs.verify().unwrap().free_blocks);
    fs.unmount().unwrap();
}

#[test]
fn image_outlives_the_handle() {
    let _serial = serial();
    let dir = tempdir().unwrap();
    let image = dir.path().join("img");

    {
        let fs = TinyFileSystem::new();
        format(&fs, &image, 16 * DEFAULT_BLOCK_SIZE).unwrap();
        mount(&fs, &image).unwrap();
        let fd = fs.open("notes").unwrap();
        fs.write(fd, &[b'x'; 1000]).unwrap();
        fs.close(fd).unwrap();
        fs.unmount().unwrap();
    }
    assert_eq!(16 * DEFAULT_BLOCK_SIZE as u64, fs::metadata(&image).unwrap().len());

    let fs = TinyFileSystem::new();
    mount(&fs, &image).unwrap();
    let fd = fs.open("notes").unwrap();
    let mut buf = vec![0; 2000];
    assert_eq!(1000, fs.read(fd, &mut buf).unwrap());
    assert!(buf[..1000].iter().all(|&byte| byte == b'x'));
    fs.unmount().unwrap();
}

#[test]
fn size_must_be_whole_blocks() {
    let _serial = serial();
    let dir = tempdir().unwrap();
    let image = dir.path().join("odd");
    let fs = TinyFileSystem::new();

    assert!(matches!(
        format(&fs, &image, 1000),
        Err(Error::InvalidSize(1000))
    ));
    assert!(!image.exists());
}

#[test]
fn refused_format_leaves_mounted_image_intact() {
    let _serial = serial();
    let dir = tempdir().unwrap();
    let image = dir.path().join("live");
    let owner = TinyFileSystem::new();

    format(&owner, &image, 2560).unwrap();
    mount(&owner, &image).unwrap();
    let fd = owner.open("keep").unwrap();
    owner.write(fd, b"PRECIOUS").unwrap();
    let before = fs::read(&image).unwrap();

    let other = TinyFileSystem::new();
    assert!(matches!(
        format(&other, &image, 2560),
        Err(Error::AlreadyMounted)
    ));
    assert_eq!(before, fs::read(&image).unwrap());
    assert_eq!(b'P', owner.read_byte(fd).unwrap());
    owner.verify().unwrap();
    owner.unmount().unwrap();
}

#[test]
fn rejected_size_never_touches_the_host_file() {
    let _serial = serial();
    let dir = tempdir().unwrap();
    let image = dir.path().join("small");
    fs::write(&image, b"123456789").unwrap();
    let fs = TinyFileSystem::new();

    for size in [0, DEFAULT_BLOCK_SIZE, 1000] {
        assert!(matches!(
            format(&fs, &image, size),
            Err(Error::InvalidSize(_))
        ));
    }
    assert_eq!(b"123456789".to_vec(), fs::read(&image).unwrap());
}

#[test]
fn format_refuses_while_mounted() {
    let _serial = serial();
    let dir = tempdir().unwrap();
    let image = dir.path().join("busy");
    let fs = TinyFileSystem::new();

    format(&fs, &image, 2560).unwrap();
    mount(&fs, &image).unwrap();
    assert!(matches!(
        format(&fs, &image, 2560),
        Err(Error::AlreadyMounted)
    ));
    fs.unmount().unwrap();
}

#[test]
fn block_size_must_match_the_image() {
    let _serial = serial();
    let dir = tempdir().unwrap();
    let image = dir.path().join("wide");
    let fs = TinyFileSystem::new();

    format(&fs, &image, 4096).unwrap();
    assert!(matches!(
        mount_with(&fs, &image, 512),
        Err(Error::BadMount)
    ));
    assert!(!fs.is_mounted());
    mount_with(&fs, &image, DEFAULT_BLOCK_SIZE).unwrap();
    fs.unmount().unwrap();
}

#[test]
fn missing_image_is_a_device_error() {
    let _serial = serial();
    let dir = tempdir().unwrap();
    let fs = TinyFileSystem::new();

    assert!(matches!(
        mount(&fs, dir.path().join("absent")),
        Err(Error::Device(block_dev::Error::Io(_)))
    ));
}

#[test]
fn closed_block_file_refuses_io() {
    let dir = tempdir().unwrap();
    let device = BlockFile::create(dir.path().join("raw"), 256, 64).unwrap();
    assert_eq!(4, device.num_blocks());

    device.write_block(3, &[1; 64]).unwrap();
    assert!(matches!(
        device.write_block(4, &[1; 64]),
        Err(block_dev::Error::OutOfRange { .. })
    ));
    device.close().unwrap();

    let mut buf = [0; 64];
    assert!(matches!(device.read_block(3, &mut buf), Err(block_dev::Error::Closed)));
    assert!(matches!(device.close(), Err(block_dev::Error::Closed)));
}
