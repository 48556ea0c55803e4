//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Encode a solid-colour square PNG.
pub fn png_bytes(size: u32, rgba: [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(size, size, image::Rgba(rgba));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

/// A minimal PE32 image with one icon group holding one PNG icon.
pub fn pe_with_icon(png: &[u8]) -> Vec<u8> {
    const RSRC_RVA: u32 = 0x1000;
    const RSRC_OFFSET: usize = 0x200;
    const BLOBS: usize = 160;

    let icon_len = png.len();
    let group_at = BLOBS + ((icon_len + 3) & !3);
    let mut rsrc = vec![0u8; group_at + 20];
    let put16 = |b: &mut Vec<u8>, at: usize, v: u16| b[at..at + 2].copy_from_slice(&v.to_le_bytes());
    let put32 = |b: &mut Vec<u8>, at: usize, v: u32| b[at..at + 4].copy_from_slice(&v.to_le_bytes());

    // root: RT_ICON, RT_GROUP_ICON
    put16(&mut rsrc, 14, 2);
    put32(&mut rsrc, 16, 3);
    put32(&mut rsrc, 20, 0x8000_0000 | 32);
    put32(&mut rsrc, 24, 14);
    put32(&mut rsrc, 28, 0x8000_0000 | 56);
    // name level, id 1 under each type
    for (dir, lang) in [(32usize, 80u32), (56, 104)] {
        put16(&mut rsrc, dir + 14, 1);
        put32(&mut rsrc, dir + 16, 1);
        put32(&mut rsrc, dir + 20, 0x8000_0000 | lang);
    }
    // language level
    for (dir, data) in [(80usize, 128u32), (104, 144)] {
        put16(&mut rsrc, dir + 14, 1);
        put32(&mut rsrc, dir + 16, 0x409);
        put32(&mut rsrc, dir + 20, data);
    }
    // data entries
    put32(&mut rsrc, 128, RSRC_RVA + BLOBS as u32);
    put32(&mut rsrc, 132, icon_len as u32);
    put32(&mut rsrc, 144, RSRC_RVA + group_at as u32);
    put32(&mut rsrc, 148, 20);
    // icon and group directory
    rsrc[BLOBS..BLOBS + icon_len].copy_from_slice(png);
    put16(&mut rsrc, group_at + 2, 1);
    rsrc[group_at + 6] = 32;
    rsrc[group_at + 7] = 32;
    put16(&mut rsrc, group_at + 4, 1);
    put16(&mut rsrc, group_at + 10, 1);
    put16(&mut rsrc, group_at + 12, 32);
    put32(&mut rsrc, group_at + 14, icon_len as u32);
    put16(&mut rsrc, group_at + 18, 1);

    let mut image = vec![0u8; RSRC_OFFSET];
    image[0..2].copy_from_slice(b"MZ");
    put32(&mut image, 0x3C, 0x40);
    image[0x40..0x44].copy_from_slice(b"PE\0\0");
    put16(&mut image, 0x44, 0x14C);
    put16(&mut image, 0x46, 1);
    put16(&mut image, 0x54, 0xE0);
    let optional = 0x58;
    put16(&mut image, optional, 0x10B);
    put32(&mut image, optional + 92, 16);
    put32(&mut image, optional + 96 + 16, RSRC_RVA);
    put32(&mut image, optional + 96 + 20, rsrc.len() as u32);
    let section = optional + 0xE0;
    image[section..section + 8].copy_from_slice(b".rsrc\0\0\0");
    put32(&mut image, section + 8, rsrc.len() as u32);
    put32(&mut image, section + 12, RSRC_RVA);
    put32(&mut image, section + 16, rsrc.len() as u32);
    put32(&mut image, section + 20, RSRC_OFFSET as u32);

    image.extend_from_slice(&rsrc);
    image
}

/// Write `tool.exe` padded to exactly 10 KiB with the given modification time.
pub fn write_tool_exe(dir: &Path, colour: [u8; 4], mtime: SystemTime) -> PathBuf {
    let path = dir.join("tool.exe");
    let mut bytes = pe_with_icon(&png_bytes(32, colour));
    assert!(bytes.len() <= 10 * 1024);
    bytes.resize(10 * 1024, 0);
    std::fs::write(&path, bytes).unwrap();
    set_mtime(&path, mtime);
    path
}

pub fn set_mtime(path: &Path, mtime: SystemTime) {
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(mtime)
        .unwrap();
}

pub fn t1() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

pub fn t2() -> SystemTime {
    t1() + Duration::from_secs(3600)
}
