//! Embedded icon resources of PE images (executables and DLLs).
//!
//! Reads the resource directory straight from the file, so extraction works
//! the same on every host platform and never maps or executes the image.
//! Only the two resource types an icon needs are looked at: `RT_GROUP_ICON`
//! directories and the `RT_ICON` images they reference.

use crate::error::{IconError, Result};
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

const RT_ICON: u32 = 3;
const RT_GROUP_ICON: u32 = 14;

const PE32_MAGIC: u16 = 0x10B;
const PE32_PLUS_MAGIC: u16 = 0x20B;
const RESOURCE_DIRECTORY_INDEX: usize = 2;

const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// Size of a `GRPICONDIRENTRY` record.
const GROUP_ENTRY_LEN: usize = 14;

/// Extract the icon selected by `index` from the PE image at `path`.
///
/// A non-negative `index` picks the n-th icon group in resource order; a
/// negative one picks the group whose resource id is `-index`. An index that
/// matches nothing falls back to the first group.
pub fn extract_icon(path: &Path, index: i32) -> Result<DynamicImage> {
    let data = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            IconError::ReferentNotFound(path.display().to_string())
        } else {
            IconError::io_with_path(e, path)
        }
    })?;
    let image = extract_icon_from_bytes(&data, index)?;
    debug!(
        "Extracted {}x{} icon #{} from {}",
        image.width(),
        image.height(),
        index,
        path.display()
    );
    Ok(image)
}

/// Extract an icon from an in-memory PE image.
pub fn extract_icon_from_bytes(data: &[u8], index: i32) -> Result<DynamicImage> {
    let image = PeImage::parse(data)?;
    let resources = image.resources()?;

    let groups = resources.entries_of_type(RT_GROUP_ICON)?;
    if groups.is_empty() {
        return Err(IconError::invalid("PE", "image has no icon groups"));
    }
    let group = select_group(&groups, index);
    let entries = parse_group(group.data)?;
    let best = best_entry(&entries)
        .ok_or_else(|| IconError::invalid("PE", "icon group is empty"))?;

    let icons = resources.entries_of_type(RT_ICON)?;
    let icon = icons
        .iter()
        .find(|e| e.id == Some(u32::from(best.icon_id)))
        .ok_or_else(|| {
            IconError::invalid("PE", format!("icon resource {} is missing", best.icon_id))
        })?;

    decode_icon_resource(icon.data, best)
}

/// Decode an `.ico` container, keeping its largest image.
pub fn decode_ico(bytes: &[u8]) -> Result<DynamicImage> {
    let dir = ico::IconDir::read(Cursor::new(bytes))
        .map_err(|e| IconError::invalid("ICO", e.to_string()))?;
    let entry = dir
        .entries()
        .iter()
        .max_by_key(|e| (e.width() * e.height(), e.bits_per_pixel()))
        .ok_or_else(|| IconError::invalid("ICO", "container holds no images"))?;
    let decoded = entry
        .decode()
        .map_err(|e| IconError::invalid("ICO", e.to_string()))?;
    rgba_image(decoded)
}

fn rgba_image(icon: ico::IconImage) -> Result<DynamicImage> {
    let (width, height) = (icon.width(), icon.height());
    image::RgbaImage::from_raw(width, height, icon.rgba_data().to_vec())
        .map(DynamicImage::ImageRgba8)
        .ok_or_else(|| IconError::invalid("ICO", "pixel buffer does not match dimensions"))
}

/// An `RT_ICON` payload is either a PNG stream or a headerless DIB. The DIB
/// case is wrapped in a one-image ICO container so the decoder sees the
/// format it expects.
fn decode_icon_resource(data: &[u8], entry: &GroupEntry) -> Result<DynamicImage> {
    if data.starts_with(PNG_SIGNATURE) {
        return Ok(image::load_from_memory_with_format(
            data,
            image::ImageFormat::Png,
        )?);
    }

    let mut container = Vec::with_capacity(22 + data.len());
    container.extend_from_slice(&0u16.to_le_bytes());
    container.extend_from_slice(&1u16.to_le_bytes());
    container.extend_from_slice(&1u16.to_le_bytes());
    container.push(entry.width);
    container.push(entry.height);
    container.push(entry.color_count);
    container.push(0);
    container.extend_from_slice(&entry.planes.to_le_bytes());
    container.extend_from_slice(&entry.bit_count.to_le_bytes());
    container.extend_from_slice(&(data.len() as u32).to_le_bytes());
    container.extend_from_slice(&22u32.to_le_bytes());
    container.extend_from_slice(data);
    decode_ico(&container)
}

/// One image advertised by an icon group.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GroupEntry {
    width: u8,
    height: u8,
    color_count: u8,
    planes: u16,
    bit_count: u16,
    icon_id: u16,
}

impl GroupEntry {
    /// Edge lengths; zero encodes 256.
    fn dimensions(&self) -> (u32, u32) {
        let edge = |v: u8| if v == 0 { 256 } else { u32::from(v) };
        (edge(self.width), edge(self.height))
    }
}

fn parse_group(data: &[u8]) -> Result<Vec<GroupEntry>> {
    let reader = Reader::new(data, "icon group");
    let kind = reader.u16_at(2)?;
    if kind != 1 {
        return Err(IconError::invalid("icon group", format!("unexpected type {}", kind)));
    }
    let count = reader.u16_at(4)? as usize;

    (0..count)
        .map(|i| {
            let at = 6 + i * GROUP_ENTRY_LEN;
            Ok(GroupEntry {
                width: reader.u8_at(at)?,
                height: reader.u8_at(at + 1)?,
                color_count: reader.u8_at(at + 2)?,
                planes: reader.u16_at(at + 4)?,
                bit_count: reader.u16_at(at + 6)?,
                icon_id: reader.u16_at(at + 12)?,
            })
        })
        .collect()
}

/// Largest area wins; bit depth breaks ties.
fn best_entry(entries: &[GroupEntry]) -> Option<&GroupEntry> {
    entries.iter().max_by_key(|e| {
        let (w, h) = e.dimensions();
        (w * h, e.bit_count)
    })
}

fn select_group<'a>(groups: &'a [ResourceEntry<'a>], index: i32) -> &'a ResourceEntry<'a> {
    let chosen = if index >= 0 {
        groups.get(index as usize)
    } else {
        let id = index.unsigned_abs();
        groups.iter().find(|g| g.id == Some(id))
    };
    chosen.unwrap_or(&groups[0])
}

/// Bounds-checked little-endian reads.
struct Reader<'a> {
    data: &'a [u8],
    what: &'static str,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], what: &'static str) -> Self {
        Self { data, what }
    }

    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| {
                IconError::invalid(
                    self.what,
                    format!("read of {} bytes at {:#x} is out of bounds", len, offset),
                )
            })
    }

    fn u8_at(&self, offset: usize) -> Result<u8> {
        Ok(self.slice(offset, 1)?[0])
    }

    fn u16_at(&self, offset: usize) -> Result<u16> {
        let b = self.slice(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32_at(&self, offset: usize) -> Result<u32> {
        let b = self.slice(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[derive(Debug, Clone, Copy)]
struct Section {
    virtual_address: u32,
    virtual_size: u32,
    raw_size: u32,
    raw_offset: u32,
}

struct PeImage<'a> {
    reader: Reader<'a>,
    sections: Vec<Section>,
    resource_rva: u32,
}

impl<'a> PeImage<'a> {
    fn parse(data: &'a [u8]) -> Result<Self> {
        let reader = Reader::new(data, "PE");
        if reader.slice(0, 2)? != b"MZ" {
            return Err(IconError::invalid("PE", "missing MZ signature"));
        }
        let pe_offset = reader.u32_at(0x3C)? as usize;
        if reader.slice(pe_offset, 4)? != b"PE\0\0" {
            return Err(IconError::invalid("PE", "missing PE signature"));
        }

        let coff = pe_offset + 4;
        let section_count = reader.u16_at(coff + 2)? as usize;
        let optional_size = reader.u16_at(coff + 16)? as usize;
        let optional = coff + 20;

        let (count_offset, directories) = match reader.u16_at(optional)? {
            PE32_MAGIC => (optional + 92, optional + 96),
            PE32_PLUS_MAGIC => (optional + 108, optional + 112),
            other => {
                return Err(IconError::invalid(
                    "PE",
                    format!("unknown optional header magic {:#x}", other),
                ))
            }
        };
        let directory_count = reader.u32_at(count_offset)? as usize;
        if directory_count <= RESOURCE_DIRECTORY_INDEX {
            return Err(IconError::invalid("PE", "image has no resource directory"));
        }
        let resource_rva = reader.u32_at(directories + RESOURCE_DIRECTORY_INDEX * 8)?;
        if resource_rva == 0 {
            return Err(IconError::invalid("PE", "image has no resources"));
        }

        let table = optional + optional_size;
        let sections = (0..section_count)
            .map(|i| {
                let at = table + i * 40;
                Ok(Section {
                    virtual_size: reader.u32_at(at + 8)?,
                    virtual_address: reader.u32_at(at + 12)?,
                    raw_size: reader.u32_at(at + 16)?,
                    raw_offset: reader.u32_at(at + 20)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            reader,
            sections,
            resource_rva,
        })
    }

    fn rva_to_offset(&self, rva: u32) -> Result<usize> {
        self.sections
            .iter()
            .find(|s| {
                let extent = s.virtual_size.max(s.raw_size);
                rva >= s.virtual_address && rva - s.virtual_address < extent
            })
            .map(|s| (rva - s.virtual_address + s.raw_offset) as usize)
            .ok_or_else(|| {
                IconError::invalid("PE", format!("RVA {:#x} is outside every section", rva))
            })
    }

    fn resources(&self) -> Result<Resources<'_, 'a>> {
        Ok(Resources {
            image: self,
            root: self.rva_to_offset(self.resource_rva)?,
        })
    }
}

/// A leaf of the resource tree: the data of one type/name pair, first
/// language.
#[derive(Debug)]
struct ResourceEntry<'a> {
    /// Numeric id, `None` for string-named resources.
    id: Option<u32>,
    data: &'a [u8],
}

struct Resources<'p, 'a> {
    image: &'p PeImage<'a>,
    root: usize,
}

impl<'p, 'a> Resources<'p, 'a> {
    /// Every resource of `kind`, in directory order (named before numbered).
    fn entries_of_type(&self, kind: u32) -> Result<Vec<ResourceEntry<'a>>> {
        let Some(type_dir) = self
            .directory(self.root)?
            .into_iter()
            .find(|(name, _)| *name == Some(kind))
            .map(|(_, target)| target)
        else {
            return Ok(Vec::new());
        };

        let mut entries = Vec::new();
        for (id, target) in self.directory(self.subdirectory(type_dir)?)? {
            let languages = self.directory(self.subdirectory(target)?)?;
            let Some((_, leaf)) = languages.first() else {
                continue;
            };
            entries.push(ResourceEntry {
                id,
                data: self.leaf_data(*leaf)?,
            });
        }
        Ok(entries)
    }

    /// Entries of the directory at `offset` as (numeric id, raw target).
    fn directory(&self, offset: usize) -> Result<Vec<(Option<u32>, u32)>> {
        let reader = &self.image.reader;
        let named = reader.u16_at(offset + 12)? as usize;
        let numbered = reader.u16_at(offset + 14)? as usize;
        (0..named + numbered)
            .map(|i| {
                let at = offset + 16 + i * 8;
                let name = reader.u32_at(at)?;
                let target = reader.u32_at(at + 4)?;
                let id = (name & 0x8000_0000 == 0).then_some(name);
                Ok((id, target))
            })
            .collect()
    }

    fn subdirectory(&self, target: u32) -> Result<usize> {
        if target & 0x8000_0000 == 0 {
            return Err(IconError::invalid("PE", "expected a resource subdirectory"));
        }
        Ok(self.root + (target & 0x7FFF_FFFF) as usize)
    }

    fn leaf_data(&self, target: u32) -> Result<&'a [u8]> {
        if target & 0x8000_0000 != 0 {
            return Err(IconError::invalid("PE", "expected a resource data entry"));
        }
        let reader = &self.image.reader;
        let entry = self.root + target as usize;
        let rva = reader.u32_at(entry)?;
        let size = reader.u32_at(entry + 4)? as usize;
        reader.slice(self.image.rva_to_offset(rva)?, size)
    }
}
