//! Composite "grid" icons.
//!
//! Lays out up to N² member icons on a square canvas and stores the result as
//! a multi-size ICO container. Output depends only on the ordered member list,
//! the dimension and the member files' contents, so recomposing the same group
//! produces a byte-identical file.

use crate::cache::atomic_write_bytes;
use crate::config::{EngineConfig, GridConfig};
use crate::error::{IconError, Result};
use crate::fingerprint::short_hash;
use crate::referent::extension_of;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One composition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridIconSpec {
    /// Member icons in display order, row-major.
    pub icons: Vec<PathBuf>,
    /// Grid edge; 2 or 3.
    pub dimension: u32,
    /// Where the composite icon is written.
    pub target: PathBuf,
}

impl GridIconSpec {
    pub fn new(icons: Vec<PathBuf>, dimension: u32, target: impl Into<PathBuf>) -> Self {
        Self {
            icons,
            dimension,
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GridComposer {
    canvas_size: u32,
    padding: u32,
    grids_dir: PathBuf,
}

impl GridComposer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            canvas_size: config.grid_canvas_size,
            padding: config.grid_padding,
            grids_dir: config.grids_dir.clone(),
        }
    }

    /// Deterministic target under the grids directory for a member list.
    pub fn target_for(&self, icons: &[PathBuf], dimension: u32) -> PathBuf {
        let mut input = format!("{}", dimension);
        for icon in icons {
            input.push('\n');
            input.push_str(&icon.to_string_lossy());
        }
        self.grids_dir
            .join(format!("grid-{}.ico", short_hash(input.as_bytes())))
    }

    /// Compose into the deterministic target for `icons`.
    pub fn compose(&self, icons: &[PathBuf], dimension: u32) -> Result<PathBuf> {
        let spec = GridIconSpec::new(icons.to_vec(), dimension, self.target_for(icons, dimension));
        self.compose_into(&spec)
    }

    /// Compose into `spec.target`, replacing it atomically. On failure the
    /// previous file at the target is left as it was.
    pub fn compose_into(&self, spec: &GridIconSpec) -> Result<PathBuf> {
        let canvas = self.render(&spec.icons, spec.dimension)?;
        let container = self.encode(&canvas)?;
        atomic_write_bytes(&spec.target, &container)?;
        debug!(
            "Composed {}x{} grid of {} icons at {}",
            spec.dimension,
            spec.dimension,
            spec.icons.len().min((spec.dimension * spec.dimension) as usize),
            spec.target.display()
        );
        Ok(spec.target.clone())
    }

    /// Draw the grid. Only the first N² icons are used; missing or undecodable
    /// members leave their cell transparent.
    pub fn render(&self, icons: &[PathBuf], dimension: u32) -> Result<RgbaImage> {
        if !(2..=3).contains(&dimension) {
            return Err(IconError::InvalidGridDimension(dimension));
        }
        let cell = self.cell_size(dimension)?;
        let mut canvas = RgbaImage::new(self.canvas_size, self.canvas_size);

        for (i, path) in icons.iter().take((dimension * dimension) as usize).enumerate() {
            let (row, col) = (i as u32 / dimension, i as u32 % dimension);
            let icon = match load_icon(path) {
                Ok(icon) => icon,
                Err(e) => {
                    warn!("Leaving grid cell {} blank, {} unusable: {}", i, path.display(), e);
                    continue;
                }
            };
            let fitted = icon.resize(cell, cell, FilterType::Lanczos3).to_rgba8();
            let x = self.padding + col * (cell + self.padding) + (cell - fitted.width()) / 2;
            let y = self.padding + row * (cell + self.padding) + (cell - fitted.height()) / 2;
            imageops::overlay(&mut canvas, &fitted, i64::from(x), i64::from(y));
        }
        Ok(canvas)
    }

    fn cell_size(&self, dimension: u32) -> Result<u32> {
        self.canvas_size
            .checked_sub(self.padding * (dimension + 1))
            .map(|free| free / dimension)
            .filter(|&cell| cell > 0)
            .ok_or_else(|| {
                IconError::Other(format!(
                    "Grid canvas of {}px cannot fit {}x{} cells with {}px padding",
                    self.canvas_size, dimension, dimension, self.padding
                ))
            })
    }

    fn encode(&self, canvas: &RgbaImage) -> Result<Vec<u8>> {
        let mut dir = ico::IconDir::new(ico::ResourceType::Icon);
        for size in GridConfig::CONTAINER_SIZES
            .into_iter()
            .filter(|&size| size <= self.canvas_size)
        {
            let scaled = if size == canvas.width() {
                canvas.clone()
            } else {
                imageops::resize(canvas, size, size, FilterType::Lanczos3)
            };
            let image = ico::IconImage::from_rgba_data(size, size, scaled.into_raw());
            let entry = ico::IconDirEntry::encode(&image)
                .map_err(|e| IconError::invalid("ICO", format!("encoding {}px: {}", size, e)))?;
            dir.add_entry(entry);
        }

        let mut bytes = Vec::new();
        dir.write(&mut bytes)
            .map_err(|e| IconError::invalid("ICO", format!("writing container: {}", e)))?;
        Ok(bytes)
    }
}

/// Decode an icon file, choosing the largest image of ICO containers.
pub(crate) fn load_icon(path: &Path) -> Result<DynamicImage> {
    if extension_of(path).as_deref() == Some("ico") {
        let bytes = std::fs::read(path).map_err(|e| IconError::io_with_path(e, path))?;
        return crate::extract::pe::decode_ico(&bytes);
    }
    Ok(image::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::atomic_write_png;
    use crate::config::EngineSettings;
    use image::Rgba;
    use tempfile::TempDir;

    fn composer(root: &Path) -> GridComposer {
        GridComposer::new(&EngineConfig::for_data_dir(root))
    }

    fn solid(dir: &Path, name: &str, rgba: [u8; 4]) -> PathBuf {
        let path = dir.join(name);
        atomic_write_png(&path, &RgbaImage::from_pixel(32, 32, Rgba(rgba))).unwrap();
        path
    }

    fn largest(path: &Path) -> RgbaImage {
        load_icon(path).unwrap().to_rgba8()
    }

    #[test]
    fn test_same_input_gives_identical_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let icons: Vec<PathBuf> = [[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255], [9, 9, 9, 255]]
            .iter()
            .enumerate()
            .map(|(i, c)| solid(temp_dir.path(), &format!("{}.png", i), *c))
            .collect();
        let composer = composer(temp_dir.path());

        let first = composer.compose(&icons, 2).unwrap();
        let first_bytes = std::fs::read(&first).unwrap();
        let second = composer.compose(&icons, 2).unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), first_bytes);
        assert!(first.starts_with(temp_dir.path().join("grids")));
    }

    #[test]
    fn test_three_icons_leave_fourth_cell_blank() {
        let temp_dir = TempDir::new().unwrap();
        let icons = vec![
            solid(temp_dir.path(), "a.png", [255, 0, 0, 255]),
            solid(temp_dir.path(), "b.png", [0, 255, 0, 255]),
            solid(temp_dir.path(), "c.png", [0, 0, 255, 255]),
        ];
        let target = temp_dir.path().join("group.ico");
        let composer = composer(temp_dir.path());

        composer
            .compose_into(&GridIconSpec::new(icons, 2, &target))
            .unwrap();
        let image = largest(&target);

        assert_eq!(image.dimensions(), (256, 256));
        // cell = (256 - 8 * 3) / 2 = 116; centres at 66 and 190
        assert_eq!(image.get_pixel(66, 66).0, [255, 0, 0, 255]);
        assert_eq!(image.get_pixel(190, 66).0, [0, 255, 0, 255]);
        assert_eq!(image.get_pixel(66, 190).0, [0, 0, 255, 255]);
        assert_eq!(image.get_pixel(190, 190).0[3], 0);
        // padding stays transparent
        assert_eq!(image.get_pixel(3, 3).0[3], 0);
    }

    #[test]
    fn test_container_holds_every_size() {
        let temp_dir = TempDir::new().unwrap();
        let icons = vec![solid(temp_dir.path(), "a.png", [1, 2, 3, 255])];
        let path = composer(temp_dir.path()).compose(&icons, 3).unwrap();

        let dir = ico::IconDir::read(std::fs::File::open(&path).unwrap()).unwrap();
        let mut sizes: Vec<u32> = dir.entries().iter().map(|e| e.width()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![16, 32, 48, 64, 256]);
    }

    #[test]
    fn test_extra_and_missing_members() {
        let temp_dir = TempDir::new().unwrap();
        let mut icons: Vec<PathBuf> = (0..5)
            .map(|i| solid(temp_dir.path(), &format!("{}.png", i), [200, 100, 50, 255]))
            .collect();
        icons[1] = temp_dir.path().join("missing.png");

        let image = composer(temp_dir.path()).render(&icons, 2).unwrap();
        assert_eq!(image.get_pixel(66, 66).0, [200, 100, 50, 255]);
        assert_eq!(image.get_pixel(190, 66).0[3], 0);
        assert_eq!(image.get_pixel(190, 190).0, [200, 100, 50, 255]);
    }

    #[test]
    fn test_invalid_dimension_keeps_previous_target() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("group.ico");
        std::fs::write(&target, b"previous").unwrap();

        let err = composer(temp_dir.path())
            .compose_into(&GridIconSpec::new(Vec::new(), 4, &target))
            .unwrap_err();

        assert!(matches!(err, IconError::InvalidGridDimension(4)));
        assert_eq!(std::fs::read(&target).unwrap(), b"previous");
    }

    #[test]
    fn test_small_configured_canvas_still_composes() {
        let temp_dir = TempDir::new().unwrap();
        let config = EngineConfig::for_data_dir(temp_dir.path()).with_settings(&EngineSettings {
            grid_canvas_size: Some(16),
            ..EngineSettings::default()
        });
        let icon = solid(temp_dir.path(), "a.png", [10, 200, 10, 255]);

        let target = GridComposer::new(&config).compose(&[icon], 3).unwrap();
        assert_eq!(largest(&target).dimensions(), (16, 16));
    }

    #[test]
    fn test_canvas_without_room_for_cells_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let icon = solid(temp_dir.path(), "a.png", [10, 200, 10, 255]);
        for canvas_size in [16, 32] {
            let composer = GridComposer {
                canvas_size,
                padding: 8,
                grids_dir: temp_dir.path().join("grids"),
            };
            let err = composer.render(&[icon.clone()], 3).unwrap_err();
            assert!(matches!(err, IconError::Other(_)));
        }
    }

    #[test]
    fn test_target_depends_on_order_and_dimension() {
        let temp_dir = TempDir::new().unwrap();
        let composer = composer(temp_dir.path());
        let a = PathBuf::from("/i/a.png");
        let b = PathBuf::from("/i/b.png");

        let ab = composer.target_for(&[a.clone(), b.clone()], 2);
        assert_eq!(ab, composer.target_for(&[a.clone(), b.clone()], 2));
        assert_ne!(ab, composer.target_for(&[b.clone(), a.clone()], 2));
        assert_ne!(ab, composer.target_for(&[a, b], 3));
    }
}
