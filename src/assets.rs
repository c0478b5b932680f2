//! Locating and loading bundled assets
//!
//! Assets are looked up next to the working directory first (running from a
//! checkout) and then in the system data directory (installed package).

use std::path::{Path, PathBuf};

use image::RgbaImage;
use log::info;

use crate::error::{PlayerError, Result};

pub const SYSTEM_DATA_DIR: &str = "/usr/share/vr-video-player";

const ARROW_IMAGE: &str = "images/arrow.png";
const ACTION_MANIFEST: &str = "config/vr_actions.json";
const INSTALLED_ACTION_MANIFEST: &str = "vr_actions.json";

pub fn arrow_image_candidates(base: &Path) -> Vec<PathBuf> {
    vec![base.join(ARROW_IMAGE), Path::new(SYSTEM_DATA_DIR).join(ARROW_IMAGE)]
}

pub fn action_manifest_candidates(base: &Path) -> Vec<PathBuf> {
    vec![
        base.join(ACTION_MANIFEST),
        Path::new(SYSTEM_DATA_DIR).join(INSTALLED_ACTION_MANIFEST),
    ]
}

/// First existing path among `candidates`.
pub fn locate(name: &str, candidates: &[PathBuf]) -> Result<PathBuf> {
    candidates
        .iter()
        .find(|path| path.is_file())
        .cloned()
        .ok_or_else(|| PlayerError::AssetNotFound {
            name: name.to_string(),
            searched: candidates.to_vec(),
        })
}

/// Cursor arrow as RGBA pixels
pub fn load_arrow_image(base: &Path) -> Result<RgbaImage> {
    let path = locate("arrow image", &arrow_image_candidates(base))?;
    let arrow = image::open(&path)?.to_rgba8();
    info!(
        "Loaded arrow image {} ({}x{})",
        path.display(),
        arrow.width(),
        arrow.height()
    );
    Ok(arrow)
}

pub fn action_manifest_path(base: &Path) -> Result<PathBuf> {
    locate("action manifest", &action_manifest_candidates(base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn prefers_local_asset() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::write(dir.path().join(ACTION_MANIFEST), "{}").unwrap();

        let path = action_manifest_path(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("config/vr_actions.json"));
    }

    #[test]
    fn missing_asset_lists_searched_paths() {
        let dir = tempfile::tempdir().unwrap();
        let candidates = vec![dir.path().join("a.png"), dir.path().join("b.png")];
        match locate("arrow image", &candidates) {
            Err(PlayerError::AssetNotFound { name, searched }) => {
                assert_eq!(name, "arrow image");
                assert_eq!(searched, candidates);
            }
            other => panic!("expected AssetNotFound, got {other:?}"),
        }
    }

    #[test]
    fn system_paths_are_searched_second() {
        let base = Path::new("/nonexistent");
        let arrow = arrow_image_candidates(base);
        assert_eq!(arrow[1], Path::new("/usr/share/vr-video-player/images/arrow.png"));
        let manifest = action_manifest_candidates(base);
        assert_eq!(manifest[1], Path::new("/usr/share/vr-video-player/vr_actions.json"));
    }

    #[test]
    fn loads_arrow_as_rgba() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("images")).unwrap();
        let mut arrow = RgbaImage::new(4, 8);
        arrow.put_pixel(1, 2, image::Rgba([255, 255, 255, 255]));
        arrow.save(dir.path().join(ARROW_IMAGE)).unwrap();

        let loaded = load_arrow_image(dir.path()).unwrap();
        assert_eq!(loaded.dimensions(), (4, 8));
        assert_eq!(loaded.get_pixel(1, 2).0, [255, 255, 255, 255]);
        assert_eq!(loaded.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn bundled_arrow_loads() {
        let arrow = load_arrow_image(Path::new(env!("CARGO_MANIFEST_DIR"))).unwrap();
        assert!(arrow.width() > 0 && arrow.height() > 0);
    }

    #[test]
    fn corrupt_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("images")).unwrap();
        fs::write(dir.path().join(ARROW_IMAGE), b"not a png").unwrap();
        assert!(matches!(load_arrow_image(dir.path()), Err(PlayerError::Image(_))));
    }
}
