use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;

const PICTURE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff"];

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Pictures in the student's folder under `root`, keyed by lower-cased file stem.
///
/// The folder is matched case-insensitively. A missing root or folder yields an empty map.
pub fn find_student_assets(root: &Path, student: &str) -> BTreeMap<String, PathBuf> {
    let mut assets = BTreeMap::new();
    let Ok(entries) = std::fs::read_dir(root) else {
        debug!("Pictures directory {} is not readable", root.display());
        return assets;
    };
    let Some(folder) = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| same_name(n, student))
        })
    else {
        return assets;
    };

    let Ok(files) = std::fs::read_dir(&folder) else {
        return assets;
    };
    let mut files: Vec<PathBuf> = files
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    for file in files {
        let is_picture = file
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| PICTURE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if !is_picture {
            continue;
        }
        let Some(stem) = file.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        assets.entry(stem.trim().to_lowercase()).or_insert(file);
    }
    debug!("Found {} picture(s) for {student} in {}", assets.len(), folder.display());
    assets
}
