use std::path::PathBuf;

use walkdir::WalkDir;

/// Returns all vdex files reachable from `paths`.
///
/// Directories are walked one level deep, non-recursive; plain file arguments
/// are taken as-is.
pub(crate) fn collect_vdex_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path)
                .max_depth(1)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.path().is_file())
                .filter(|e| {
                    e.path()
                        .extension()
                        .and_then(|s| s.to_str())
                        .map(|ext| ext.eq_ignore_ascii_case("vdex"))
                        .unwrap_or(false)
                })
            {
                files.push(entry.path().to_path_buf());
            }
        } else if path.is_file() {
            files.push(path.clone());
        }
    }

    files.sort();
    files
}
