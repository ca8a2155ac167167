//! Directory enumeration and the experiment/folder layout rules.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::domain::FileEntry;
use crate::error::{Result, SpoolError};

/// Every non-directory under `root` with its size, in a stable order
/// (file name order at each level). Symlinks are members, not followed.
pub fn scan_directory(root: &Path) -> impl Iterator<Item = Result<FileEntry>> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| match e {
            Ok(e) if e.file_type().is_dir() => None,
            Ok(e) => Some(
                e.metadata()
                    .map(|md| FileEntry::new(e.path(), md.len()))
                    .map_err(SpoolError::from),
            ),
            Err(e) => Some(Err(SpoolError::from(e))),
        })
}

/// Experiment directories are named like `20240131-C2`.
pub fn is_experiment_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| name.starts_with("20") && name.contains("-C"))
        .unwrap_or(false)
}

/// Immediate real subdirectories (symlinks excluded), by name.
fn subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for e in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let e = e?;
        if e.file_type().is_dir() {
            out.push(e.path().to_path_buf());
        }
    }
    Ok(out)
}

/// Resolve a directory argument (relative to `base_dir`) into the folders
/// that each get their own archives and transcript. Returned paths are
/// relative to `base_dir`.
pub fn archival_units(base_dir: &Path, arg: &Path) -> Result<Vec<PathBuf>> {
    if arg.is_absolute() {
        return Err(SpoolError::planning(
            arg,
            "absolute directory paths are not supported; give a path relative to the base directory",
        ));
    }
    let full = base_dir.join(arg);
    if !full.is_dir() {
        return Err(SpoolError::planning(arg, "not a directory"));
    }
    if !is_experiment_dir(arg) {
        return Ok(vec![arg.to_path_buf()]);
    }

    let mut units = Vec::new();
    for sample in subdirs(&full)? {
        tracing::info!(sample = %sample.display(), "found sample folder");
        for folder in subdirs(&sample)? {
            let rel = folder
                .strip_prefix(base_dir)
                .map(Path::to_path_buf)
                .unwrap_or(folder);
            units.push(rel);
        }
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scan_is_sorted_and_skips_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("raw");
        fs::create_dir_all(root.join("b")).unwrap();
        fs::write(root.join("c.bin"), vec![0u8; 3]).unwrap();
        fs::write(root.join("a.bin"), vec![0u8; 5]).unwrap();
        fs::write(root.join("b/x"), vec![0u8; 7]).unwrap();
        fs::write(root.join(".hidden"), b"h").unwrap();

        let got: Vec<_> = scan_directory(&root)
            .map(|r| r.unwrap())
            .map(|e| (e.path.strip_prefix(&root).unwrap().to_path_buf(), e.size))
            .collect();
        assert_eq!(
            got,
            vec![
                (PathBuf::from(".hidden"), 1),
                (PathBuf::from("a.bin"), 5),
                (PathBuf::from("b/x"), 7),
                (PathBuf::from("c.bin"), 3),
            ]
        );
    }

    #[test]
    fn experiment_names() {
        assert!(is_experiment_dir(Path::new("exp/20240131-C2")));
        assert!(!is_experiment_dir(Path::new("exp/2024-sample")));
        assert!(!is_experiment_dir(Path::new("projects/C-20")));
    }

    #[test]
    fn experiment_expands_to_sample_folders() {
        let tmp = tempfile::tempdir().unwrap();
        let exp = tmp.path().join("20240131-C2");
        fs::create_dir_all(exp.join("s1/raw")).unwrap();
        fs::create_dir_all(exp.join("s1/motion")).unwrap();
        fs::create_dir_all(exp.join("s2/raw")).unwrap();
        fs::write(exp.join("notes.txt"), b"n").unwrap();

        let units = archival_units(tmp.path(), Path::new("20240131-C2")).unwrap();
        assert_eq!(
            units,
            vec![
                PathBuf::from("20240131-C2/s1/motion"),
                PathBuf::from("20240131-C2/s1/raw"),
                PathBuf::from("20240131-C2/s2/raw"),
            ]
        );
    }

    #[test]
    fn plain_folder_is_one_unit() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("proj/raw")).unwrap();
        let units = archival_units(tmp.path(), Path::new("proj/raw")).unwrap();
        assert_eq!(units, vec![PathBuf::from("proj/raw")]);
    }

    #[test]
    fn absolute_and_missing_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            archival_units(tmp.path(), tmp.path()),
            Err(SpoolError::Planning { .. })
        ));
        assert!(matches!(
            archival_units(tmp.path(), Path::new("nope")),
            Err(SpoolError::Planning { .. })
        ));
    }
}
