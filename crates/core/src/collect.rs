use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub scanned_files: usize,
    pub skipped_extension: usize,
    pub skipped_duplicate: usize,
}

/// Expands files and directories into photo paths, in input order.
///
/// Directories are walked recursively in file-name order. Every path is
/// canonicalized, and paths for which `exclude` returns true (or that were
/// already produced) are dropped.
pub fn collect_photo_paths<F>(
    inputs: &[PathBuf],
    exclude: F,
    stats: &mut CollectStats,
) -> Result<Vec<PathBuf>>
where
    F: Fn(&Path) -> bool,
{
    let mut out = Vec::new();
    let mut seen = HashSet::<PathBuf>::new();

    let mut accept = |path: &Path, stats: &mut CollectStats| -> Result<()> {
        stats.scanned_files += 1;
        if !is_photo(path) {
            stats.skipped_extension += 1;
            return Ok(());
        }
        let canonical = safe_canonicalize(path)
            .with_context(|| format!("パスの正規化に失敗しました: {}", path.display()))?;
        if exclude(&canonical) || !seen.insert(canonical.clone()) {
            stats.skipped_duplicate += 1;
            return Ok(());
        }
        out.push(canonical);
        Ok(())
    };

    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input).sort_by_file_name() {
                let entry = entry
                    .with_context(|| format!("フォルダ走査に失敗しました: {}", input.display()))?;
                if entry.file_type().is_file() {
                    accept(entry.path(), stats)?;
                }
            }
        } else if input.is_file() {
            accept(input, stats)?;
        } else {
            anyhow::bail!("入力パスが存在しません: {}", input.display());
        }
    }

    Ok(out)
}

pub fn is_photo(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy();
            PHOTO_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

/// `canonicalize()` without the Windows `\\?\` prefix.
pub fn safe_canonicalize(path: &Path) -> std::io::Result<PathBuf> {
    let canonical = path.canonicalize()?;
    Ok(strip_verbatim(canonical))
}

#[cfg(windows)]
fn strip_verbatim(path: PathBuf) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(stripped) = s.strip_prefix(r"\\?\") {
        PathBuf::from(stripped)
    } else {
        path
    }
}

#[cfg(not(windows))]
fn strip_verbatim(path: PathBuf) -> PathBuf {
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn is_photo_matches_extensions_case_insensitively() {
        assert!(is_photo(Path::new("a.jpg")));
        assert!(is_photo(Path::new("a.JPEG")));
        assert!(is_photo(Path::new("a.JpG")));
        assert!(!is_photo(Path::new("a.png")));
        assert!(!is_photo(Path::new("jpg")));
    }

    #[test]
    fn walks_directories_recursively_and_filters_extensions() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("card");
        fs::create_dir_all(root.join("nested")).expect("mkdir");
        fs::write(root.join("b.JPG"), b"x").expect("write");
        fs::write(root.join("a.jpeg"), b"x").expect("write");
        fs::write(root.join("notes.txt"), b"x").expect("write");
        fs::write(root.join("nested").join("c.jpg"), b"x").expect("write");

        let mut stats = CollectStats::default();
        let files = collect_photo_paths(&[root.clone()], |_| false, &mut stats).expect("collect");
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().expect("name").to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jpeg", "b.JPG", "c.jpg"]);
        assert_eq!(stats.scanned_files, 4);
        assert_eq!(stats.skipped_extension, 1);
        assert!(files.iter().all(|p| p.is_absolute()));
    }

    #[test]
    fn drops_excluded_and_repeated_paths() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("card");
        fs::create_dir_all(&root).expect("mkdir");
        let a = root.join("a.jpg");
        let b = root.join("b.jpg");
        fs::write(&a, b"x").expect("write");
        fs::write(&b, b"x").expect("write");
        let excluded = safe_canonicalize(&b).expect("canonical");

        let mut stats = CollectStats::default();
        let files = collect_photo_paths(
            &[a.clone(), root.clone()],
            |p| p == excluded.as_path(),
            &mut stats,
        )
        .expect("collect");
        assert_eq!(files, vec![safe_canonicalize(&a).expect("canonical")]);
        assert_eq!(stats.skipped_duplicate, 2);
    }

    #[test]
    fn missing_input_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let mut stats = CollectStats::default();
        let err = collect_photo_paths(&[temp.path().join("nope")], |_| false, &mut stats)
            .expect_err("missing input");
        assert!(err.to_string().contains("入力パスが存在しません"));
    }
}
