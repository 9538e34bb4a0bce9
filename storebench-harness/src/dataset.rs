//! Discovery and sampling of the sample files a benchmark run transfers.
//!
//! A dataset root contains one folder per [`FileCategory`]:
//!
//! ```text
//! datasets/
//! ├── small/
//! ├── medium/
//! └── large/
//! ```
//!
//! Missing category folders are treated as empty. Only regular files directly inside a category
//! folder are part of the dataset.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// A dataset partition by file size tier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Small,
    Medium,
    Large,
}

impl FileCategory {
    /// All categories, in the order they are benchmarked.
    pub const ALL: [Self; 3] = [Self::Small, Self::Medium, Self::Large];

    /// The folder name and the value written into result rows.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single sample file.
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

impl DatasetFile {
    /// The lower-cased extension including the leading dot, or an empty string.
    ///
    /// Dot files like `.hidden` have no extension.
    pub fn extension(&self) -> String {
        Path::new(&self.name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .unwrap_or_default()
    }
}

/// The order in which files of a category are sampled.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleOrder {
    /// The order the filesystem lists the directory in. Not stable across filesystems.
    #[default]
    Listing,
    /// Ascending by file name.
    Name,
    /// Ascending by size, ties broken by name.
    Size,
}

/// Which files of each category are benchmarked.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Sampling {
    /// The maximum number of files taken from every category.
    pub files_per_category: usize,
    pub order: SampleOrder,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            files_per_category: 3,
            order: SampleOrder::Listing,
        }
    }
}

/// All sample files found below a dataset root, grouped by category.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    categories: Vec<(FileCategory, Vec<DatasetFile>)>,
}

impl Dataset {
    /// Scans the dataset root.
    ///
    /// Fails if the root itself does not exist, since that almost certainly means a wrong working
    /// directory or configuration.
    pub fn scan(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            bail!(
                "dataset folder `{}` not found; create it with `small/`, `medium/` and `large/` subfolders",
                root.display()
            );
        }

        let mut categories = Vec::with_capacity(FileCategory::ALL.len());
        for category in FileCategory::ALL {
            let dir = root.join(category.as_str());
            let files = if dir.is_dir() {
                scan_category(&dir)
                    .with_context(|| format!("failed to scan `{}`", dir.display()))?
            } else {
                Vec::new()
            };
            categories.push((category, files));
        }

        Ok(Self { categories })
    }

    /// Returns all files of a category in listing order.
    pub fn files(&self, category: FileCategory) -> &[DatasetFile] {
        self.categories
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, files)| files.as_slice())
            .unwrap_or_default()
    }

    /// Returns the number of files per category, in benchmark order.
    pub fn counts(&self) -> impl Iterator<Item = (FileCategory, usize)> + '_ {
        self.categories
            .iter()
            .map(|(category, files)| (*category, files.len()))
    }

    /// Applies the sampling policy, returning the files to benchmark per category.
    ///
    /// Categories without files are included with an empty list.
    pub fn sample(&self, sampling: &Sampling) -> Vec<(FileCategory, Vec<&DatasetFile>)> {
        self.categories
            .iter()
            .map(|(category, files)| {
                let mut files: Vec<_> = files.iter().collect();
                match sampling.order {
                    SampleOrder::Listing => {}
                    SampleOrder::Name => files.sort_by(|a, b| a.name.cmp(&b.name)),
                    SampleOrder::Size => {
                        files.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| a.name.cmp(&b.name)))
                    }
                }
                files.truncate(sampling.files_per_category);
                (*category, files)
            })
            .collect()
    }
}

fn scan_category(dir: &Path) -> Result<Vec<DatasetFile>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = match fs::metadata(entry.path()) {
            Ok(metadata) => metadata,
            Err(error) => {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    path = %entry.path().display(),
                    "skipping unreadable dataset entry"
                );
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        files.push(DatasetFile {
            path: entry.path(),
            name: entry.file_name().to_string_lossy().into_owned(),
            size: metadata.len(),
        });
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, len: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![b'x'; len]).unwrap();
    }

    #[test]
    fn scans_categories_and_skips_directories() {
        let root = tempfile::tempdir().unwrap();
        write(&root.path().join("small/a.txt"), 10);
        write(&root.path().join("small/b.JPG"), 20);
        fs::create_dir_all(root.path().join("small/nested")).unwrap();
        write(&root.path().join("large/movie.mkv"), 30);
        write(&root.path().join("unrelated/c.txt"), 1);

        let dataset = Dataset::scan(root.path()).unwrap();

        let counts: Vec<_> = dataset.counts().collect();
        assert_eq!(
            counts,
            [
                (FileCategory::Small, 2),
                (FileCategory::Medium, 0),
                (FileCategory::Large, 1)
            ]
        );
        assert_eq!(dataset.files(FileCategory::Large)[0].size, 30);
    }

    #[cfg(unix)]
    #[test]
    fn skips_dangling_symlinks() {
        let root = tempfile::tempdir().unwrap();
        let small = root.path().join("small");
        write(&small.join("a.txt"), 10);
        std::os::unix::fs::symlink(small.join("gone.bin"), small.join("link.bin")).unwrap();

        let dataset = Dataset::scan(root.path()).unwrap();

        let names: Vec<_> = dataset
            .files(FileCategory::Small)
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, ["a.txt"]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let err = Dataset::scan(&root.path().join("datasets")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn samples_by_name_and_size() {
        let root = tempfile::tempdir().unwrap();
        for (name, len) in [("d.bin", 1), ("a.bin", 4), ("c.bin", 2), ("b.bin", 3)] {
            write(&root.path().join("medium").join(name), len);
        }
        let dataset = Dataset::scan(root.path()).unwrap();

        let names = |order| {
            let sampling = Sampling {
                files_per_category: 3,
                order,
            };
            let sampled = dataset.sample(&sampling);
            sampled[1]
                .1
                .iter()
                .map(|f| f.name.clone())
                .collect::<Vec<_>>()
        };

        assert_eq!(names(SampleOrder::Name), ["a.bin", "b.bin", "c.bin"]);
        assert_eq!(names(SampleOrder::Size), ["d.bin", "c.bin", "b.bin"]);
        assert_eq!(names(SampleOrder::Listing).len(), 3);
    }

    #[test]
    fn extensions_follow_splitext() {
        let file = |name: &str| DatasetFile {
            path: PathBuf::from(name),
            name: name.into(),
            size: 0,
        };

        assert_eq!(file("Photo.JPG").extension(), ".jpg");
        assert_eq!(file("archive.tar.gz").extension(), ".gz");
        assert_eq!(file(".hidden").extension(), "");
        assert_eq!(file("README").extension(), "");
    }
}
