//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sul filesystem della pipeline.
//!
//! ## Responsabilità:
//! - Discovery dei file candidati in una directory (non ricorsiva, niente symlink)
//! - Lettura di dimensione e modification time
//! - Ripristino dei timestamp originali sul file finale
//! - `HoldingArea`: spostamento dei file superati in una directory di attesa
//! - Formattazione human-readable delle dimensioni (anche negative)
//!
//! ## Holding directory:
//! I file intermedi non vengono mai cancellati definitivamente. Vengono
//! spostati (rename, o copia + rimozione tra filesystem diversi) nella
//! holding directory, creata al primo utilizzo. Nomi già presenti ricevono
//! un suffisso numerico.

use std::fs::{File, FileTimes};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Get size and modification time of a file
    pub async fn get_file_info(path: &Path) -> io::Result<(u64, SystemTime)> {
        let metadata = fs::metadata(path).await?;
        Ok((metadata.len(), metadata.modified()?))
    }

    /// Regular files directly inside `dir` accepted by `is_candidate`, sorted by path.
    ///
    /// Symlinks are skipped, as are subdirectories.
    pub fn find_images<F>(dir: &Path, is_candidate: F) -> io::Result<Vec<PathBuf>>
    where
        F: Fn(&Path) -> bool,
    {
        let mut files = Vec::new();

        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry?;
            if entry.file_type().is_file() && is_candidate(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }

        Ok(files)
    }

    /// Set access and modification time of `path` to `mtime`.
    ///
    /// Works on read-only files as long as the caller owns them.
    pub async fn restore_timestamps(path: &Path, mtime: SystemTime) -> io::Result<()> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let file = open_for_times(&path)?;
            file.set_times(FileTimes::new().set_accessed(mtime).set_modified(mtime))
        })
        .await
        .map_err(io::Error::other)?
    }

    /// Human-readable size with binary units, keeping the sign
    pub fn format_size(size: i64) -> String {
        const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];

        if size < 0 {
            return format!("-{}", Self::format_size(size.saturating_neg()));
        }

        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }
}

#[cfg(not(windows))]
fn open_for_times(path: &Path) -> io::Result<File> {
    File::open(path)
}

// SetFileTime needs FILE_WRITE_ATTRIBUTES, which a plain read handle lacks
#[cfg(windows)]
fn open_for_times(path: &Path) -> io::Result<File> {
    use std::os::windows::fs::OpenOptionsExt;
    const FILE_WRITE_ATTRIBUTES: u32 = 0x0100;
    File::options().access_mode(FILE_WRITE_ATTRIBUTES).open(path)
}

/// Directory that receives superseded intermediate files
#[derive(Debug, Clone)]
pub struct HoldingArea {
    dir: PathBuf,
}

impl HoldingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Move `file` into the holding directory, returning its new location
    pub async fn relocate(&self, file: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;

        let target = self.free_slot(file).await?;
        if let Err(e) = fs::rename(file, &target).await {
            debug!("rename into holding area failed ({}), copying instead", e);
            fs::copy(file, &target).await?;
            fs::remove_file(file).await?;
        }

        debug!("Moved superseded file '{}' -> '{}'", file.display(), target.display());
        Ok(target)
    }

    async fn free_slot(&self, file: &Path) -> io::Result<PathBuf> {
        let name = file.file_name().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("no file name: {}", file.display()))
        })?;

        let mut candidate = self.dir.join(name);
        let mut counter = 1;
        while fs::try_exists(&candidate).await? {
            let mut numbered = name.to_os_string();
            numbered.push(format!(".{}", counter));
            candidate = self.dir.join(numbered);
            counter += 1;
        }
        Ok(candidate)
    }
}
