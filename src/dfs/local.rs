use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::dfs::{Dfs, FileStat};
use crate::error::Result;
use crate::errinput;
use crate::flock::FileLock;
use crate::Error;

/// [`Dfs`] implementation over the local filesystem.
///
/// Holds an exclusive advisory lock on `<root>/LOCK` for its whole lifetime,
/// so two processes cannot own the same store root.
pub struct LocalDfs {
    root: PathBuf,
    _lock: FileLock,
}

impl LocalDfs {
    /// Opens a store root, creating it if missing, and acquires its lock.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let lock = FileLock::lock(root.join("LOCK"))
            .map_err(|e| Error::IO(format!("locking store root {}: {e}", root.display())))?;
        Ok(Self { root, _lock: lock })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn sync(file: &File, path: &Path) -> Result<()> {
        file.sync_all()
            .map_err(|e| Error::IO(format!("syncing {}: {e}", path.display())))
    }
}

impl Dfs for LocalDfs {
    fn create(&self, path: &Path, init_size: u64) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| Error::IO(format!("creating {}: {e}", path.display())))?;
        if init_size > 0 {
            file.write_all(&vec![0u8; init_size as usize])?;
        }
        Self::sync(&file, path)
    }

    fn read_all(&self, path: &Path) -> Result<Vec<u8>> {
        let mut file = File::open(path)
            .map_err(|e| Error::IO(format!("opening {}: {e}", path.display())))?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        Ok(content)
    }

    fn append(&self, path: &Path, data: &[u8]) -> Result<()> {
        let stat = self.stat(path)?;
        if stat.is_dir {
            return errinput!("cannot append to directory {}", path.display());
        }
        let mut file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| Error::IO(format!("opening {}: {e}", path.display())))?;
        file.write_all(data)?;
        Self::sync(&file, path)
    }

    fn overwrite_all(&self, path: &Path, data: &[u8]) -> Result<()> {
        let stat = self.stat(path)?;
        if stat.is_dir {
            return errinput!("cannot write to directory {}", path.display());
        }
        let mut file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| Error::IO(format!("opening {}: {e}", path.display())))?;
        if stat.size > data.len() as u64 {
            file.set_len(data.len() as u64)?;
        }
        file.seek(SeekFrom::Start(0))?;
        file.write_all(data)?;
        Self::sync(&file, path)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path)
            .map_err(|e| Error::IO(format!("removing {}: {e}", path.display())))
    }

    fn mkdir(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)
            .map_err(|e| Error::IO(format!("creating directory {}: {e}", path.display())))
    }

    fn list_sorted(&self, path: &Path) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(path)
            .map_err(|e| Error::IO(format!("listing {}: {e}", path.display())))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn stat(&self, path: &Path) -> Result<FileStat> {
        let meta = std::fs::metadata(path)
            .map_err(|e| Error::IO(format!("stat {}: {e}", path.display())))?;
        Ok(FileStat {
            size: meta.len(),
            is_dir: meta.is_dir(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_dfs(dir: &TempDir) -> LocalDfs {
        LocalDfs::open(dir.path().join("store")).expect("Failed to open store root")
    }

    #[test]
    fn test_create_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let dfs = open_dfs(&dir);
        let path = dfs.root().join("1");

        dfs.create(&path, 0).expect("First create should succeed");
        assert!(dfs.create(&path, 0).is_err(), "Second create must fail");
    }

    #[test]
    fn test_create_with_init_size() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let dfs = open_dfs(&dir);
        let path = dfs.root().join("zeroed");

        dfs.create(&path, 16)?;
        assert_eq!(dfs.stat(&path)?.size, 16);
        assert_eq!(dfs.read_all(&path)?, vec![0u8; 16]);
        Ok(())
    }

    #[test]
    fn test_append_and_read_all() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let dfs = open_dfs(&dir);
        let path = dfs.root().join("log");

        dfs.create(&path, 0)?;
        dfs.append(&path, b"first\n")?;
        dfs.append(&path, b"second\n")?;
        assert_eq!(dfs.read_all(&path)?, b"first\nsecond\n");
        Ok(())
    }

    #[test]
    fn test_overwrite_truncates_shorter_content() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let dfs = open_dfs(&dir);
        let path = dfs.root().join("chk");

        dfs.create(&path, 0)?;
        dfs.overwrite_all(&path, b"a very long first version")?;
        dfs.overwrite_all(&path, b"short")?;
        assert_eq!(dfs.read_all(&path)?, b"short");
        Ok(())
    }

    #[test]
    fn test_append_to_directory_fails() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let dfs = open_dfs(&dir);
        let path = dfs.root().join("subdir");

        dfs.mkdir(&path)?;
        assert!(matches!(
            dfs.append(&path, b"data"),
            Err(Error::InvalidInput(_))
        ));
        Ok(())
    }

    #[test]
    fn test_list_sorted_is_lexicographic() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let dfs = open_dfs(&dir);
        let sub = dfs.root().join("logs");
        dfs.mkdir(&sub)?;

        for name in ["2", "10", "1"] {
            dfs.create(&sub.join(name), 0)?;
        }

        // Unpadded decimal names sort lexicographically, not numerically.
        assert_eq!(dfs.list_sorted(&sub)?, vec!["1", "10", "2"]);
        Ok(())
    }

    #[test]
    fn test_stat() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let dfs = open_dfs(&dir);
        let file = dfs.root().join("f");
        let sub = dfs.root().join("d");

        dfs.create(&file, 0)?;
        dfs.append(&file, b"1234")?;
        dfs.mkdir(&sub)?;

        assert_eq!(dfs.stat(&file)?, FileStat { size: 4, is_dir: false });
        assert!(dfs.stat(&sub)?.is_dir);
        assert!(dfs.stat(&dfs.root().join("missing")).is_err());
        Ok(())
    }

    #[test]
    fn test_remove() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let dfs = open_dfs(&dir);
        let path = dfs.root().join("gone");

        dfs.create(&path, 0)?;
        dfs.remove(&path)?;
        assert!(dfs.stat(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_root_is_locked() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("store");
        let _dfs = LocalDfs::open(&root).expect("First open should succeed");
        assert!(
            LocalDfs::open(&root).is_err(),
            "Second open of the same root must fail while the lock is held"
        );
    }
}
