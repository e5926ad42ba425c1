//! Sequential writer for the `.part` file and its closed, staged form.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Open write handle on a `.part` file. Owned by the orchestrator while bytes
/// are arriving; closing it yields a `StagedFile` handed to the hash worker.
#[derive(Debug)]
pub struct TempFile {
    file: File,
    path: PathBuf,
    written: u64,
}

impl TempFile {
    /// Create the temp file at `path`, truncating anything left by a previous attempt.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(TempFile {
            file,
            path: path.to_path_buf(),
            written: 0,
        })
    }

    /// Append a chunk of the response body.
    pub fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop writing and hand the file over. Durability is left to
    /// `StagedFile::sync`, which the hash worker runs off the event loop.
    pub fn close(mut self) -> io::Result<StagedFile> {
        self.file.flush()?;
        let TempFile { file, path, written } = self;
        Ok(StagedFile {
            file,
            path,
            len: written,
        })
    }

    /// Close and delete the temp file (cancel, transport failure).
    pub fn discard(self) -> io::Result<()> {
        let TempFile { file, path, .. } = self;
        drop(file);
        super::remove_if_exists(&path)
    }
}

/// A fully received `.part` file. Nothing writes to it any more; the handle
/// is kept only to flush it to disk before the rename.
#[derive(Debug)]
pub struct StagedFile {
    file: File,
    path: PathBuf,
    len: u64,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Flush file data and metadata to disk.
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    /// Rename onto `final_path`. Only the hash worker calls this, after verification.
    /// Fails if `final_path` is on a different filesystem.
    pub(crate) fn commit(self, final_path: &Path) -> io::Result<()> {
        let StagedFile { file, path, .. } = self;
        drop(file);
        std::fs::rename(&path, final_path)
    }

    /// Delete the staged file.
    pub fn discard(self) -> io::Result<()> {
        let StagedFile { file, path, .. } = self;
        drop(file);
        super::remove_if_exists(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::temp_path;

    #[test]
    fn create_append_close_commit() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("output.bin");
        let tp = temp_path(&final_path);

        let mut temp = TempFile::create(&tp).unwrap();
        temp.append(b"hello ").unwrap();
        temp.append(b"world").unwrap();
        assert_eq!(temp.written(), 11);
        assert!(!final_path.exists());

        let staged = temp.close().unwrap();
        assert_eq!(staged.len(), 11);
        staged.sync().unwrap();
        staged.commit(&final_path).unwrap();

        assert!(!tp.exists());
        assert_eq!(std::fs::read(&final_path).unwrap(), b"hello world");
    }

    #[test]
    fn create_truncates_previous_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let tp = dir.path().join("model.bin.part");
        std::fs::write(&tp, b"stale bytes from an earlier attempt").unwrap();

        let mut temp = TempFile::create(&tp).unwrap();
        temp.append(b"new").unwrap();
        let staged = temp.close().unwrap();
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"new");
    }

    #[test]
    fn discard_removes_temp() {
        let dir = tempfile::tempdir().unwrap();
        let tp = dir.path().join("partial.bin.part");
        let mut temp = TempFile::create(&tp).unwrap();
        temp.append(b"partial").unwrap();
        temp.discard().unwrap();
        assert!(!tp.exists());

        let temp = TempFile::create(&tp).unwrap();
        let staged = temp.close().unwrap();
        assert!(staged.is_empty());
        staged.discard().unwrap();
        assert!(!tp.exists());
    }
}
