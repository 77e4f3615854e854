use super::error::StorageError;
use super::sink::{check_range, ByteSink};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

fn validate_file_path(file_path: &Path) -> Result<(), StorageError> {
    for component in file_path.components() {
        match component {
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::PathTraversal(file_path.display().to_string()));
            }
            _ => {}
        }
    }
    Ok(())
}

/// One file holding the whole transfer.
///
/// The file is sized to the full length on creation; on filesystems that
/// support it the unwritten ranges stay sparse.
pub struct FileSink {
    path: PathBuf,
    length: u64,
    file: Mutex<File>,
}

impl FileSink {
    /// Opens or creates `path` and sets its length. Existing content is kept.
    pub async fn create(path: impl AsRef<Path>, length: u64) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .await?;
        file.set_len(length).await?;

        tracing::debug!(path = %path.display(), length, "preallocated sink file");

        Ok(Self {
            path,
            length,
            file: Mutex::new(file),
        })
    }

    /// Like [`create`](Self::create) for `dir/name`, where `name` comes from
    /// a descriptor and must stay inside `dir`.
    pub async fn in_dir(
        dir: impl AsRef<Path>,
        name: impl AsRef<Path>,
        length: u64,
    ) -> Result<Self, StorageError> {
        let name = name.as_ref();
        validate_file_path(name)?;
        Self::create(dir.as_ref().join(name), length).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub async fn flush(&self) -> Result<(), StorageError> {
        let mut file = self.file.lock().await;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }
}

#[async_trait]
impl ByteSink for FileSink {
    async fn write_at(&self, offset: u64, data: Bytes) -> Result<(), StorageError> {
        check_range(offset, data.len() as u64, self.length)?;

        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_at(&self, offset: u64, length: usize) -> Result<Bytes, StorageError> {
        check_range(offset, length as u64, self.length)?;

        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; length];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}
