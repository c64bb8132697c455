use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::PathBuf;

use tempfile::TempDir;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Directory under the root holding uploads in flight. Not a UUID, so it can
/// never be addressed as an asset.
const STAGING_DIR: &str = ".staging";

/// One of the blobs stored for an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Video,
    Thumb,
    Meta,
    Extra(i32),
}

impl Artifact {
    /// The file name inside the asset directory.
    pub fn file_name(&self) -> String {
        match self {
            Artifact::Video => "video".to_string(),
            Artifact::Thumb => "thumb".to_string(),
            Artifact::Meta => "meta".to_string(),
            Artifact::Extra(index) => format!("extra{}", index),
        }
    }

    /// The inverse of [`Artifact::file_name`].
    pub fn from_file_name(name: &str) -> Option<Self> {
        match name {
            "video" => Some(Artifact::Video),
            "thumb" => Some(Artifact::Thumb),
            "meta" => Some(Artifact::Meta),
            _ => {
                let digits = name.strip_prefix("extra")?;
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                digits.parse().ok().map(Artifact::Extra)
            }
        }
    }
}

/// An upload being received, kept outside every asset directory until it is
/// published.
///
/// The directory and whatever is still in it are removed on drop.
#[derive(Debug)]
pub struct Staging {
    dir: TempDir,
    files: Vec<(Artifact, u64)>,
}

impl Staging {
    fn staged_path(&self, artifact: Artifact) -> PathBuf {
        self.dir.path().join(artifact.file_name())
    }

    /// Streams `reader` into the staged copy of `artifact`.
    ///
    /// Each artifact can be staged once per upload; a second copy is a
    /// validation error.
    ///
    /// # Returns
    ///
    /// The number of bytes written.
    pub async fn write_stream<R>(&mut self, artifact: Artifact, reader: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if self.size_of(artifact).is_some() {
            return Err(AppError::Validation(format!(
                "Duplicate {} field",
                artifact.file_name()
            )));
        }

        let mut file = File::create(self.staged_path(artifact)).await?;
        let written = tokio::io::copy(reader, &mut file).await?;
        file.flush().await?;

        self.files.push((artifact, written));
        tracing::debug!("📦 Staged {} ({} bytes)", artifact.file_name(), written);
        Ok(written)
    }

    /// Stages an in-memory payload.
    pub async fn write(&mut self, artifact: Artifact, data: &[u8]) -> Result<u64> {
        let mut reader = data;
        self.write_stream(artifact, &mut reader).await
    }

    /// Reads at most `limit` bytes from the start of a staged artifact.
    pub async fn read_head(&self, artifact: Artifact, limit: u64) -> Result<Option<Vec<u8>>> {
        if self.size_of(artifact).is_none() {
            return Ok(None);
        }
        let file = File::open(self.staged_path(artifact)).await?;
        let mut head = Vec::new();
        file.take(limit).read_to_end(&mut head).await?;
        Ok(Some(head))
    }

    /// The staged size of `artifact`, if it was uploaded.
    pub fn size_of(&self, artifact: Artifact) -> Option<u64> {
        self.files
            .iter()
            .find(|(staged, _)| *staged == artifact)
            .map(|(_, size)| *size)
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|(_, size)| size).sum()
    }

    pub fn artifacts(&self) -> impl Iterator<Item = Artifact> + '_ {
        self.files.iter().map(|(artifact, _)| *artifact)
    }
}

/// Blob storage with one directory per asset under a common root.
///
/// Directory names are always formatted UUIDs, so request input never reaches
/// the filesystem as a path component.
#[derive(Debug, Clone)]
pub struct AssetStorage {
    root: PathBuf,
}

impl AssetStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn asset_dir(&self, id: Uuid) -> PathBuf {
        self.root.join(id.to_string())
    }

    pub fn path(&self, id: Uuid, artifact: Artifact) -> PathBuf {
        self.asset_dir(id).join(artifact.file_name())
    }

    /// Writes an artifact, replacing any previous content.
    ///
    /// # Returns
    ///
    /// The number of bytes written.
    pub async fn write(&self, id: Uuid, artifact: Artifact, data: &[u8]) -> Result<u64> {
        fs::create_dir_all(self.asset_dir(id)).await?;
        let path = self.path(id, artifact);
        fs::write(&path, data).await.map_err(|e| {
            tracing::error!("Failed to write {}: {}", path.display(), e);
            e
        })?;
        tracing::debug!("💾 Stored {} for {} ({} bytes)", artifact.file_name(), id, data.len());
        Ok(data.len() as u64)
    }

    /// Opens a staging area for one upload.
    pub async fn stage(&self) -> Result<Staging> {
        let staging_root = self.root.join(STAGING_DIR);
        fs::create_dir_all(&staging_root).await?;
        let dir = tempfile::Builder::new()
            .prefix("upload-")
            .tempdir_in(&staging_root)?;
        Ok(Staging {
            dir,
            files: Vec::new(),
        })
    }

    /// Moves every staged artifact into the asset's directory, replacing files
    /// of the same name.
    ///
    /// Staging sits under the same root, so each move is a single rename.
    pub async fn publish(&self, id: Uuid, staging: &Staging) -> Result<()> {
        fs::create_dir_all(self.asset_dir(id)).await?;
        for artifact in staging.artifacts() {
            let target = self.path(id, artifact);
            fs::rename(staging.staged_path(artifact), &target)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to publish {}: {}", target.display(), e);
                    e
                })?;
        }
        tracing::debug!("💾 Published {} artifacts for {}", staging.files.len(), id);
        Ok(())
    }

    /// Deletes the directory of an asset with everything in it.
    ///
    /// # Returns
    ///
    /// Whether the directory existed.
    pub async fn remove_asset(&self, id: Uuid) -> Result<bool> {
        match fs::remove_dir_all(self.asset_dir(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Opens an artifact for reading.
    ///
    /// # Returns
    ///
    /// The open file and its size. A missing artifact is `AppError::NotFound`.
    pub async fn open(&self, id: Uuid, artifact: Artifact) -> Result<(File, u64)> {
        let path = self.path(id, artifact);
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(AppError::NotFound),
            Err(e) => return Err(e.into()),
        };
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(AppError::NotFound);
        }
        Ok((file, metadata.len()))
    }

    /// Deletes `extra{N}` files whose index is not in `keep`.
    ///
    /// Failures on individual files are logged and skipped.
    ///
    /// # Returns
    ///
    /// The number of files removed.
    pub async fn remove_extras_except(&self, id: Uuid, keep: &[i32]) -> Result<usize> {
        let keep: HashSet<i32> = keep.iter().copied().collect();
        let mut entries = match fs::read_dir(self.asset_dir(id)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(Artifact::Extra(index)) = name.to_str().and_then(Artifact::from_file_name) else {
                continue;
            };
            if keep.contains(&index) {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Could not remove stale extra {} of {}: {}", index, id, e),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_names() {
        assert_eq!(Artifact::Extra(3).file_name(), "extra3");
        assert_eq!(Artifact::from_file_name("extra12"), Some(Artifact::Extra(12)));
        assert_eq!(Artifact::from_file_name("thumb"), Some(Artifact::Thumb));
        assert_eq!(Artifact::from_file_name("extra"), None);
        assert_eq!(Artifact::from_file_name("extra-1"), None);
        assert_eq!(Artifact::from_file_name("extra1.tmp"), None);
    }

    #[tokio::test]
    async fn test_write_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AssetStorage::new(dir.path().to_path_buf());
        let id = Uuid::new_v4();

        let written = storage.write(id, Artifact::Video, b"frames").await.unwrap();
        assert_eq!(written, 6);

        let (mut file, len) = storage.open(id, Artifact::Video).await.unwrap();
        assert_eq!(len, 6);
        let mut content = Vec::new();
        file.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"frames");
    }

    #[tokio::test]
    async fn test_open_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AssetStorage::new(dir.path().to_path_buf());
        let result = storage.open(Uuid::new_v4(), Artifact::Thumb).await;
        assert!(matches!(result, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn test_remove_extras_except() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AssetStorage::new(dir.path().to_path_buf());
        let id = Uuid::new_v4();

        for index in [0, 1, 2] {
            storage.write(id, Artifact::Extra(index), b"x").await.unwrap();
        }
        storage.write(id, Artifact::Video, b"v").await.unwrap();

        let removed = storage.remove_extras_except(id, &[1]).await.unwrap();
        assert_eq!(removed, 2);
        assert!(!storage.path(id, Artifact::Extra(0)).exists());
        assert!(storage.path(id, Artifact::Extra(1)).exists());
        assert!(!storage.path(id, Artifact::Extra(2)).exists());
        assert!(storage.path(id, Artifact::Video).exists());
    }

    #[tokio::test]
    async fn test_staged_upload_is_published() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AssetStorage::new(dir.path().to_path_buf());
        let id = Uuid::new_v4();

        let mut staging = storage.stage().await.unwrap();
        staging.write(Artifact::Video, b"frames").await.unwrap();
        staging.write(Artifact::Meta, b"title: x").await.unwrap();
        assert_eq!(staging.total_bytes(), 14);
        assert_eq!(staging.size_of(Artifact::Thumb), None);
        assert!(!storage.asset_dir(id).exists());

        storage.publish(id, &staging).await.unwrap();
        assert_eq!(std::fs::read(storage.path(id, Artifact::Video)).unwrap(), b"frames");
        assert_eq!(std::fs::read(storage.path(id, Artifact::Meta)).unwrap(), b"title: x");
    }

    #[tokio::test]
    async fn test_staging_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AssetStorage::new(dir.path().to_path_buf());

        let mut staging = storage.stage().await.unwrap();
        staging.write(Artifact::Video, b"abandoned").await.unwrap();
        drop(staging);

        let leftovers = std::fs::read_dir(dir.path().join(STAGING_DIR)).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_staging_rejects_duplicate_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AssetStorage::new(dir.path().to_path_buf());

        let mut staging = storage.stage().await.unwrap();
        staging.write(Artifact::Extra(1), b"a").await.unwrap();
        let again = staging.write(Artifact::Extra(1), b"b").await;
        assert!(matches!(again, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_read_head_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AssetStorage::new(dir.path().to_path_buf());

        let mut staging = storage.stage().await.unwrap();
        staging.write(Artifact::Meta, b"0123456789").await.unwrap();
        assert_eq!(staging.read_head(Artifact::Meta, 4).await.unwrap().unwrap(), b"0123");
        assert!(staging.read_head(Artifact::Thumb, 4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_publish_onto_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AssetStorage::new(dir.path().to_path_buf());
        let id = Uuid::new_v4();
        std::fs::create_dir_all(storage.path(id, Artifact::Video)).unwrap();

        let mut staging = storage.stage().await.unwrap();
        staging.write(Artifact::Video, b"frames").await.unwrap();
        assert!(matches!(storage.publish(id, &staging).await, Err(AppError::Io(_))));
    }

    #[tokio::test]
    async fn test_remove_asset() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AssetStorage::new(dir.path().to_path_buf());
        let id = Uuid::new_v4();
        storage.write(id, Artifact::Video, b"v").await.unwrap();
        storage.write(id, Artifact::Extra(0), b"e").await.unwrap();

        assert!(storage.remove_asset(id).await.unwrap());
        assert!(!storage.asset_dir(id).exists());
        assert!(!storage.remove_asset(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_extras_without_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AssetStorage::new(dir.path().to_path_buf());
        assert_eq!(storage.remove_extras_except(Uuid::new_v4(), &[]).await.unwrap(), 0);
    }
}
