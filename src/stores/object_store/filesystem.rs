// docvault-core/src/stores/object_store/filesystem.rs
// Disk-backed ObjectStorePort: each ObjectPath maps to a file under a
// configured root, with a sidecar `.sha256` file holding the content hash
// computed while the upload was written, so `exists_with_hash` and the
// idempotent move operations never re-read the object body to check it.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::ports::object_store::{ByteStream, ObjectPath, ObjectStorePort};

pub struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn check_tenant_prefix(tenant_id: Uuid, path: &ObjectPath) -> CoreResult<()> {
        match path.tenant_prefix() {
            Some(prefix) if prefix == tenant_id.to_string() => Ok(()),
            _ => Err(CoreError::forbidden("object key does not belong to the requesting tenant")),
        }
    }

    /// Resolves an `ObjectPath` to a file under `root`, rejecting any key
    /// whose components could escape it.
    fn resolve(&self, path: &ObjectPath) -> CoreResult<PathBuf> {
        let rel = Path::new(&path.0);
        if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(CoreError::validation("object key contains an invalid path component"));
        }
        Ok(self.root.join(rel))
    }

    fn hash_sidecar(content_path: &Path) -> PathBuf {
        let mut sidecar = content_path.as_os_str().to_owned();
        sidecar.push(".sha256");
        PathBuf::from(sidecar)
    }

    async fn read_hash(content_path: &Path) -> Option<String> {
        fs::read_to_string(Self::hash_sidecar(content_path)).await.ok().map(|s| s.trim().to_string())
    }

    async fn write_file(dest: &Path, mut stream: ByteStream) -> CoreResult<String> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(dest).await?;
        let mut hasher = Sha256::new();
        while let Some(chunk) = stream.next().await {
            let chunk: Bytes = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        let digest = hex::encode(hasher.finalize());
        fs::write(Self::hash_sidecar(dest), &digest).await?;
        Ok(digest)
    }

    async fn move_file(&self, src: &ObjectPath, dest: &ObjectPath, expected_hash: &str) -> CoreResult<ObjectPath> {
        let src_path = self.resolve(src)?;
        let dest_path = self.resolve(dest)?;

        if let Some(existing) = Self::read_hash(&dest_path).await {
            if existing == expected_hash {
                return Ok(dest.clone());
            }
        }

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&src_path, &dest_path).await?;
        fs::rename(Self::hash_sidecar(&src_path), Self::hash_sidecar(&dest_path)).await?;
        Ok(dest.clone())
    }
}

#[async_trait]
impl ObjectStorePort for FilesystemObjectStore {
    async fn put_temporary(
        &self,
        tenant_id: Uuid,
        doc_id: Uuid,
        upload_id: Uuid,
        stream: ByteStream,
        _content_type: &str,
    ) -> CoreResult<ObjectPath> {
        let path = ObjectPath::temp_key(tenant_id, doc_id, upload_id);
        let dest = self.resolve(&path)?;
        Self::write_file(&dest, stream).await?;
        Ok(path)
    }

    async fn move_to_permanent(
        &self,
        temp_path: &ObjectPath,
        tenant_id: Uuid,
        _folder_id: Uuid,
        doc_id: Uuid,
        version_id: Uuid,
        expected_hash: &str,
    ) -> CoreResult<ObjectPath> {
        Self::check_tenant_prefix(tenant_id, temp_path)?;
        let dest = ObjectPath::permanent_key(tenant_id, doc_id, version_id);
        self.move_file(temp_path, &dest, expected_hash).await
    }

    async fn move_to_quarantine(
        &self,
        path: &ObjectPath,
        tenant_id: Uuid,
        doc_id: Uuid,
        version_id: Uuid,
        expected_hash: &str,
    ) -> CoreResult<ObjectPath> {
        Self::check_tenant_prefix(tenant_id, path)?;
        let dest = ObjectPath::quarantine_key(tenant_id, doc_id, version_id);
        self.move_file(path, &dest, expected_hash).await
    }

    async fn get(&self, tenant_id: Uuid, path: &ObjectPath) -> CoreResult<ByteStream> {
        Self::check_tenant_prefix(tenant_id, path)?;
        let file_path = self.resolve(path)?;
        let file = fs::File::open(&file_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::NotFound
            } else {
                CoreError::from(e)
            }
        })?;
        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn delete(&self, tenant_id: Uuid, path: &ObjectPath) -> CoreResult<()> {
        Self::check_tenant_prefix(tenant_id, path)?;
        let file_path = self.resolve(path)?;
        let _ = fs::remove_file(&file_path).await;
        let _ = fs::remove_file(Self::hash_sidecar(&file_path)).await;
        Ok(())
    }

    async fn exists_with_hash(&self, tenant_id: Uuid, path: &ObjectPath, expected_hash: &str) -> CoreResult<bool> {
        Self::check_tenant_prefix(tenant_id, path)?;
        let file_path = self.resolve(path)?;
        Ok(Self::read_hash(&file_path).await.is_some_and(|h| h == expected_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn body(bytes: &'static [u8]) -> ByteStream {
        Box::pin(stream::once(async move { Ok(Bytes::from_static(bytes)) }))
    }

    #[tokio::test]
    async fn put_then_get_round_trips_bytes() {
        let dir = tempfile_dir();
        let store = FilesystemObjectStore::new(&dir);
        let tenant = Uuid::new_v4();
        let (doc, upload) = (Uuid::new_v4(), Uuid::new_v4());

        let path = store.put_temporary(tenant, doc, upload, body(b"hello"), "text/plain").await.unwrap();
        let mut stream = store.get(tenant, &path).await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"hello");
    }

    #[tokio::test]
    async fn get_rejects_foreign_tenant_prefix() {
        let dir = tempfile_dir();
        let store = FilesystemObjectStore::new(&dir);
        let tenant = Uuid::new_v4();
        let other_tenant = Uuid::new_v4();
        let path = store.put_temporary(tenant, Uuid::new_v4(), Uuid::new_v4(), body(b"x"), "text/plain").await.unwrap();
        let result = store.get(other_tenant, &path).await;
        assert!(matches!(result, Err(CoreError::Forbidden(_))));
    }

    #[tokio::test]
    async fn move_to_permanent_is_idempotent_on_matching_hash() {
        let dir = tempfile_dir();
        let store = FilesystemObjectStore::new(&dir);
        let tenant = Uuid::new_v4();
        let (doc, version, upload) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let temp_path = store.put_temporary(tenant, doc, upload, body(b"hello"), "text/plain").await.unwrap();
        let expected_hash = hex::encode(Sha256::digest(b"hello"));

        let first = store.move_to_permanent(&temp_path, tenant, Uuid::new_v4(), doc, version, &expected_hash).await.unwrap();
        let second = store.move_to_permanent(&temp_path, tenant, Uuid::new_v4(), doc, version, &expected_hash).await.unwrap();
        assert_eq!(first, second);
    }

    fn tempfile_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("docvault-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
