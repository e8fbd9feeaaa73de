//! Where the objects to upload come from.
//!
//! [`ObjectSource`] is the listing and read capability the upload driver
//! needs; [`StoreSource`] provides it over any `object_store` backend, in
//! practice an S3 bucket or a local directory.

mod error;

pub use error::{Error, Result};

use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;

/// Object content, read as it arrives.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

pub trait ObjectSource: Send + Sync {
    /// Every key in the source, sorted.
    fn list_objects(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn open_object(&self, key: &str) -> impl Future<Output = Result<ByteStream>> + Send;
}

/// Connection settings for an S3 (or S3-compatible) bucket.
///
/// Credentials left unset are taken from the usual `AWS_*` environment
/// variables.
#[derive(Debug, Clone, Default)]
pub struct S3Options {
    pub bucket:            String,
    pub region:            String,
    pub endpoint:          Option<String>,
    pub access_key_id:     Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Clone)]
pub struct StoreSource {
    store: Arc<dyn ObjectStore>,
    name:  String,
}

impl std::fmt::Debug for StoreSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSource")
            .field("name", &self.name)
            .finish()
    }
}

impl StoreSource {
    pub fn new(store: Arc<dyn ObjectStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    pub fn s3(options: &S3Options) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&options.bucket)
            .with_region(&options.region);

        if let Some(endpoint) = &options.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        if let Some(key_id) = &options.access_key_id {
            builder = builder.with_access_key_id(key_id);
        }
        if let Some(secret) = &options.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }

        let store = builder
            .build()
            .map_err(|source| Error::Configure { kind: "s3", source })?;
        Ok(Self::new(Arc::new(store), format!("s3://{}", options.bucket)))
    }

    /// Serve the files under `root` as objects, keyed by relative path.
    pub fn local(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let store = LocalFileSystem::new_with_prefix(root)
            .map_err(|source| Error::Configure { kind: "local", source })?;
        Ok(Self::new(Arc::new(store), root.display().to_string()))
    }

    pub fn name(&self) -> &str { &self.name }
}

impl ObjectSource for StoreSource {
    async fn list_objects(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .store
            .list(None)
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await
            .map_err(|source| Error::List {
                store: self.name.clone(),
                source,
            })?;
        keys.sort();

        tracing::debug!(store = %self.name, objects = keys.len(), "listed source objects");
        Ok(keys)
    }

    async fn open_object(&self, key: &str) -> Result<ByteStream> {
        let path = ObjectPath::parse(key).map_err(|source| Error::InvalidKey {
            key: key.to_string(),
            source,
        })?;
        let object = self.store.get(&path).await.map_err(|source| Error::Open {
            key: key.to_string(),
            source,
        })?;

        Ok(object.into_stream().map_err(io::Error::other).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populated() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        std::fs::write(dir.path().join("zeta.bin"), b"last").unwrap();
        std::fs::write(dir.path().join("alpha.bin"), b"first").unwrap();
        std::fs::write(dir.path().join("nested/deeper/mid.bin"), vec![7u8; 4096]).unwrap();
        dir
    }

    async fn read_all(mut stream: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_local_listing_is_sorted() {
        let dir = populated();
        let source = StoreSource::local(dir.path()).unwrap();

        assert_eq!(
            source.list_objects().await.unwrap(),
            vec!["alpha.bin", "nested/deeper/mid.bin", "zeta.bin"]
        );
    }

    #[tokio::test]
    async fn test_open_streams_content() {
        let dir = populated();
        let source = StoreSource::local(dir.path()).unwrap();

        let content = read_all(source.open_object("nested/deeper/mid.bin").await.unwrap()).await;
        assert_eq!(content, vec![7u8; 4096]);
        assert_eq!(read_all(source.open_object("alpha.bin").await.unwrap()).await, b"first");
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let dir = populated();
        let source = StoreSource::local(dir.path()).unwrap();

        let Err(err) = source.open_object("nope.bin").await else {
            panic!("expected an error opening nope.bin");
        };
        assert!(err.is_not_found(), "got {err:?}");
        assert!(err.to_string().contains("nope.bin"));
    }

    #[test]
    fn test_missing_root_fails_to_configure() {
        let dir = TempDir::new().unwrap();
        let err = StoreSource::local(dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, Error::Configure { kind: "local", .. }));
    }
}
