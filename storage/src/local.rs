use camino::{Utf8Path, Utf8PathBuf};
use eyre::WrapErr;
use tokio::io::AsyncWriteExt;
use tracing::Instrument;

use storage_driver::{Driver, Metadata, Reader, StorageError, StorageErrorKind, Writer};

/// Map an io::Error onto the matching storage error kind, keeping the
/// bucket and path context.
fn io_error(
    engine: &'static str,
    bucket: &str,
    remote: &Utf8Path,
    err: std::io::Error,
) -> StorageError {
    let kind = match err.kind() {
        std::io::ErrorKind::NotFound => StorageErrorKind::NotFound,
        std::io::ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
        _ => StorageErrorKind::Io,
    };
    StorageError::builder(engine, kind, err)
        .bucket(bucket)
        .path(remote.as_str())
        .build()
}

/// Storage driver backed by a directory tree.
///
/// Objects live at `<root>/<bucket>/<path>`; buckets are plain
/// directories created on first upload.
#[derive(Debug)]
pub struct LocalDriver {
    root: Utf8PathBuf,
}

impl LocalDriver {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, bucket: &str, remote: &Utf8Path) -> Utf8PathBuf {
        let mut path = self.root.join(bucket);
        path.push(remote);
        path
    }
}

#[async_trait::async_trait]
impl Driver for LocalDriver {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn metadata(&self, bucket: &str, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        let target = self.path(bucket, remote);
        let metadata = tokio::fs::metadata(target)
            .await
            .map_err(|err| io_error(self.name(), bucket, remote, err))?;
        Ok(Metadata {
            size: metadata.len(),
            created: metadata
                .created()
                .wrap_err("created timestamp")
                .map_err(StorageError::with(self.name(), StorageErrorKind::Io))?
                .into(),
        })
    }

    async fn delete(&self, bucket: &str, remote: &Utf8Path) -> Result<(), StorageError> {
        let target = self.path(bucket, remote);
        tokio::fs::remove_file(target)
            .await
            .map_err(|err| io_error(self.name(), bucket, remote, err))?;
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        reader: &mut Reader<'_>,
    ) -> Result<(), StorageError> {
        let target = self.path(bucket, remote);

        tokio::fs::create_dir_all(target.parent().expect("object paths have a parent"))
            .await
            .map_err(|err| io_error(self.name(), bucket, remote, err))?;

        // Write to a sibling temp file and rename into place, so a failed
        // upload is never observable at the final path.
        let staging = target.with_file_name(format!(
            ".{}.{}.part",
            target.file_name().unwrap_or("upload"),
            uuid::Uuid::new_v4()
        ));

        let result: eyre::Result<()> = async {
            let mut writer = tokio::io::BufWriter::new(
                tokio::fs::File::create(&staging)
                    .await
                    .wrap_err("create staging file")?,
            );
            tokio::io::copy(reader, &mut writer).await.wrap_err("copy")?;
            writer.shutdown().await.wrap_err("shutdown writer")?;
            tokio::fs::rename(&staging, &target)
                .await
                .wrap_err("rename into place")?;
            Ok(())
        }
        .await;

        if let Err(err) = result {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(StorageError::builder(self.name(), StorageErrorKind::Io, err)
                .bucket(bucket)
                .path(remote.as_str())
                .build());
        }

        Ok(())
    }

    async fn download(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        writer: &mut Writer<'_>,
    ) -> Result<(), StorageError> {
        let target = self.path(bucket, remote);

        let mut reader = tokio::io::BufReader::new(
            tokio::fs::File::open(&target)
                .await
                .map_err(|err| io_error(self.name(), bucket, remote, err))?,
        );

        tokio::io::copy(&mut reader, writer)
            .await
            .map_err(|err| io_error(self.name(), bucket, remote, err))?;

        writer
            .flush()
            .await
            .map_err(|err| io_error(self.name(), bucket, remote, err))?;

        Ok(())
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: Option<&Utf8Path>,
    ) -> Result<Vec<String>, StorageError> {
        let mut base = self.root.join(bucket);
        if let Some(part) = prefix {
            base.push(part);
        }

        if tokio::fs::metadata(&base).await.is_err() {
            return Ok(Vec::new());
        }

        let root = self.root.join(bucket);
        let items = tokio::task::spawn_blocking(move || collect_list(&root, &base))
            .in_current_span()
            .await
            .wrap_err("local driver list task")
            .map_err(StorageError::with(self.name(), StorageErrorKind::Io))?
            .map_err(StorageError::with(self.name(), StorageErrorKind::Io))?;

        tracing::debug!("Found {} entries", items.len());

        Ok(items.into_iter().map(|p| p.to_string()).collect())
    }

    async fn buckets(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(err) => {
                return Err(StorageError::new(self.name(), StorageErrorKind::Io, err));
            }
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(StorageError::with(self.name(), StorageErrorKind::Io))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map_err(StorageError::with(self.name(), StorageErrorKind::Io))?
                .is_dir();
            if is_dir {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        names.sort();
        Ok(names)
    }
}

/// Collect files under `base`, returned relative to the bucket `root`.
#[tracing::instrument]
fn collect_list(root: &Utf8Path, base: &Utf8Path) -> eyre::Result<Vec<Utf8PathBuf>> {
    let mut files = Vec::new();
    visit(base, &mut files)?;

    Ok(files
        .into_iter()
        .filter_map(|p| p.strip_prefix(root).ok().map(|p| p.to_owned()))
        .collect())
}

fn visit(path: &Utf8Path, files: &mut Vec<Utf8PathBuf>) -> eyre::Result<()> {
    for entry in path.read_dir_utf8()? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            visit(entry.path(), files)?;
        } else {
            files.push(entry.path().to_owned())
        }
    }

    Ok(())
}
