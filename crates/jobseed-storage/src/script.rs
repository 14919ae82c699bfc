use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use crate::StoreError;

pub const MANIFEST_FILE: &str = "manifest.json";

/// One rendered seed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptChunk {
    pub file_name: String,
    pub contents: String,
    /// Data statements, transaction markers excluded.
    pub statements: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptManifest {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    /// Execution order.
    pub files: Vec<ScriptManifestFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptManifestFile {
    pub name: String,
    pub sha256: String,
    pub bytes: u64,
    pub statements: usize,
}

/// Output directory for seed scripts. Every file lands via temp-file + rename.
#[derive(Debug, Clone)]
pub struct ScriptStore {
    root: PathBuf,
}

impl ScriptStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Replaces `name` under the root atomically; readers see the old or the new file.
    pub async fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StoreError::io(&self.root, source))?;

        let target = self.root.join(name);
        let temp_path = self
            .root
            .join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .map_err(|source| StoreError::io(&temp_path, source))?;
        file.write_all(bytes)
            .await
            .map_err(|source| StoreError::io(&temp_path, source))?;
        file.flush()
            .await
            .map_err(|source| StoreError::io(&temp_path, source))?;
        drop(file);

        if let Err(source) = fs::rename(&temp_path, &target).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StoreError::io(&target, source));
        }
        Ok(target)
    }

    /// Seed documents this store writes: `seed.sql` or `seed_*.sql`.
    fn is_seed_script(name: &str) -> bool {
        name == "seed.sql" || (name.starts_with("seed_") && name.ends_with(".sql"))
    }

    /// Removes seed documents left by an earlier run that are not in `keep`.
    async fn prune_stale(&self, keep: &HashSet<&str>) -> Result<usize, StoreError> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|source| StoreError::io(&self.root, source))?;
        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StoreError::io(&self.root, source))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if Self::is_seed_script(&name) && !keep.contains(name.as_str()) {
                let path = entry.path();
                fs::remove_file(&path)
                    .await
                    .map_err(|source| StoreError::io(&path, source))?;
                debug!(file = %name, "removed stale seed script");
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Writes the chunks in order, drops seed scripts from earlier runs, then writes
    /// the manifest describing the new set.
    pub async fn write_chunks(
        &self,
        chunks: &[ScriptChunk],
        generated_at: DateTime<Utc>,
    ) -> Result<ScriptManifest, StoreError> {
        let mut files = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let bytes = chunk.contents.as_bytes();
            self.write_atomic(&chunk.file_name, bytes).await?;
            files.push(ScriptManifestFile {
                name: chunk.file_name.clone(),
                sha256: Self::sha256_hex(bytes),
                bytes: bytes.len() as u64,
                statements: chunk.statements,
            });
        }

        let keep: HashSet<&str> = chunks.iter().map(|c| c.file_name.as_str()).collect();
        let removed = self.prune_stale(&keep).await?;

        let manifest = ScriptManifest {
            schema_version: 1,
            generated_at,
            files,
        };
        let encoded = serde_json::to_vec_pretty(&manifest)?;
        self.write_atomic(MANIFEST_FILE, &encoded).await?;
        info!(
            dir = %self.root.display(),
            files = manifest.files.len(),
            removed,
            "wrote seed scripts"
        );
        Ok(manifest)
    }

    pub async fn read_manifest(&self) -> Result<ScriptManifest, StoreError> {
        let path = self.root.join(MANIFEST_FILE);
        let bytes = fs::read(&path)
            .await
            .map_err(|source| StoreError::io(&path, source))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Reads a listed file and checks it still matches its manifest hash.
    pub async fn read_verified(&self, file: &ScriptManifestFile) -> Result<String, StoreError> {
        let path = self.root.join(&file.name);
        let text = fs::read_to_string(&path)
            .await
            .map_err(|source| StoreError::io(&path, source))?;
        let actual = Self::sha256_hex(text.as_bytes());
        if actual != file.sha256 {
            return Err(StoreError::Checksum {
                file: file.name.clone(),
                expected: file.sha256.clone(),
                actual,
            });
        }
        Ok(text)
    }
}

/// Executes seed scripts against Postgres, one file per round trip.
#[derive(Debug, Clone)]
pub struct PgScriptApplier {
    pool: PgPool,
}

impl PgScriptApplier {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Files carry their own BEGIN/COMMIT; a failing file stops the run.
    pub async fn apply(
        &self,
        store: &ScriptStore,
        manifest: &ScriptManifest,
    ) -> Result<usize, StoreError> {
        let mut applied = 0usize;
        for file in &manifest.files {
            let sql = store.read_verified(file).await?;
            let span = tracing::info_span!("apply_script", file = %file.name);
            sqlx::raw_sql(&sql)
                .execute(&self.pool)
                .instrument(span)
                .await?;
            info!(file = %file.name, statements = file.statements, "applied seed script");
            applied += 1;
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn chunk(name: &str, body: &str) -> ScriptChunk {
        ScriptChunk {
            file_name: name.to_string(),
            contents: body.to_string(),
            statements: 1,
        }
    }

    #[test]
    fn hashing_is_stable() {
        assert_eq!(
            ScriptStore::sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn chunks_and_manifest_round_trip() {
        let dir = tempdir().expect("tempdir");
        let store = ScriptStore::new(dir.path().join("out"));
        let generated_at = DateTime::parse_from_rfc3339("2026-02-24T12:00:00Z")
            .expect("ts")
            .with_timezone(&Utc);

        let written = store
            .write_chunks(
                &[
                    chunk("seed_01_locations.sql", "BEGIN;\nSELECT 1;\nCOMMIT;\n"),
                    chunk("seed_02_roles.sql", "BEGIN;\nSELECT 2;\nCOMMIT;\n"),
                ],
                generated_at,
            )
            .await
            .expect("write chunks");
        let read = store.read_manifest().await.expect("read manifest");
        assert_eq!(written, read);
        assert_eq!(read.files[0].name, "seed_01_locations.sql");
        assert_eq!(read.files[1].bytes, 25);

        let text = store.read_verified(&read.files[1]).await.expect("verified chunk");
        assert!(text.contains("SELECT 2"));

        let leftovers: Vec<_> = std::fs::read_dir(store.root())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn rewriting_replaces_previous_contents() {
        let dir = tempdir().expect("tempdir");
        let store = ScriptStore::new(dir.path());
        store.write_atomic("seed.sql", b"old").await.expect("atomic write");
        let path = store.write_atomic("seed.sql", b"new").await.expect("atomic write");
        assert_eq!(std::fs::read_to_string(path).expect("read file"), "new");
    }

    #[tokio::test]
    async fn smaller_rerun_removes_stale_scripts() {
        let dir = tempdir().expect("tempdir");
        let store = ScriptStore::new(dir.path());
        store
            .write_chunks(
                &[
                    chunk("seed_01_locations.sql", "SELECT 1;"),
                    chunk("seed_02_jobs.sql", "SELECT 2;"),
                    chunk("seed_03_jobs.sql", "SELECT 3;"),
                ],
                Utc::now(),
            )
            .await
            .expect("first run");
        std::fs::write(dir.path().join("notes.sql"), "-- kept").expect("write file");

        store
            .write_chunks(&[chunk("seed_1_locations.sql", "SELECT 1;")], Utc::now())
            .await
            .expect("second run");

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["manifest.json", "notes.sql", "seed_1_locations.sql"]);
    }

    #[tokio::test]
    async fn tampered_file_fails_verification() {
        let dir = tempdir().expect("tempdir");
        let store = ScriptStore::new(dir.path());
        let manifest = store
            .write_chunks(&[chunk("seed_01_jobs.sql", "SELECT 1;")], Utc::now())
            .await
            .expect("write chunks");
        std::fs::write(dir.path().join("seed_01_jobs.sql"), "DROP TABLE jobs;").expect("tamper chunk");

        let err = store.read_verified(&manifest.files[0]).await.unwrap_err();
        assert!(matches!(err, StoreError::Checksum { .. }));
    }
}
