//! Zip backups of a server's emojis, kept on local disk per server.

use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::AppError;
use crate::manage::{validate_emoji_name, PROGRESS_INTERVAL};
use crate::models::emoji::GuildEmoji;
use crate::platform::{EmojiHost, HostError};
use crate::storage;

const MANIFEST_FILE: &str = "manifest.json";
const ARCHIVE_SUFFIX: &str = "_backup.zip";
const CONCURRENT_DOWNLOADS: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub guild_id: String,
    pub created_at: DateTime<Utc>,
    pub emojis: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file: String,
    pub name: String,
    pub id: String,
    pub animated: bool,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub name: String,
    pub archived: usize,
    pub failed: usize,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub name: String,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub total: usize,
    pub restored: usize,
    pub failed: usize,
    pub aborted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteAllOutcome {
    /// Nothing was touched; the caller must confirm.
    NeedsConfirmation { count: usize },
    Deleted {
        deleted: usize,
        failed: usize,
        backup: BackupReport,
    },
}

struct ArchivedEmoji {
    file: String,
    bytes: Vec<u8>,
}

/// Backups live at `{root}/{guild_id}/{name}_backup.zip`.
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn guild_dir(&self, guild_id: &str) -> PathBuf {
        self.root.join(storage::sanitize_component(guild_id))
    }

    pub fn archive_path(&self, guild_id: &str, name: &str) -> Result<PathBuf, AppError> {
        storage::validate_backup_name(name)?;
        Ok(self.guild_dir(guild_id).join(format!("{name}{ARCHIVE_SUFFIX}")))
    }

    /// Archive every emoji currently on the server. Emojis whose image cannot
    /// be downloaded are left out and counted.
    pub async fn create(
        &self,
        host: &dyn EmojiHost,
        guild_id: &str,
        name: &str,
    ) -> Result<BackupReport, AppError> {
        let path = self.archive_path(guild_id, name)?;
        let emojis = host.list_emojis(guild_id).await?;
        if emojis.is_empty() {
            return Err(AppError::BadRequest(
                "no custom emojis to back up in this server".to_string(),
            ));
        }
        self.write_backup(host, guild_id, name, &path, emojis).await
    }

    async fn write_backup(
        &self,
        host: &dyn EmojiHost,
        guild_id: &str,
        name: &str,
        path: &Path,
        emojis: Vec<GuildEmoji>,
    ) -> Result<BackupReport, AppError> {
        let downloads: Vec<(GuildEmoji, Result<Vec<u8>, HostError>)> = stream::iter(emojis)
            .map(|emoji| async move {
                let image = match &emoji.image_url {
                    Some(url) => host.fetch_image(url).await,
                    None => Err(HostError::NotFound(format!("emoji {} has no image", emoji.id))),
                };
                (emoji, image)
            })
            .buffered(CONCURRENT_DOWNLOADS)
            .collect()
            .await;

        let mut files = Vec::with_capacity(downloads.len());
        let mut failed = 0;
        for (emoji, image) in downloads {
            match image {
                Ok(bytes) => files.push((emoji, bytes)),
                Err(e) => {
                    tracing::error!("error backing up emoji {}: {e}", emoji.name);
                    failed += 1;
                }
            }
        }
        let archived = files.len();

        let manifest_guild = guild_id.to_string();
        let archive = tokio::task::spawn_blocking(move || build_archive(&manifest_guild, &files))
            .await
            .map_err(|e| AppError::Internal(format!("archive task failed: {e}")))??;

        let size_bytes = archive.len() as u64;
        storage::write_atomic_async(path.to_path_buf(), archive).await?;
        tracing::info!("created backup '{name}' for guild {guild_id} ({archived} emojis, {failed} failed)");

        Ok(BackupReport {
            name: name.to_string(),
            archived,
            failed,
            size_bytes,
        })
    }

    /// Backups for a server, newest first.
    pub async fn list(&self, guild_id: &str) -> Result<Vec<BackupInfo>, AppError> {
        let dir = self.guild_dir(guild_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(name) = file_name.strip_suffix(ARCHIVE_SUFFIX) else {
                continue;
            };
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            backups.push(BackupInfo {
                name: name.to_string(),
                size_bytes: metadata.len(),
                modified,
            });
        }

        backups.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
        Ok(backups)
    }

    /// Re-create every emoji in a backup. Entries whose checksum does not
    /// match the manifest, or whose name is not usable, count as failed.
    pub async fn restore(
        &self,
        host: &dyn EmojiHost,
        guild_id: &str,
        name: &str,
        progress: &mut (dyn FnMut(&RestoreSummary) + Send),
    ) -> Result<RestoreSummary, AppError> {
        let path = self.archive_path(guild_id, name)?;
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound(format!("no backup found with the name `{name}`")))
            }
            Err(e) => return Err(e.into()),
        };

        let (manifest, archived) = tokio::task::spawn_blocking(move || read_archive(raw))
            .await
            .map_err(|e| AppError::Internal(format!("archive task failed: {e}")))??;

        let mut summary = RestoreSummary {
            total: archived.len(),
            ..RestoreSummary::default()
        };

        for item in archived {
            let emoji_name = emoji_name_from_file(&item.file);
            if validate_emoji_name(&emoji_name).is_err() || item.bytes.len() > storage::MAX_EMOJI_SIZE {
                tracing::warn!("skipping unusable backup entry {}", item.file);
                summary.failed += 1;
                continue;
            }

            if let Some(expected) = manifest
                .as_ref()
                .and_then(|m| m.emojis.iter().find(|e| e.file == item.file))
                .map(|e| e.sha256.as_str())
            {
                if sha256_hex(&item.bytes) != expected {
                    tracing::warn!("checksum mismatch for backup entry {}", item.file);
                    summary.failed += 1;
                    continue;
                }
            }

            match host.create_emoji(guild_id, &emoji_name, &item.bytes).await {
                Ok(_) => {
                    summary.restored += 1;
                    if summary.restored % PROGRESS_INTERVAL == 0 {
                        progress(&summary);
                    }
                }
                Err(HostError::Forbidden(e)) => {
                    tracing::warn!("restore to guild {guild_id} refused: {e}");
                    summary.aborted = true;
                    break;
                }
                Err(e) => {
                    tracing::error!("error restoring emoji {emoji_name}: {e}");
                    summary.failed += 1;
                }
            }
        }

        progress(&summary);
        tracing::info!(
            "restored {} emojis from backup '{name}' to guild {guild_id}",
            summary.restored
        );
        Ok(summary)
    }

    /// Delete every emoji on the server after writing an `auto_*` backup.
    /// Without `confirm` nothing happens.
    pub async fn delete_all(
        &self,
        host: &dyn EmojiHost,
        guild_id: &str,
        confirm: bool,
    ) -> Result<DeleteAllOutcome, AppError> {
        let emojis = host.list_emojis(guild_id).await?;
        if emojis.is_empty() {
            return Err(AppError::BadRequest(
                "no custom emojis to delete in this server".to_string(),
            ));
        }
        if !confirm {
            return Ok(DeleteAllOutcome::NeedsConfirmation {
                count: emojis.len(),
            });
        }

        let name = format!("auto_{}", Utc::now().format("%Y%m%d_%H%M%S"));
        let path = self.archive_path(guild_id, &name)?;
        let backup = self
            .write_backup(host, guild_id, &name, &path, emojis.clone())
            .await?;

        let mut deleted = 0;
        let mut failed = 0;
        for emoji in &emojis {
            match host.delete_emoji(guild_id, &emoji.id).await {
                Ok(()) => deleted += 1,
                Err(HostError::Forbidden(e)) => {
                    tracing::warn!("delete in guild {guild_id} refused: {e}");
                    failed += emojis.len() - deleted - failed;
                    break;
                }
                Err(e) => {
                    tracing::error!("error deleting emoji {}: {e}", emoji.name);
                    failed += 1;
                }
            }
        }

        tracing::info!("deleted {deleted} emojis from guild {guild_id}");
        Ok(DeleteAllOutcome::Deleted {
            deleted,
            failed,
            backup,
        })
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn archive_file_name(emoji: &GuildEmoji) -> String {
    format!("{}_{}.{}", emoji.name, emoji.id, emoji.extension())
}

/// `party_cat_123.png` -> `party_cat`. The trailing `_<id>` is only removed
/// when it is numeric.
fn emoji_name_from_file(file: &str) -> String {
    let base = file.rsplit('/').next().unwrap_or(file);
    let stem = base
        .strip_suffix(".png")
        .or_else(|| base.strip_suffix(".gif"))
        .unwrap_or(base);
    match stem.rsplit_once('_') {
        Some((name, id)) if !name.is_empty() && !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) => {
            name.to_string()
        }
        _ => stem.to_string(),
    }
}

fn build_archive(
    guild_id: &str,
    files: &[(GuildEmoji, Vec<u8>)],
) -> Result<Vec<u8>, zip::result::ZipError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut manifest = Manifest {
        guild_id: guild_id.to_string(),
        created_at: Utc::now(),
        emojis: Vec::with_capacity(files.len()),
    };

    for (emoji, bytes) in files {
        let file = archive_file_name(emoji);
        zip.start_file(file.as_str(), options)?;
        zip.write_all(bytes)?;
        manifest.emojis.push(ManifestEntry {
            file,
            name: emoji.name.clone(),
            id: emoji.id.clone(),
            animated: emoji.animated,
            sha256: sha256_hex(bytes),
        });
    }

    let manifest = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| zip::result::ZipError::Io(std::io::Error::other(e)))?;
    zip.start_file(MANIFEST_FILE, options)?;
    zip.write_all(&manifest)?;

    Ok(zip.finish()?.into_inner())
}

fn read_archive(
    raw: Vec<u8>,
) -> Result<(Option<Manifest>, Vec<ArchivedEmoji>), zip::result::ZipError> {
    let mut archive = ZipArchive::new(Cursor::new(raw))?;

    let manifest = match archive.by_name(MANIFEST_FILE) {
        Ok(mut file) => {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            match serde_json::from_slice::<Manifest>(&buf) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    tracing::warn!("ignoring unreadable backup manifest: {e}");
                    None
                }
            }
        }
        Err(zip::result::ZipError::FileNotFound) => None,
        Err(e) => return Err(e),
    };

    let mut emojis = Vec::new();
    for i in 0..archive.len() {
        let file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        if !(name.ends_with(".png") || name.ends_with(".gif")) {
            continue;
        }
        // Anything past the emoji limit is rejected later; no need to inflate it all.
        let mut bytes = Vec::new();
        file.take(storage::MAX_EMOJI_SIZE as u64 + 1)
            .read_to_end(&mut bytes)?;
        emojis.push(ArchivedEmoji { file: name, bytes });
    }

    Ok((manifest, emojis))
}
