// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::ArchiveError;

use super::record::{Archive, VersionEntry};
use super::sidecar::EpisodeSidecar;

/// Filename of the record-set document inside a feed directory
pub const ARCHIVE_DOCUMENT: &str = "archive.json";

/// Subdirectory episodes are quarantined into when they vanish from
/// the feed
pub const QUARANTINE_DIR: &str = "deleted";

const LOCK_FILENAME: &str = ".podvault.lock";
const PARTIAL_SUFFIX: &str = ".partial";

/// Run-scoped lock on a feed directory.
///
/// Created with O_EXCL so a second sync against the same directory
/// fails fast instead of interleaving file operations. Removed when
/// dropped; after a crash the stale file must be removed by hand.
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    fn acquire(path: PathBuf) -> Result<Self, ArchiveError> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ArchiveError::LockHeld { path });
            }
            Err(e) => return Err(ArchiveError::WriteFailed { path, source: e }),
        };

        let lock = Self { path };

        // The PID is informational, for whoever has to clean up a stale
        // lock after a crash.
        writeln!(file, "{}", std::process::id()).map_err(|e| ArchiveError::WriteFailed {
            path: lock.path.clone(),
            source: e,
        })?;

        Ok(lock)
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// All file operations of one feed archive go through this type.
///
/// Opening the store creates the feed directory and takes the run
/// lock; the lock is held until the store is dropped.
pub struct ArchiveStore {
    root: PathBuf,
    _lock: RunLock,
}

impl ArchiveStore {
    pub fn open(root: &Path) -> Result<Self, ArchiveError> {
        std::fs::create_dir_all(root).map_err(|e| ArchiveError::CreateDirectoryFailed {
            path: root.to_path_buf(),
            source: e,
        })?;

        let lock = RunLock::acquire(root.join(LOCK_FILENAME))?;

        Ok(Self {
            root: root.to_path_buf(),
            _lock: lock,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the record set, cleaning up stale partial files first.
    ///
    /// A missing document means an empty archive; a malformed document
    /// or invariant violation is fatal. Returns the archive and the
    /// number of partials removed.
    pub fn load(&self) -> Result<(Archive, usize), ArchiveError> {
        let cleaned = self.clean_partials()?;

        let path = self.document_path();
        if !path.exists() {
            return Ok((Archive::new(), cleaned));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ArchiveError::ReadFailed {
            path: path.clone(),
            source: e,
        })?;

        let archive: Archive =
            serde_json::from_str(&content).map_err(|e| ArchiveError::DocumentParseFailed {
                path: path.clone(),
                source: e,
            })?;

        archive.validate()?;

        Ok((archive, cleaned))
    }

    /// Atomically replace the record-set document: serialize to a
    /// temporary file, then rename over the old document.
    pub fn commit(&self, archive: &Archive) -> Result<(), ArchiveError> {
        let json = serde_json::to_vec_pretty(archive)?;

        let path = self.document_path();
        let tmp = self.root.join(format!("{ARCHIVE_DOCUMENT}.tmp"));

        std::fs::write(&tmp, json).map_err(|e| ArchiveError::WriteFailed {
            path: tmp.clone(),
            source: e,
        })?;

        std::fs::rename(&tmp, &path).map_err(|e| ArchiveError::FileOperationFailed {
            from: tmp,
            to: path,
            source: e,
        })
    }

    pub fn document_path(&self) -> PathBuf {
        self.root.join(ARCHIVE_DOCUMENT)
    }

    pub fn artifact_path(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    pub fn partial_path(&self, filename: &str) -> PathBuf {
        self.root.join(format!("{filename}{PARTIAL_SUFFIX}"))
    }

    pub fn sidecar_path(&self, filename: &str) -> PathBuf {
        self.root.join(sidecar_name(filename))
    }

    fn quarantine_dir(&self) -> PathBuf {
        self.root.join(QUARANTINE_DIR)
    }

    /// Rename a completed partial into its final artifact name
    pub fn promote_partial(&self, filename: &str) -> Result<(), ArchiveError> {
        let from = self.partial_path(filename);
        let to = self.artifact_path(filename);
        std::fs::rename(&from, &to).map_err(|e| ArchiveError::FileOperationFailed {
            from,
            to,
            source: e,
        })
    }

    /// Remove a partial that turned out to be redundant; missing is fine
    pub fn remove_partial(&self, filename: &str) -> Result<(), ArchiveError> {
        let path = self.partial_path(filename);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ArchiveError::RemoveFailed { path, source: e }),
        }
    }

    /// Rename the current artifact to its backup name before new
    /// content takes its place. Returns the backup name, or None when
    /// there is no artifact on disk.
    pub fn preserve_artifact(
        &self,
        filename: &str,
        timestamp: &str,
    ) -> Result<Option<String>, ArchiveError> {
        self.preserve_file(filename, timestamp)
    }

    /// Rename the current sidecar to its backup name. Returns the
    /// backup name, or None when no sidecar exists.
    pub fn preserve_sidecar(
        &self,
        filename: &str,
        timestamp: &str,
    ) -> Result<Option<String>, ArchiveError> {
        self.preserve_file(&sidecar_name(filename), timestamp)
    }

    fn preserve_file(&self, name: &str, timestamp: &str) -> Result<Option<String>, ArchiveError> {
        let from = self.root.join(name);
        if !from.exists() {
            return Ok(None);
        }

        let backup_name = format!("{name}.pre-{timestamp}");
        let to = self.root.join(&backup_name);
        std::fs::rename(&from, &to).map_err(|e| ArchiveError::FileOperationFailed {
            from,
            to,
            source: e,
        })?;

        Ok(Some(backup_name))
    }

    /// Write the sidecar snapshot next to the artifact
    pub fn write_sidecar(
        &self,
        filename: &str,
        sidecar: &EpisodeSidecar,
    ) -> Result<(), ArchiveError> {
        let json = serde_json::to_string_pretty(sidecar)?;
        let path = self.sidecar_path(filename);
        std::fs::write(&path, json).map_err(|e| ArchiveError::WriteFailed { path, source: e })
    }

    /// Backup files of this artifact that no version entry references,
    /// left behind when an earlier run was interrupted between the
    /// backup rename and the document commit.
    pub fn unreferenced_backups(
        &self,
        filename: &str,
        versions: &[VersionEntry],
    ) -> Result<Vec<String>, ArchiveError> {
        let prefix = format!("{filename}.pre-");
        let mut orphans: Vec<String> = self
            .list_names(&self.root)?
            .into_iter()
            .filter(|name| name.starts_with(&prefix))
            .filter(|name| !versions.iter().any(|v| &v.filename == name))
            .collect();
        orphans.sort();
        Ok(orphans)
    }

    /// Move the artifact, its sidecar, and all backups of both into
    /// the quarantine subdirectory. Returns the names moved.
    pub fn quarantine_family(&self, filename: &str) -> Result<Vec<String>, ArchiveError> {
        let members = self.family_members(&self.root, filename)?;
        if members.is_empty() {
            return Ok(members);
        }

        let quarantine = self.quarantine_dir();
        std::fs::create_dir_all(&quarantine).map_err(|e| ArchiveError::CreateDirectoryFailed {
            path: quarantine.clone(),
            source: e,
        })?;

        for name in &members {
            let from = self.root.join(name);
            let to = quarantine.join(name);
            std::fs::rename(&from, &to).map_err(|e| ArchiveError::FileOperationFailed {
                from,
                to,
                source: e,
            })?;
        }

        Ok(members)
    }

    /// Move a quarantined episode's file family back into the archive
    /// directory. Returns the names moved.
    pub fn restore_family(&self, filename: &str) -> Result<Vec<String>, ArchiveError> {
        let quarantine = self.quarantine_dir();
        if !quarantine.exists() {
            return Ok(Vec::new());
        }

        let members = self.family_members(&quarantine, filename)?;
        for name in &members {
            let from = quarantine.join(name);
            let to = self.root.join(name);
            std::fs::rename(&from, &to).map_err(|e| ArchiveError::FileOperationFailed {
                from,
                to,
                source: e,
            })?;
        }

        Ok(members)
    }

    fn family_members(&self, dir: &Path, filename: &str) -> Result<Vec<String>, ArchiveError> {
        let mut members: Vec<String> = self
            .list_names(dir)?
            .into_iter()
            .filter(|name| episode_family(name, filename))
            .collect();
        members.sort();
        Ok(members)
    }

    fn list_names(&self, dir: &Path) -> Result<Vec<String>, ArchiveError> {
        let entries = std::fs::read_dir(dir).map_err(|e| ArchiveError::ReadFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ArchiveError::ReadFailed {
                path: dir.to_path_buf(),
                source: e,
            })?;
            if entry.path().is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    fn clean_partials(&self) -> Result<usize, ArchiveError> {
        let mut cleaned = 0;
        for name in self.list_names(&self.root)? {
            if name.ends_with(PARTIAL_SUFFIX) {
                let path = self.root.join(&name);
                std::fs::remove_file(&path)
                    .map_err(|e| ArchiveError::RemoveFailed { path, source: e })?;
                cleaned += 1;
            }
        }
        Ok(cleaned)
    }
}

fn sidecar_name(filename: &str) -> String {
    format!("{filename}.json")
}

/// Whether a directory entry belongs to the file family of the given
/// artifact: the artifact itself, its sidecar, or a backup of either.
fn episode_family(name: &str, filename: &str) -> bool {
    name == filename
        || name == sidecar_name(filename)
        || name.starts_with(&format!("{filename}.pre-"))
        || name.starts_with(&format!("{filename}.json.pre-"))
}
