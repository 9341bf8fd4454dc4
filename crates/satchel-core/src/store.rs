//! On-disk profile store.
//!
//! One JSON file per profile under `profiles/`. Writes go through a staging
//! directory and are renamed into place, so a crash mid-write never leaves a
//! half-written profile behind.

use anyhow::{anyhow, Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

use crate::profile::UserProfile;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("profile not found: {0}")]
    ProfileNotFound(Uuid),
    #[error("profile file corrupted: {0}")]
    ProfileCorrupted(String),
}

pub struct ProfileStore {
    root: PathBuf,
    profiles_root: PathBuf,
    staging_root: PathBuf,
}

impl ProfileStore {
    /// Open the store rooted at `root`, creating directories as needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let profiles_root = root.join("profiles");
        let staging_root = root.join("staging");

        fs::create_dir_all(&profiles_root)?;
        fs::create_dir_all(&staging_root)?;
        Self::restrict_dir_permissions(&root);

        // Clean up orphaned staging files from a previous crash.
        Self::cleanup_staging_dir(&staging_root);

        Ok(Self {
            root,
            profiles_root,
            staging_root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn contains(&self, profile_id: &Uuid) -> bool {
        self.profile_path(profile_id).exists()
    }

    /// Persist a profile, replacing any previous version atomically.
    pub fn save(&self, profile: &UserProfile) -> Result<()> {
        let json = serde_json::to_vec_pretty(profile)?;
        let dest = self.profile_path(&profile.profile_id);
        self.write_atomic(&dest, &json)
            .with_context(|| format!("persist profile {}", profile.profile_id))
    }

    pub fn load(&self, profile_id: &Uuid) -> Result<UserProfile> {
        let path = self.profile_path(profile_id);
        if !path.exists() {
            return Err(anyhow!(StoreError::ProfileNotFound(*profile_id)));
        }
        let json = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        let profile: UserProfile = serde_json::from_slice(&json)
            .map_err(|e| anyhow!(StoreError::ProfileCorrupted(format!("{}: {e}", path.display()))))?;
        Ok(profile)
    }

    /// All readable profiles. Unparsable files are skipped with a warning
    /// rather than failing the whole listing.
    pub fn list(&self) -> Result<Vec<UserProfile>> {
        let mut profiles = Vec::new();
        for entry in fs::read_dir(&self.profiles_root)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read(&path)
                .map_err(anyhow::Error::from)
                .and_then(|json| serde_json::from_slice::<UserProfile>(&json).map_err(Into::into))
            {
                Ok(profile) => profiles.push(profile),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable profile"),
            }
        }
        profiles.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(profiles)
    }

    /// Remove a profile and all of its meeting data. Idempotent: deleting a
    /// profile that is not present returns `Ok(false)`.
    pub fn delete(&self, profile_id: &Uuid) -> Result<bool> {
        let path = self.profile_path(profile_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("delete {}", path.display())),
        }
    }

    fn profile_path(&self, profile_id: &Uuid) -> PathBuf {
        self.profiles_root.join(format!("{profile_id}.json"))
    }

    fn write_atomic(&self, dest: &Path, bytes: &[u8]) -> Result<()> {
        let staging_name = format!("{}.staging", Uuid::new_v4());
        let staging_path = self.staging_root.join(staging_name);
        {
            let mut file = File::create(&staging_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        Self::fsync_dir(&self.staging_root)?;
        fs::rename(&staging_path, dest)?;
        if let Some(parent) = dest.parent() {
            Self::fsync_dir(parent)?;
        }
        Ok(())
    }

    fn restrict_dir_permissions(path: &Path) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o700)) {
                warn!("cannot restrict permissions on {}: {}", path.display(), e);
            }
        }
    }

    /// Remove any leftover `.staging` files from a previous crash.
    fn cleanup_staging_dir(staging_root: &Path) {
        if let Ok(entries) = fs::read_dir(staging_root) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                if name.to_string_lossy().ends_with(".staging") {
                    warn!(path = %entry.path().display(), "removing orphaned staging file");
                    let _ = fs::remove_file(entry.path());
                }
            }
        }
    }

    fn fsync_dir(path: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            let dir = OpenOptions::new().read(true).open(path)?;
            dir.sync_all()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        let profile = UserProfile::new("alice");
        store.save(&profile).unwrap();
        let loaded = store.load(&profile.profile_id).unwrap();
        assert_eq!(loaded, profile);
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        let profile = UserProfile::new("alice");
        store.save(&profile).unwrap();
        assert!(store.delete(&profile.profile_id).unwrap());
        assert!(!store.delete(&profile.profile_id).unwrap());
        assert!(!store.delete(&Uuid::new_v4()).unwrap());
    }

    #[test]
    fn load_missing_profile_fails() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        let err = store.load(&Uuid::new_v4()).unwrap_err();
        assert!(err.downcast_ref::<StoreError>().is_some());
    }

    #[test]
    fn list_skips_unreadable_entries() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();
        let profile = UserProfile::new("alice");
        store.save(&profile).unwrap();
        fs::write(dir.path().join("profiles").join("junk.json"), b"not json").unwrap();
        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], profile);
    }

    #[test]
    fn orphaned_staging_files_are_swept() {
        let dir = tempdir().unwrap();
        {
            let _store = ProfileStore::open(dir.path()).unwrap();
        }
        let orphan = dir.path().join("staging").join("deadbeef.staging");
        fs::write(&orphan, b"partial").unwrap();
        let _store = ProfileStore::open(dir.path()).unwrap();
        assert!(!orphan.exists());
    }
}
