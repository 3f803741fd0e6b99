// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Short-lived storage for the in-flight login session. The session has to
//! survive the round trip through the identity provider, so it lives in a
//! key/value store that outlives the process that started the login.

use crate::error::LoginError;
use parking_lot::Mutex;
use sites_keyless_common::{derive_nonce, EphemeralKeyPair};
use std::{
    collections::BTreeMap,
    fmt,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tracing::{debug, info, warn};
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

// Storage keys
const PRIVATE_KEY_KEY: &str = "ephemeral-private-key";
const RANDOMNESS_KEY: &str = "jwt-randomness";
const NONCE_KEY: &str = "login-nonce";
const MAX_EPOCH_KEY: &str = "login-maxEpoch";
const SESSION_ID_KEY: &str = "login-session-id";
const SESSION_COUNTER_KEY: &str = "login-session-counter";
const ADDRESS_KEY: &str = "zklogin-address";
const ID_TOKEN_KEY: &str = "id-token";

/// A string key/value store, modelled on browser session storage
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, LoginError>;

    fn set(&self, key: &str, value: &str) -> Result<(), LoginError>;

    /// Removes the key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), LoginError>;
}

impl<T: SessionStorage + ?Sized> SessionStorage for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, LoginError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LoginError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), LoginError> {
        (**self).remove(key)
    }
}

/// Session storage that lives only as long as the process
#[derive(Debug, Default)]
pub struct InMemorySessionStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for InMemorySessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, LoginError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LoginError> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), LoginError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Session storage backed by a JSON file, so that the session started by one
/// CLI invocation can be resolved by the next one
#[derive(Debug)]
pub struct FileSessionStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, LoginError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(&self.path).map_err(|error| {
            LoginError::Storage(format!("failed to read {}: {}", self.path.display(), error))
        })?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents).map_err(|error| {
            LoginError::Storage(format!("failed to parse {}: {}", self.path.display(), error))
        })
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), LoginError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                LoginError::Storage(format!("failed to create {}: {}", parent.display(), error))
            })?;
        }
        let contents = serde_json::to_string_pretty(entries)
            .map_err(|error| LoginError::Storage(error.to_string()))?;

        // Write then rename so readers never observe a partially written file
        let tmp_path = self.path.with_extension("tmp");
        let result = write_to_user_only_file(&tmp_path, contents.as_bytes()).and_then(|()| {
            fs::rename(&tmp_path, &self.path).map_err(|error| {
                LoginError::Storage(format!("failed to replace {}: {}", self.path.display(), error))
            })
        });
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }
}

/// Creates (or truncates) the file readable by the current user only, and
/// writes the given bytes to it
fn write_to_user_only_file(path: &Path, bytes: &[u8]) -> Result<(), LoginError> {
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(0o600);

    let to_storage_error = |error: std::io::Error| {
        LoginError::Storage(format!("failed to write {}: {}", path.display(), error))
    };
    let mut file = opts.open(path).map_err(to_storage_error)?;
    // A leftover file from an older write keeps its mode, so restrict it too
    #[cfg(unix)]
    file.set_permissions(fs::Permissions::from_mode(0o600))
        .map_err(to_storage_error)?;
    file.write_all(bytes).map_err(to_storage_error)?;
    file.sync_all().map_err(to_storage_error)
}

impl SessionStorage for FileSessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, LoginError> {
        let _guard = self.lock.lock();
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LoginError> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;
        entries.insert(key.to_owned(), value.to_owned());
        self.write_entries(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), LoginError> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;
        if entries.remove(key).is_some() {
            self.write_entries(&entries)?;
        }
        Ok(())
    }
}

/// The fields that make up a persisted login session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionField {
    PrivateKey,
    Randomness,
    Nonce,
    MaxEpoch,
}

impl SessionField {
    pub const ALL: [SessionField; 4] = [
        SessionField::PrivateKey,
        SessionField::Randomness,
        SessionField::Nonce,
        SessionField::MaxEpoch,
    ];

    pub fn storage_key(&self) -> &'static str {
        match self {
            SessionField::PrivateKey => PRIVATE_KEY_KEY,
            SessionField::Randomness => RANDOMNESS_KEY,
            SessionField::Nonce => NONCE_KEY,
            SessionField::MaxEpoch => MAX_EPOCH_KEY,
        }
    }
}

impl fmt::Display for SessionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}

/// Identifies one login attempt. Ids only ever increase, so a callback for
/// an older attempt can be told apart from the active one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(SessionId)
    }
}

/// Everything needed to finish one login attempt
#[derive(Debug)]
pub struct LoginSession {
    pub ephemeral_key_pair: EphemeralKeyPair,
    pub randomness: String,
    pub nonce: String,
    pub max_epoch: u64,
}

impl LoginSession {
    /// Builds a session, deriving the nonce from the other fields
    pub fn new(
        ephemeral_key_pair: EphemeralKeyPair,
        max_epoch: u64,
        randomness: String,
    ) -> Result<Self, LoginError> {
        let nonce = derive_nonce(&ephemeral_key_pair.public_key(), max_epoch, &randomness)?;
        Ok(Self {
            ephemeral_key_pair,
            randomness,
            nonce,
            max_epoch,
        })
    }

    /// Checks that the nonce commits to the key, epoch and randomness
    fn is_consistent(&self) -> Result<bool, LoginError> {
        let expected = derive_nonce(
            &self.ephemeral_key_pair.public_key(),
            self.max_epoch,
            &self.randomness,
        )?;
        Ok(expected == self.nonce)
    }
}

/// Owns the login session fields in the underlying session storage
pub struct EphemeralKeyStore<S> {
    storage: S,
}

impl<S: SessionStorage> EphemeralKeyStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Generates a fresh ephemeral keypair
    pub fn create(&self) -> EphemeralKeyPair {
        EphemeralKeyPair::generate()
    }

    /// Persists every field of the session under a newly allocated session
    /// id. Any session still in flight is overwritten.
    pub fn persist(&self, session: &LoginSession) -> Result<SessionId, LoginError> {
        let session_id = self.next_session_id()?;
        if let Some(previous) = self.active_session_id()? {
            warn!(
                previous_session_id = %previous,
                session_id = %session_id,
                "Replacing a login session that was never resolved"
            );
        }

        self.storage.set(
            SessionField::PrivateKey.storage_key(),
            &session.ephemeral_key_pair.private_key_base64(),
        )?;
        self.storage
            .set(SessionField::Randomness.storage_key(), &session.randomness)?;
        self.storage
            .set(SessionField::Nonce.storage_key(), &session.nonce)?;
        self.storage.set(
            SessionField::MaxEpoch.storage_key(),
            &session.max_epoch.to_string(),
        )?;
        self.storage.set(SESSION_ID_KEY, &session_id.to_string())?;

        info!(
            session_id = %session_id,
            max_epoch = session.max_epoch,
            "Persisted login session"
        );
        Ok(session_id)
    }

    /// Restores the full session. Partial sessions are never returned.
    pub fn restore(&self) -> Result<LoginSession, LoginError> {
        let private_key = self.require(SessionField::PrivateKey)?;
        let randomness = self.require(SessionField::Randomness)?;
        let nonce = self.require(SessionField::Nonce)?;
        let max_epoch = self.require(SessionField::MaxEpoch)?;

        let max_epoch = max_epoch.parse::<u64>().map_err(|error| {
            LoginError::Storage(format!("stored max epoch '{}' is invalid: {}", max_epoch, error))
        })?;
        let session = LoginSession {
            ephemeral_key_pair: EphemeralKeyPair::from_private_key_base64(&private_key)?,
            randomness,
            nonce,
            max_epoch,
        };
        if !session.is_consistent()? {
            return Err(LoginError::Storage(
                "stored nonce does not match the stored key, epoch and randomness".into(),
            ));
        }
        Ok(session)
    }

    /// Removes every session field. Safe to call when nothing is stored.
    pub fn clear(&self) -> Result<(), LoginError> {
        for field in SessionField::ALL {
            self.storage.remove(field.storage_key())?;
        }
        self.storage.remove(SESSION_ID_KEY)?;
        debug!("Cleared login session");
        Ok(())
    }

    /// Clears the session together with the stored address and token
    pub fn logout(&self) -> Result<(), LoginError> {
        self.clear()?;
        self.storage.remove(ADDRESS_KEY)?;
        self.storage.remove(ID_TOKEN_KEY)?;
        info!("Logged out of zkLogin");
        Ok(())
    }

    /// Returns the id of the session currently in flight, if any
    pub fn active_session_id(&self) -> Result<Option<SessionId>, LoginError> {
        self.storage
            .get(SESSION_ID_KEY)?
            .map(|value| {
                value.parse::<SessionId>().map_err(|error| {
                    LoginError::Storage(format!("stored session id '{}' is invalid: {}", value, error))
                })
            })
            .transpose()
    }

    pub fn store_address(&self, address: &str) -> Result<(), LoginError> {
        self.storage.set(ADDRESS_KEY, address)
    }

    pub fn address(&self) -> Result<Option<String>, LoginError> {
        self.storage.get(ADDRESS_KEY)
    }

    pub fn store_id_token(&self, id_token: &str) -> Result<(), LoginError> {
        self.storage.set(ID_TOKEN_KEY, id_token)
    }

    pub fn id_token(&self) -> Result<Option<String>, LoginError> {
        self.storage.get(ID_TOKEN_KEY)
    }

    fn require(&self, field: SessionField) -> Result<String, LoginError> {
        self.storage
            .get(field.storage_key())?
            .ok_or(LoginError::MissingSessionData(field))
    }

    fn next_session_id(&self) -> Result<SessionId, LoginError> {
        let current = match self.storage.get(SESSION_COUNTER_KEY)? {
            Some(value) => value.parse::<u64>().map_err(|error| {
                LoginError::Storage(format!("stored session counter '{}' is invalid: {}", value, error))
            })?,
            None => 0,
        };
        let next = current + 1;
        self.storage.set(SESSION_COUNTER_KEY, &next.to_string())?;
        Ok(SessionId(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sites_keyless_common::generate_randomness;

    fn new_session() -> LoginSession {
        LoginSession::new(EphemeralKeyPair::generate(), 12, generate_randomness()).unwrap()
    }

    #[test]
    fn restores_what_was_persisted() {
        let store = EphemeralKeyStore::new(InMemorySessionStorage::new());
        let session = new_session();
        store.persist(&session).unwrap();

        let restored = store.restore().unwrap();
        assert_eq!(restored.nonce, session.nonce);
        assert_eq!(restored.randomness, session.randomness);
        assert_eq!(restored.max_epoch, 12);
        assert_eq!(
            restored.ephemeral_key_pair.public_key(),
            session.ephemeral_key_pair.public_key()
        );
    }

    #[test]
    fn restore_fails_when_any_single_field_is_missing() {
        for missing in SessionField::ALL {
            let store = EphemeralKeyStore::new(InMemorySessionStorage::new());
            store.persist(&new_session()).unwrap();
            store.storage().remove(missing.storage_key()).unwrap();

            match store.restore() {
                Err(LoginError::MissingSessionData(field)) => assert_eq!(field, missing),
                other => panic!("expected missing {}, got {:?}", missing, other),
            }
        }
    }

    #[test]
    fn restore_rejects_tampered_nonces() {
        let store = EphemeralKeyStore::new(InMemorySessionStorage::new());
        store.persist(&new_session()).unwrap();
        store
            .storage()
            .set(SessionField::MaxEpoch.storage_key(), "13")
            .unwrap();
        assert!(matches!(store.restore(), Err(LoginError::Storage(_))));
    }

    #[test]
    fn clear_is_idempotent() {
        let store = EphemeralKeyStore::new(InMemorySessionStorage::new());
        store.clear().unwrap();
        store.persist(&new_session()).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(matches!(
            store.restore(),
            Err(LoginError::MissingSessionData(SessionField::PrivateKey))
        ));
        assert_eq!(store.active_session_id().unwrap(), None);
    }

    #[test]
    fn session_ids_keep_increasing_across_clears() {
        let store = EphemeralKeyStore::new(InMemorySessionStorage::new());
        let first = store.persist(&new_session()).unwrap();
        store.clear().unwrap();
        let second = store.persist(&new_session()).unwrap();
        let third = store.persist(&new_session()).unwrap();
        assert!(first < second && second < third);
        assert_eq!(store.active_session_id().unwrap(), Some(third));
    }

    #[test]
    fn logout_removes_address_and_token() {
        let store = EphemeralKeyStore::new(InMemorySessionStorage::new());
        store.persist(&new_session()).unwrap();
        store.store_address("0x01").unwrap();
        store.store_id_token("a.b.c").unwrap();

        store.clear().unwrap();
        assert_eq!(store.address().unwrap().as_deref(), Some("0x01"));

        store.logout().unwrap();
        assert_eq!(store.address().unwrap(), None);
        assert_eq!(store.id_token().unwrap(), None);
    }

    #[test]
    fn file_storage_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let session = new_session();
        let session_id = EphemeralKeyStore::new(FileSessionStorage::new(&path))
            .persist(&session)
            .unwrap();

        let reopened = EphemeralKeyStore::new(FileSessionStorage::new(&path));
        assert_eq!(reopened.active_session_id().unwrap(), Some(session_id));
        assert_eq!(reopened.restore().unwrap().nonce, session.nonce);

        reopened.clear().unwrap();
        reopened.clear().unwrap();
        assert!(reopened.restore().is_err());
    }

    #[test]
    fn file_storage_reports_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();
        let storage = FileSessionStorage::new(&path);
        assert!(matches!(storage.get("any"), Err(LoginError::Storage(_))));
    }

    #[cfg(unix)]
    #[test]
    fn session_file_is_readable_by_its_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        // A pre-existing, world readable file must be restricted on rewrite
        fs::write(&path, "{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        EphemeralKeyStore::new(FileSessionStorage::new(&path))
            .persist(&new_session())
            .unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!path.with_extension("tmp").exists());
    }
}
