// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Single-slot durable storage for one signing identity.
//!
//! The slot holds a password-protected PKCS#12 blob plus certificate
//! metadata that can be displayed without the password. Writes are
//! last-write-wins; callers wanting concurrent saves must serialise them.

use std::fs;
use std::path::{Path, PathBuf};

use base64::prelude::*;
use chrono::{DateTime, Utc};
use seal_common::{der, Result, SealError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{export_pkcs12, import_pkcs12, Keys};

/// File name of the single keystore slot inside the store directory.
pub const KEYSTORE_FILE: &str = "seal-keystore.json";

/// Certificate metadata displayable without the keystore password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredKeyInfo {
    pub alias: String,
    pub common_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The one persisted record: the encrypted key material and its metadata.
#[derive(Serialize, Deserialize)]
struct StoredKeyRecord {
    p12_base64: String,
    info: StoredKeyInfo,
}

/// Handle to the on-disk keystore slot.
pub struct Keystore {
    path: PathBuf,
}

impl Keystore {
    /// Opens the keystore rooted at `dir`, creating the directory if it
    /// doesn't exist yet. Opening never touches the slot itself.
    pub fn open(dir: &Path) -> Result<Keystore> {
        fs::create_dir_all(dir)?;
        Ok(Keystore {
            path: dir.join(KEYSTORE_FILE),
        })
    }

    /// Serialises `keys` into the slot, protected by `password`,
    /// overwriting any previous occupant. Metadata is derived from the
    /// certificate so [info](Keystore::info) works without the password.
    pub fn save(&self, keys: &Keys, password: &str) -> Result<()> {
        let fields = der::cert_fields(&keys.certificate)?;
        let record = StoredKeyRecord {
            p12_base64: BASE64_STANDARD.encode(export_pkcs12(keys, password)?),
            info: StoredKeyInfo {
                alias: keys.alias.clone(),
                common_name: fields.subject_common_name.unwrap_or_default(),
                created_at: fields.not_before,
                expires_at: fields.not_after,
            },
        };
        write_private(&self.path, &serde_json::to_vec_pretty(&record)?)?;
        info!(alias = %record.info.alias, "saved signing keys to keystore");
        Ok(())
    }

    /// Decrypts the slot's key material. A wrong password surfaces as
    /// [SealError::KeystoreWrongPassword], never as garbage keys.
    pub fn load(&self, password: &str) -> Result<Keys> {
        let record = self.read_record()?;
        let p12_bytes = BASE64_STANDARD.decode(&record.p12_base64)?;
        import_pkcs12(&p12_bytes, password, &record.info.alias)
    }

    /// Whether the slot is occupied.
    pub fn has_saved(&self) -> bool {
        self.path.is_file()
    }

    /// The stored certificate metadata, without needing the password.
    /// Returns `None` when the slot is empty.
    pub fn info(&self) -> Result<Option<StoredKeyInfo>> {
        if !self.has_saved() {
            return Ok(None);
        }
        Ok(Some(self.read_record()?.info))
    }

    /// Empties the slot. Deleting an already-empty slot is not an error.
    pub fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn read_record(&self) -> Result<StoredKeyRecord> {
        let bytes = fs::read(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SealError::NoKeys
            } else {
                e.into()
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Writes the record readable only by the owning user where the platform
/// supports it.
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
