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

//! PKCS#12 (.p12) export and import of the signing bundle.
//!
//! PKCS#12 is the interchange format the rest of the Android tooling
//! (keytool, apksigner, Android Studio) speaks, so keys exported here can
//! be imported there and vice versa.

use rsa::{
    pkcs8::{DecodePrivateKey, EncodePrivateKey},
    RsaPrivateKey, RsaPublicKey,
};
use seal_common::*;
use tracing::debug;

use crate::Keys;

/// Magic number of the legacy Java KeyStore (.jks / .keystore) format,
/// which looks superficially like a p12 file but is a different container.
const JKS_MAGIC: [u8; 4] = [0xFE, 0xED, 0xFE, 0xED];

/// Serialises `keys` into a password-protected PKCS#12 container.
///
/// The private key and certificate are stored under the bundle's alias as
/// its friendly name.
pub fn export_pkcs12(keys: &Keys, password: &str) -> Result<Vec<u8>> {
    let key_der = keys.private_key.to_pkcs8_der()?;
    let pfx = p12::PFX::new(
        &keys.certificate,
        key_der.as_bytes(),
        None,
        password,
        &keys.alias,
    )
    .ok_or_else(|| {
        SealError::KeystoreCorrupt("could not assemble PKCS#12 container".to_string())
    })?;
    debug!(alias = %keys.alias, "exported keys to PKCS#12");
    Ok(pfx.to_der())
}

/// Parses a password-protected PKCS#12 container back into a [Keys] bundle.
///
/// Legacy Java KeyStore files are detected by magic number and rejected
/// with a pointer to the conversion command, since they are a common
/// mix-up.
pub fn import_pkcs12(bytes: &[u8], password: &str, alias: &str) -> Result<Keys> {
    if bytes.len() >= 4 && bytes[..4] == JKS_MAGIC {
        return Err(SealError::KeystoreUnsupportedFormat(
            "this is a legacy Java KeyStore (.jks) file; convert it with \
             `keytool -importkeystore -deststoretype pkcs12` first"
                .to_string(),
        ));
    }

    let pfx = p12::PFX::parse(bytes)
        .map_err(|e| SealError::KeystoreCorrupt(format!("not a PKCS#12 container: {e:?}")))?;

    // The bag contents are encrypted with a key derived from the password,
    // so a wrong password surfaces as a decryption failure here.
    let key_bags = pfx
        .key_bags(password)
        .map_err(|_| SealError::KeystoreWrongPassword)?;
    let cert_bags = pfx
        .cert_x509_bags(password)
        .map_err(|_| SealError::KeystoreWrongPassword)?;

    let key_der = key_bags.first().ok_or(SealError::NoKeys)?;
    let certificate = cert_bags.first().ok_or(SealError::NoKeys)?.clone();

    let private_key = RsaPrivateKey::from_pkcs8_der(key_der)
        .map_err(|e| SealError::KeystoreCorrupt(format!("invalid private key: {e}")))?;
    let public_key = RsaPublicKey::from(private_key.clone());

    Ok(Keys {
        certificate,
        public_key,
        private_key,
        alias: alias.to_string(),
    })
}
