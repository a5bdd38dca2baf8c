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

//! Signing-key material for SEAL: the [Keys] bundle, key/certificate
//! generation, PKCS#12 export/import and the single-slot keystore.

use std::collections::HashMap;

use seal_common::*;
use rsa::{
    pkcs8::{DecodePrivateKey, EncodePublicKey},
    RsaPrivateKey, RsaPublicKey,
};

#[cfg(feature = "cert-gen")]
mod generate;
mod keystore;
mod pkcs12;

pub use keystore::{Keystore, StoredKeyInfo, KEYSTORE_FILE};
pub use pkcs12::{export_pkcs12, import_pkcs12};

/// Holds the certificate and RSA private key used for signing.
///
/// A `Keys` value is exclusively owned by the operation holding it and is
/// never persisted unencrypted; durable storage goes through
/// [export_pkcs12] / [Keystore].
pub struct Keys {
    /// X.509 signing certificate in ASN.1 DER form
    pub certificate: Vec<u8>,
    /// RSA public key
    pub public_key: RsaPublicKey,
    /// RSA private key
    pub private_key: RsaPrivateKey,
    /// Name the JAR signature entries (`<ALIAS>.SF` / `<ALIAS>.RSA`) and
    /// keystore metadata are filed under.
    pub alias: String,
}

impl Keys {
    /// Parses and creates an instance of [Keys] from a `.pem` file.
    ///
    /// "Combined" in this case means that the one file has both a `BEGIN
    /// CERTIFICATE` and a `BEGIN PRIVATE KEY` section as one long UTF-8
    /// string.
    ///
    /// If you don't have one of these, use [generate](Keys::generate).
    pub fn from_combined_pem_string(combined_pem: &str, alias: &str) -> Result<Keys> {
        let pem_map = parse_pem_map_by_tags(combined_pem)?;
        let certificate = pem_map
            .get("CERTIFICATE")
            .ok_or(SealError::NoKeys)?
            .clone();

        let priv_key_bytes = pem_map.get("PRIVATE KEY").ok_or(SealError::NoKeys)?;
        let private_key = RsaPrivateKey::from_pkcs8_der(priv_key_bytes)?;
        let public_key = RsaPublicKey::from(private_key.clone());

        Ok(Keys {
            public_key,
            private_key,
            certificate,
            alias: alias.to_string(),
        })
    }

    /// Returns the RSA public key encoded as a SubjectPublicKeyInfo in
    /// ASN.1 DER format, as embedded in the v2 signer block.
    pub fn pub_key_as_der(&self) -> Result<Vec<u8>> {
        Ok(self.public_key.to_public_key_der()?.as_ref().to_vec())
    }
}

/// Parses a .pem file and returns a map of Tag -> Contents
fn parse_pem_map_by_tags(combined_pem: &str) -> Result<HashMap<String, Vec<u8>>> {
    let parsed = pem::parse_many(combined_pem)?;
    let mut map = HashMap::new();
    for pem_part in parsed {
        map.insert(pem_part.tag().into(), pem_part.into_contents());
    }
    Ok(map)
}
