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

use rand::prelude::*;
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose,
};
use rsa::{
    pkcs8::{EncodePrivateKey, LineEnding},
    RsaPrivateKey, RsaPublicKey,
};
use seal_common::*;
use time::{Duration, OffsetDateTime};
use tracing::info;

use crate::Keys;

impl Keys {
    /// Generates a fresh RSA-2048 key pair and a matching self-signed X.509
    /// certificate.
    ///
    /// This API is only enabled when the optional "cert-gen" feature is
    /// enabled for seal-keys (it's on by default). It introduces a
    /// non-trivial amount of extra dependencies, and RSA key generation is
    /// very slow (~150ms). If you already have keys, prefer
    /// [Keys::from_combined_pem_string] or [import_pkcs12](crate::import_pkcs12).
    ///
    /// The certificate is marked not-a-CA with `digitalSignature` /
    /// `keyEncipherment` key usage and `codeSigning` extended key usage.
    /// Android only checks that the APK's signature verifies against the
    /// certificate, so a self-signed certificate is all that is needed.
    pub fn generate(
        common_name: &str,
        organization: &str,
        country: &str,
        validity_years: u32,
        alias: &str,
    ) -> Result<Keys> {
        let private_key = RsaPrivateKey::new(&mut thread_rng(), 2048)?;
        let public_key = RsaPublicKey::from(private_key.clone());
        let private_key_pem = private_key.to_pkcs8_pem(LineEnding::LF)?.to_string();

        // Hand the key over to rcgen for the certificate itself.
        let key_pair = KeyPair::from_pem(&private_key_pem)
            .map_err(|e| SealError::CertificateGenerationFailed(e.to_string()))?;

        let mut distinguished_name = DistinguishedName::new();
        distinguished_name.push(DnType::CommonName, common_name);
        distinguished_name.push(DnType::OrganizationName, organization);
        distinguished_name.push(DnType::CountryName, country);

        let mut cert_params = CertificateParams::new(vec![])
            .map_err(|e| SealError::CertificateGenerationFailed(e.to_string()))?;
        cert_params.distinguished_name = distinguished_name;
        cert_params.is_ca = IsCa::ExplicitNoCa;
        cert_params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        cert_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::CodeSigning];
        let now = OffsetDateTime::now_utc();
        cert_params.not_before = now;
        cert_params.not_after = now + Duration::days(365 * i64::from(validity_years));

        let cert = cert_params
            .self_signed(&key_pair)
            .map_err(|e| SealError::CertificateGenerationFailed(e.to_string()))?;
        info!(common_name, validity_years, "generated signing keys");

        Ok(Keys {
            certificate: cert.der().to_vec(),
            private_key,
            public_key,
            alias: alias.to_string(),
        })
    }

    /// Randomly generates RSA signing keys and an accompanying certificate
    /// with placeholder naming, for local testing.
    ///
    /// For testing APKs on your local device you aren't concerned about the
    /// app's origin (the developer is you), so a throwaway certificate is
    /// fine. Note that Android treats APKs signed with different keys as
    /// coming from different publishers, so updating an installed app
    /// requires re-using the same keys.
    pub fn generate_random_testing_keys() -> Result<Keys> {
        eprintln!("Warning: Randomly generating a placeholder signing key. This is slow!");
        eprintln!("    It's recommended to generate your own keys first and pass them in.");
        Self::generate(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_NAME"), "US", 30, "CERT")
    }
}
