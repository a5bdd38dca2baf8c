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

//! Most of this package is concerned with APK Signature Scheme v2, but
//! this module handles Signature Scheme v1, aka. Signed JAR File format.

use base64::{prelude::BASE64_STANDARD, Engine};
use seal_common::Result;
use seal_keys::Keys;
use seal_zip::{is_signature_metadata, read_files, strip_and_append, File};
use tracing::debug;

use crate::{hasher::sha256, pkcs7};

/// Adds a v1 (JAR) signature to the container: `MANIFEST.MF`, `<ALIAS>.SF`
/// and `<ALIAS>.RSA` under `META-INF/`. Any pre-existing signature
/// metadata entries are removed first, so re-signing is idempotent.
pub fn add_v1_signature(apk_buf: &[u8], keys: &Keys) -> Result<Vec<u8>> {
    // Entries are digested in sorted order so re-signing the same input
    // reproduces the same manifest byte for byte.
    let mut entries: Vec<File> = read_files(apk_buf)?
        .into_iter()
        .filter(|f| !is_signature_metadata(&f.path) && !f.path.ends_with('/'))
        .collect();
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    // Create all META-INF files first so they don't hash themselves
    let manifest = create_manifest(&entries);
    let sig_file = create_signature_file(&entries, &manifest);
    let pkcs7_file = pkcs7::create_signature_block(sig_file.as_bytes(), keys)?;

    let alias = signature_entry_alias(&keys.alias);
    debug!(entries = entries.len(), %alias, "created v1 signature files");

    strip_and_append(
        apk_buf,
        &[
            File {
                path: "META-INF/MANIFEST.MF".to_string(),
                data: manifest.into(),
            },
            File {
                path: format!("META-INF/{alias}.SF"),
                data: sig_file.into(),
            },
            File {
                path: format!("META-INF/{alias}.RSA"),
                data: pkcs7_file,
            },
        ],
    )
}

/// JAR signature entries traditionally use an uppercase 8.3-style base
/// name. Anything unusable in the alias is dropped; an empty result falls
/// back to `CERT`.
fn signature_entry_alias(alias: &str) -> String {
    let cleaned: String = alias
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(8)
        .collect();
    if cleaned.is_empty() {
        "CERT".to_string()
    } else {
        cleaned
    }
}

fn create_signature_file(files: &[File], manifest: &str) -> String {
    let mut output_sig = "Signature-Version: 1.0\r\nCreated-By: 1.0 (Android)\r\n".to_string();
    let manifest_digest = b64_digest(manifest);
    output_sig = format!(
        "{output_sig}SHA-256-Digest-Manifest: {manifest_digest}\r\nX-Android-APK-Signed: 2\r\n\r\n"
    );

    // Each .SF section digests the corresponding manifest section exactly
    // as written, including its trailing blank line.
    for file in files {
        let file_name = &file.path;
        let entry = create_manifest_entry(file);
        let digest = b64_digest(entry);
        output_sig = format!("{output_sig}Name: {file_name}\r\nSHA-256-Digest: {digest}\r\n\r\n");
    }

    output_sig
}

fn create_manifest(files: &[File]) -> String {
    let mut output_manifest = "Manifest-Version: 1.0\r\n\r\n".to_string();

    for file in files {
        let entry = create_manifest_entry(file);
        output_manifest = format!("{output_manifest}{entry}");
    }

    output_manifest
}

// Also used in the generation of the .SF entry digests
fn create_manifest_entry(file: &File) -> String {
    let file_name = &file.path;
    let b64_digest = b64_digest(&file.data);
    format!("Name: {file_name}\r\nSHA-256-Digest: {b64_digest}\r\n\r\n")
}

fn b64_digest(input: impl AsRef<[u8]>) -> String {
    BASE64_STANDARD.encode(sha256(input.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(path: &str) -> File {
        File {
            path: path.to_string(),
            data: path.as_bytes().to_vec(),
        }
    }

    #[test]
    fn manifest_lists_every_entry_with_base64_digest() {
        let files = vec![named("AndroidManifest.xml"), named("resources.arsc")];
        let manifest = create_manifest(&files);
        assert!(manifest.starts_with("Manifest-Version: 1.0\r\n\r\n"));
        assert!(manifest.contains("Name: AndroidManifest.xml\r\n"));
        assert!(manifest.contains("Name: resources.arsc\r\n"));
        let expected = BASE64_STANDARD.encode(sha256(b"resources.arsc"));
        assert!(manifest.contains(&format!("SHA-256-Digest: {expected}\r\n")));
    }

    #[test]
    fn signature_file_digests_manifest_and_sections() {
        let files = vec![named("resources.arsc")];
        let manifest = create_manifest(&files);
        let sf = create_signature_file(&files, &manifest);

        let manifest_digest = b64_digest(&manifest);
        assert!(sf.contains(&format!("SHA-256-Digest-Manifest: {manifest_digest}\r\n")));
        assert!(sf.contains("X-Android-APK-Signed: 2\r\n"));
        // The per-entry digest covers the whole manifest section,
        // trailing separator included.
        let section_digest = b64_digest(create_manifest_entry(&files[0]));
        assert!(sf.contains(&format!(
            "Name: resources.arsc\r\nSHA-256-Digest: {section_digest}\r\n\r\n"
        )));
    }

    #[test]
    fn alias_is_sanitised_for_entry_names() {
        assert_eq!(signature_entry_alias("mykey"), "MYKEY");
        assert_eq!(signature_entry_alias("my key!longername"), "MYKEYLON");
        assert_eq!(signature_entry_alias("日本語"), "CERT");
        assert_eq!(signature_entry_alias(""), "CERT");
    }

    #[test]
    fn resigning_is_idempotent_and_reproducible() {
        let keys = Keys::generate("v1 test", "SEAL", "US", 1, "mykey").unwrap();
        let apk = crate::tests::fixture_apk();

        let once = add_v1_signature(&apk, &keys).unwrap();
        let twice = add_v1_signature(&once, &keys).unwrap();
        assert_eq!(once, twice);

        let files = read_files(&twice).unwrap();
        let metadata: Vec<_> = files
            .iter()
            .filter(|f| is_signature_metadata(&f.path))
            .map(|f| f.path.clone())
            .collect();
        assert_eq!(
            metadata,
            vec![
                "META-INF/MANIFEST.MF".to_string(),
                "META-INF/MYKEY.SF".to_string(),
                "META-INF/MYKEY.RSA".to_string()
            ]
        );
    }
}
