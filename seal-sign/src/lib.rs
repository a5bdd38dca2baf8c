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

use deku::DekuContainerWrite;
use hasher::compute_top_level_hash;
use seal_common::{Result, SealError};
use seal_keys::Keys;
use signing_block::compute_signing_block;
use splice::splice_signing_block;
use tracing::debug;

mod crypto;
mod hasher;
mod pkcs7;
mod signed_data_block;
mod signing_block;
mod signing_types;
mod splice;
pub mod v1_signing;
pub mod verify;

pub use signed_data_block::{APK_SIGNING_BLOCK_MAGIC, SIGNATURE_SCHEME_V2_BLOCK_ID};
pub use v1_signing::add_v1_signature;

// APK Signature Scheme v2 based on https://source.android.com/docs/security/features/apksigning/v2
/// Signs a ZIP file buffer, adding an APK Signing Block before its Central
/// Directory and patching the EOCD to the directory's new position.
///
/// The block's size is predicted from a dry run with a zero digest before
/// any real signing happens; if the assembled block disagrees with the
/// prediction the operation aborts rather than emit an artifact whose
/// signature covers a stale offset.
pub fn sign_apk_buffer(apk_buf: &[u8], keys: &Keys) -> Result<Vec<u8>> {
    // Dry-run the block to figure out how long it will be given our key
    let dry_run = compute_signing_block([0; 32], keys)?;
    let predicted_size = dry_run.to_bytes()?.len();
    // Read ZIP file to find the central directory
    let layout = seal_zip::parse(apk_buf)?;
    // SHA-256 content digest of the three protected ranges
    let top_level_hash = compute_top_level_hash(apk_buf, &layout)?;
    // Compute again using the real digest this time
    let signing_block = compute_signing_block(top_level_hash, keys)?;
    let block_bytes = signing_block.to_bytes()?;
    if block_bytes.len() != predicted_size {
        return Err(SealError::SigningBlockSizeMismatch {
            predicted: predicted_size,
            actual: block_bytes.len(),
        });
    }
    debug!(block_size = block_bytes.len(), "assembled v2 signing block");
    // Build up the final zip file again
    splice_signing_block(apk_buf, &layout, &block_bytes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

    /// 2-entry unsigned APK: a compressed manifest and a stored resource
    /// table, 10 bytes each.
    pub(crate) fn fixture_apk() -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let deflated =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file("AndroidManifest.xml", deflated).unwrap();
        writer.write_all(b"0123456789").unwrap();
        writer.start_file("resources.arsc", stored).unwrap();
        writer.write_all(b"abcdefghij").unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn test_keys() -> Keys {
        Keys::generate("sign test", "SEAL", "US", 1, "CERT").unwrap()
    }

    #[test]
    fn signed_apk_ends_with_valid_eocd_after_block() {
        let signed = sign_apk_buffer(&fixture_apk(), &test_keys()).unwrap();
        let layout = seal_zip::parse(&signed).unwrap();
        // The central directory now sits right after a block trailer
        // ending in the magic.
        assert_eq!(
            &signed[layout.cd_start - 16..layout.cd_start],
            APK_SIGNING_BLOCK_MAGIC
        );
        assert_eq!(layout.entries.len(), 2);
    }

    #[test]
    fn signing_is_reproducible() {
        let keys = test_keys();
        let apk = fixture_apk();
        assert_eq!(
            sign_apk_buffer(&apk, &keys).unwrap(),
            sign_apk_buffer(&apk, &keys).unwrap()
        );
    }

    #[test]
    fn signed_apk_passes_verification() {
        let signed = sign_apk_buffer(&fixture_apk(), &test_keys()).unwrap();
        verify::verify_apk(&signed).unwrap();
    }

    #[test]
    fn input_buffer_is_not_mutated() {
        let apk = fixture_apk();
        let before = apk.clone();
        sign_apk_buffer(&apk, &test_keys()).unwrap();
        assert_eq!(apk, before);
    }

    #[test]
    fn tampering_with_entry_bytes_breaks_the_digest() {
        let apk = fixture_apk();
        let mut signed = sign_apk_buffer(&apk, &test_keys()).unwrap();

        // Flip one byte inside the stored resources.arsc data.
        let layout = seal_zip::parse(&signed).unwrap();
        let arsc = layout
            .entries
            .iter()
            .find(|e| e.name == "resources.arsc")
            .unwrap();
        let data_start = seal_zip::data_start(&signed, arsc).unwrap();
        signed[data_start] ^= 0xff;

        assert!(matches!(
            verify::verify_apk(&signed),
            Err(SealError::SignatureVerificationFailed(_))
        ));
    }

    #[test]
    fn extracted_signature_matches_signing_key() {
        let keys = test_keys();
        let signed = sign_apk_buffer(&fixture_apk(), &keys).unwrap();
        let info = verify::extract_v2_signature(&signed).unwrap();
        assert_eq!(info.certificate, keys.certificate);
        assert_eq!(info.public_key_der, keys.pub_key_as_der().unwrap());
        assert_eq!(info.signature.len(), 256);
    }
}
