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

//! End-to-end checks over the whole signing pipeline, driven through the
//! public API the way an embedding application would call it.

use std::io::{Cursor, Write};

use byteorder::{ByteOrder, LittleEndian};
use seal_api::{sign_apk, verify_apk, Keys};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

/// A 2-entry unsigned APK: a compressed manifest and a stored resource
/// table, 10 bytes each.
fn unsigned_apk() -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    writer.start_file("AndroidManifest.xml", deflated).unwrap();
    writer.write_all(b"0123456789").unwrap();
    writer.start_file("resources.arsc", stored).unwrap();
    writer.write_all(b"abcdefghij").unwrap();
    writer.finish().unwrap().into_inner()
}

fn test_keys() -> Keys {
    Keys::generate("e2e test", "SEAL", "US", 1, "testkey").unwrap()
}

#[test]
fn signed_apk_has_the_expected_trailer() {
    let signed = sign_apk(&unsigned_apk(), &test_keys()).unwrap();

    // The file's last 22 bytes are the EOCD record.
    let eocd = &signed[signed.len() - 22..];
    assert_eq!(LittleEndian::read_u32(&eocd[0..4]), 0x06054b50);

    // Its central directory offset points just past a region ending in
    // the signing block magic.
    let cd_start = LittleEndian::read_u32(&eocd[16..20]) as usize;
    assert_eq!(&signed[cd_start - 16..cd_start], b"APK Sig Block 42");
}

#[test]
fn stored_entries_are_aligned_and_metadata_added() {
    let signed = sign_apk(&unsigned_apk(), &test_keys()).unwrap();

    let mut archive = ZipArchive::new(Cursor::new(&signed)).unwrap();
    let mut names = vec![];
    for i in 0..archive.len() {
        let entry = archive.by_index(i).unwrap();
        names.push(entry.name().to_string());
        if entry.compression() == CompressionMethod::Stored {
            assert_eq!(entry.data_start() % 4, 0, "{} misaligned", entry.name());
        }
    }

    // The two payload entries plus exactly three new signature entries.
    assert_eq!(names.len(), 5);
    assert!(names.contains(&"META-INF/MANIFEST.MF".to_string()));
    assert!(names.contains(&"META-INF/TESTKEY.SF".to_string()));
    assert!(names.contains(&"META-INF/TESTKEY.RSA".to_string()));
}

#[test]
fn payload_bytes_survive_signing() {
    let signed = sign_apk(&unsigned_apk(), &test_keys()).unwrap();

    let mut archive = ZipArchive::new(Cursor::new(&signed)).unwrap();
    let mut manifest = String::new();
    let mut arsc = Vec::new();
    std::io::Read::read_to_string(
        &mut archive.by_name("AndroidManifest.xml").unwrap(),
        &mut manifest,
    )
    .unwrap();
    std::io::Read::read_to_end(&mut archive.by_name("resources.arsc").unwrap(), &mut arsc)
        .unwrap();
    assert_eq!(manifest, "0123456789");
    assert_eq!(arsc, b"abcdefghij");
}

#[test]
fn signing_twice_is_byte_identical() {
    let keys = test_keys();
    let apk = unsigned_apk();
    assert_eq!(sign_apk(&apk, &keys).unwrap(), sign_apk(&apk, &keys).unwrap());
}

#[test]
fn resigning_a_signed_apk_replaces_the_old_signature() {
    let first_keys = test_keys();
    let second_keys = Keys::generate("second", "SEAL", "US", 1, "other").unwrap();

    let once = sign_apk(&unsigned_apk(), &first_keys).unwrap();
    let twice = sign_apk(&once, &second_keys).unwrap();
    verify_apk(&twice).unwrap();

    let mut archive = ZipArchive::new(Cursor::new(&twice)).unwrap();
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    assert!(names.contains(&"META-INF/OTHER.SF".to_string()));
    assert!(!names.contains(&"META-INF/TESTKEY.SF".to_string()));
}

#[test]
fn verification_catches_tampering() {
    let mut signed = sign_apk(&unsigned_apk(), &test_keys()).unwrap();
    verify_apk(&signed).unwrap();

    // Flip a byte in the stored entry's data region.
    let needle = b"abcdefghij";
    let pos = signed
        .windows(needle.len())
        .position(|window| window == needle)
        .unwrap();
    signed[pos] ^= 0x01;

    assert!(verify_apk(&signed).is_err());
}

#[test]
fn keystore_round_trip_through_the_api() {
    use seal_api::Keystore;

    let dir = tempfile::tempdir().unwrap();
    let store = Keystore::open(dir.path()).unwrap();
    let keys = test_keys();
    store.save(&keys, "passphrase").unwrap();

    let loaded = store.load("passphrase").unwrap();
    let signed = sign_apk(&unsigned_apk(), &loaded).unwrap();
    verify_apk(&signed).unwrap();
    // Same key material signs to the same bytes as the original.
    assert_eq!(signed, sign_apk(&unsigned_apk(), &keys).unwrap());
}
