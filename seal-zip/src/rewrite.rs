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

use std::io::{Cursor, Read, Write};

use seal_common::Result;
use tracing::debug;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::File;

/// Entries owned by the JAR signing scheme. These are removed before
/// re-signing so the operation is idempotent.
pub fn is_signature_metadata(name: &str) -> bool {
    name == "META-INF/MANIFEST.MF"
        || (name.starts_with("META-INF/")
            && (name.ends_with(".SF")
                || name.ends_with(".RSA")
                || name.ends_with(".DSA")
                || name.ends_with(".EC")))
}

/// Reads every entry's uncompressed contents.
pub fn read_files(buf: &[u8]) -> Result<Vec<File>> {
    let mut archive = ZipArchive::new(Cursor::new(buf))?;
    let mut files = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        files.push(File {
            path: entry.name().to_string(),
            data,
        });
    }
    Ok(files)
}

/// Rewrites the container with all signature metadata entries removed and
/// `new_files` appended (Deflated). Every surviving entry is raw-copied,
/// so its compressed bytes are untouched.
pub fn strip_and_append(buf: &[u8], new_files: &[File]) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(buf))?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    let mut dropped = 0;
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if is_signature_metadata(entry.name()) {
            dropped += 1;
            continue;
        }
        writer.raw_copy_file(entry)?;
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for file in new_files {
        writer.start_file(&*file.path, options)?;
        writer.write_all(&file.data)?;
    }
    debug!(dropped, appended = new_files.len(), "container rewritten");

    Ok(writer.finish()?.into_inner())
}
