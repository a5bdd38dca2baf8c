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

use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian};
use seal_common::{Result, SealError};
use tracing::debug;

use crate::parser::{self, CEN_LEN, LOC_LEN, LOC_MAGIC};

/// Alignment required for uncompressed entry data, so Android can mmap it.
pub const ALIGNMENT: usize = 4;

/// Rewrites a container so that every stored (uncompressed) entry's data
/// begins on a 4-byte boundary, by growing that entry's local-header extra
/// field with zero padding. Compressed entries are copied byte-identically.
///
/// The operation is idempotent: realigning an aligned container returns
/// the same bytes.
pub fn zipalign(buf: &[u8]) -> Result<Vec<u8>> {
    let layout = parser::parse(buf)?;

    // Entries are relocated in file order, which the central directory is
    // not required to follow.
    let mut order: Vec<usize> = (0..layout.entries.len()).collect();
    order.sort_by_key(|&i| layout.entries[i].local_header_offset);

    let mut out = Vec::with_capacity(buf.len() + layout.entries.len() * ALIGNMENT);
    let mut relocated: HashMap<u32, u32> = HashMap::new();

    // Anything before the first local header (rare, but legal) is kept.
    let first_offset = order
        .first()
        .map(|&i| layout.entries[i].local_header_offset as usize)
        .unwrap_or(layout.cd_start);
    out.extend_from_slice(&buf[..first_offset]);

    for (position, &i) in order.iter().enumerate() {
        let entry = &layout.entries[i];
        let offset = entry.local_header_offset as usize;
        let span_end = order
            .get(position + 1)
            .map(|&next| layout.entries[next].local_header_offset as usize)
            .unwrap_or(layout.cd_start);

        if offset + LOC_LEN > buf.len() || LittleEndian::read_u32(&buf[offset..]) != LOC_MAGIC {
            return Err(SealError::ZipBadLocalHeader { offset });
        }
        let name_len = LittleEndian::read_u16(&buf[offset + 26..]) as usize;
        let extra_len = LittleEndian::read_u16(&buf[offset + 28..]) as usize;
        let data_start = offset + LOC_LEN + name_len + extra_len;
        if data_start > span_end {
            return Err(SealError::ZipTruncated { offset });
        }

        let new_offset = out.len();
        relocated.insert(entry.local_header_offset, new_offset as u32);

        if entry.is_stored() {
            let unpadded_data_start = new_offset + LOC_LEN + name_len + extra_len;
            let pad = (ALIGNMENT - unpadded_data_start % ALIGNMENT) % ALIGNMENT;
            // Header up to the extra-length field, then the grown length.
            out.extend_from_slice(&buf[offset..offset + 28]);
            let mut grown = [0u8; 2];
            LittleEndian::write_u16(&mut grown, (extra_len + pad) as u16);
            out.extend_from_slice(&grown);
            // Name and existing extra field, zero padding, then the data
            // (and trailing data descriptor, if any) untouched.
            out.extend_from_slice(&buf[offset + LOC_LEN..data_start]);
            out.resize(out.len() + pad, 0);
            out.extend_from_slice(&buf[data_start..span_end]);
        } else {
            out.extend_from_slice(&buf[offset..span_end]);
        }
    }

    // Central directory, with every local-header-offset field rewritten.
    let new_cd_start = out.len();
    out.extend_from_slice(&buf[layout.cd_start..layout.eocd_start]);
    let mut pos = new_cd_start;
    for _ in 0..layout.entries.len() {
        let old_offset = LittleEndian::read_u32(&out[pos + 42..]);
        let new_offset = relocated[&old_offset];
        LittleEndian::write_u32(&mut out[pos + 42..pos + 46], new_offset);
        let name_len = LittleEndian::read_u16(&out[pos + 28..]) as usize;
        let extra_len = LittleEndian::read_u16(&out[pos + 30..]) as usize;
        let comment_len = LittleEndian::read_u16(&out[pos + 32..]) as usize;
        pos += CEN_LEN + name_len + extra_len + comment_len;
    }

    let new_eocd_start = out.len();
    out.extend_from_slice(&buf[layout.eocd_start..]);
    parser::patch_cd_offset(&mut out, new_eocd_start, new_cd_start as u32);

    // Realignment must never lose or invent entries.
    let check = parser::parse(&out)?;
    if check.entries.len() != layout.entries.len() {
        return Err(SealError::ZipEntryCountMismatch {
            before: layout.entries.len(),
            after: check.entries.len(),
        });
    }
    debug!(
        entries = layout.entries.len(),
        grown = out.len() - buf.len(),
        "zipalign complete"
    );

    Ok(out)
}

/// Offset of an entry's first data byte, from its local header.
pub fn data_start(buf: &[u8], entry: &parser::ZipEntry) -> Result<usize> {
    let offset = entry.local_header_offset as usize;
    if offset + LOC_LEN > buf.len() || LittleEndian::read_u32(&buf[offset..]) != LOC_MAGIC {
        return Err(SealError::ZipBadLocalHeader { offset });
    }
    let name_len = LittleEndian::read_u16(&buf[offset + 26..]) as usize;
    let extra_len = LittleEndian::read_u16(&buf[offset + 28..]) as usize;
    Ok(offset + LOC_LEN + name_len + extra_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::tests::fixture_apk;

    fn entry_data<'a>(buf: &'a [u8], name: &str) -> &'a [u8] {
        let layout = parser::parse(buf).unwrap();
        let entry = layout.entries.iter().find(|e| e.name == name).unwrap();
        let start = data_start(buf, entry).unwrap();
        &buf[start..start + entry.compressed_size as usize]
    }

    #[test]
    fn stored_entries_land_on_four_byte_boundaries() {
        let aligned = zipalign(&fixture_apk()).unwrap();
        let layout = parser::parse(&aligned).unwrap();
        for entry in layout.entries.iter().filter(|e| e.is_stored()) {
            assert_eq!(data_start(&aligned, entry).unwrap() % ALIGNMENT, 0);
        }
    }

    #[test]
    fn zipalign_is_idempotent() {
        let once = zipalign(&fixture_apk()).unwrap();
        let twice = zipalign(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn compressed_bytes_survive_untouched() {
        let apk = fixture_apk();
        let aligned = zipalign(&apk).unwrap();
        assert_eq!(
            entry_data(&apk, "AndroidManifest.xml"),
            entry_data(&aligned, "AndroidManifest.xml")
        );
        assert_eq!(
            entry_data(&apk, "resources.arsc"),
            entry_data(&aligned, "resources.arsc")
        );
    }

    #[test]
    fn garbage_cd_offset_is_an_error_not_a_panic() {
        // A lone EOCD claiming 0 entries and a far-out-of-bounds
        // central directory offset must be rejected during parsing,
        // before any slicing happens.
        let mut eocd = vec![0u8; parser::EOCD_LEN];
        LittleEndian::write_u32(&mut eocd[0..4], parser::EOCD_MAGIC);
        LittleEndian::write_u32(&mut eocd[16..20], 0x00ff_ffff);
        assert!(matches!(
            zipalign(&eocd),
            Err(SealError::ZipBadCentralDirectory { .. })
        ));
    }

    #[test]
    fn entry_names_and_count_are_preserved() {
        let apk = fixture_apk();
        let before = parser::parse(&apk).unwrap();
        let after = parser::parse(&zipalign(&apk).unwrap()).unwrap();
        let names = |l: &parser::Layout| {
            let mut v: Vec<String> = l.entries.iter().map(|e| e.name.clone()).collect();
            v.sort();
            v
        };
        assert_eq!(names(&before), names(&after));
    }
}
