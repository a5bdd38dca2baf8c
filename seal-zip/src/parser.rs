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

use byteorder::{ByteOrder, LittleEndian};
use seal_common::{Result, SealError};

pub const EOCD_MAGIC: u32 = 0x06054b50;
pub const CEN_MAGIC: u32 = 0x02014b50;
pub const LOC_MAGIC: u32 = 0x04034b50;

/// Fixed part of the End Of Central Directory record.
pub const EOCD_LEN: usize = 22;
/// Fixed part of a central directory record.
pub const CEN_LEN: usize = 46;
/// Fixed part of a local file header.
pub const LOC_LEN: usize = 30;

/// One central directory record. Offsets and sizes are 32-bit by
/// construction; ZIP64 inputs never make it this far.
#[derive(Debug, Clone, PartialEq)]
pub struct ZipEntry {
    pub name: String,
    pub compression_method: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub local_header_offset: u32,
}

impl ZipEntry {
    /// Whether the entry is stored without compression (method 0).
    pub fn is_stored(&self) -> bool {
        self.compression_method == 0
    }
}

/// The three regions of a container: `[0, cd_start)` holds the entries,
/// `[cd_start, eocd_start)` the central directory, `[eocd_start, len)`
/// the EOCD record.
#[derive(Debug, Clone)]
pub struct Layout {
    pub entries: Vec<ZipEntry>,
    pub cd_start: usize,
    pub eocd_start: usize,
}

fn u16_at(buf: &[u8], offset: usize) -> Result<u16> {
    if offset + 2 > buf.len() {
        return Err(SealError::ZipTruncated { offset });
    }
    Ok(LittleEndian::read_u16(&buf[offset..offset + 2]))
}

fn u32_at(buf: &[u8], offset: usize) -> Result<u32> {
    if offset + 4 > buf.len() {
        return Err(SealError::ZipTruncated { offset });
    }
    Ok(LittleEndian::read_u32(&buf[offset..offset + 4]))
}

/// Backward scan for the EOCD signature, limited to the trailer window
/// (fixed record plus the maximum 65535-byte comment).
pub fn locate_eocd(buf: &[u8]) -> Result<usize> {
    if buf.len() < EOCD_LEN {
        return Err(SealError::ZipEocdMissing);
    }
    let lower_bound = buf.len().saturating_sub(EOCD_LEN + u16::MAX as usize);
    let mut pos = buf.len() - EOCD_LEN;
    loop {
        if LittleEndian::read_u32(&buf[pos..pos + 4]) == EOCD_MAGIC {
            // An archive comment containing the magic bytes can
            // masquerade as the record. The real EOCD's comment length
            // reaches exactly to the end of the file.
            let comment_len = LittleEndian::read_u16(&buf[pos + 20..pos + 22]) as usize;
            if pos + EOCD_LEN + comment_len == buf.len() {
                return Ok(pos);
            }
        }
        if pos == lower_bound {
            return Err(SealError::ZipEocdMissing);
        }
        pos -= 1;
    }
}

/// Walks the central directory into a [Layout].
pub fn parse(buf: &[u8]) -> Result<Layout> {
    let eocd_start = locate_eocd(buf)?;
    let entry_count = u16_at(buf, eocd_start + 10)?;
    let cd_size = u32_at(buf, eocd_start + 12)?;
    let cd_start = u32_at(buf, eocd_start + 16)?;
    if entry_count == u16::MAX || cd_size == u32::MAX || cd_start == u32::MAX {
        return Err(SealError::Zip64Unsupported);
    }
    // The central directory must fit between the entries and the EOCD;
    // an offset pointing past the EOCD would send later slicing out of
    // bounds.
    let cd_start = cd_start as usize;
    if cd_start > eocd_start || cd_start + cd_size as usize > eocd_start {
        return Err(SealError::ZipBadCentralDirectory { offset: cd_start });
    }

    let mut entries = Vec::with_capacity(entry_count as usize);
    let mut pos = cd_start;
    for _ in 0..entry_count {
        if pos + CEN_LEN > eocd_start {
            return Err(SealError::ZipTruncated { offset: pos });
        }
        if u32_at(buf, pos)? != CEN_MAGIC {
            return Err(SealError::ZipBadCentralDirectory { offset: pos });
        }
        let compression_method = u16_at(buf, pos + 10)?;
        let crc32 = u32_at(buf, pos + 16)?;
        let compressed_size = u32_at(buf, pos + 20)?;
        let uncompressed_size = u32_at(buf, pos + 24)?;
        let name_len = u16_at(buf, pos + 28)? as usize;
        let extra_len = u16_at(buf, pos + 30)? as usize;
        let comment_len = u16_at(buf, pos + 32)? as usize;
        let local_header_offset = u32_at(buf, pos + 42)?;
        if compressed_size == u32::MAX
            || uncompressed_size == u32::MAX
            || local_header_offset == u32::MAX
        {
            return Err(SealError::Zip64Unsupported);
        }
        let name_end = pos + CEN_LEN + name_len;
        if name_end > eocd_start {
            return Err(SealError::ZipTruncated { offset: pos });
        }
        entries.push(ZipEntry {
            name: String::from_utf8_lossy(&buf[pos + CEN_LEN..name_end]).into_owned(),
            compression_method,
            crc32,
            compressed_size,
            uncompressed_size,
            local_header_offset,
        });
        pos = name_end + extra_len + comment_len;
    }

    Ok(Layout {
        entries,
        cd_start,
        eocd_start,
    })
}

/// In-place update of the EOCD's central directory offset field.
pub fn patch_cd_offset(buf: &mut [u8], eocd_start: usize, new_cd_start: u32) {
    LittleEndian::write_u32(&mut buf[eocd_start + 16..eocd_start + 20], new_cd_start);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::tests::fixture_apk;

    #[test]
    fn parses_fixture_layout() {
        let apk = fixture_apk();
        let layout = parse(&apk).unwrap();
        assert_eq!(layout.entries.len(), 2);
        assert!(layout.cd_start < layout.eocd_start);
        assert_eq!(layout.eocd_start + EOCD_LEN, apk.len());
        let arsc = layout
            .entries
            .iter()
            .find(|e| e.name == "resources.arsc")
            .unwrap();
        assert!(arsc.is_stored());
        assert_eq!(arsc.compressed_size, arsc.uncompressed_size);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse(&[0u8; 64]),
            Err(SealError::ZipEocdMissing)
        ));
    }

    #[test]
    fn rejects_zip64_sentinels() {
        // A lone EOCD claiming 0xFFFF entries.
        let mut eocd = vec![0u8; EOCD_LEN];
        byteorder::LittleEndian::write_u32(&mut eocd[0..4], EOCD_MAGIC);
        eocd[10] = 0xff;
        eocd[11] = 0xff;
        assert!(matches!(parse(&eocd), Err(SealError::Zip64Unsupported)));
    }

    #[test]
    fn rejects_cd_offset_beyond_eocd() {
        // A lone EOCD claiming 0 entries but a central directory way
        // past the end of the buffer.
        let mut eocd = vec![0u8; EOCD_LEN];
        byteorder::LittleEndian::write_u32(&mut eocd[0..4], EOCD_MAGIC);
        byteorder::LittleEndian::write_u32(&mut eocd[16..20], 0x00ff_ffff);
        assert!(matches!(
            parse(&eocd),
            Err(SealError::ZipBadCentralDirectory { .. })
        ));
    }

    #[test]
    fn rejects_cd_size_overrunning_eocd() {
        let mut apk = fixture_apk();
        let eocd_start = locate_eocd(&apk).unwrap();
        byteorder::LittleEndian::write_u32(&mut apk[eocd_start + 12..eocd_start + 16], 0xffff);
        assert!(matches!(
            parse(&apk),
            Err(SealError::ZipBadCentralDirectory { .. })
        ));
    }

    #[test]
    fn finds_eocd_behind_comment() {
        let mut apk = fixture_apk();
        let eocd_start = locate_eocd(&apk).unwrap();
        let comment = b"trailing archive comment";
        byteorder::LittleEndian::write_u16(
            &mut apk[eocd_start + 20..eocd_start + 22],
            comment.len() as u16,
        );
        apk.extend_from_slice(comment);
        assert_eq!(locate_eocd(&apk).unwrap(), eocd_start);
    }

    #[test]
    fn comment_containing_the_magic_does_not_shadow_the_eocd() {
        let mut apk = fixture_apk();
        let eocd_start = locate_eocd(&apk).unwrap();
        // A comment whose first four bytes spell the EOCD signature.
        let mut comment = vec![0u8; 26];
        byteorder::LittleEndian::write_u32(&mut comment[0..4], EOCD_MAGIC);
        byteorder::LittleEndian::write_u16(
            &mut apk[eocd_start + 20..eocd_start + 22],
            comment.len() as u16,
        );
        apk.extend_from_slice(&comment);
        assert_eq!(locate_eocd(&apk).unwrap(), eocd_start);
    }

    #[test]
    fn patch_cd_offset_is_read_back() {
        let mut apk = fixture_apk();
        let eocd_start = locate_eocd(&apk).unwrap();
        patch_cd_offset(&mut apk, eocd_start, 0x1234);
        let layout_offset = byteorder::LittleEndian::read_u32(&apk[eocd_start + 16..]);
        assert_eq!(layout_offset, 0x1234);
    }
}
