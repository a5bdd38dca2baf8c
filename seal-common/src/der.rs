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

//! Minimal ASN.1 DER toolkit: a tagged-value AST with a recursive
//! tag+length+value encoder, and a reader just capable enough to lift
//! fields out of an X.509 certificate.
//!
//! SEAL builds its PKCS#7 signature block from these primitives directly
//! instead of pulling in a general-purpose CMS library, so the crypto
//! backend stays swappable per target.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{Result, SealError};

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_UTF8_STRING: u8 = 0x0c;
const TAG_PRINTABLE_STRING: u8 = 0x13;
const TAG_IA5_STRING: u8 = 0x16;
const TAG_UTC_TIME: u8 = 0x17;
const TAG_GENERALIZED_TIME: u8 = 0x18;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_SET: u8 = 0x31;
const TAG_CONTEXT_CONSTRUCTED: u8 = 0xa0;

/// id-at-commonName (2.5.4.3), as encoded OID content bytes.
const OID_COMMON_NAME: &[u8] = &[0x55, 0x04, 0x03];

/// A DER value. `Raw` splices a pre-encoded TLV verbatim, which is how
/// certificate-derived structures (issuer, serial, the certificate itself)
/// are embedded without re-modelling X.509.
#[derive(Debug, Clone)]
pub enum Der {
    Sequence(Vec<Der>),
    Set(Vec<Der>),
    /// Context-specific constructed tag `[n]`, IMPLICIT style: the children
    /// are encoded directly as the contents.
    ContextConstructed(u8, Vec<Der>),
    /// Non-negative INTEGER.
    Integer(u64),
    OctetString(Vec<u8>),
    Oid(&'static [u64]),
    Null,
    Raw(Vec<u8>),
}

impl Der {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Der::Sequence(children) => encode_constructed(out, TAG_SEQUENCE, children),
            Der::Set(children) => encode_constructed(out, TAG_SET, children),
            Der::ContextConstructed(n, children) => {
                encode_constructed(out, TAG_CONTEXT_CONSTRUCTED | n, children)
            }
            Der::Integer(value) => encode_integer(out, *value),
            Der::OctetString(bytes) => {
                out.push(TAG_OCTET_STRING);
                encode_length(out, bytes.len());
                out.extend_from_slice(bytes);
            }
            Der::Oid(arcs) => encode_oid(out, arcs),
            Der::Null => out.extend_from_slice(&[TAG_NULL, 0x00]),
            Der::Raw(tlv) => out.extend_from_slice(tlv),
        }
    }
}

fn encode_constructed(out: &mut Vec<u8>, tag: u8, children: &[Der]) {
    let mut contents = Vec::new();
    for child in children {
        child.encode_into(&mut contents);
    }
    out.push(tag);
    encode_length(out, contents.len());
    out.extend_from_slice(&contents);
}

/// Short form below 128, long form (0x80 | byte count, then big-endian
/// bytes) above.
fn encode_length(out: &mut Vec<u8>, length: usize) {
    if length < 128 {
        out.push(length as u8);
    } else {
        let bytes_needed = (usize::BITS as usize - (length.leading_zeros() as usize)).div_ceil(8);
        out.push(0x80 | bytes_needed as u8);
        for i in (0..bytes_needed).rev() {
            out.push(((length >> (i * 8)) & 0xff) as u8);
        }
    }
}

fn encode_integer(out: &mut Vec<u8>, value: u64) {
    out.push(TAG_INTEGER);
    if value == 0 {
        out.extend_from_slice(&[0x01, 0x00]);
        return;
    }
    let mut bytes_needed = ((u64::BITS - value.leading_zeros()) as usize).div_ceil(8);
    // A set top bit would read back as negative, so pad with a zero byte.
    let needs_sign_pad = (value >> (bytes_needed * 8 - 1)) & 1 == 1;
    if needs_sign_pad {
        bytes_needed += 1;
    }
    encode_length(out, bytes_needed);
    if needs_sign_pad {
        out.push(0x00);
        bytes_needed -= 1;
    }
    for i in (0..bytes_needed).rev() {
        out.push(((value >> (i * 8)) & 0xff) as u8);
    }
}

fn encode_oid(out: &mut Vec<u8>, arcs: &[u64]) {
    let mut contents = vec![(arcs[0] * 40 + arcs[1]) as u8];
    for &arc in &arcs[2..] {
        let mut stack = [0u8; 10];
        let mut len = 0;
        let mut value = arc;
        loop {
            stack[len] = (value & 0x7f) as u8;
            len += 1;
            value >>= 7;
            if value == 0 {
                break;
            }
        }
        for i in (0..len).rev() {
            let continuation = if i == 0 { 0 } else { 0x80 };
            contents.push(stack[i] | continuation);
        }
    }
    out.push(TAG_OID);
    encode_length(out, contents.len());
    out.extend_from_slice(&contents);
}

// --- Reading side -----------------------------------------------------------

/// One parsed tag-length-value, with ranges into the original buffer.
#[derive(Debug, Clone, Copy)]
pub struct Tlv {
    pub tag: u8,
    /// Start of the tag byte.
    pub start: usize,
    /// Start of the contents.
    pub contents_start: usize,
    /// End of the contents (== end of the whole TLV).
    pub end: usize,
}

impl Tlv {
    pub fn contents<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.contents_start..self.end]
    }

    pub fn raw<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.start..self.end]
    }
}

/// Reads the TLV starting at `pos`. Only definite lengths are accepted,
/// which is all DER permits.
pub fn read_tlv(buf: &[u8], pos: usize) -> Result<Tlv> {
    let err = || SealError::DerParsingFailed { offset: pos };
    if pos + 2 > buf.len() {
        return Err(err());
    }
    let tag = buf[pos];
    let first = buf[pos + 1];
    let (length, header_len) = if first < 0x80 {
        (first as usize, 2)
    } else {
        let num_bytes = (first & 0x7f) as usize;
        if num_bytes == 0 || num_bytes > 4 || pos + 2 + num_bytes > buf.len() {
            return Err(err());
        }
        let mut length = 0usize;
        for i in 0..num_bytes {
            length = (length << 8) | buf[pos + 2 + i] as usize;
        }
        (length, 2 + num_bytes)
    };
    let contents_start = pos + header_len;
    let end = contents_start.checked_add(length).ok_or_else(err)?;
    if end > buf.len() {
        return Err(err());
    }
    Ok(Tlv {
        tag,
        start: pos,
        contents_start,
        end,
    })
}

/// Iterates the children of a constructed TLV.
fn children(buf: &[u8], parent: Tlv) -> Result<Vec<Tlv>> {
    let mut out = Vec::new();
    let mut pos = parent.contents_start;
    while pos < parent.end {
        let child = read_tlv(buf, pos)?;
        pos = child.end;
        out.push(child);
    }
    Ok(out)
}

/// Fields SEAL needs out of an X.509 certificate: the raw issuer and
/// serial TLVs (spliced into the PKCS#7 SignerInfo), the subject common
/// name and the validity window (keystore metadata).
#[derive(Debug, Clone)]
pub struct CertFields {
    /// serialNumber as a complete INTEGER TLV.
    pub serial: Vec<u8>,
    /// issuer as a complete Name (SEQUENCE) TLV.
    pub issuer: Vec<u8>,
    pub subject_common_name: Option<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// Walks `Certificate -> tbsCertificate -> { serial, issuer, validity,
/// subject }` without fully modelling X.509.
pub fn cert_fields(cert_der: &[u8]) -> Result<CertFields> {
    let certificate = read_tlv(cert_der, 0)?;
    let tbs = read_tlv(cert_der, certificate.contents_start)?;
    let fields = children(cert_der, tbs)?;

    // The leading [0] EXPLICIT version is optional; everything shifts by
    // one when it is present.
    let mut index = 0;
    if fields
        .first()
        .is_some_and(|tlv| tlv.tag == TAG_CONTEXT_CONSTRUCTED)
    {
        index = 1;
    }
    let field = |n: usize| -> Result<Tlv> {
        fields
            .get(index + n)
            .copied()
            .ok_or(SealError::DerParsingFailed { offset: tbs.start })
    };

    let serial = field(0)?;
    let issuer = field(2)?;
    let validity = field(3)?;
    let subject = field(4)?;

    let times = children(cert_der, validity)?;
    if times.len() != 2 {
        return Err(SealError::DerParsingFailed {
            offset: validity.start,
        });
    }

    Ok(CertFields {
        serial: serial.raw(cert_der).to_vec(),
        issuer: issuer.raw(cert_der).to_vec(),
        subject_common_name: find_common_name(cert_der, subject)?,
        not_before: parse_time(cert_der, times[0])?,
        not_after: parse_time(cert_der, times[1])?,
    })
}

/// Name is a SEQUENCE of RDN SETs, each holding
/// `SEQUENCE { type OID, value }`.
fn find_common_name(buf: &[u8], name: Tlv) -> Result<Option<String>> {
    for rdn in children(buf, name)? {
        if rdn.tag != TAG_SET {
            continue;
        }
        for attribute in children(buf, rdn)? {
            let parts = children(buf, attribute)?;
            let [oid, value] = parts.as_slice() else {
                continue;
            };
            if oid.tag != TAG_OID || oid.contents(buf) != OID_COMMON_NAME {
                continue;
            }
            if matches!(
                value.tag,
                TAG_UTF8_STRING | TAG_PRINTABLE_STRING | TAG_IA5_STRING
            ) {
                return Ok(Some(
                    String::from_utf8_lossy(value.contents(buf)).into_owned(),
                ));
            }
        }
    }
    Ok(None)
}

fn parse_time(buf: &[u8], tlv: Tlv) -> Result<DateTime<Utc>> {
    let err = || SealError::DerParsingFailed { offset: tlv.start };
    let text = std::str::from_utf8(tlv.contents(buf)).map_err(|_| err())?;
    let format = match tlv.tag {
        TAG_UTC_TIME => "%y%m%d%H%M%SZ",
        TAG_GENERALIZED_TIME => "%Y%m%d%H%M%SZ",
        _ => return Err(err()),
    };
    let naive = NaiveDateTime::parse_from_str(text, format).map_err(|_| err())?;
    Ok(naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_short_form() {
        let mut buf = Vec::new();
        encode_length(&mut buf, 10);
        assert_eq!(buf, vec![10]);
    }

    #[test]
    fn length_long_form() {
        let mut buf = Vec::new();
        encode_length(&mut buf, 256);
        assert_eq!(buf, vec![0x82, 0x01, 0x00]);
    }

    #[test]
    fn integer_one() {
        assert_eq!(Der::Integer(1).encode(), vec![0x02, 0x01, 0x01]);
    }

    #[test]
    fn integer_high_bit_gets_sign_pad() {
        assert_eq!(Der::Integer(128).encode(), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(Der::Integer(256).encode(), vec![0x02, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn oid_sha256() {
        // 2.16.840.1.101.3.4.2.1
        let der = Der::Oid(&[2, 16, 840, 1, 101, 3, 4, 2, 1]).encode();
        assert_eq!(
            der,
            vec![0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01]
        );
    }

    #[test]
    fn nested_sequence_round_trips_through_reader() {
        let doc = Der::Sequence(vec![
            Der::Integer(1),
            Der::Set(vec![Der::OctetString(vec![0xab; 200])]),
        ])
        .encode();
        let root = read_tlv(&doc, 0).unwrap();
        assert_eq!(root.tag, TAG_SEQUENCE);
        assert_eq!(root.end, doc.len());
        let kids = children(&doc, root).unwrap();
        assert_eq!(kids.len(), 2);
        assert_eq!(kids[0].tag, TAG_INTEGER);
        assert_eq!(kids[1].tag, TAG_SET);
    }

    #[test]
    fn truncated_tlv_is_rejected() {
        let mut doc = Der::OctetString(vec![1, 2, 3, 4]).encode();
        doc.truncate(doc.len() - 1);
        assert!(read_tlv(&doc, 0).is_err());
    }

    fn fake_cert(cn_value: Der) -> Vec<u8> {
        // Just enough of a Certificate for cert_fields: serial, a
        // signature algorithm, issuer, validity, subject.
        let name = |cn: Der| {
            Der::Sequence(vec![Der::Set(vec![Der::Sequence(vec![
                Der::Raw(vec![0x06, 0x03, 0x55, 0x04, 0x03]),
                cn,
            ])])])
        };
        let utc = |text: &str| {
            let mut tlv = vec![TAG_UTC_TIME, text.len() as u8];
            tlv.extend_from_slice(text.as_bytes());
            Der::Raw(tlv)
        };
        let tbs = Der::Sequence(vec![
            Der::ContextConstructed(0, vec![Der::Integer(2)]),
            Der::Integer(0x1234),
            Der::Sequence(vec![Der::Oid(&[1, 2, 840, 113549, 1, 1, 11]), Der::Null]),
            name(Der::Raw(Der::Sequence(vec![]).encode())),
            Der::Sequence(vec![utc("260101000000Z"), utc("510101000000Z")]),
            name(cn_value),
        ]);
        Der::Sequence(vec![tbs]).encode()
    }

    #[test]
    fn cert_fields_extracts_serial_cn_and_validity() {
        let utf8_cn = {
            let mut tlv = vec![TAG_UTF8_STRING, 4];
            tlv.extend_from_slice(b"SEAL");
            Der::Raw(tlv)
        };
        let cert = fake_cert(utf8_cn);
        let fields = cert_fields(&cert).unwrap();
        assert_eq!(fields.serial, vec![0x02, 0x02, 0x12, 0x34]);
        assert_eq!(fields.subject_common_name.as_deref(), Some("SEAL"));
        assert_eq!(fields.not_before.format("%Y").to_string(), "2026");
        assert_eq!(fields.not_after.format("%Y").to_string(), "2051");
        // issuer is the fourth field: an empty inner Name here
        assert_eq!(fields.issuer[0], TAG_SEQUENCE);
    }
}
