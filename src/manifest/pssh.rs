//! PSSH box construction/parsing and PlayReady→Widevine translation.
//!
//! Box layout follows ISO/IEC 23001-7 (`pssh` box: size, type, version,
//! flags, `system_id`, optional KID list, data). Parsing uses `byteorder`
//! for the fixed-width big-endian fields, the same crate the teacher uses
//! elsewhere for binary parsing (DESIGN.md).

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

use crate::error::{Error, Result};
use crate::model::Kid;

pub const WIDEVINE_SYSTEM_ID: [u8; 16] = [
    0xed, 0xef, 0x8b, 0xa9, 0x79, 0xd6, 0x4a, 0xce,
    0xa3, 0xc8, 0x27, 0xdc, 0xd5, 0x1d, 0x21, 0xed,
];

pub const PLAYREADY_SYSTEM_ID: [u8; 16] = [
    0x9a, 0x04, 0xf0, 0x79, 0x98, 0x40, 0x42, 0x86,
    0xab, 0x92, 0xe6, 0x5b, 0xe0, 0x88, 0x5f, 0x95,
];

#[derive(Debug, Clone)]
pub struct Pssh {
    pub version: u8,
    pub system_id: [u8; 16],
    pub key_ids: Vec<[u8; 16]>,
    pub data: Vec<u8>,
}

impl Pssh {
    /// Parse a `pssh` box (with or without the outer 8-byte size+fourcc
    /// header — manifests sometimes embed only the payload).
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(bytes);
        let mut peek = [0u8; 4];
        if bytes.len() >= 8 {
            peek.copy_from_slice(&bytes[4..8]);
        }
        if &peek == b"pssh" {
            cur.set_position(8);
        }
        let version_and_flags = cur.read_u32::<BigEndian>()
            .map_err(|e| Error::ManifestError(format!("reading pssh version/flags: {e}")))?;
        let version = (version_and_flags >> 24) as u8;
        let mut system_id = [0u8; 16];
        std::io::Read::read_exact(&mut cur, &mut system_id)
            .map_err(|e| Error::ManifestError(format!("reading pssh system_id: {e}")))?;
        let mut key_ids = Vec::new();
        if version >= 1 {
            let count = cur.read_u32::<BigEndian>()
                .map_err(|e| Error::ManifestError(format!("reading pssh kid count: {e}")))?;
            for _ in 0..count {
                let mut kid = [0u8; 16];
                std::io::Read::read_exact(&mut cur, &mut kid)
                    .map_err(|e| Error::ManifestError(format!("reading pssh kid: {e}")))?;
                key_ids.push(kid);
            }
        }
        let data_size = cur.read_u32::<BigEndian>()
            .map_err(|e| Error::ManifestError(format!("reading pssh data size: {e}")))? as usize;
        let pos = cur.position() as usize;
        let data = bytes.get(pos..pos + data_size)
            .ok_or_else(|| Error::ManifestError("pssh data size exceeds box length".into()))?
            .to_vec();
        Ok(Pssh { version, system_id, key_ids, data })
    }

    /// Serialize back to a full `pssh` box, including the 8-byte
    /// size+fourcc header.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        let version_and_flags: u32 = (self.version as u32) << 24;
        payload.write_u32::<BigEndian>(version_and_flags).unwrap();
        payload.write_all(&self.system_id).unwrap();
        if self.version >= 1 {
            payload.write_u32::<BigEndian>(self.key_ids.len() as u32).unwrap();
            for kid in &self.key_ids {
                payload.write_all(kid).unwrap();
            }
        }
        payload.write_u32::<BigEndian>(self.data.len() as u32).unwrap();
        payload.write_all(&self.data).unwrap();

        let mut out = Vec::with_capacity(8 + payload.len());
        out.write_u32::<BigEndian>((8 + payload.len()) as u32).unwrap();
        out.write_all(b"pssh").unwrap();
        out.write_all(&payload).unwrap();
        out
    }

    pub fn is_widevine(&self) -> bool {
        self.system_id == WIDEVINE_SYSTEM_ID
    }

    pub fn is_playready(&self) -> bool {
        self.system_id == PLAYREADY_SYSTEM_ID
    }
}

/// Build a minimal Widevine PSSH box carrying a single KID, for services
/// that only expose a PlayReady WRMHEADER (spec §4.4: CDMs expect a
/// Widevine-shaped PSSH even when the manifest only carries PlayReady).
/// The Widevine `data` payload is the protobuf-encoded `WidevineCencHeader`
/// with just the `key_id` field (tag 2, length-delimited) set, which every
/// production CDM accepts even without `algorithm`/`provider` populated.
pub fn playready_to_widevine(kid: &Kid) -> Result<Vec<u8>> {
    let kid_hex = kid.as_hex();
    let mut raw = [0u8; 16];
    for i in 0..16 {
        raw[i] = u8::from_str_radix(&kid_hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| Error::ManifestError("invalid kid hex".into()))?;
    }
    let mut data = Vec::new();
    data.push(0x12); // field 2, wire type 2 (length-delimited)
    data.push(16);
    data.extend_from_slice(&raw);
    let pssh = Pssh {
        version: 0,
        system_id: WIDEVINE_SYSTEM_ID,
        key_ids: Vec::new(),
        data,
    };
    Ok(pssh.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let pssh = Pssh {
            version: 1,
            system_id: WIDEVINE_SYSTEM_ID,
            key_ids: vec![[0x11; 16]],
            data: vec![1, 2, 3, 4],
        };
        let bytes = pssh.to_bytes();
        let parsed = Pssh::parse(&bytes).unwrap();
        assert_eq!(parsed.version, 1);
        assert!(parsed.is_widevine());
        assert_eq!(parsed.key_ids, vec![[0x11; 16]]);
        assert_eq!(parsed.data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn playready_translation_embeds_kid() {
        let kid = Kid::from_hex("00112233445566778899aabbccddeeff").unwrap();
        let bytes = playready_to_widevine(&kid).unwrap();
        let pssh = Pssh::parse(&bytes).unwrap();
        assert!(pssh.is_widevine());
        assert_eq!(&pssh.data[2..18], &[0x00,0x11,0x22,0x33,0x44,0x55,0x66,0x77,0x88,0x99,0xaa,0xbb,0xcc,0xdd,0xee,0xff]);
    }
}
