//! C1: Container Parser.
//!
//! Decodes the LIF binary framing and hands back the raw JSON descriptor
//! bytes plus a lookup table from blob id to byte slice. Normalization
//! into a [`crate::capture::Capture`] happens one layer up in
//! [`crate::capture`]; this module only understands bytes and offsets.

use std::collections::HashMap;

use crate::{Error, Result};

const MAGIC: u16 = 0x1E1A;
const FIELD_TYPE_JSON_META: u32 = 7;
const FIELD_TYPE_JSON_META_NEW: u32 = 8;

/// One `{field_type, field_size, field_data}` entry from the metadata
/// region.
struct Field<'a> {
    field_type: u32,
    data: &'a [u8],
}

/// The result of splitting a `.lif` file into its metadata fields. Blob
/// references are resolved lazily by [`resolve_blob`] against the
/// original buffer, since most blobs (full-resolution images) are large
/// and callers decode them on demand.
pub struct Container<'a> {
    bytes: &'a [u8],
    fields: Vec<Field<'a>>,
}

impl<'a> Container<'a> {
    /// Parses the trailing magic, `region_offset`, and metadata field
    /// table out of `bytes`. Does not touch the JSON descriptor or any
    /// blob payload.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < 6 {
            return Err(Error::TruncatedContainer(
                "file shorter than the trailing magic + region_offset".into(),
            ));
        }

        let magic = u16::from_be_bytes([bytes[bytes.len() - 2], bytes[bytes.len() - 1]]);
        if magic != MAGIC {
            return Err(Error::NotACapture);
        }

        let region_offset_bytes = &bytes[bytes.len() - 6..bytes.len() - 2];
        let region_offset =
            u32::from_be_bytes(region_offset_bytes.try_into().expect("4 byte slice")) as usize;

        let region_start = bytes
            .len()
            .checked_sub(region_offset)
            .ok_or_else(|| Error::TruncatedContainer("region_offset past start of file".into()))?;

        let mut cursor = region_start;
        let field_count = read_u32(bytes, &mut cursor)?;

        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let field_type = read_u32(bytes, &mut cursor)?;
            let field_size = read_u32(bytes, &mut cursor)? as usize;
            let end = cursor
                .checked_add(field_size)
                .ok_or_else(|| Error::TruncatedContainer("field_size overflow".into()))?;
            if end > bytes.len() {
                return Err(Error::TruncatedContainer(
                    "field_data runs past end of file".into(),
                ));
            }
            fields.push(Field {
                field_type,
                data: &bytes[cursor..end],
            });
            cursor = end;
        }

        Ok(Self { bytes, fields })
    }

    /// Returns the JSON descriptor bytes, preferring `JSON_META_NEW`
    /// (field type 8) over the legacy `JSON_META` (field type 7).
    pub fn json_descriptor(&self) -> Result<&'a [u8]> {
        self.fields
            .iter()
            .find(|f| f.field_type == FIELD_TYPE_JSON_META_NEW)
            .or_else(|| self.fields.iter().find(|f| f.field_type == FIELD_TYPE_JSON_META))
            .map(|f| f.data)
            .ok_or(Error::MissingMetadata)
    }

    /// Builds a `blob_id -> bytes` table from the field list for every
    /// field type other than the JSON descriptors themselves.
    pub fn blob_table(&self) -> HashMap<u32, &'a [u8]> {
        self.fields
            .iter()
            .filter(|f| f.field_type != FIELD_TYPE_JSON_META && f.field_type != FIELD_TYPE_JSON_META_NEW)
            .map(|f| (f.field_type, f.data))
            .collect()
    }

    /// Resolves a blob reference per §3: `-1` means "the whole container
    /// file, interpreted as JPEG"; any other id is looked up in the blob
    /// table by field type.
    pub fn resolve_blob(&self, blob_id: i64) -> Result<&'a [u8]> {
        if blob_id == -1 {
            return Ok(self.bytes);
        }
        let blob_id_u32 =
            u32::try_from(blob_id).map_err(|_| Error::InvalidBlobReference(blob_id))?;
        self.blob_table()
            .get(&blob_id_u32)
            .copied()
            .ok_or(Error::InvalidBlobReference(blob_id))
    }
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    let end = cursor
        .checked_add(4)
        .ok_or_else(|| Error::TruncatedContainer("u32 read past end of file".into()))?;
    if end > bytes.len() {
        return Err(Error::TruncatedContainer("u32 read past end of file".into()));
    }
    let v = u32::from_be_bytes(bytes[*cursor..end].try_into().expect("4 byte slice"));
    *cursor = end;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_container(json: &[u8], blobs: &[(u32, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        let region_start = out.len();
        // placeholder, overwritten below once we know region_offset
        let mut region = Vec::new();
        let field_count = 1 + blobs.len() as u32;
        region.extend_from_slice(&field_count.to_be_bytes());
        region.extend_from_slice(&8u32.to_be_bytes()); // JSON_META_NEW
        region.extend_from_slice(&(json.len() as u32).to_be_bytes());
        region.extend_from_slice(json);
        for (ty, data) in blobs {
            region.extend_from_slice(&ty.to_be_bytes());
            region.extend_from_slice(&(data.len() as u32).to_be_bytes());
            region.extend_from_slice(data);
        }
        out.extend_from_slice(&region);
        let region_offset = (out.len() - region_start) as u32;
        out.extend_from_slice(&region_offset.to_be_bytes());
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out
    }

    #[test]
    fn parses_json_and_blob_table() {
        let json = br#"{"views":[]}"#;
        let blob = b"blobdata";
        let bytes = build_container(json, &[(3, blob)]);

        let container = Container::parse(&bytes).expect("parse");
        assert_eq!(container.json_descriptor().expect("json"), json);
        assert_eq!(container.resolve_blob(3).expect("blob"), blob);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = build_container(b"{}", &[]);
        let len = bytes.len();
        bytes[len - 1] = 0x00;
        assert!(matches!(Container::parse(&bytes), Err(Error::NotACapture)));
    }

    #[test]
    fn blob_id_minus_one_is_whole_file() {
        let bytes = build_container(br#"{}"#, &[]);
        let container = Container::parse(&bytes).expect("parse");
        assert_eq!(container.resolve_blob(-1).expect("whole file"), bytes.as_slice());
    }

    #[test]
    fn truncated_file_is_rejected() {
        let bytes = [0u8; 3];
        assert!(matches!(
            Container::parse(&bytes),
            Err(Error::TruncatedContainer(_))
        ));
    }
}
