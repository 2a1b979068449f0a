//! Decoder for the Git `index` file (the binary `DIRC` format).
//!
//! Only the entry list is decoded: each entry yields its path, object id and
//! a few stat fields. Extensions and the trailing checksum are skipped, since
//! the dump engine needs nothing beyond the set of referenced blobs.

use std::fmt;

use thiserror::Error;

/// The 4-byte magic at the start of every Git index file.
pub const SIGNATURE: &[u8] = b"DIRC";

/// Index versions this decoder understands.
const SUPPORTED_VERSIONS: [u32; 3] = [2, 3, 4];

/// Bit in the entry flags marking an extended (version 3+) entry.
const FLAG_EXTENDED: u16 = 0x4000;

/// Mask for the name-length field in the entry flags.
const NAME_LENGTH_MASK: u16 = 0x0FFF;

/// Byte length of the fixed-width portion of an on-disk entry.
const ENTRY_FIXED_LEN: usize = 62;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not a git index: missing DIRC signature")]
    Signature,
    #[error("unsupported index version {0}")]
    Version(u32),
    #[error("index entry {0}: unexpected end of data")]
    Truncated(usize),
    #[error("index entry {0}: name prefix is longer than the previous name")]
    BadPrefix(usize),
}

/// A 20-byte SHA-1 object id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// The 40-character lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

/// One index entry: a tracked path and the blob it points at.
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub id: ObjectId,
    pub size: u32,
    /// Creation time, seconds since the epoch.
    pub ctime: u32,
    /// Modification time, seconds since the epoch.
    pub mtime: u32,
}

/// A decoded index file.
#[derive(Debug)]
pub struct Index {
    pub version: u32,
    pub entries: Vec<Entry>,
}

/// Returns true if `data` looks like a Git index file.
///
/// This is the probe predicate: at least five bytes, starting with `DIRC`.
pub fn is_index(data: &[u8]) -> bool {
    data.len() >= 5 && data.starts_with(SIGNATURE)
}

impl Index {
    /// Decode the entry list from a raw index buffer.
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        if !is_index(data) {
            return Err(Error::Signature);
        }

        let mut reader = Reader::new(data, 0);
        reader.skip(SIGNATURE.len())?;
        let version = reader.read_u32()?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(Error::Version(version));
        }
        let count = reader.read_u32()? as usize;

        let mut entries = Vec::with_capacity(count.min(u16::MAX as usize));
        let mut previous_name = String::new();
        for i in 0..count {
            reader.entry = i;
            let entry = read_entry(&mut reader, version, &previous_name)?;
            previous_name.clone_from(&entry.name);
            entries.push(entry);
        }

        Ok(Self { version, entries })
    }
}

fn read_entry(reader: &mut Reader<'_>, version: u32, previous_name: &str) -> Result<Entry, Error> {
    let start = reader.pos;

    let ctime = reader.read_u32()?;
    reader.skip(4)?; // ctime nanoseconds
    let mtime = reader.read_u32()?;
    reader.skip(4)?; // mtime nanoseconds
    reader.skip(4 * 5)?; // dev, ino, mode, uid, gid
    let size = reader.read_u32()?;

    let mut id = [0u8; 20];
    id.copy_from_slice(reader.read_bytes(20)?);

    let flags = reader.read_u16()?;
    if flags & FLAG_EXTENDED != 0 {
        reader.skip(2)?; // version 3 extended flags
    }

    let name = if version == 4 {
        // Version 4 prefix-compresses names: a varint strip count against the
        // previous entry's name, then a NUL-terminated suffix. No padding.
        let strip = reader.read_varint()? as usize;
        let keep = previous_name
            .len()
            .checked_sub(strip)
            .ok_or(Error::BadPrefix(reader.entry))?;
        let suffix = reader.read_until_nul()?;
        let mut name = previous_name[..keep].to_string();
        name.push_str(&String::from_utf8_lossy(suffix));
        name
    } else {
        let name_len = (flags & NAME_LENGTH_MASK) as usize;
        let raw = if name_len < NAME_LENGTH_MASK as usize {
            reader.read_bytes(name_len)?
        } else {
            reader.read_until_nul()?
        };
        let name = String::from_utf8_lossy(raw).into_owned();

        // Entries are NUL-padded to a multiple of eight bytes, with at least
        // one NUL terminating the name.
        let consumed = reader.pos - start;
        let padded = (consumed + 8) & !7;
        reader.skip(padded - consumed)?;
        name
    };

    Ok(Entry {
        name,
        id: ObjectId::from_bytes(id),
        size,
        ctime,
        mtime,
    })
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    entry: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], entry: usize) -> Self {
        Self { buf, pos: 0, entry }
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(Error::Truncated(self.entry))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn skip(&mut self, n: usize) -> Result<(), Error> {
        self.read_bytes(n).map(|_| ())
    }

    fn read_u16(&mut self) -> Result<u16, Error> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, Error> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_until_nul(&mut self) -> Result<&'a [u8], Error> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or(Error::Truncated(self.entry))?;
        self.pos += nul + 1;
        Ok(&rest[..nul])
    }

    /// Git's chained varint encoding, as used for version 4 name prefixes.
    fn read_varint(&mut self) -> Result<u64, Error> {
        let mut byte = self.read_bytes(1)?[0];
        let mut value = u64::from(byte & 0x7F);
        while byte & 0x80 != 0 {
            byte = self.read_bytes(1)?[0];
            value = value
                .checked_add(1)
                .and_then(|v| v.checked_mul(128))
                .map(|v| v + u64::from(byte & 0x7F))
                .ok_or(Error::Truncated(self.entry))?;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build an on-disk version 2 index with the given `(name, id, size)`
    /// entries. Stat times are fixed so the output is deterministic.
    fn encode_v2(entries: &[(&str, [u8; 20], u32)]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(SIGNATURE);
        buf.extend_from_slice(&2u32.to_be_bytes());
        buf.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        for (name, id, size) in entries {
            let start = buf.len();
            buf.extend_from_slice(&1700000000u32.to_be_bytes()); // ctime
            buf.extend_from_slice(&0u32.to_be_bytes());
            buf.extend_from_slice(&1700000100u32.to_be_bytes()); // mtime
            buf.extend_from_slice(&0u32.to_be_bytes());
            for _ in 0..5 {
                buf.extend_from_slice(&0u32.to_be_bytes()); // dev, ino, mode, uid, gid
            }
            buf.extend_from_slice(&size.to_be_bytes());
            buf.extend_from_slice(id);
            buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
            buf.extend_from_slice(name.as_bytes());
            let padded = (buf.len() - start + 8) & !7;
            buf.resize(start + padded, 0);
        }
        buf
    }

    fn id(byte: u8) -> [u8; 20] {
        [byte; 20]
    }

    #[test]
    fn decode_v2_entries() {
        let data = encode_v2(&[
            ("README.md", id(0xab), 120),
            ("src/main.rs", id(0xcd), 4096),
        ]);
        let index = Index::decode(&data).unwrap();

        assert_eq!(index.version, 2);
        assert_eq!(index.entries.len(), 2);
        assert_eq!(index.entries[0].name, "README.md");
        assert_eq!(index.entries[0].id.to_hex(), "ab".repeat(20));
        assert_eq!(index.entries[0].size, 120);
        assert_eq!(index.entries[0].ctime, 1700000000);
        assert_eq!(index.entries[0].mtime, 1700000100);
        assert_eq!(index.entries[1].name, "src/main.rs");
        assert_eq!(index.entries[1].id.to_hex(), "cd".repeat(20));
    }

    #[test]
    fn decode_empty_index() {
        let data = encode_v2(&[]);
        let index = Index::decode(&data).unwrap();
        assert!(index.entries.is_empty());
    }

    #[test]
    fn decode_v4_prefix_compression() {
        // Two entries sharing the `src/` prefix: "src/a.rs" then "src/b.rs"
        // (strip 4 from the previous name, append "b.rs").
        let mut buf = Vec::new();
        buf.extend_from_slice(SIGNATURE);
        buf.extend_from_slice(&4u32.to_be_bytes());
        buf.extend_from_slice(&2u32.to_be_bytes());
        for (strip, suffix, byte) in [(0u8, "src/a.rs", 0x11), (4, "b.rs", 0x22)] {
            buf.extend_from_slice(&[0u8; 36]); // times + stat fields
            buf.extend_from_slice(&64u32.to_be_bytes()); // size
            buf.extend_from_slice(&id(byte));
            buf.extend_from_slice(&8u16.to_be_bytes()); // flags: name length
            buf.push(strip);
            buf.extend_from_slice(suffix.as_bytes());
            buf.push(0);
        }

        let index = Index::decode(&buf).unwrap();
        assert_eq!(index.entries[0].name, "src/a.rs");
        assert_eq!(index.entries[1].name, "src/b.rs");
    }

    #[test]
    fn rejects_missing_signature() {
        assert!(matches!(
            Index::decode(b"<html>not a repo</html>"),
            Err(Error::Signature)
        ));
        assert!(!is_index(b"DIR"));
        assert!(!is_index(b""));
        assert!(is_index(b"DIRC\x00\x00\x00\x02"));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut data = Vec::from(SIGNATURE);
        data.extend_from_slice(&9u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        assert!(matches!(Index::decode(&data), Err(Error::Version(9))));
    }

    #[test]
    fn rejects_truncated_entry() {
        let mut data = encode_v2(&[("README.md", id(0xab), 120)]);
        data.truncate(data.len() - 16);
        assert!(matches!(Index::decode(&data), Err(Error::Truncated(0))));
    }
}
