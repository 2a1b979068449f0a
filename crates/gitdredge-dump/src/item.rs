//! Classification and reference extraction for fetched artifacts.
//!
//! Given a repository-relative path and the bytes served for it, decide what
//! the artifact is and which further paths it names. This is the semantic
//! heart of the crawl: refs files point at objects and more refs, commits
//! point at trees and parents, trees point at blobs.

use std::io::Read;

use flate2::read::ZlibDecoder;
use rustc_hash::FxHashSet;
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::paths::{
    hash_to_path, implied_object_hash, is_loose_object, HASH_RE, PATH_HEAD, PATH_INFO_REFS,
    PATH_PACKED_REFS, PATH_PACKS,
};

const REF_PREFIX: &str = "ref: ";

#[derive(Debug, Error)]
pub(crate) enum ParseError {
    #[error("invalid hash <{0}>")]
    InvalidHash(String),

    #[error("malformed refs line `{0}`")]
    RefLine(String),

    #[error("zlib decompression failed")]
    Zlib(#[source] std::io::Error),

    #[error("object data hashes to {actual}, not the name it is served under")]
    Checksum { actual: String },

    #[error("truncated tree entry")]
    TruncatedTree,

    #[error("unsupported git object type `tag`")]
    UnsupportedTag,

    #[error("unrecognized object header")]
    UnknownHeader,
}

/// Decoded kind of a loose object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
    #[default]
    Unknown,
}

/// Knobs the parser takes from the orchestrator.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParseLimits {
    /// Cap on hex-40 matches per scanned file.
    pub(crate) hash_limit: usize,
    /// Keep extracting from objects whose SHA-1 does not match their path.
    pub(crate) ignore_bad_checksum: bool,
    /// Circuit breaker: short-circuit all loose-object parsing.
    pub(crate) objects_skip: bool,
}

/// What extraction produced: the deduplicated set of newly discovered paths
/// plus any per-item errors. Errors never abort the crawl, and the item's
/// raw bytes are persisted regardless.
#[derive(Debug, Default)]
pub(crate) struct Extraction {
    pub(crate) paths: FxHashSet<String>,
    pub(crate) errors: Vec<ParseError>,
}

/// One fetched artifact. Owned by a single worker from fetch through parse,
/// then handed off to the save writer; never mutated concurrently.
#[derive(Debug)]
pub(crate) struct Item {
    pub(crate) path: String,
    pub(crate) data: Vec<u8>,
    /// HTTP status, or -1 when the transport failed before any status line.
    pub(crate) status: i32,
    pub(crate) exists: bool,
    pub(crate) is_object: bool,
    pub(crate) kind: ObjectKind,
}

enum Class {
    Ignore,
    Refs,
    Packs,
    Head,
    Object,
    Scan,
}

fn classify(path: &str) -> Class {
    if path.starts_with("hooks/") {
        Class::Ignore
    } else if path == PATH_PACKED_REFS || path == PATH_INFO_REFS {
        Class::Refs
    } else if path == PATH_PACKS {
        Class::Packs
    } else if path == PATH_HEAD {
        Class::Head
    } else if path.starts_with("objects/pack/") {
        // Pack groups are fetched as opaque blobs; their contents are never
        // walked.
        Class::Ignore
    } else if is_loose_object(path) {
        Class::Object
    } else {
        Class::Scan
    }
}

impl Item {
    pub(crate) fn new(path: &str, data: Vec<u8>, status: i32) -> Self {
        Self {
            path: path.to_string(),
            exists: (100..300).contains(&status),
            is_object: is_loose_object(path),
            kind: ObjectKind::default(),
            data,
            status,
        }
    }

    /// Classify the artifact and collect every further path it references.
    pub(crate) fn extract(&mut self, limits: &ParseLimits) -> Extraction {
        let mut out = Extraction::default();
        if self.data.is_empty() && !self.is_object {
            return out;
        }

        match classify(&self.path) {
            Class::Ignore => {}
            Class::Refs => ref_lines(&String::from_utf8_lossy(&self.data), &mut out),
            Class::Packs => pack_list(&self.data, limits.hash_limit, &mut out),
            Class::Head => head_target(&String::from_utf8_lossy(&self.data), &mut out),
            Class::Object => {
                if !limits.objects_skip {
                    self.extract_object(limits, &mut out);
                }
            }
            Class::Scan => scan_hashes(&self.data, limits.hash_limit, &mut out),
        }
        out
    }

    /// Loose object: decompress, verify the content hash against the path,
    /// then walk whatever the header says the payload is.
    fn extract_object(&mut self, limits: &ParseLimits, out: &mut Extraction) {
        let decoded = match decode_zlib(&self.data) {
            Ok(decoded) => decoded,
            Err(err) => {
                out.errors.push(ParseError::Zlib(err));
                return;
            }
        };

        if let Some(expected) = implied_object_hash(&self.path) {
            let actual = hex::encode(Sha1::digest(&decoded));
            if actual != expected {
                out.errors.push(ParseError::Checksum { actual });
                if !limits.ignore_bad_checksum {
                    return;
                }
            }
        }

        self.kind = object_kind(&decoded);
        match self.kind {
            ObjectKind::Blob => {}
            ObjectKind::Commit => scan_hashes(&decoded, limits.hash_limit, out),
            ObjectKind::Tree => match object_body(&decoded) {
                Some(body) => {
                    if let Err(err) = tree_entries(body, out) {
                        out.errors.push(err);
                    }
                }
                None => out.errors.push(ParseError::TruncatedTree),
            },
            ObjectKind::Tag => out.errors.push(ParseError::UnsupportedTag),
            ObjectKind::Unknown => out.errors.push(ParseError::UnknownHeader),
        }
    }
}

fn decode_zlib(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoded = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut decoded)?;
    Ok(decoded)
}

fn object_kind(decoded: &[u8]) -> ObjectKind {
    if decoded.starts_with(b"blob ") {
        ObjectKind::Blob
    } else if decoded.starts_with(b"tree ") {
        ObjectKind::Tree
    } else if decoded.starts_with(b"commit ") {
        ObjectKind::Commit
    } else if decoded.starts_with(b"tag ") {
        ObjectKind::Tag
    } else {
        ObjectKind::Unknown
    }
}

/// The payload after the `<type> <size>\0` header.
fn object_body(decoded: &[u8]) -> Option<&[u8]> {
    memchr::memchr(0, decoded).map(|nul| &decoded[nul + 1..])
}

/// Line-oriented refs file (`packed-refs`, `info/refs`): every line is
/// `<hash> <refname>`, and both halves become paths. Comments and blank
/// lines are skipped; a malformed line only fails itself.
fn ref_lines(text: &str, out: &mut Extraction) {
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(hash), Some(refname), None) = (fields.next(), fields.next(), fields.next())
        else {
            out.errors.push(ParseError::RefLine(line.to_string()));
            continue;
        };
        match hash_to_path(hash) {
            Ok(path) => {
                out.paths.insert(path);
                out.paths.insert(refname.to_string());
            }
            Err(err) => out.errors.push(err),
        }
    }
}

/// `objects/info/packs`: every hash names a pack group on the server.
fn pack_list(data: &[u8], limit: usize, out: &mut Extraction) {
    for found in HASH_RE.find_iter(data).take(limit) {
        let hash = std::str::from_utf8(found.as_bytes()).expect("hex match is ascii");
        for ext in ["pack", "idx", "rev"] {
            out.paths.insert(format!("objects/pack/pack-{hash}.{ext}"));
        }
    }
}

/// `HEAD` is either symbolic (`ref: refs/heads/x`, which also implies a
/// reflog) or detached (a bare hash).
fn head_target(text: &str, out: &mut Extraction) {
    let text = text.trim();
    if let Some(target) = text.strip_prefix(REF_PREFIX) {
        let target = target.trim();
        out.paths.insert(target.to_string());
        out.paths.insert(format!("logs/{target}"));
        return;
    }
    match hash_to_path(text) {
        Ok(path) => {
            out.paths.insert(path);
        }
        Err(err) => out.errors.push(err),
    }
}

/// Fallback for anything unclassified (reflogs, `FETCH_HEAD`, config, …):
/// sweep the bytes for hex-40 tokens, capped so a pathological file cannot
/// explode the frontier.
fn scan_hashes(data: &[u8], limit: usize, out: &mut Extraction) {
    for found in HASH_RE.find_iter(data).take(limit) {
        let hash = std::str::from_utf8(found.as_bytes()).expect("hex match is ascii");
        if let Ok(path) = hash_to_path(hash) {
            out.paths.insert(path);
        }
    }
}

/// Tree payload: a run of `<mode> SP <name> NUL <20-byte hash>` records.
/// EOF at a record boundary is success; EOF inside a record is an error.
fn tree_entries(mut rest: &[u8], out: &mut Extraction) -> Result<(), ParseError> {
    while !rest.is_empty() {
        let space = memchr::memchr(b' ', rest).ok_or(ParseError::TruncatedTree)?;
        let nul = memchr::memchr(0, &rest[space + 1..]).ok_or(ParseError::TruncatedTree)?;
        let hash_start = space + 1 + nul + 1;
        let hash_end = hash_start + 20;
        if rest.len() < hash_end {
            return Err(ParseError::TruncatedTree);
        }
        let hash = hex::encode(&rest[hash_start..hash_end]);
        out.paths.insert(hash_to_path(&hash)?);
        rest = &rest[hash_end..];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    use super::*;

    fn limits() -> ParseLimits {
        ParseLimits {
            hash_limit: 2_000,
            ignore_bad_checksum: true,
            objects_skip: false,
        }
    }

    fn extract(path: &str, data: &[u8]) -> Extraction {
        Item::new(path, data.to_vec(), 200).extract(&limits())
    }

    fn paths(extraction: &Extraction) -> Vec<&str> {
        let mut paths: Vec<&str> = extraction.paths.iter().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// Zlib-compressed object bytes plus the path git would serve them at.
    fn object(kind: &str, body: &[u8]) -> (String, Vec<u8>) {
        let mut raw = format!("{kind} {}\0", body.len()).into_bytes();
        raw.extend_from_slice(body);
        let hash = hex::encode(Sha1::digest(&raw));
        (hash_to_path(&hash).unwrap(), compress(&raw))
    }

    #[test]
    fn packed_refs_yield_objects_and_refnames() {
        let body = "# pack-refs with: peeled fully-peeled sorted \n\
                    652c5d72790ba74bd7b83f8b2a63bc942c2c304d refs/heads/master\n";
        let out = extract("packed-refs", body.as_bytes());

        assert!(out.errors.is_empty());
        assert_eq!(
            paths(&out),
            [
                "objects/65/2c5d72790ba74bd7b83f8b2a63bc942c2c304d",
                "refs/heads/master",
            ]
        );
    }

    #[test]
    fn info_refs_accepts_tab_separation() {
        let body = "c4689918009781117723d3200f9e876a33fe9e4d\trefs/heads/master";
        let out = extract("info/refs", body.as_bytes());

        assert!(out.errors.is_empty());
        assert_eq!(
            paths(&out),
            [
                "objects/c4/689918009781117723d3200f9e876a33fe9e4d",
                "refs/heads/master",
            ]
        );
    }

    #[test]
    fn malformed_ref_lines_fail_alone() {
        let body = "652c5d72790ba74bd7b83f8b2a63bc942c2c304d\n\
                    \n\
                    c4689918009781117723d3200f9e876a33fe9e4d refs/heads/main\n";
        let out = extract("packed-refs", body.as_bytes());

        assert_eq!(out.errors.len(), 1);
        assert!(matches!(out.errors[0], ParseError::RefLine(_)));
        assert_eq!(
            paths(&out),
            [
                "objects/c4/689918009781117723d3200f9e876a33fe9e4d",
                "refs/heads/main",
            ]
        );
    }

    #[test]
    fn info_packs_expand_to_pack_idx_rev() {
        let body = "P pack-45e49368a99785ecc6638838b6a969a6f40b3516.pack\n";
        let out = extract("objects/info/packs", body.as_bytes());

        assert!(out.errors.is_empty());
        assert_eq!(
            paths(&out),
            [
                "objects/pack/pack-45e49368a99785ecc6638838b6a969a6f40b3516.idx",
                "objects/pack/pack-45e49368a99785ecc6638838b6a969a6f40b3516.pack",
                "objects/pack/pack-45e49368a99785ecc6638838b6a969a6f40b3516.rev",
            ]
        );
    }

    #[test]
    fn symbolic_head_implies_ref_and_reflog() {
        let out = extract("HEAD", b"ref: refs/heads/master\n");

        assert!(out.errors.is_empty());
        assert_eq!(paths(&out), ["logs/refs/heads/master", "refs/heads/master"]);
    }

    #[test]
    fn detached_head_is_a_bare_hash() {
        let out = extract("HEAD", b"652c5d72790ba74bd7b83f8b2a63bc942c2c304d\n");

        assert!(out.errors.is_empty());
        assert_eq!(
            paths(&out),
            ["objects/65/2c5d72790ba74bd7b83f8b2a63bc942c2c304d"]
        );
    }

    #[test]
    fn reflogs_are_swept_for_hashes() {
        let body = "0000000000000000000000000000000000000000 \
                    2b9c3f3aae0c83775239dc2b04301d833382a497 author <a@b> 1742629735 +0100\t\
                    commit (initial): hello\n";
        let out = extract("logs/HEAD", body.as_bytes());

        assert!(out.errors.is_empty());
        assert_eq!(
            paths(&out),
            [
                "objects/00/00000000000000000000000000000000000000",
                "objects/2b/9c3f3aae0c83775239dc2b04301d833382a497",
            ]
        );
    }

    #[test]
    fn hash_scans_respect_the_cap() {
        let mut body = String::new();
        for i in 0..50 {
            body.push_str(&format!("{i:040x}\n"));
        }
        let out = Item::new("logs/HEAD", body.into_bytes(), 200).extract(&ParseLimits {
            hash_limit: 10,
            ignore_bad_checksum: true,
            objects_skip: false,
        });

        assert_eq!(out.paths.len(), 10);
    }

    #[test]
    fn empty_bodies_yield_nothing() {
        for path in ["HEAD", "packed-refs", "logs/HEAD", "info/refs"] {
            let out = extract(path, b"");
            assert!(out.paths.is_empty(), "{path}");
            assert!(out.errors.is_empty(), "{path}");
        }
    }

    #[test]
    fn hook_bodies_are_ignored() {
        let out = extract(
            "hooks/pre-commit",
            b"652c5d72790ba74bd7b83f8b2a63bc942c2c304d",
        );
        assert!(out.paths.is_empty());
    }

    #[test]
    fn pack_blobs_are_opaque() {
        let out = extract("objects/pack/pack-abc.pack", b"PACK\x00\x00\x00\x02garbage");
        assert!(out.paths.is_empty());
        assert!(out.errors.is_empty());
    }

    #[test]
    fn commit_objects_reference_tree_and_parents() {
        let body = "tree b00007014ac2f0fb466f9b853b9c0a929d6cf8a4\n\
                    parent 1e123d74161cd70f3bf678c2142034db220ada91\n\
                    author A <a@b> 1742629735 +0100\n\
                    committer A <a@b> 1742629735 +0100\n\nmeh\n";
        let (path, data) = object("commit", body.as_bytes());
        let mut item = Item::new(&path, data, 200);
        let out = item.extract(&limits());

        assert!(out.errors.is_empty());
        assert_eq!(item.kind, ObjectKind::Commit);
        assert_eq!(
            paths(&out),
            [
                "objects/1e/123d74161cd70f3bf678c2142034db220ada91",
                "objects/b0/0007014ac2f0fb466f9b853b9c0a929d6cf8a4",
            ]
        );
    }

    #[test]
    fn blob_objects_reference_nothing() {
        let (path, data) = object("blob", b"652c5d72790ba74bd7b83f8b2a63bc942c2c304d");
        let mut item = Item::new(&path, data, 200);
        let out = item.extract(&limits());

        assert!(out.errors.is_empty());
        assert_eq!(item.kind, ObjectKind::Blob);
        assert!(out.paths.is_empty());
    }

    #[test]
    fn tree_objects_walk_the_entry_stream() {
        let mut body = Vec::new();
        body.extend_from_slice(b"100644 README.md\0");
        body.extend_from_slice(&[0xAB; 20]);
        body.extend_from_slice(b"40000 src\0");
        body.extend_from_slice(&[0xCD; 20]);
        let (path, data) = object("tree", &body);
        let mut item = Item::new(&path, data, 200);
        let out = item.extract(&limits());

        assert!(out.errors.is_empty());
        assert_eq!(item.kind, ObjectKind::Tree);
        let readme = hash_to_path(&hex::encode([0xABu8; 20])).unwrap();
        let src = hash_to_path(&hex::encode([0xCDu8; 20])).unwrap();
        assert_eq!(paths(&out), [readme.as_str(), src.as_str()]);
    }

    #[test]
    fn empty_trees_parse_cleanly() {
        let (path, data) = object("tree", b"");
        let out = Item::new(&path, data, 200).extract(&limits());

        assert!(out.errors.is_empty());
        assert!(out.paths.is_empty());
    }

    #[test]
    fn truncated_tree_entries_error() {
        let mut body = Vec::new();
        body.extend_from_slice(b"100644 README.md\0");
        body.extend_from_slice(&[0xAB; 7]); // hash cut short
        let (path, data) = object("tree", &body);
        let out = Item::new(&path, data, 200).extract(&limits());

        assert!(matches!(out.errors[..], [ParseError::TruncatedTree]));
        assert!(out.paths.is_empty());
    }

    #[test]
    fn tag_objects_are_unsupported() {
        let (path, data) = object("tag", b"object 652c\ntype commit\n");
        let out = Item::new(&path, data, 200).extract(&limits());

        assert!(matches!(out.errors[..], [ParseError::UnsupportedTag]));
    }

    #[test]
    fn garbage_objects_fail_zlib() {
        let out = extract(
            "objects/65/2c5d72790ba74bd7b83f8b2a63bc942c2c304d",
            b"<html>404</html>",
        );
        assert!(matches!(out.errors[..], [ParseError::Zlib(_)]));
    }

    #[test]
    fn checksum_mismatch_is_flagged_but_still_walked() {
        let body = "tree b00007014ac2f0fb466f9b853b9c0a929d6cf8a4\n";
        let mut raw = format!("commit {}\0", body.len()).into_bytes();
        raw.extend_from_slice(body.as_bytes());
        let data = compress(&raw);

        // Served under a name that is not its hash.
        let path = "objects/65/2c5d72790ba74bd7b83f8b2a63bc942c2c304d";
        let out = Item::new(path, data.clone(), 200).extract(&limits());
        assert!(matches!(out.errors[..], [ParseError::Checksum { .. }]));
        assert_eq!(
            paths(&out),
            ["objects/b0/0007014ac2f0fb466f9b853b9c0a929d6cf8a4"]
        );

        // With the lenient mode off, extraction stops at the mismatch.
        let strict = ParseLimits {
            ignore_bad_checksum: false,
            ..limits()
        };
        let out = Item::new(path, data, 200).extract(&strict);
        assert!(matches!(out.errors[..], [ParseError::Checksum { .. }]));
        assert!(out.paths.is_empty());
    }

    #[test]
    fn the_breaker_short_circuits_objects() {
        let (path, data) = object("commit", b"tree b00007014ac2f0fb466f9b853b9c0a929d6cf8a4\n");
        let skipping = ParseLimits {
            objects_skip: true,
            ..limits()
        };
        let out = Item::new(&path, data, 200).extract(&skipping);

        assert!(out.paths.is_empty());
        assert!(out.errors.is_empty());
    }

    #[test]
    fn existence_follows_the_status_code() {
        assert!(Item::new("HEAD", Vec::new(), 200).exists);
        assert!(!Item::new("HEAD", Vec::new(), 404).exists);
        assert!(!Item::new("HEAD", Vec::new(), 301).exists);
        assert!(!Item::new("HEAD", Vec::new(), 500).exists);
        assert!(!Item::new("HEAD", Vec::new(), -1).exists);
    }
}
