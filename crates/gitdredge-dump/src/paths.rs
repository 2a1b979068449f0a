//! Path vocabulary of a `.git` directory: the well-known seed set, the
//! hash-to-object-path mapping, and the shared hex-40 scanner.

use std::sync::LazyLock;

use gitdredge_index::ObjectId;
use regex::bytes::Regex;

use crate::item::ParseError;

pub(crate) static HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[0-9a-f]{40}").unwrap());

pub(crate) const ROOT_DIR: &str = ".git";
pub(crate) const PATH_INDEX: &str = "index";
pub(crate) const PATH_HEAD: &str = "HEAD";
pub(crate) const PATH_PACKS: &str = "objects/info/packs";
pub(crate) const PATH_PACKED_REFS: &str = "packed-refs";
pub(crate) const PATH_INFO_REFS: &str = "info/refs";

/// Paths worth probing on every repository, whether or not anything
/// references them: refs and their logs, config files, and the stock hooks.
pub(crate) static WELL_KNOWN: &[&str] = &[
    PATH_HEAD,
    PATH_PACKS,
    PATH_PACKED_REFS,
    PATH_INFO_REFS,
    "COMMIT_EDITMSG",
    "FETCH_HEAD",
    "ORIG_HEAD",
    "config",
    "description",
    "info/exclude",
    "logs/HEAD",
    "logs/stash",
    "logs/refs/heads/master",
    "logs/refs/heads/main",
    "logs/refs/heads/origin",
    "logs/refs/remotes/origin/HEAD",
    "logs/refs/remotes/origin/master",
    "logs/refs/remotes/origin/main",
    "refs/heads/master",
    "refs/heads/main",
    "refs/heads/origin",
    "refs/remotes/origin/HEAD",
    "refs/remotes/origin/master",
    "refs/remotes/origin/main",
    "hooks/applypatch-msg",
    "hooks/applypatch-msg.sample",
    "hooks/commit-msg",
    "hooks/commit-msg.sample",
    "hooks/fsmonitor-watchman",
    "hooks/fsmonitor-watchman.sample",
    "hooks/post-commit",
    "hooks/post-commit.sample",
    "hooks/post-receive",
    "hooks/post-receive.sample",
    "hooks/post-update",
    "hooks/post-update.sample",
    "hooks/pre-applypatch",
    "hooks/pre-applypatch.sample",
    "hooks/pre-commit",
    "hooks/pre-commit.sample",
    "hooks/pre-merge-commit",
    "hooks/pre-merge-commit.sample",
    "hooks/pre-push",
    "hooks/pre-push.sample",
    "hooks/pre-rebase",
    "hooks/pre-rebase.sample",
    "hooks/pre-receive",
    "hooks/pre-receive.sample",
    "hooks/prepare-commit-msg",
    "hooks/prepare-commit-msg.sample",
    "hooks/push-to-checkout",
    "hooks/push-to-checkout.sample",
    "hooks/sendemail-validate",
    "hooks/sendemail-validate.sample",
    "hooks/update",
    "hooks/update.sample",
];

/// True for paths holding a loose object, i.e. everything under `objects/`
/// except the pack files and `objects/info/`.
pub(crate) fn is_loose_object(path: &str) -> bool {
    path.strip_prefix("objects/")
        .is_some_and(|rest| !rest.starts_with("pack/") && !rest.starts_with("info/"))
}

/// Canonical object path for a 40-character hex hash:
/// `objects/<first two>/<remaining 38>`.
pub(crate) fn hash_to_path(hash: &str) -> Result<String, ParseError> {
    let hash = hash.trim();
    if hash.len() != 40 || !hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(ParseError::InvalidHash(hash.to_string()));
    }
    Ok(format!("objects/{}/{}", &hash[..2], &hash[2..]))
}

/// [`hash_to_path`] for an already-decoded object id, which is valid by
/// construction.
pub(crate) fn object_path(id: &ObjectId) -> String {
    let hex = id.to_hex();
    format!("objects/{}/{}", &hex[..2], &hex[2..])
}

/// The hash an object served at `path` must decompress to, when the path has
/// the canonical `objects/<xx>/<38 hex>` shape.
pub(crate) fn implied_object_hash(path: &str) -> Option<String> {
    let rest = path.strip_prefix("objects/")?;
    let (prefix, suffix) = rest.split_once('/')?;
    if prefix.len() != 2 || suffix.len() != 38 {
        return None;
    }
    let hash = format!("{prefix}{suffix}");
    hash_to_path(&hash).ok().map(|_| hash)
}
