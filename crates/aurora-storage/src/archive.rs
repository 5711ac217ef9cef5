// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::StorageError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{trace, warn};

const RE_TIME: &str = r"(?P<time>\d+)";
const RE_NAME: &str = r"(?P<name>[a-z0-9][a-z0-9@._+-]+)";
const RE_VER: &str = r"(?P<ver>[a-z0-9_.:]+-\d+)";
const RE_ARCH: &str = r"(?P<arch>i686|x86_64|any)";
const RE_EXT: &str = r"(?P<ext>tar(?:\.(?:gz|bz2|xz|zst|lrz|lzo|sz))?)";

fn full_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(r"^{RE_TIME}\.{RE_NAME}-{RE_VER}-{RE_ARCH}\.pkg\.{RE_EXT}$"))
            .unwrap_or_else(|err| unreachable!("archive pattern must compile: {err}"))
    })
}

fn bare_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(r"^{RE_NAME}-{RE_VER}-{RE_ARCH}\.pkg\.{RE_EXT}$"))
            .unwrap_or_else(|err| unreachable!("archive pattern must compile: {err}"))
    })
}

/// A parsed repository archive filename:
/// `<time>.<name>-<ver>-<arch>.pkg.<ext>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveName {
    /// Unix timestamp prefix distinguishing rebuilds of the same version.
    pub time: u64,
    /// Package name.
    pub name: String,
    /// Full version including the pkgrel suffix, e.g. `1.2.3-1`.
    pub ver: String,
    /// Target architecture: `i686`, `x86_64` or `any`.
    pub arch: String,
    /// Archive extension, `tar` optionally followed by a compressor suffix.
    pub ext: String,
}

impl ArchiveName {
    /// Parse a repository basename; `None` when it is not an archive of ours.
    pub fn parse(basename: &str) -> Option<Self> {
        let captures = full_pattern().captures(basename)?;
        Some(Self {
            time: captures["time"].parse().ok()?,
            name: captures["name"].to_string(),
            ver: captures["ver"].to_string(),
            arch: captures["arch"].to_string(),
            ext: captures["ext"].to_string(),
        })
    }

    /// Whether `basename` is the timestamp-less form a build container
    /// deposits (`<name>-<ver>-<arch>.pkg.<ext>`).
    pub fn is_bare(basename: &str) -> bool {
        bare_pattern().is_match(basename)
    }

    /// The full basename this archive carries in the repository.
    pub fn basename(&self) -> String {
        format!(
            "{}.{}-{}-{}.pkg.{}",
            self.time, self.name, self.ver, self.arch, self.ext
        )
    }
}

/// Retention policy for on-disk archives of one package.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    /// How many distinct versions to keep.
    pub versions: usize,
    /// How many archives to keep within each surviving version.
    pub builds_per_version: usize,
}

/// Prune archives of `package` under `dir` down to the `history` policy.
///
/// Versions beyond `history.versions` are dropped smallest-first (string
/// order, so the lexicographically-greatest versions survive); within each
/// surviving version only the `builds_per_version` newest timestamps are
/// kept. Returns the removed paths. Deletion is a local unlink; the
/// repository database is reconciled separately by the indexer.
pub fn cleanup_repository_directory(
    dir: &Path,
    package: &str,
    history: History,
) -> Result<Vec<PathBuf>, StorageError> {
    let entries = fs::read_dir(dir).map_err(|source| StorageError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    // ver -> [(time, basename)]
    let mut builds: BTreeMap<String, Vec<(u64, String)>> = BTreeMap::new();
    for entry in entries.flatten() {
        let basename = entry.file_name().to_string_lossy().into_owned();
        let Some(archive) = ArchiveName::parse(&basename) else {
            continue;
        };
        if archive.name != package {
            continue;
        }

        builds
            .entry(archive.ver)
            .or_default()
            .push((archive.time, basename));
    }

    let mut trash = Vec::new();

    if builds.len() > history.versions {
        let excess = builds.len() - history.versions;
        // BTreeMap iterates versions in ascending order, so the first
        // `excess` keys are the smallest ones.
        let doomed: Vec<String> = builds.keys().take(excess).cloned().collect();
        for version in doomed {
            if let Some(archives) = builds.remove(&version) {
                trash.extend(archives.into_iter().map(|(_, basename)| basename));
            }
        }
    }

    for archives in builds.values_mut() {
        if archives.len() <= history.builds_per_version {
            continue;
        }

        archives.sort_by(|a, b| b.0.cmp(&a.0));
        trash.extend(
            archives
                .split_off(history.builds_per_version)
                .into_iter()
                .map(|(_, basename)| basename),
        );
    }

    let mut removed = Vec::with_capacity(trash.len());
    for basename in trash {
        let path = dir.join(&basename);
        trace!(path = %path.display(), "removing old archive");

        match fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unable to remove old archive");
            }
        }
    }

    Ok(removed)
}

/// The newest archive basename of `package` under `dir`, by timestamp.
pub fn newest_archive(dir: &Path, package: &str) -> Option<String> {
    let entries = fs::read_dir(dir).ok()?;

    entries
        .flatten()
        .filter_map(|entry| {
            let basename = entry.file_name().to_string_lossy().into_owned();
            let archive = ArchiveName::parse(&basename)?;
            (archive.name == package).then_some((archive.time, basename))
        })
        .max_by_key(|(time, _)| *time)
        .map(|(_, basename)| basename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_canonical_filename() {
        let archive =
            ArchiveName::parse("1700000000.tree-sitter-cli-0.20.8-1-x86_64.pkg.tar.zst").unwrap();
        assert_eq!(archive.time, 1_700_000_000);
        assert_eq!(archive.name, "tree-sitter-cli");
        assert_eq!(archive.ver, "0.20.8-1");
        assert_eq!(archive.arch, "x86_64");
        assert_eq!(archive.ext, "tar.zst");
    }

    #[test]
    fn accepts_grammar_union() {
        // `any` arch and `zst` compression are part of the accepted union,
        // as is a plain uncompressed tar and an epoch-style version.
        for name in [
            "1.aa-1.0-1-any.pkg.tar",
            "2.a@b-2:1.0-3-i686.pkg.tar.gz",
            "3.foo_bar-0.1_2-1-x86_64.pkg.tar.lrz",
        ] {
            assert!(ArchiveName::parse(name).is_some(), "expected {name:?} to parse");
        }
    }

    #[test]
    fn rejects_foreign_filenames() {
        for name in [
            "aurora.db.tar",
            "aa-1.0-1-x86_64.pkg.tar.zst",        // missing time prefix
            "1.aa-1.0-1-armv7h.pkg.tar.zst",      // unknown arch
            "1.aa-1.0-1-x86_64.pkg.tar.br",       // unknown compressor
            "1.Aa-1.0-1-x86_64.pkg.tar.zst",      // uppercase name
            "x.aa-1.0-1-x86_64.pkg.tar.zst",      // non-numeric time
            "1.aa-1.0-x86_64.pkg.tar.zst",        // version without pkgrel
        ] {
            assert!(ArchiveName::parse(name).is_none(), "expected {name:?} to be rejected");
        }
    }

    #[test]
    fn bare_form_is_recognized() {
        assert!(ArchiveName::is_bare("aa-1.0-1-x86_64.pkg.tar.zst"));
        assert!(!ArchiveName::is_bare("1.aa-1.0-1-x86_64.pkg.tar.zst"));
        assert!(!ArchiveName::is_bare("aa.tar.gz"));
    }

    proptest! {
        #[test]
        fn basename_roundtrips(
            time in 0u64..=u64::MAX / 2,
            name in "[a-z0-9][a-z0-9@._+-]{1,20}",
            ver in "[a-z0-9_.:]{1,10}-[0-9]{1,3}",
            arch_idx in 0usize..3,
            ext_idx in 0usize..8,
        ) {
            let arch = ["i686", "x86_64", "any"][arch_idx];
            let ext = ["tar", "tar.gz", "tar.bz2", "tar.xz", "tar.zst", "tar.lrz", "tar.lzo", "tar.sz"][ext_idx];
            let original = ArchiveName {
                time,
                name,
                ver,
                arch: arch.into(),
                ext: ext.into(),
            };
            let parsed = ArchiveName::parse(&original.basename());
            prop_assert_eq!(parsed, Some(original));
        }
    }

    fn touch(dir: &Path, basename: &str) {
        fs::write(dir.join(basename), b"archive").unwrap();
    }

    fn survivors(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn sweep_keeps_greatest_versions_and_newest_builds() {
        let dir = tempfile::tempdir().unwrap();
        for ver in ["1.0-1", "1.0-2", "1.0-3"] {
            for time in [100, 200] {
                touch(dir.path(), &format!("{time}.foo-{ver}-x86_64.pkg.tar.zst"));
            }
        }

        let removed = cleanup_repository_directory(
            dir.path(),
            "foo",
            History {
                versions: 2,
                builds_per_version: 1,
            },
        )
        .unwrap();

        assert_eq!(removed.len(), 4);
        assert_eq!(
            survivors(dir.path()),
            vec![
                "200.foo-1.0-2-x86_64.pkg.tar.zst".to_string(),
                "200.foo-1.0-3-x86_64.pkg.tar.zst".to_string(),
            ]
        );
    }

    #[test]
    fn sweep_ignores_other_packages() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "100.foo-1.0-1-x86_64.pkg.tar.zst");
        touch(dir.path(), "100.foo-git-1.0-1-x86_64.pkg.tar.zst");
        touch(dir.path(), "aurora.db.tar");

        let removed = cleanup_repository_directory(
            dir.path(),
            "foo",
            History {
                versions: 1,
                builds_per_version: 1,
            },
        )
        .unwrap();

        assert!(removed.is_empty());
        assert_eq!(survivors(dir.path()).len(), 3);
    }

    #[test]
    fn sweep_within_policy_removes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "100.foo-1.0-1-x86_64.pkg.tar.zst");

        let removed = cleanup_repository_directory(
            dir.path(),
            "foo",
            History {
                versions: 3,
                builds_per_version: 3,
            },
        )
        .unwrap();
        assert!(removed.is_empty());
    }

    #[test]
    fn newest_archive_prefers_highest_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "100.foo-1.0-1-x86_64.pkg.tar.zst");
        touch(dir.path(), "300.foo-1.0-2-x86_64.pkg.tar.zst");
        touch(dir.path(), "200.foo-1.0-3-x86_64.pkg.tar.zst");
        touch(dir.path(), "900.bar-1.0-1-x86_64.pkg.tar.zst");

        assert_eq!(
            newest_archive(dir.path(), "foo"),
            Some("300.foo-1.0-2-x86_64.pkg.tar.zst".to_string())
        );
        assert_eq!(newest_archive(dir.path(), "baz"), None);
    }
}
