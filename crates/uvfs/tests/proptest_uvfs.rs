//! Property-based tests for the uvfs core using proptest.
//!
//! Covers the POSIX security mapping, directory buffer paging and
//! resumable reparse point resolution.

use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use uvfs::dir_buffer::{DirBufferConfig, DirectoryBuffer};
use uvfs::reparse::ReparsePointResolver;
use uvfs::security::{SecurityDescriptor, SecurityInformation};
use uvfs::types::{DirEntry, FileInfo, ReparseData};
use uvfs::volume::DirBufferAcquire;
use uvfs::{PosixOwnership, SecurityTranslator};

/// Directory entry names: short, unique after collection into a set.
fn any_names() -> impl Strategy<Value = BTreeSet<String>> {
    proptest::collection::btree_set("[a-zA-Z0-9_.]{1,20}", 0..60)
}

fn component() -> impl Strategy<Value = String> {
    prop_oneof![Just("a"), Just("b"), Just("c"), Just("d")].prop_map(str::to_string)
}

fn any_path() -> impl Strategy<Value = String> {
    proptest::collection::vec(component(), 1..6).prop_map(|parts| {
        parts.iter().fold(String::new(), |mut out, p| {
            out.push('\\');
            out.push_str(p);
            out
        })
    })
}

fn any_target() -> impl Strategy<Value = String> {
    prop_oneof![
        any_path(),
        (component(), component()).prop_map(|(a, b)| format!("..\\{}\\{}", a, b)),
        component(),
    ]
}

fn any_links() -> impl Strategy<Value = HashMap<String, ReparseData>> {
    proptest::collection::hash_map(any_path(), any_target().prop_map(ReparseData::symlink), 0..6)
}

fn count_components(path: &str) -> usize {
    path.split('\\').filter(|c| !c.is_empty()).count()
}

proptest! {
    /// Encoding ownership into a descriptor and decoding it again keeps
    /// uid, gid and the nine permission bits.
    #[test]
    fn test_posix_descriptor_round_trip(uid in any::<u32>(), gid in any::<u32>(), mode in 0u32..0o10000) {
        let bytes = SecurityTranslator::posix_to_bytes(PosixOwnership::new(uid, gid, mode));
        let back = SecurityTranslator::bytes_to_posix(&bytes).unwrap();
        prop_assert_eq!(back, PosixOwnership::new(uid, gid, mode & 0o777));
    }

    /// The self-relative encoding is lossless for generated descriptors.
    #[test]
    fn test_descriptor_bytes_round_trip(uid in any::<u32>(), gid in any::<u32>(), mode in 0u32..0o1000) {
        let sd = SecurityTranslator::posix_to_descriptor(PosixOwnership::new(uid, gid, mode));
        let back = SecurityDescriptor::from_bytes(&sd.to_bytes()).unwrap();
        prop_assert_eq!(back, sd);
    }

    /// Replacing only the DACL keeps the original owner and group.
    #[test]
    fn test_evolve_dacl_keeps_owner(mode_a in 0u32..0o1000, mode_b in 0u32..0o1000) {
        let original = SecurityTranslator::posix_to_descriptor(PosixOwnership::new(10, 20, mode_a));
        let modification = SecurityTranslator::posix_to_descriptor(PosixOwnership::new(30, 40, mode_b));
        let evolved = original
            .evolve(SecurityInformation(SecurityInformation::DACL), &modification)
            .unwrap();
        let posix = SecurityTranslator::descriptor_to_posix(&evolved).unwrap();
        prop_assert_eq!(posix.uid, 10);
        prop_assert_eq!(posix.gid, 20);
        prop_assert_eq!(evolved.dacl(), modification.dacl());
    }

    /// Paging through a filled buffer yields every entry exactly once, in
    /// name order, with no page exceeding the requested capacity.
    #[test]
    fn test_directory_paging_is_complete(names in any_names(), capacity in 144usize..2048) {
        let buffer = DirectoryBuffer::new(DirBufferConfig {
            capacity_bytes: usize::MAX,
            acquire: DirBufferAcquire::Block,
        });
        let mut fill = buffer.acquire(true).unwrap().unwrap();
        // Reverse order on purpose; the buffer sorts on release.
        for name in names.iter().rev() {
            prop_assert!(fill.fill(DirEntry::new(name.clone(), FileInfo::default())));
        }
        fill.release();

        let mut seen = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let page = buffer.read(marker.as_deref(), capacity).unwrap();
            if page.is_end() {
                prop_assert!(page.next_marker.is_none());
                break;
            }
            prop_assert!(page.bytes_transferred <= capacity);
            let total: usize = page.entries.iter().map(DirEntry::record_len).sum();
            prop_assert_eq!(total, page.bytes_transferred);
            seen.extend(page.entries.iter().map(|e| e.name.clone()));
            marker = page.next_marker;
        }
        let expected: Vec<String> = names.into_iter().collect();
        prop_assert_eq!(seen, expected);
    }

    /// Entries beyond the fill capacity are dropped, never partially kept.
    #[test]
    fn test_fill_respects_capacity(names in any_names(), capacity in 0usize..4096) {
        let buffer = DirectoryBuffer::new(DirBufferConfig {
            capacity_bytes: capacity,
            acquire: DirBufferAcquire::Block,
        });
        let mut fill = buffer.acquire(true).unwrap().unwrap();
        let mut accepted = 0usize;
        let mut bytes = 0usize;
        for name in &names {
            let entry = DirEntry::new(name.clone(), FileInfo::default());
            let len = entry.record_len();
            if fill.fill(entry) {
                accepted += 1;
                bytes += len;
            }
        }
        fill.release();
        prop_assert!(bytes <= capacity);
        prop_assert_eq!(buffer.len(), accepted);
        prop_assert_eq!(buffer.stats().dropped_entries as usize, names.len() - accepted);
    }

    /// Resuming resolution from any index up to the first reparse point
    /// gives the same answer as resolving from the start.
    #[test]
    fn test_resolve_restart_equivalence(
        links in any_links(),
        path in any_path(),
        resolve_last in any::<bool>(),
    ) {
        let resolver = ReparsePointResolver::new(8);
        let lookup = |name: &str, _dir: bool| -> uvfs::Result<Option<ReparseData>> {
            Ok(links.get(name).cloned())
        };
        let full = resolver.resolve(&path, 0, resolve_last, lookup);
        let limit = full.reparse_index.unwrap_or_else(|| count_components(&path));
        for start in 0..=limit {
            let lookup = |name: &str, _dir: bool| -> uvfs::Result<Option<ReparseData>> {
                Ok(links.get(name).cloned())
            };
            let resumed = resolver.resolve(&path, start, resolve_last, lookup);
            prop_assert_eq!(&resumed, &full);
        }
    }

    /// Resolution always terminates within the substitution bound.
    #[test]
    fn test_resolve_is_bounded(links in any_links(), path in any_path(), depth in 1u32..10) {
        let resolver = ReparsePointResolver::new(depth);
        let lookup = |name: &str, _dir: bool| -> uvfs::Result<Option<ReparseData>> {
            Ok(links.get(name).cloned())
        };
        let r = resolver.resolve(&path, 0, true, lookup);
        prop_assert!(r.substitutions <= depth);
    }
}
