mod common;

use affs::volume::{FsFlag, SecondaryType, tail};
use affs::{
    Bitmap, BlockId, CheckOptions, Error, EntryKind, FormatOptions, Problem, ProblemKind, Walker,
    detect_format, find_root,
};
use common::{MIB, Volume};

fn forced() -> CheckOptions {
    CheckOptions {
        force: true,
        ..CheckOptions::default()
    }
}

fn is_already_allocated(kind: &ProblemKind) -> bool {
    matches!(kind, ProblemKind::AlreadyAllocated)
}

#[test]
fn clean_volume_is_skipped_unless_forced() {
    let vol = Volume::format(MIB, &FormatOptions::new("Empty"));

    let report = affs::check(&vol.dev, &CheckOptions::default()).unwrap();
    assert!(report.clean);
    assert!(report.skipped);
    assert_eq!(b"Empty", report.name.as_slice());

    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert!(!report.skipped);
    assert!(report.is_consistent());
}

#[test]
fn empty_volume_only_holds_root_and_bitmap() {
    let vol = Volume::format(4 * MIB, &FormatOptions::new("Empty"));
    let (geo, root) = find_root(&vol.dev, 2, Default::default()).unwrap();
    let flags = detect_format(&vol.store).unwrap();

    let mut bitmap = Bitmap::new(&geo);
    assert_eq!(0, bitmap.load(&vol.store, &root));
    let report = Walker::new(&vol.store, &mut bitmap, &geo, flags)
        .walk_volume(&root)
        .unwrap();
    assert!(report.entries.is_empty());
    assert!(report.problems.is_empty());

    let used = (geo.reserved..geo.blocks)
        .map(BlockId::new)
        .filter(|&id| bitmap.is_allocated(id))
        .collect::<Vec<_>>();
    let mut expected = vec![geo.root];
    expected.extend_from_slice(bitmap.pages());
    expected.sort();
    assert_eq!(expected, used);
    assert!(bitmap.diff().is_empty());
}

#[test]
fn ofs_file_of_ten_thousand_bytes() {
    let mut opts = FormatOptions::new("Work");
    opts.flags = FsFlag::Ofs.into();
    let mut vol = Volume::format(16 * MIB, &opts);
    let root = vol.geo.root;
    let (key, data) = vol.add_file(root, "readme", 10000);
    assert_eq!(21, data.len());

    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert_eq!(512, report.geometry.block_size.bytes());
    assert_eq!(488, report.geometry.data_block_size);
    assert!(report.flags.contains(FsFlag::Ofs));
    assert!(report.discrepancy.is_empty());
    assert!(report.is_consistent());

    let [entry] = report.walk.entries.as_slice() else {
        panic!("expected one entry, got {:?}", report.walk.entries);
    };
    assert_eq!(key, entry.key);
    assert_eq!(b"readme", entry.name.as_slice());
    assert_eq!(
        EntryKind::File {
            byte_size: 10000,
            data_blocks: 21,
            extensions: 0
        },
        entry.kind
    );
}

#[test]
fn nested_tree_with_links() {
    let mut vol = Volume::format(8 * MIB, &FormatOptions::new("Tree"));
    let root = vol.geo.root;
    let docs = vol.add_dir(root, "docs");
    let sub = vol.add_dir(docs, "old");
    vol.add_file(sub, "a", 1000);
    vol.add_file(docs, "b", 0);
    vol.add_link(docs, "c", SecondaryType::SoftLink);
    vol.add_link(root, "d", SecondaryType::LinkDir);
    vol.add_link(sub, "e", SecondaryType::LinkFile);

    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert!(report.is_consistent(), "{:?}", report.walk.problems);
    assert_eq!(7, report.walk.entries.len());

    let parent_of = |name: &str| {
        report
            .walk
            .entries
            .iter()
            .find(|e| e.name == name.as_bytes())
            .map(|e| e.parent)
            .unwrap()
    };
    assert_eq!(docs, parent_of("old"));
    assert_eq!(sub, parent_of("a"));
    assert_eq!(root, parent_of("d"));
}

#[test]
fn hash_chains_are_followed() {
    let mut vol = Volume::format(4 * MIB, &FormatOptions::new("Chain"));
    let root = vol.geo.root;
    let table = vol.geo.block_size.table_size() as u32;

    // 两个块号模表长同余，落进同一个桶
    let (first, _) = vol.add_file(root, "first", 0);
    while (vol.alloc().get() + 1) % table != first.get() % table {}
    let second = vol.add_dir(root, "second");
    assert_eq!(first.get() % table, second.get() % table);

    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert_eq!(2, report.walk.entries.len());
    // 夹在两者之间被占用的块无人引用
    assert_eq!(
        (second.get() - first.get() - 1) as usize,
        report.discrepancy.orphaned.len()
    );
}

#[test]
fn corrupt_bitmap_blocks_write_back() {
    let vol = Volume::format(16 * MIB, &FormatOptions::new("Bad"));
    let page = vol.root().bitmap_page(0);
    vol.corrupt(page, 100);

    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert_eq!(1, report.unreadable_bitmap_blocks);
    assert!(!report.is_consistent());

    let opts = CheckOptions {
        write: true,
        ..forced()
    };
    assert!(matches!(
        affs::check(&vol.dev, &opts),
        Err(Error::AbortDueToPriorErrors(1))
    ));
}

#[test]
fn shared_data_block_is_reported_once() {
    let mut vol = Volume::format(4 * MIB, &FormatOptions::new("Shared"));
    let root = vol.geo.root;
    let (_, data) = vol.add_file(root, "one", 1500);
    vol.add_file(root, "two", 10);

    let third = vol.alloc();
    vol.write_file(third, root, "three", 512, &data[1..2]);

    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert_eq!(3, report.walk.entries.len());
    assert_eq!(1, report.walk.count(is_already_allocated));
    let problem = report
        .walk
        .problems
        .iter()
        .find(|p| is_already_allocated(&p.kind))
        .unwrap();
    assert_eq!(data[1], problem.block);
    assert!(!problem.warning);
}

#[test]
fn extension_blocks_hold_the_rest_of_the_table() {
    let mut vol = Volume::format(4 * MIB, &FormatOptions::new("Big"));
    let root = vol.geo.root;
    let table = vol.geo.block_size.table_size() as u32;
    let byte_size = (2 * table + 5) * 512;
    vol.add_file(root, "big", byte_size);

    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert!(report.is_consistent(), "{:?}", report.walk.problems);
    assert_eq!(
        EntryKind::File {
            byte_size,
            data_blocks: 2 * table + 5,
            extensions: 2
        },
        report.walk.entries[0].kind
    );
}

#[test]
fn leaked_and_orphaned_blocks() {
    let mut vol = Volume::format(4 * MIB, &FormatOptions::new("Diff"));
    let root = vol.geo.root;
    let (_, data) = vol.add_file(root, "f", 2000);
    vol.mark_free(data[2]);
    let stray = vol.alloc();

    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert!(report.walk.problems.is_empty());
    assert_eq!(vec![data[2]], report.discrepancy.leaked);
    assert_eq!(vec![stray], report.discrepancy.orphaned);
    assert_eq!(2, report.discrepancy.total());
}

#[test]
fn hash_chain_cycle_terminates() {
    let mut vol = Volume::format(4 * MIB, &FormatOptions::new("Loop"));
    let root = vol.geo.root;
    let dir = vol.add_dir(root, "dir");
    let (file, _) = vol.add_file(dir, "f", 100);
    vol.patch(file, |block| block.set_tail_word(tail::HASH_CHAIN, file.get()));

    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert_eq!(2, report.walk.entries.len());
    assert_eq!(1, report.walk.count(is_already_allocated));
    assert!(report.discrepancy.is_empty());
}

#[test]
fn directory_loop_terminates() {
    let mut vol = Volume::format(4 * MIB, &FormatOptions::new("Loop"));
    let root = vol.geo.root;
    let outer = vol.add_dir(root, "outer");
    let inner = vol.add_dir(outer, "inner");
    vol.link(inner, outer);

    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert_eq!(2, report.walk.entries.len());
    assert_eq!(1, report.walk.count(is_already_allocated));
}

#[test]
fn bad_checksum_abandons_the_chain_only() {
    let mut vol = Volume::format(4 * MIB, &FormatOptions::new("Sum"));
    let root = vol.geo.root;
    let (bad, data) = vol.add_file(root, "bad", 1000);
    vol.add_file(root, "good", 1000);
    vol.corrupt(bad, 30);

    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert_eq!(1, report.walk.entries.len());
    assert_eq!(b"good", report.walk.entries[0].name.as_slice());
    assert_eq!(
        1,
        report
            .walk
            .count(|kind| matches!(kind, ProblemKind::BadChecksum(_)))
    );

    let mut orphaned = vec![bad];
    orphaned.extend(data);
    assert_eq!(orphaned, report.discrepancy.orphaned);
}

#[test]
fn wrong_key_and_size_mismatch() {
    let mut vol = Volume::format(4 * MIB, &FormatOptions::new("Keys"));
    let root = vol.geo.root;
    let (file, data) = vol.add_file(root, "f", 3 * 512);
    vol.patch(file, |block| {
        block.set_word(1, 7);
        block.set_tail_word(tail::BYTE_SIZE, 512);
    });

    let report = affs::check(&vol.dev, &forced()).unwrap();
    let kinds = report
        .walk
        .problems
        .iter()
        .map(|p| (p.kind.clone(), p.warning))
        .collect::<Vec<_>>();
    assert!(kinds.contains(&(ProblemKind::WrongKey { found: BlockId::new(7) }, false)));
    assert!(kinds.contains(&(ProblemKind::BeyondFileSize(data[1]), true)));
    assert!(kinds.contains(&(ProblemKind::BeyondFileSize(data[2]), true)));
    assert_eq!(1, report.walk.errors());
    assert_eq!(vec![data[1], data[2]], report.discrepancy.orphaned);

    let strict = CheckOptions {
        strict: true,
        ..forced()
    };
    let report = affs::check(&vol.dev, &strict).unwrap();
    assert_eq!(3, report.walk.errors());
    assert_eq!(0, report.walk.warnings());
}

#[test]
fn block_count_mismatch_is_a_warning() {
    let mut vol = Volume::format(4 * MIB, &FormatOptions::new("Count"));
    let root = vol.geo.root;
    let (file, _) = vol.add_file(root, "f", 2 * 512);
    vol.patch(file, |block| block.set_word(2, 5));

    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert_eq!(
        vec![ProblemKind::BlockCount {
            declared: 5,
            found: 2
        }],
        report
            .walk
            .problems
            .iter()
            .map(|p| p.kind.clone())
            .collect::<Vec<_>>()
    );
    assert_eq!(0, report.walk.errors());
    assert!(report.is_consistent());
}

#[test]
fn write_back_repairs_the_bitmap() {
    let mut vol = Volume::format(4 * MIB, &FormatOptions::new("Fix"));
    let root = vol.geo.root;
    let (_, data) = vol.add_file(root, "f", 5000);
    vol.mark_free(data[0]);
    vol.alloc();
    vol.patch(root, |block| block.set_tail_word(tail::BITMAP_FLAG, 0));

    let report = affs::check(&vol.dev, &CheckOptions::default()).unwrap();
    assert!(!report.clean);
    assert_eq!(2, report.discrepancy.total());
    assert!(!report.written);

    let opts = CheckOptions {
        write: true,
        ..CheckOptions::default()
    };
    assert!(affs::check(&vol.dev, &opts).unwrap().written);

    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert!(report.clean);
    assert!(report.is_consistent());
}

#[test]
fn write_is_refused_on_read_only_runs() {
    let vol = Volume::format(MIB, &FormatOptions::new("Ro"));
    let opts = CheckOptions {
        write: true,
        read_only: true,
        ..forced()
    };
    assert!(matches!(affs::check(&vol.dev, &opts), Err(Error::ReadOnly)));
    assert!(matches!(
        affs::clear_bitmap_flag(&vol.dev, &opts),
        Err(Error::ReadOnly)
    ));
}

#[test]
fn clearing_the_flag_forces_a_check() {
    let vol = Volume::format(MIB, &FormatOptions::new("Clear"));
    assert!(vol.root().bitmap_valid());

    affs::clear_bitmap_flag(&vol.dev, &CheckOptions::default()).unwrap();
    let root = vol.root();
    assert!(!root.bitmap_valid());
    assert!(root.is_root());

    let report = affs::check(&vol.dev, &CheckOptions::default()).unwrap();
    assert!(!report.clean);
    assert!(!report.skipped);
}

#[test]
fn dir_caches_are_claimed() {
    let mut opts = FormatOptions::new("Cache");
    opts.flags = FsFlag::DirCache.into();
    let mut vol = Volume::format(4 * MIB, &opts);
    let root = vol.geo.root;
    vol.add_dir_cache(root, 2);
    let dir = vol.add_dir(root, "dir");
    let chain = vol.add_dir_cache(dir, 3);
    vol.add_file(dir, "f", 700);

    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert!(report.flags.contains(FsFlag::DirCache));
    assert!(report.is_consistent(), "{:?}", report.walk.problems);

    vol.corrupt(chain[1], 64);
    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert_eq!(
        1,
        report
            .walk
            .count(|kind| matches!(kind, ProblemKind::BadChecksum(_)))
    );
    assert_eq!(vec![chain[1], chain[2]], report.discrepancy.orphaned);
}

#[test]
fn dangling_pointers_are_structural_problems() {
    let mut vol = Volume::format(MIB, &FormatOptions::new("Dangle"));
    let root = vol.geo.root;
    let blocks = vol.geo.blocks;
    let (file, _) = vol.add_file(root, "f", 10);
    vol.patch(file, |block| block.set_tail_word(tail::HASH_CHAIN, blocks + 10));

    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert_eq!(1, report.walk.entries.len());
    assert_eq!(
        1,
        report
            .walk
            .count(|kind| matches!(kind, ProblemKind::OutOfRange))
    );
}

#[test]
fn unknown_secondary_type_skips_the_entry() {
    let mut vol = Volume::format(4 * MIB, &FormatOptions::new("Stype"));
    let root = vol.geo.root;
    let (odd, data) = vol.add_file(root, "f", 10);
    vol.add_file(root, "g", 10);
    vol.patch(odd, |block| block.set_tail_word(tail::SECONDARY_TYPE, 77));

    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert_eq!(
        vec![Problem {
            block: odd,
            kind: ProblemKind::UnknownType(77),
            warning: false
        }],
        report.walk.problems
    );
    let [entry] = report.walk.entries.as_slice() else {
        panic!("expected one entry, got {:?}", report.walk.entries);
    };
    assert_eq!(b"g", entry.name.as_slice());
    assert_eq!(vec![odd, data[0]], report.discrepancy.orphaned);
}

#[test]
fn foreign_block_types_are_errors() {
    let mut vol = Volume::format(4 * MIB, &FormatOptions::new("Types"));
    let root = vol.geo.root;
    let (rooted, _) = vol.add_file(root, "rooted", 10);
    let (mistyped, _) = vol.add_file(root, "mistyped", 10);
    vol.add_file(root, "fine", 10);
    vol.patch(rooted, |block| {
        block.set_tail_word(tail::SECONDARY_TYPE, SecondaryType::Root.raw())
    });
    vol.patch(mistyped, |block| block.set_word(0, 3));

    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert_eq!(1, report.walk.entries.len());
    assert_eq!(2, report.walk.errors());
    let kinds = report
        .walk
        .problems
        .iter()
        .map(|p| (p.block, p.kind.clone()))
        .collect::<Vec<_>>();
    assert!(kinds.contains(&(rooted, ProblemKind::UnexpectedRoot)));
    assert!(kinds.contains(&(mistyped, ProblemKind::BadPrimaryType(3))));
}

#[test]
fn truncated_extension_chain_misses_data() {
    let mut vol = Volume::format(4 * MIB, &FormatOptions::new("Short"));
    let root = vol.geo.root;
    let table = vol.geo.block_size.table_size();
    let (file, data) = vol.add_file(root, "f", (table as u32 + 3) * 512);
    let ext = BlockId::new(data[table + 2].get() + 1);
    vol.patch(file, |block| block.set_tail_word(tail::EXTENSION, 0));

    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert_eq!(
        vec![Problem {
            block: file,
            kind: ProblemKind::MissingData(3),
            warning: true
        }],
        report.walk.problems
    );
    let mut orphaned = data[table..].to_vec();
    orphaned.push(ext);
    assert_eq!(orphaned, report.discrepancy.orphaned);

    let strict = CheckOptions {
        strict: true,
        ..forced()
    };
    let report = affs::check(&vol.dev, &strict).unwrap();
    assert_eq!(1, report.walk.errors());
}

#[test]
fn extension_past_the_file_size_is_left_unclaimed() {
    let mut vol = Volume::format(4 * MIB, &FormatOptions::new("Long"));
    let root = vol.geo.root;
    let table = vol.geo.block_size.table_size();
    let (file, data) = vol.add_file(root, "f", (table as u32 + 3) * 512);
    let ext = BlockId::new(data[table + 2].get() + 1);
    vol.patch(file, |block| {
        block.set_tail_word(tail::BYTE_SIZE, table as u32 * 512)
    });

    let report = affs::check(&vol.dev, &forced()).unwrap();
    assert_eq!(
        vec![Problem {
            block: ext,
            kind: ProblemKind::ExtensionBeyondSize,
            warning: true
        }],
        report.walk.problems
    );
    assert_eq!(
        EntryKind::File {
            byte_size: table as u32 * 512,
            data_blocks: table as u32,
            extensions: 0
        },
        report.walk.entries[0].kind
    );
    let mut orphaned = data[table..].to_vec();
    orphaned.push(ext);
    assert_eq!(orphaned, report.discrepancy.orphaned);
}

#[test]
fn wrong_parent_is_tolerated_even_when_strict() {
    let mut vol = Volume::format(4 * MIB, &FormatOptions::new("Parent"));
    let root = vol.geo.root;
    let dir = vol.add_dir(root, "dir");
    let (file, _) = vol.add_file(dir, "f", 10);
    vol.patch(file, |block| block.set_tail_word(tail::PARENT, root.get()));

    let strict = CheckOptions {
        strict: true,
        ..forced()
    };
    for opts in [forced(), strict] {
        let report = affs::check(&vol.dev, &opts).unwrap();
        assert_eq!(2, report.walk.entries.len());
        assert_eq!(
            vec![Problem {
                block: file,
                kind: ProblemKind::WrongParent {
                    found: root,
                    expected: dir
                },
                warning: true
            }],
            report.walk.problems
        );
        assert!(report.is_consistent());
    }
}
