mod common;

use bufzip::{Archive, ExtractError, IndexError, OpenError, ReadOptions, UseAfterClose};
use common::{ArchiveBuilder, LOCAL_HEADER_SIZE, TestEntry, noise, reference_crc, sample_text};
use flate2::Compression;

fn strict() -> ReadOptions {
    ReadOptions::new().with_verify_crc(true)
}

#[test]
fn stored_entries() {
    let data = ArchiveBuilder::new()
        .stored("hello.txt", b"hi")
        .directory("docs/")
        .stored("docs/readme.md", b"# readme\n")
        .build();

    let archive = Archive::open_with(data, strict()).unwrap();
    assert_eq!(archive.entry_count().unwrap(), 3);

    let hello = archive.extract(0).unwrap();
    assert_eq!(hello.name, "hello.txt");
    assert_eq!(hello.size, 2);
    assert_eq!(hello.crc32, reference_crc(b"hi"));
    assert_eq!(hello.content.as_deref(), Some(&b"hi"[..]));

    let docs = archive.extract(1).unwrap();
    assert!(docs.is_directory);
    assert_eq!(docs.content, None);

    let readme = archive.extract(2).unwrap();
    assert_eq!(readme.content.as_deref(), Some(&b"# readme\n"[..]));
}

#[test]
fn deflated_entries_at_every_level() {
    let text = sample_text(200_000);
    let levels = [
        Compression::none(),
        Compression::fast(),
        Compression::default(),
        Compression::best(),
    ];

    let mut builder = ArchiveBuilder::new();
    for (i, level) in levels.iter().enumerate() {
        builder = builder.compressed(&format!("text-{i}.txt"), &text, *level);
    }
    let archive = Archive::open_with(builder.build(), strict()).unwrap();

    for index in 0..archive.entry_count().unwrap() {
        let entry = archive.extract(index).unwrap();
        let content = entry.content.unwrap();
        assert_eq!(content.len(), text.len());
        assert!(content == text, "content of {} differs", entry.name);
        assert_eq!(entry.crc32, reference_crc(&text));
        assert_eq!(bufzip::crc32(&content), entry.crc32);
    }
}

#[test]
fn deflated_incompressible_data() {
    let data = noise(70_000);
    let archive = Archive::open_with(
        ArchiveBuilder::new()
            .compressed("noise.bin", &data, Compression::best())
            .build(),
        strict(),
    )
    .unwrap();

    let entry = archive.entry_at(0).unwrap();
    assert_eq!(entry.uncompressed_size, data.len() as u64);
    assert!(archive.extract(0).unwrap().content.unwrap() == data);
}

#[test]
fn small_deflated_entries() {
    let archive = Archive::open_with(
        ArchiveBuilder::new()
            .compressed("a", b"a", Compression::default())
            .compressed("abc", b"abcabcabcabcabcabc", Compression::default())
            .build(),
        strict(),
    )
    .unwrap();

    assert_eq!(archive.extract(0).unwrap().content.as_deref(), Some(&b"a"[..]));
    assert_eq!(
        archive.extract(1).unwrap().content.as_deref(),
        Some(&b"abcabcabcabcabcabc"[..])
    );
}

#[test]
fn descriptors_match_central_directory() {
    let text = sample_text(5_000);
    let archive = Archive::open(
        ArchiveBuilder::new()
            .stored("first.txt", b"first")
            .compressed("second.txt", &text, Compression::default())
            .comment(b"built by the integration tests")
            .build(),
    )
    .unwrap();

    let first = archive.entry_at(0).unwrap();
    assert_eq!(first.name, "first.txt");
    assert_eq!(first.local_header_offset, 0);
    assert_eq!(first.compressed_size, 5);
    assert_eq!(first.uncompressed_size, 5);

    let second = archive.entry_at(1).unwrap();
    assert_eq!(second.name, "second.txt");
    assert_eq!(
        second.local_header_offset,
        (LOCAL_HEADER_SIZE + "first.txt".len() + 5) as u64
    );
    assert_eq!(second.uncompressed_size, text.len() as u64);
    assert!(second.compressed_size < second.uncompressed_size);

    assert_eq!(archive.by_name("second.txt").unwrap(), Some(1));
    assert_eq!(archive.comment().unwrap(), "built by the integration tests");
}

#[test]
fn entry_at_is_stable() {
    let archive = Archive::open(
        ArchiveBuilder::new()
            .stored("a", b"1")
            .stored("b", b"22")
            .build(),
    )
    .unwrap();

    let first = archive.entry_at(1).unwrap();
    for _ in 0..10 {
        assert_eq!(archive.entry_at(1).unwrap(), first);
    }
    assert_eq!(archive.extract(1).unwrap(), archive.extract(1).unwrap());
}

#[test]
fn index_bounds() {
    let archive = Archive::open(ArchiveBuilder::new().stored("only", b"x").build()).unwrap();
    assert!(archive.entry_at(0).is_ok());
    assert_eq!(
        archive.entry_at(1).unwrap_err(),
        IndexError::IndexOutOfRange { index: 1, count: 1 }
    );
    assert!(matches!(
        archive.extract(7),
        Err(ExtractError::IndexOutOfRange { index: 7, count: 1 })
    ));
}

#[test]
fn empty_archive() {
    let archive = Archive::open(ArchiveBuilder::new().build()).unwrap();
    assert_eq!(archive.entry_count().unwrap(), 0);
    assert!(archive.entries().unwrap().is_empty());
    assert!(matches!(
        archive.entry_at(0),
        Err(IndexError::IndexOutOfRange { index: 0, count: 0 })
    ));
}

#[test]
fn open_rejects_non_archives() {
    assert_eq!(Archive::open(Vec::new()).unwrap_err(), OpenError::EmptyBuffer);
    assert!(matches!(
        Archive::open(vec![0u8; 1024]),
        Err(OpenError::CorruptArchive(_))
    ));

    let truncated = ArchiveBuilder::new().stored("a", b"abc").build();
    assert!(matches!(
        Archive::open(&truncated[..truncated.len() - 1]),
        Err(OpenError::CorruptArchive(_))
    ));
}

#[test]
fn caller_buffer_is_copied() {
    let mut data = ArchiveBuilder::new().stored("a.txt", b"original").build();
    let archive = Archive::open(data.as_slice()).unwrap();
    data.fill(0);
    assert_eq!(
        archive.extract(0).unwrap().content.as_deref(),
        Some(&b"original"[..])
    );
}

#[test]
fn close_invalidates_handle() {
    let mut archive = Archive::open(ArchiveBuilder::new().stored("a", b"x").build()).unwrap();
    assert!(archive.is_open());

    archive.close();
    assert!(!archive.is_open());
    assert_eq!(archive.entry_count(), Err(UseAfterClose));
    assert_eq!(archive.comment(), Err(UseAfterClose));
    assert_eq!(archive.buffer_len(), Err(UseAfterClose));
    assert!(matches!(archive.entries(), Err(UseAfterClose)));
    assert!(matches!(
        archive.extract(0),
        Err(ExtractError::UseAfterClose(_))
    ));

    archive.close();
    assert!(!archive.is_open());
}

#[test]
fn concurrent_extraction() {
    let text = sample_text(50_000);
    let mut builder = ArchiveBuilder::new();
    for i in 0..8 {
        builder = builder.compressed(&format!("part-{i}"), &text, Compression::default());
    }
    let archive = Archive::open_with(builder.build(), strict()).unwrap();

    std::thread::scope(|scope| {
        for index in 0..archive.entry_count().unwrap() {
            let archive = &archive;
            let text = &text;
            scope.spawn(move || {
                let content = archive.extract(index).unwrap().content.unwrap();
                assert!(content == *text);
            });
        }
    });
}

#[test]
fn longest_comment_opens() {
    let comment = vec![b'c'; 65_535];
    let archive = Archive::open(
        ArchiveBuilder::new()
            .stored("a.txt", b"abc")
            .comment(&comment)
            .build(),
    )
    .unwrap();
    assert_eq!(archive.entry_count().unwrap(), 1);
    assert_eq!(archive.comment().unwrap().len(), 65_535);
}

#[test]
fn trailing_bytes_within_search_window_open() {
    let mut data = ArchiveBuilder::new().stored("a.txt", b"abc").build();
    data.resize(data.len() + 65_535, 0);

    let archive = Archive::open(data).unwrap();
    assert_eq!(archive.entry_count().unwrap(), 1);
    assert_eq!(
        archive.extract(0).unwrap().content.as_deref(),
        Some(&b"abc"[..])
    );
}

#[test]
fn trailing_bytes_beyond_search_window_fail() {
    let mut data = ArchiveBuilder::new().stored("a.txt", b"abc").build();
    data.resize(data.len() + 65_536, 0);

    assert_eq!(
        Archive::open(data).unwrap_err(),
        OpenError::CorruptArchive(bufzip::Corrupt(
            "end of central directory record not found"
        ))
    );
}

#[test]
fn dos_directory_attribute_marks_directory() {
    let entry = TestEntry {
        external_attrs: 0x10,
        ..TestEntry::stored("build", b"")
    };
    let archive = Archive::open(ArchiveBuilder::new().entry(entry).build()).unwrap();

    assert!(archive.entry_at(0).unwrap().is_directory);
    let extracted = archive.extract(0).unwrap();
    assert!(extracted.is_directory);
    assert_eq!(extracted.content, None);
}
