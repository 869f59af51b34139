use crate::archive::*;
use crate::error::{ArchiveError, Error};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create a ZIP archive with the given members; names ending in `/` become directories
fn create_zip_archive(archive_path: &Path, members: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in members {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            std::io::Write::write_all(&mut writer, content).unwrap();
        }
    }
    writer.finish().unwrap();
}

/// Create a deflate-compressed ZIP so member reads actually decompress
fn create_deflated_zip(archive_path: &Path, name: &str, content: &[u8]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options = ::zip::write::FileOptions::default()
        .compression_method(::zip::CompressionMethod::Deflated);
    writer.start_file(name, options).unwrap();
    std::io::Write::write_all(&mut writer, content).unwrap();
    writer.finish().unwrap();
}

/// Create a valid 7z archive from a source directory using sevenz_rust
fn create_7z_archive(archive_path: &Path, source_dir: &Path) {
    sevenz_rust::compress_to_path(source_dir, archive_path).unwrap();
}

/// Cut a file into `.001`, `.002`, ... volumes of `part_len` bytes next to it
fn split_into_volumes(archive_path: &Path, part_len: usize) -> Vec<PathBuf> {
    let bytes = std::fs::read(archive_path).unwrap();
    let mut parts = Vec::new();
    for (i, chunk) in bytes.chunks(part_len).enumerate() {
        let part = PathBuf::from(format!("{}.{:03}", archive_path.display(), i + 1));
        std::fs::write(&part, chunk).unwrap();
        parts.push(part);
    }
    std::fs::remove_file(archive_path).unwrap();
    parts
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// ===========================================================================
// Kind detection
// ===========================================================================

#[test]
fn detect_archive_kind_by_name() {
    let cases = [
        ("movie.zip", Some(ArchiveKind::Zip)),
        ("MOVIE.ZIP", Some(ArchiveKind::Zip)),
        ("movie.rar", Some(ArchiveKind::Rar)),
        ("movie.part01.rar", Some(ArchiveKind::Rar)),
        ("movie.r07", Some(ArchiveKind::Rar)),
        ("movie.7z", Some(ArchiveKind::SevenZip)),
        ("movie.7z.001", Some(ArchiveKind::SevenZip)),
        ("movie.7z.014", Some(ArchiveKind::SevenZip)),
        ("movie.mkv", None),
        ("movie", None),
        ("movie.001", None),
    ];

    for (name, expected) in cases {
        assert_eq!(detect_archive_kind(Path::new(name)), expected, "{name}");
    }
}

#[test]
fn archive_kind_serializes_to_short_names() {
    assert_eq!(serde_json::to_string(&ArchiveKind::SevenZip).unwrap(), "\"7z\"");
    assert_eq!(serde_json::to_string(&ArchiveKind::Rar).unwrap(), "\"rar\"");
    assert_eq!(ArchiveKind::Zip.to_string(), "zip");
}

#[test]
fn classify_falls_back_to_signature() {
    let temp_dir = TempDir::new().unwrap();
    let disguised = temp_dir.path().join("download.bin");
    create_zip_archive(&disguised, &[("a.txt", b"a")]);

    assert_eq!(sniff_archive_kind(&disguised).unwrap(), Some(ArchiveKind::Zip));
    assert_eq!(classify(&disguised).unwrap(), ArchiveKind::Zip);

    let sevenz = temp_dir.path().join("payload");
    let src = temp_dir.path().join("src");
    std::fs::create_dir(&src).unwrap();
    std::fs::write(src.join("x.txt"), b"x").unwrap();
    create_7z_archive(&sevenz, &src);
    assert_eq!(classify(&sevenz).unwrap(), ArchiveKind::SevenZip);
}

#[test]
fn classify_rejects_plain_files_and_reports_missing_ones() {
    let temp_dir = TempDir::new().unwrap();
    let text = temp_dir.path().join("notes.txt");
    std::fs::write(&text, b"just some text").unwrap();

    match classify(&text) {
        Err(Error::Archive(ArchiveError::UnsupportedFormat { path })) => assert_eq!(path, text),
        other => panic!("expected UnsupportedFormat, got {other:?}"),
    }

    let tiny = temp_dir.path().join("tiny");
    std::fs::write(&tiny, b"PK").unwrap();
    assert!(matches!(
        classify(&tiny),
        Err(Error::Archive(ArchiveError::UnsupportedFormat { .. }))
    ));

    assert!(matches!(
        classify(&temp_dir.path().join("missing")),
        Err(Error::NotFound(_))
    ));
}

// ===========================================================================
// ZIP
// ===========================================================================

#[test]
fn zip_listing_matches_members_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("release.zip");
    let video = patterned(4096);
    create_zip_archive(
        &archive,
        &[
            ("Sample/", b""),
            ("Sample/sample.mkv", b"sample-bytes"),
            ("release.mkv", &video),
            ("release.nfo", b"info"),
        ],
    );

    let entries = list_archive(&archive).unwrap();
    let summary: Vec<(&str, u64, bool)> = entries
        .iter()
        .map(|e| (e.name.as_str(), e.size, e.is_dir))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Sample/", 0, true),
            ("Sample/sample.mkv", 12, false),
            ("release.mkv", 4096, false),
            ("release.nfo", 4, false),
        ]
    );

    // Same order on every call
    assert_eq!(list_archive(&archive).unwrap(), entries);
}

#[test]
fn zip_member_read_returns_exact_bytes() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("release.zip");
    let video = patterned(100_000);
    create_deflated_zip(&archive, "release.mkv", &video);

    let data = read_member(&archive, "release.mkv").unwrap();
    assert_eq!(data, video);
}

#[test]
fn zip_member_sub_ranges_are_deterministic() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("release.zip");
    create_deflated_zip(&archive, "release.mkv", &patterned(50_000));

    let first = read_member(&archive, "release.mkv").unwrap();
    let second = read_member(&archive, "release.mkv").unwrap();

    // a narrow range and a wider range sliced locally agree on the overlap
    let narrow = &first[1000..=1999];
    let wide = &second[500..=4999];
    assert_eq!(narrow, &wide[500..=1499]);
}

#[test]
fn zip_missing_member_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("a.zip");
    create_zip_archive(&archive, &[("present.txt", b"x")]);

    match read_member(&archive, "absent.txt") {
        Err(Error::Archive(ArchiveError::MemberNotFound { member, .. })) => {
            assert_eq!(member, "absent.txt")
        }
        other => panic!("expected MemberNotFound, got {other:?}"),
    }
}

#[test]
fn zip_directory_member_cannot_be_read() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("a.zip");
    create_zip_archive(&archive, &[("dir/", b""), ("dir/file.txt", b"x")]);

    assert!(matches!(
        read_member(&archive, "dir"),
        Err(Error::Archive(ArchiveError::MemberIsDirectory { .. }))
    ));
    assert_eq!(read_member(&archive, "dir/file.txt").unwrap(), b"x");
}

#[test]
fn corrupt_zip_is_unreadable() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("broken.zip");
    std::fs::write(&archive, b"PK\x03\x04 this is not really a zip file").unwrap();

    assert!(matches!(
        list_archive(&archive),
        Err(Error::Archive(ArchiveError::Unreadable { .. }))
    ));
}

// ===========================================================================
// 7z
// ===========================================================================

#[test]
fn sevenz_listing_and_member_read() {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().join("src");
    std::fs::create_dir(&src).unwrap();
    let video = patterned(20_000);
    std::fs::write(src.join("episode.mkv"), &video).unwrap();
    std::fs::write(src.join("episode.nfo"), b"nfo").unwrap();

    let archive = temp_dir.path().join("episode.7z");
    create_7z_archive(&archive, &src);

    let entries = list_archive(&archive).unwrap();
    let mkv = entries
        .iter()
        .find(|e| e.name.ends_with("episode.mkv"))
        .expect("mkv listed");
    assert_eq!(mkv.size, 20_000);
    assert!(!mkv.is_dir);

    let data = read_member(&archive, &mkv.name).unwrap();
    assert_eq!(data, video);

    let nfo = entries.iter().find(|e| e.name.ends_with("episode.nfo")).unwrap();
    assert_eq!(read_member(&archive, &nfo.name).unwrap(), b"nfo");
}

#[test]
fn split_sevenz_reads_across_volumes() {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().join("src");
    std::fs::create_dir(&src).unwrap();
    let video = patterned(30_000);
    std::fs::write(src.join("movie.mkv"), &video).unwrap();

    let archive = temp_dir.path().join("movie.7z");
    create_7z_archive(&archive, &src);
    let total = std::fs::metadata(&archive).unwrap().len() as usize;
    let parts = split_into_volumes(&archive, total / 3 + 1);
    assert!(parts.len() >= 3, "expected at least three volumes");

    let first = &parts[0];
    assert!(first.to_string_lossy().ends_with("movie.7z.001"));
    assert_eq!(volumes(first), parts);

    let entries = list_archive(first).unwrap();
    let mkv = entries.iter().find(|e| e.name.ends_with("movie.mkv")).unwrap();
    assert_eq!(mkv.size, 30_000);
    assert_eq!(read_member(first, &mkv.name).unwrap(), video);
}

#[test]
fn sevenz_missing_member_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().join("src");
    std::fs::create_dir(&src).unwrap();
    std::fs::write(src.join("a.txt"), b"a").unwrap();
    let archive = temp_dir.path().join("a.7z");
    create_7z_archive(&archive, &src);

    assert!(matches!(
        read_member(&archive, "nope.bin"),
        Err(Error::Archive(ArchiveError::MemberNotFound { .. }))
    ));
}

// ===========================================================================
// RAR
// ===========================================================================

#[test]
fn garbage_rar_is_unreadable() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("fake.rar");
    std::fs::write(&archive, b"definitely not a rar archive").unwrap();

    assert!(matches!(
        list_archive(&archive),
        Err(Error::Archive(ArchiveError::Unreadable { .. }))
    ));
    assert!(matches!(
        read_member(&archive, "anything"),
        Err(Error::Archive(ArchiveError::Unreadable { .. }))
    ));
}

#[test]
fn missing_rar_is_not_found() {
    assert!(matches!(
        list_archive(Path::new("/no/such/dir/archive.rar")),
        Err(Error::NotFound(_))
    ));
}

// ===========================================================================
// Extraction
// ===========================================================================

#[test]
fn zip_extracts_files_and_directories() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("pack.zip");
    create_zip_archive(
        &archive,
        &[
            ("extras/", b""),
            ("extras/sample.mkv", b"sample"),
            ("movie.mkv", b"movie bytes"),
        ],
    );
    let dest = temp_dir.path().join("out");

    let written = extract_archive(&archive, &dest, &CancellationToken::new()).unwrap();

    assert_eq!(written, 2);
    assert_eq!(std::fs::read(dest.join("movie.mkv")).unwrap(), b"movie bytes");
    assert_eq!(std::fs::read(dest.join("extras/sample.mkv")).unwrap(), b"sample");
}

#[test]
fn zip_extraction_skips_escaping_names() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("evil.zip");
    create_zip_archive(&archive, &[("../escape.txt", b"x"), ("ok.txt", b"ok")]);
    let dest = temp_dir.path().join("out");

    let written = extract_archive(&archive, &dest, &CancellationToken::new()).unwrap();

    assert_eq!(written, 1);
    assert!(dest.join("ok.txt").exists());
    assert!(!temp_dir.path().join("escape.txt").exists());
}

#[test]
fn split_sevenz_extracts_from_all_volumes() {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().join("src");
    std::fs::create_dir(&src).unwrap();
    let video = patterned(25_000);
    std::fs::write(src.join("show.mkv"), &video).unwrap();

    let archive = temp_dir.path().join("show.7z");
    create_7z_archive(&archive, &src);
    let total = std::fs::metadata(&archive).unwrap().len() as usize;
    let parts = split_into_volumes(&archive, total / 2 + 1);
    let dest = temp_dir.path().join("out");

    let written = extract_archive(&parts[0], &dest, &CancellationToken::new()).unwrap();

    assert_eq!(written, 1);
    let extracted = walkdir::WalkDir::new(&dest)
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_name() == "show.mkv")
        .expect("show.mkv extracted");
    assert_eq!(std::fs::read(extracted.path()).unwrap(), video);
}

#[test]
fn cancelled_extraction_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("pack.zip");
    create_zip_archive(&archive, &[("a.bin", b"aaaa"), ("b.bin", b"bbbb")]);
    let dest = temp_dir.path().join("out");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = extract_archive(&archive, &dest, &cancel);

    assert!(matches!(result, Err(Error::Io(_))), "{result:?}");
    assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 0);
}

#[test]
fn cancelled_sevenz_extraction_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().join("src");
    std::fs::create_dir(&src).unwrap();
    std::fs::write(src.join("show.mkv"), patterned(4096)).unwrap();
    let archive = temp_dir.path().join("show.7z");
    create_7z_archive(&archive, &src);
    let dest = temp_dir.path().join("out");
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(extract_archive(&archive, &dest, &cancel).is_err());
    assert_eq!(walkdir::WalkDir::new(&dest).min_depth(1).into_iter().count(), 0);
}

#[test]
fn cancellable_writer_stops_once_cancelled() {
    use std::io::Write;

    let cancel = CancellationToken::new();
    let mut sink = Vec::new();
    {
        let mut writer = CancellableWriter::new(&mut sink, &cancel);
        writer.write_all(b"before").unwrap();
        cancel.cancel();
        assert!(writer.write_all(b"after").is_err());
    }
    assert_eq!(sink, b"before");
}

#[test]
fn member_path_drops_escaping_components() {
    assert_eq!(member_path("../../etc/passwd"), PathBuf::from("etc/passwd"));
    assert_eq!(member_path("\\Season 1\\ep1.mkv"), PathBuf::from("Season 1/ep1.mkv"));
    assert_eq!(member_path("/"), PathBuf::new());
}

// ===========================================================================
// Async wrappers
// ===========================================================================

#[tokio::test]
async fn async_wrappers_match_blocking_results() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("a.zip");
    create_zip_archive(&archive, &[("one.bin", b"11111"), ("two.bin", b"22")]);

    let listed = list_archive_async(archive.clone()).await.unwrap();
    assert_eq!(listed, list_archive(&archive).unwrap());

    let data = read_member_async(archive, "two.bin".to_string())
        .await
        .unwrap();
    assert_eq!(data, b"22");
}
