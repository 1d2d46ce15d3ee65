//! Exercises the full pipeline end to end: write a small directory tree
//! to a temp dir, hash it with `TorrentCreate::generate`, and check the
//! resulting `Torrent` both validates on its own and survives a
//! bencode round trip.

use std::fs;
use std::path::PathBuf;

use tmeta::{PieceLength, Torrent, TorrentCreate, TorrentVersion, InfoDict};

fn write_fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("a.txt"), vec![b'a'; 40_000]).unwrap();
    fs::write(dir.path().join("sub/b.txt"), vec![b'b'; 5_000]).unwrap();
    fs::write(dir.path().join(".DS_Store"), b"noise").unwrap();
    dir
}

fn make(dir: &std::path::Path, version: TorrentVersion) -> Torrent {
    let create = TorrentCreate {
        path_root: dir.to_path_buf(),
        files: None,
        piece_length: PieceLength::Custom(16 * 1024),
        trackers: vec![vec!["udp://tracker.example:80".to_string()]],
        comment: Some("generated for a test".to_string()),
        created_by: Some("tmeta-tests".to_string()),
        creation_date: Some(1_700_000_000),
        url_list: None,
        similar: None,
        source: None,
        private: Some(false),
    };
    create.generate(version, 4, None).unwrap()
}

#[test]
fn generates_a_v1_torrent_that_round_trips_through_bencode() {
    let dir = write_fixture();
    let torrent = make(dir.path(), TorrentVersion::V1);

    match &torrent.info {
        InfoDict::V1(info) => {
            assert!(info.files.is_some(), "multi-file torrent should use the files list");
            assert!(info.length.is_none());
        }
        _ => panic!("expected InfoV1"),
    }
    assert!(torrent.v1_infohash().is_some());
    assert!(torrent.v2_infohash().is_none());

    let bytes = torrent.bencode();
    let read_back = Torrent::from_bencode(&bytes).unwrap();
    assert_eq!(read_back, torrent);
}

#[test]
fn generates_a_v2_torrent_with_matching_piece_layers() {
    let dir = write_fixture();
    let torrent = make(dir.path(), TorrentVersion::V2);

    assert!(torrent.v1_infohash().is_none());
    assert!(torrent.v2_infohash().is_some());
    assert!(torrent.piece_layers.is_some());

    let bytes = torrent.bencode();
    let read_back = Torrent::from_bencode(&bytes).unwrap();
    assert_eq!(read_back, torrent);
}

#[test]
fn generates_a_hybrid_torrent_with_both_infohashes() {
    let dir = write_fixture();
    let torrent = make(dir.path(), TorrentVersion::Hybrid);

    assert!(torrent.v1_infohash().is_some());
    assert!(torrent.v2_infohash().is_some());

    let bytes = torrent.bencode();
    let read_back = Torrent::from_bencode(&bytes).unwrap();
    assert_eq!(read_back, torrent);
}

#[test]
fn hybrid_torrent_pads_a_misaligned_non_final_file_with_a_padfile() {
    let dir = write_fixture();
    let torrent = make(dir.path(), TorrentVersion::Hybrid);

    match &torrent.info {
        InfoDict::Hybrid(info) => {
            // a.txt (40000 bytes, 16 KiB pieces) isn't piece-aligned and
            // sorts before sub/b.txt in v2/hybrid order, so it must be
            // followed by a padfile.
            let names: Vec<String> = info
                .files
                .iter()
                .map(|f| String::from_utf8_lossy(&f.path.last().cloned().unwrap_or_default()).into_owned())
                .collect();
            assert!(info.files.iter().any(|f| f.is_padfile()), "expected a padfile, got {names:?}");
            info.validate().unwrap();
        }
        _ => panic!("expected InfoHybrid"),
    }
}

#[test]
fn skips_platform_noise_files_when_deriving_the_file_list() {
    let dir = write_fixture();
    let torrent = make(dir.path(), TorrentVersion::V1);
    match &torrent.info {
        InfoDict::V1(info) => {
            let files = info.files.as_ref().unwrap();
            assert!(files.iter().all(|f| !f.path.iter().any(|c| c.as_slice() == b".DS_Store")));
            assert_eq!(files.len(), 2);
        }
        _ => panic!("expected InfoV1"),
    }
}

#[test]
fn rejects_an_explicit_file_list_with_no_entries() {
    let dir = tempfile::tempdir().unwrap();
    let create = TorrentCreate {
        path_root: dir.path().to_path_buf(),
        files: Some(Vec::<PathBuf>::new()),
        piece_length: PieceLength::OptBalanced,
        trackers: vec![],
        comment: None,
        created_by: None,
        creation_date: None,
        url_list: None,
        similar: None,
        source: None,
        private: None,
    };
    let err = create.generate(TorrentVersion::V1, 2, None).unwrap_err();
    assert!(matches!(err, tmeta::Error::Usage(tmeta::UsageError::NoFiles)));
}

#[test]
fn rejects_an_absolute_path_in_an_explicit_file_list() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"a").unwrap();
    let create = TorrentCreate {
        path_root: dir.path().to_path_buf(),
        files: Some(vec![PathBuf::from("/etc/passwd")]),
        piece_length: PieceLength::OptBalanced,
        trackers: vec![],
        comment: None,
        created_by: None,
        creation_date: None,
        url_list: None,
        similar: None,
        source: None,
        private: None,
    };
    let err = create.generate(TorrentVersion::V1, 2, None).unwrap_err();
    assert!(matches!(
        err,
        tmeta::Error::Usage(tmeta::UsageError::AbsolutePathNotAllowed { .. })
    ));
}
