//! The top-level `Torrent` record: decoding from and encoding to bencode,
//! and infohash computation, across the v1/v2/hybrid union.

use std::collections::BTreeMap;

use tmeta_bencode::BencodeValue;
use tmeta_util::{Sha1Hash, Sha256Hash};

use crate::error::{Error, Result, SchemaError};
use crate::info::{
    join_path_components, FileItem, FileTree, FileTreeItem, FileTreeNode, InfoDict, InfoHybrid,
    InfoV1, InfoV2, PieceLen,
};
use crate::parse::*;

/// A fully parsed (or constructed) torrent. Immutable once built; the
/// only way to get one is `Torrent::from_bencode`/`read` on the decode
/// path, or the construction pipeline in `builder`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Torrent {
    pub announce: Option<Vec<u8>>,
    pub announce_list: Option<Vec<Vec<Vec<u8>>>>,
    pub comment: Option<Vec<u8>>,
    pub created_by: Option<Vec<u8>>,
    pub creation_date: Option<u64>,
    pub info: InfoDict,
    pub piece_layers: Option<BTreeMap<[u8; 32], Vec<u8>>>,
    pub url_list: Option<UrlList>,
    pub similar: Option<Vec<[u8; 20]>>,
    pub source: Option<Vec<u8>>,
}

/// `url-list` may be decoded as either a single URL or a list of URLs;
/// the canonical rule (documented in DESIGN.md) is preserve-as-read on
/// decode, single-URL emission on construction when exactly one webseed
/// is supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlList {
    Single(Vec<u8>),
    Multiple(Vec<Vec<u8>>),
}

impl Torrent {
    /// Decode a torrent from its bencoded bytes, validating all
    /// cross-field invariants.
    pub fn from_bencode(bytes: &[u8]) -> Result<Torrent> {
        let root = tmeta_bencode::decode(bytes)?;
        let root_dict = root
            .as_dict()
            .ok_or_else(|| SchemaError::WrongType {
                field: "<root>".into(),
                expected: "dictionary",
            })?;

        let announce = root_dict.get(ANNOUNCE_KEY).and_then(|v| v.as_bytes()).map(<[u8]>::to_vec);
        let announce_list = root_dict.get(ANNOUNCE_LIST_KEY).map(parse_announce_list).transpose()?;
        let comment = root_dict.get(COMMENT_KEY).and_then(|v| v.as_bytes()).map(<[u8]>::to_vec);
        let created_by = root_dict.get(CREATED_BY_KEY).and_then(|v| v.as_bytes()).map(<[u8]>::to_vec);
        let creation_date = root_dict
            .get(CREATION_DATE_KEY)
            .and_then(|v| v.as_int())
            .map(|n| n as u64);
        let similar = root_dict.get(SIMILAR_KEY).map(parse_similar).transpose()?;
        let source = root_dict.get(SOURCE_KEY).and_then(|v| v.as_bytes()).map(<[u8]>::to_vec);
        let url_list = root_dict.get(URL_LIST_KEY).map(parse_url_list).transpose()?;

        let info_value = root_dict
            .get(INFO_KEY)
            .ok_or_else(|| SchemaError::MissingKey { field: "info".into() })?;
        let info_dict = info_value.as_dict().ok_or_else(|| SchemaError::WrongType {
            field: "info".into(),
            expected: "dictionary",
        })?;

        let piece_layers = root_dict.get(PIECE_LAYERS_KEY).map(parse_piece_layers).transpose()?;

        let info = parse_info(info_dict)?;
        info.validate()?;

        let torrent = Torrent {
            announce,
            announce_list,
            comment,
            created_by,
            creation_date,
            info,
            piece_layers,
            url_list,
            similar,
            source,
        };
        torrent.validate_piece_layers()?;
        Ok(torrent)
    }

    /// Re-encode into the canonical bencoded byte string.
    pub fn bencode(&self) -> Vec<u8> {
        tmeta_bencode::encode(&self.to_bencode_value())
    }

    fn to_bencode_value(&self) -> BencodeValue {
        let mut root = BTreeMap::new();

        if let Some(announce) = &self.announce {
            root.insert(ANNOUNCE_KEY.to_vec(), BencodeValue::Str(announce.clone()));
        }
        if let Some(list) = &self.announce_list {
            let encoded = list
                .iter()
                .map(|tier| BencodeValue::List(tier.iter().map(|u| BencodeValue::Str(u.clone())).collect()))
                .collect();
            root.insert(ANNOUNCE_LIST_KEY.to_vec(), BencodeValue::List(encoded));
        }
        if let Some(comment) = &self.comment {
            root.insert(COMMENT_KEY.to_vec(), BencodeValue::Str(comment.clone()));
        }
        if let Some(created_by) = &self.created_by {
            root.insert(CREATED_BY_KEY.to_vec(), BencodeValue::Str(created_by.clone()));
        }
        if let Some(creation_date) = self.creation_date {
            root.insert(CREATION_DATE_KEY.to_vec(), BencodeValue::Int(creation_date as i64));
        }
        if let Some(similar) = &self.similar {
            let encoded = similar.iter().map(|h| BencodeValue::Str(h.to_vec())).collect();
            root.insert(SIMILAR_KEY.to_vec(), BencodeValue::List(encoded));
        }
        if let Some(source) = &self.source {
            root.insert(SOURCE_KEY.to_vec(), BencodeValue::Str(source.clone()));
        }
        if let Some(url_list) = &self.url_list {
            root.insert(URL_LIST_KEY.to_vec(), encode_url_list(url_list));
        }
        if let Some(piece_layers) = &self.piece_layers {
            let mut map = BTreeMap::new();
            for (root_hash, layer) in piece_layers {
                map.insert(root_hash.to_vec(), BencodeValue::Str(layer.clone()));
            }
            root.insert(PIECE_LAYERS_KEY.to_vec(), BencodeValue::Dict(map));
        }

        root.insert(INFO_KEY.to_vec(), encode_info(&self.info));

        BencodeValue::Dict(root)
    }

    /// `SHA-1(bencode(info))`, present for v1 and hybrid torrents.
    pub fn v1_infohash(&self) -> Option<Sha1Hash> {
        match &self.info {
            InfoDict::V1(_) | InfoDict::Hybrid(_) => {
                Some(Sha1Hash::from_bytes(&tmeta_bencode::encode(&encode_info(&self.info))))
            }
            InfoDict::V2(_) => None,
        }
    }

    /// `SHA-256(bencode(info))`, present for v2 and hybrid torrents.
    pub fn v2_infohash(&self) -> Option<Sha256Hash> {
        match &self.info {
            InfoDict::V2(_) | InfoDict::Hybrid(_) => {
                Some(Sha256Hash::from_bytes(&tmeta_bencode::encode(&encode_info(&self.info))))
            }
            InfoDict::V1(_) => None,
        }
    }

    fn validate_piece_layers(&self) -> Result<()> {
        let (file_tree, piece_length) = match &self.info {
            InfoDict::V1(_) => return Ok(()),
            InfoDict::V2(info) => (&info.file_tree, info.piece_length.get()),
            InfoDict::Hybrid(info) => (&info.file_tree, info.piece_length.get()),
        };
        let empty = BTreeMap::new();
        let layers = self.piece_layers.as_ref().unwrap_or(&empty);

        for (path, item) in file_tree.flatten() {
            if item.length <= piece_length {
                continue;
            }
            let root = item.pieces_root.ok_or_else(|| SchemaError::MissingPieceRoot {
                field: format!("file_tree[{}]", String::from_utf8_lossy(&path)),
            })?;
            let layer = layers.get(&root).ok_or_else(|| SchemaError::MissingPieceRoot {
                field: format!("piece_layers[{}]", hex::encode(root)),
            })?;
            let expected = 32 * crate::util::ceil_div(item.length, piece_length);
            if layer.len() as u64 != expected {
                return Err(Error::Schema(SchemaError::PieceLayerSizeMismatch {
                    field: format!("piece_layers[{}]", hex::encode(root)),
                    expected,
                    actual: layer.len() as u64,
                }));
            }
        }
        Ok(())
    }
}

/// Minimal hex encoding, used only for error messages (no external `hex`
/// dependency is pulled in for this).
mod hex {
    pub fn encode(bytes: [u8; 32]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

fn parse_announce_list(value: &BencodeValue) -> Result<Vec<Vec<Vec<u8>>>> {
    let list = value.as_list().ok_or_else(|| SchemaError::WrongType {
        field: "announce-list".into(),
        expected: "list",
    })?;
    let mut tiers = Vec::with_capacity(list.len());
    for tier in list {
        let tier_list = tier.as_list().ok_or_else(|| SchemaError::WrongType {
            field: "announce-list[]".into(),
            expected: "list",
        })?;
        let mut urls = Vec::with_capacity(tier_list.len());
        for url in tier_list {
            let bytes = url.as_bytes().ok_or_else(|| SchemaError::WrongType {
                field: "announce-list[][]".into(),
                expected: "byte string",
            })?;
            urls.push(bytes.to_vec());
        }
        tiers.push(urls);
    }
    Ok(tiers)
}

fn parse_similar(value: &BencodeValue) -> Result<Vec<[u8; 20]>> {
    let list = value.as_list().ok_or_else(|| SchemaError::WrongType {
        field: "similar".into(),
        expected: "list",
    })?;
    let mut out = Vec::with_capacity(list.len());
    for entry in list {
        let bytes = entry.as_bytes().ok_or_else(|| SchemaError::WrongType {
            field: "similar[]".into(),
            expected: "byte string",
        })?;
        if bytes.len() != 20 {
            return Err(Error::Schema(SchemaError::WrongType {
                field: "similar[]".into(),
                expected: "20-byte infohash",
            }));
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(bytes);
        out.push(hash);
    }
    Ok(out)
}

fn parse_url_list(value: &BencodeValue) -> Result<UrlList> {
    if let Some(bytes) = value.as_bytes() {
        return Ok(UrlList::Single(bytes.to_vec()));
    }
    if let Some(list) = value.as_list() {
        let mut urls = Vec::with_capacity(list.len());
        for entry in list {
            let bytes = entry.as_bytes().ok_or_else(|| SchemaError::WrongType {
                field: "url-list[]".into(),
                expected: "byte string",
            })?;
            urls.push(bytes.to_vec());
        }
        return Ok(UrlList::Multiple(urls));
    }
    Err(Error::Schema(SchemaError::WrongType {
        field: "url-list".into(),
        expected: "byte string or list of byte strings",
    }))
}

fn encode_url_list(url_list: &UrlList) -> BencodeValue {
    match url_list {
        UrlList::Single(url) => BencodeValue::Str(url.clone()),
        UrlList::Multiple(urls) => {
            BencodeValue::List(urls.iter().map(|u| BencodeValue::Str(u.clone())).collect())
        }
    }
}

fn parse_piece_layers(value: &BencodeValue) -> Result<BTreeMap<[u8; 32], Vec<u8>>> {
    let dict = value.as_dict().ok_or_else(|| SchemaError::WrongType {
        field: "piece layers".into(),
        expected: "dictionary",
    })?;
    let mut out = BTreeMap::new();
    for (key, value) in dict {
        if key.len() != 32 {
            return Err(Error::Schema(SchemaError::WrongType {
                field: "piece layers key".into(),
                expected: "32-byte pieces root",
            }));
        }
        let mut root = [0u8; 32];
        root.copy_from_slice(key);
        let bytes = value.as_bytes().ok_or_else(|| SchemaError::WrongType {
            field: "piece layers value".into(),
            expected: "byte string",
        })?;
        out.insert(root, bytes.to_vec());
    }
    Ok(out)
}

fn parse_info(dict: &BTreeMap<Vec<u8>, BencodeValue>) -> Result<InfoDict> {
    let name = dict
        .get(NAME_KEY)
        .and_then(|v| v.as_bytes())
        .ok_or_else(|| SchemaError::MissingKey { field: "info.name".into() })?
        .to_vec();
    let piece_length_raw = dict
        .get(PIECE_LENGTH_KEY)
        .and_then(|v| v.as_int())
        .ok_or_else(|| SchemaError::MissingKey {
            field: "info.piece length".into(),
        })? as u64;
    let private = dict.get(PRIVATE_KEY).and_then(|v| v.as_int()).map(|p| p != 0);

    let has_pieces = dict.contains_key(PIECES_KEY);
    let has_file_tree = dict.contains_key(FILE_TREE_KEY);

    if has_pieces && has_file_tree {
        let piece_length = PieceLen::new_v2(piece_length_raw)?;
        let pieces = parse_pieces(dict)?;
        let files = parse_v1_files(dict)?;
        let file_tree = parse_file_tree(dict)?;
        return Ok(InfoDict::Hybrid(InfoHybrid {
            name,
            piece_length,
            pieces,
            files,
            file_tree,
            private,
        }));
    }

    if has_file_tree {
        let piece_length = PieceLen::new_v2(piece_length_raw)?;
        let file_tree = parse_file_tree(dict)?;
        return Ok(InfoDict::V2(InfoV2 {
            name,
            piece_length,
            file_tree,
            private,
        }));
    }

    if has_pieces {
        let piece_length = PieceLen::new_v1(piece_length_raw)?;
        let pieces = parse_pieces(dict)?;
        let length = dict.get(LENGTH_KEY).and_then(|v| v.as_int()).map(|n| n as u64);
        let files = if dict.contains_key(FILES_KEY) {
            Some(parse_v1_files(dict)?)
        } else {
            None
        };
        return Ok(InfoDict::V1(InfoV1 {
            name,
            piece_length,
            pieces,
            length,
            files,
            private,
        }));
    }

    Err(Error::Schema(SchemaError::MissingKey {
        field: "info.pieces|info.file tree".into(),
    }))
}

fn parse_pieces(dict: &BTreeMap<Vec<u8>, BencodeValue>) -> Result<Vec<Sha1Hash>> {
    let bytes = dict
        .get(PIECES_KEY)
        .and_then(|v| v.as_bytes())
        .ok_or_else(|| SchemaError::MissingKey { field: "info.pieces".into() })?;
    if bytes.len() % 20 != 0 {
        return Err(Error::Schema(SchemaError::WrongType {
            field: "info.pieces".into(),
            expected: "byte string with length a multiple of 20",
        }));
    }
    Ok(bytes
        .chunks(20)
        .map(|chunk| Sha1Hash::from_hash(chunk).expect("chunk length checked above"))
        .collect())
}

fn parse_v1_files(dict: &BTreeMap<Vec<u8>, BencodeValue>) -> Result<Vec<FileItem>> {
    let list = dict
        .get(FILES_KEY)
        .and_then(|v| v.as_list())
        .ok_or_else(|| SchemaError::MissingKey { field: "info.files".into() })?;
    let mut out = Vec::with_capacity(list.len());
    for entry in list {
        let file_dict = entry.as_dict().ok_or_else(|| SchemaError::WrongType {
            field: "info.files[]".into(),
            expected: "dictionary",
        })?;
        let length = file_dict
            .get(LENGTH_KEY)
            .and_then(|v| v.as_int())
            .ok_or_else(|| SchemaError::MissingKey {
                field: "info.files[].length".into(),
            })? as u64;
        let path_list = file_dict
            .get(PATH_KEY)
            .and_then(|v| v.as_list())
            .ok_or_else(|| SchemaError::MissingKey {
                field: "info.files[].path".into(),
            })?;
        let mut path = Vec::with_capacity(path_list.len());
        for component in path_list {
            let bytes = component.as_bytes().ok_or_else(|| SchemaError::WrongType {
                field: "info.files[].path[]".into(),
                expected: "byte string",
            })?;
            path.push(bytes.to_vec());
        }
        let md5sum = file_dict.get(MD5SUM_KEY).and_then(|v| v.as_bytes()).map(<[u8]>::to_vec);
        let attr = file_dict.get(ATTR_KEY).and_then(|v| v.as_bytes()).map(<[u8]>::to_vec);
        out.push(FileItem {
            length,
            path,
            md5sum,
            attr,
        });
    }
    Ok(out)
}

fn parse_file_tree(dict: &BTreeMap<Vec<u8>, BencodeValue>) -> Result<FileTree> {
    let tree_value = dict
        .get(FILE_TREE_KEY)
        .ok_or_else(|| SchemaError::MissingKey { field: "info.file tree".into() })?;
    let tree_dict = tree_value.as_dict().ok_or_else(|| SchemaError::WrongType {
        field: "info.file tree".into(),
        expected: "dictionary",
    })?;

    let mut flat = BTreeMap::new();
    parse_file_tree_node(tree_dict, &mut Vec::new(), &mut flat)?;
    Ok(FileTree::unflatten(&flat))
}

fn parse_file_tree_node(
    dict: &BTreeMap<Vec<u8>, BencodeValue>,
    prefix: &mut Vec<Vec<u8>>,
    out: &mut BTreeMap<Vec<u8>, FileTreeItem>,
) -> Result<()> {
    for (key, value) in dict {
        if key.is_empty() {
            // The wire leaf marker: `{"": {length:.., pieces root:..}}`.
            let leaf_dict = value.as_dict().ok_or_else(|| SchemaError::WrongType {
                field: "file tree leaf".into(),
                expected: "dictionary",
            })?;
            let length = leaf_dict
                .get(LENGTH_KEY)
                .and_then(|v| v.as_int())
                .ok_or_else(|| SchemaError::MissingKey {
                    field: "file tree leaf.length".into(),
                })? as u64;
            let pieces_root = match leaf_dict.get(PIECES_ROOT_KEY).and_then(|v| v.as_bytes()) {
                Some(bytes) if bytes.len() == 32 => {
                    let mut root = [0u8; 32];
                    root.copy_from_slice(bytes);
                    Some(root)
                }
                Some(_) => {
                    return Err(Error::Schema(SchemaError::WrongType {
                        field: "file tree leaf.pieces root".into(),
                        expected: "32-byte hash",
                    }))
                }
                None => None,
            };
            out.insert(join_path_components(prefix), FileTreeItem { length, pieces_root });
            continue;
        }

        prefix.push(key.clone());
        let child_dict = value.as_dict().ok_or_else(|| SchemaError::WrongType {
            field: "file tree node".into(),
            expected: "dictionary",
        })?;
        parse_file_tree_node(child_dict, prefix, out)?;
        prefix.pop();
    }
    Ok(())
}

fn encode_info(info: &InfoDict) -> BencodeValue {
    let mut dict = BTreeMap::new();
    dict.insert(NAME_KEY.to_vec(), BencodeValue::Str(info.name().to_vec()));
    dict.insert(PIECE_LENGTH_KEY.to_vec(), BencodeValue::Int(info.piece_length() as i64));
    if let Some(private) = info.private() {
        dict.insert(PRIVATE_KEY.to_vec(), BencodeValue::Int(private as i64));
    }

    match info {
        InfoDict::V1(v1) => {
            dict.insert(PIECES_KEY.to_vec(), BencodeValue::Str(concat_pieces(&v1.pieces)));
            match (&v1.length, &v1.files) {
                (Some(length), None) => {
                    dict.insert(LENGTH_KEY.to_vec(), BencodeValue::Int(*length as i64));
                }
                (None, Some(files)) => {
                    dict.insert(FILES_KEY.to_vec(), encode_v1_files(files));
                }
                _ => unreachable!("InfoV1::validate enforces exactly one is set"),
            }
        }
        InfoDict::V2(v2) => {
            dict.insert(META_VERSION_KEY.to_vec(), BencodeValue::Int(InfoV2::META_VERSION as i64));
            dict.insert(FILE_TREE_KEY.to_vec(), encode_file_tree(&v2.file_tree));
        }
        InfoDict::Hybrid(hybrid) => {
            dict.insert(PIECES_KEY.to_vec(), BencodeValue::Str(concat_pieces(&hybrid.pieces)));
            dict.insert(FILES_KEY.to_vec(), encode_v1_files(&hybrid.files));
            dict.insert(
                META_VERSION_KEY.to_vec(),
                BencodeValue::Int(InfoHybrid::META_VERSION as i64),
            );
            dict.insert(FILE_TREE_KEY.to_vec(), encode_file_tree(&hybrid.file_tree));
        }
    }

    BencodeValue::Dict(dict)
}

fn concat_pieces(pieces: &[Sha1Hash]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pieces.len() * 20);
    for piece in pieces {
        out.extend_from_slice(piece.as_ref());
    }
    out
}

fn encode_v1_files(files: &[FileItem]) -> BencodeValue {
    let list = files
        .iter()
        .map(|file| {
            let mut dict = BTreeMap::new();
            dict.insert(LENGTH_KEY.to_vec(), BencodeValue::Int(file.length as i64));
            dict.insert(
                PATH_KEY.to_vec(),
                BencodeValue::List(file.path.iter().map(|c| BencodeValue::Str(c.clone())).collect()),
            );
            if let Some(md5sum) = &file.md5sum {
                dict.insert(MD5SUM_KEY.to_vec(), BencodeValue::Str(md5sum.clone()));
            }
            if let Some(attr) = &file.attr {
                dict.insert(ATTR_KEY.to_vec(), BencodeValue::Str(attr.clone()));
            }
            BencodeValue::Dict(dict)
        })
        .collect();
    BencodeValue::List(list)
}

fn encode_file_tree(file_tree: &FileTree) -> BencodeValue {
    fn encode_node(node: &BTreeMap<Vec<u8>, FileTreeNode>) -> BencodeValue {
        let mut dict = BTreeMap::new();
        for (name, child) in node {
            let value = match child {
                FileTreeNode::File(item) => {
                    let mut leaf = BTreeMap::new();
                    leaf.insert(LENGTH_KEY.to_vec(), BencodeValue::Int(item.length as i64));
                    if let Some(root) = item.pieces_root {
                        leaf.insert(PIECES_ROOT_KEY.to_vec(), BencodeValue::Str(root.to_vec()));
                    }
                    let mut wrapper = BTreeMap::new();
                    wrapper.insert(Vec::new(), BencodeValue::Dict(leaf));
                    BencodeValue::Dict(wrapper)
                }
                FileTreeNode::Dir(children) => encode_node(children),
            };
            dict.insert(name.clone(), value);
        }
        BencodeValue::Dict(dict)
    }
    encode_node(&file_tree.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_single_file_torrent() -> Vec<u8> {
        b"d8:announce20:udp://tracker.com:804:infod6:lengthi100e4:name4:test12:piece lengthi16384e6:pieces20:00000000000000000000ee".to_vec()
    }

    #[test]
    fn decodes_v1_single_file_torrent() {
        let torrent = Torrent::from_bencode(&v1_single_file_torrent()).unwrap();
        match &torrent.info {
            InfoDict::V1(info) => {
                assert_eq!(info.name, b"test");
                assert_eq!(info.length, Some(100));
            }
            _ => panic!("expected InfoV1"),
        }
        assert!(torrent.v1_infohash().is_some());
        assert!(torrent.v2_infohash().is_none());
    }

    #[test]
    fn round_trips_v1_torrent_bytes() {
        let original = v1_single_file_torrent();
        let torrent = Torrent::from_bencode(&original).unwrap();
        assert_eq!(torrent.bencode(), original);
    }

    #[test]
    fn url_list_round_trips_as_single_value_when_decoded_as_single() {
        let mut root = BTreeMap::new();
        root.insert(
            INFO_KEY.to_vec(),
            {
                let mut info = BTreeMap::new();
                info.insert(NAME_KEY.to_vec(), BencodeValue::Str(b"t".to_vec()));
                info.insert(PIECE_LENGTH_KEY.to_vec(), BencodeValue::Int(16384));
                info.insert(LENGTH_KEY.to_vec(), BencodeValue::Int(0));
                info.insert(PIECES_KEY.to_vec(), BencodeValue::Str(vec![]));
                BencodeValue::Dict(info)
            },
        );
        root.insert(URL_LIST_KEY.to_vec(), BencodeValue::Str(b"http://example.com".to_vec()));
        let bytes = tmeta_bencode::encode(&BencodeValue::Dict(root));

        let torrent = Torrent::from_bencode(&bytes).unwrap();
        assert_eq!(torrent.url_list, Some(UrlList::Single(b"http://example.com".to_vec())));
        assert_eq!(torrent.bencode(), bytes);
    }
}
