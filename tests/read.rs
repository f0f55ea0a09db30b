use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::{Value, json};
use zarrs::filesystem::FilesystemStore;
use zarrs::storage::store::MemoryStore;
use zarrs::storage::{StoreKey, WritableStorageTraits};
use zarrs_v2_reader::data_type::elements;
use zarrs_v2_reader::storage::ZarrsStore;
use zarrs_v2_reader::{Error, ReadOptions, Reader, RequestError};

const SIDE: usize = 4;
const CHUNK: usize = 2;

fn init_logger() {
    env_logger::try_init().ok();
}

/// Values of the 4x4 test array, row-major.
fn raw() -> Vec<f32> {
    (0..SIDE * SIDE).map(|v| v as f32).collect()
}

/// Bytes of chunk `(ci, cj)`, in C or F order.
fn chunk_bytes(ci: usize, cj: usize, fortran: bool) -> Vec<u8> {
    let mut out = Vec::new();
    for a in 0..CHUNK {
        for b in 0..CHUNK {
            let (i, j) = if fortran { (b, a) } else { (a, b) };
            let value = ((ci * CHUNK + i) * SIDE + cj * CHUNK + j) as f32;
            out.extend(value.to_le_bytes());
        }
    }
    out
}

fn encode(compressor: &Value, raw: &[u8]) -> Vec<u8> {
    match compressor["id"].as_str() {
        None => raw.to_vec(),
        Some("zlib") => {
            let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(1));
            enc.write_all(raw).unwrap();
            enc.finish().unwrap()
        }
        Some("gzip") => {
            let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::new(5));
            enc.write_all(raw).unwrap();
            enc.finish().unwrap()
        }
        Some("bz2") => {
            let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::new(9));
            enc.write_all(raw).unwrap();
            enc.finish().unwrap()
        }
        Some("zstd") => zstd::stream::encode_all(raw, 3).unwrap(),
        Some(other) => panic!("no test encoder for {other}"),
    }
}

fn zarray(compressor: &Value, order: &str, separator: &str) -> Vec<u8> {
    serde_json::to_vec_pretty(&json!({
        "zarr_format": 2,
        "shape": [SIDE, SIDE],
        "chunks": [CHUNK, CHUNK],
        "dtype": "<f4",
        "compressor": compressor,
        "fill_value": 0.0,
        "order": order,
        "filters": null,
        "dimension_separator": separator,
    }))
    .unwrap()
}

/// Write the test array into `dir`, skipping chunks in `missing`.
fn write_array(dir: &Path, compressor: &Value, order: &str, separator: &str, missing: &[[usize; 2]]) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(".zarray"), zarray(compressor, order, separator)).unwrap();
    for ci in 0..SIDE / CHUNK {
        for cj in 0..SIDE / CHUNK {
            if missing.contains(&[ci, cj]) {
                continue;
            }
            let path = dir.join(format!("{ci}{separator}{cj}"));
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            let bytes = encode(compressor, &chunk_bytes(ci, cj, order == "F"));
            std::fs::write(path, bytes).unwrap();
        }
    }
}

fn open(dir: &Path) -> Reader<ZarrsStore<FilesystemStore>> {
    let store = FilesystemStore::new(dir).expect("should be able to create store");
    Reader::open(ZarrsStore::new(store)).expect("open array")
}

fn values(reader: &Reader<impl zarrs_v2_reader::storage::ChunkStore>, bytes: &[u8]) -> Vec<f32> {
    elements(reader.metadata().data_type(), bytes).expect("f32 elements")
}

fn check_read(compressor: Value, order: &str, separator: &str) {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    write_array(dir.path(), &compressor, order, separator, &[]);
    let reader = open(dir.path());

    let full = reader.read_full().unwrap();
    assert_eq!(full.len(), SIDE * SIDE * 4);
    assert_eq!(values(&reader, &full), raw());

    let region = reader.read_region(&[1, 1], &[2, 2]).unwrap();
    assert_eq!(values(&reader, &region), [5.0, 6.0, 9.0, 10.0]);

    let column = reader.read_region(&[0, 3], &[4, 1]).unwrap();
    assert_eq!(values(&reader, &column), [3.0, 7.0, 11.0, 15.0]);
}

#[test]
fn test_uncompressed() {
    check_read(Value::Null, "C", ".");
}

#[test]
fn test_zlib() {
    check_read(json!({"id": "zlib", "level": 1}), "C", ".");
}

#[test]
fn test_gzip() {
    check_read(json!({"id": "gzip", "level": 5}), "C", ".");
}

#[test]
fn test_bz2() {
    check_read(json!({"id": "bz2", "level": 9}), "C", ".");
}

#[test]
fn test_zstd() {
    check_read(json!({"id": "zstd", "level": 3}), "C", ".");
}

#[test]
fn test_fortran_order() {
    check_read(json!({"id": "zlib", "level": 1}), "F", ".");
}

#[test]
fn test_nested_chunk_keys() {
    check_read(json!({"id": "zstd", "level": 3}), "C", "/");
}

#[test]
fn test_missing_chunks() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    write_array(dir.path(), &Value::Null, "C", ".", &[[0, 1], [1, 0]]);
    let reader = open(dir.path());
    #[rustfmt::skip]
    let expected = [
        0.0, 1.0, 0.0, 0.0,
        4.0, 5.0, 0.0, 0.0,
        0.0, 0.0, 10.0, 11.0,
        0.0, 0.0, 14.0, 15.0,
    ];
    assert_eq!(values(&reader, &reader.read_full().unwrap()), expected);
    assert_eq!(reader.read_chunk(&[0, 1]).unwrap(), vec![0; CHUNK * CHUNK * 4]);
}

#[test]
fn test_batches() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    write_array(dir.path(), &json!({"id": "gzip", "level": 1}), "C", ".", &[]);
    let mut reader = open(dir.path());

    let mut rows = Vec::new();
    while let Some(batch) = reader.next_batch(3).unwrap() {
        rows.extend(values(&reader, &batch));
    }
    assert_eq!(rows, raw());

    let batches: Vec<Vec<u8>> = reader
        .batches(3)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches.concat(), reader.read_full().unwrap());
}

#[test]
fn test_out_of_bounds() {
    let dir = tempfile::tempdir().unwrap();
    write_array(dir.path(), &Value::Null, "C", ".", &[]);
    let reader = open(dir.path());
    assert!(matches!(
        reader.read_region(&[3, 0], &[2, 4]),
        Err(Error::Request(RequestError::OutOfBounds { axis: 0, .. }))
    ));
}

#[test]
fn test_corrupt_chunk_fails_whole_read() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let compressor = json!({"id": "zlib", "level": 1});
    write_array(dir.path(), &compressor, "C", ".", &[]);
    std::fs::write(dir.path().join("1.1"), b"not zlib").unwrap();
    let reader = open(dir.path());
    assert!(matches!(reader.read_full(), Err(Error::Codec(_))));
    assert!(reader.read_region(&[0, 0], &[2, 2]).is_ok());
}

#[test]
fn test_memory_store_with_prefix() {
    init_logger();
    let memory = Arc::new(MemoryStore::new());
    let set = |key: &str, bytes: Vec<u8>| {
        memory
            .set(&StoreKey::new(key).unwrap(), Bytes::from(bytes))
            .unwrap();
    };
    let compressor = json!({"id": "zstd", "level": 1});
    set("group/array/.zarray", zarray(&compressor, "C", "."));
    for ci in 0..SIDE / CHUNK {
        for cj in 0..SIDE / CHUNK {
            set(
                &format!("group/array/{ci}.{cj}"),
                encode(&compressor, &chunk_bytes(ci, cj, false)),
            );
        }
    }

    let reader = Reader::open(ZarrsStore::new(memory.clone()).with_prefix("group/array"))
        .unwrap()
        .with_options(ReadOptions::default().with_concurrent_target(1));
    assert_eq!(values(&reader, &reader.read_full().unwrap()), raw());

    assert!(matches!(
        Reader::open(ZarrsStore::new(memory).with_prefix("group")),
        Err(Error::MissingMetadata(_))
    ));
}

#[cfg(feature = "filesystem")]
#[test]
fn test_open_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    write_array(dir.path(), &json!({"id": "bz2", "level": 1}), "C", ".", &[]);
    let reader = Reader::open_filesystem(dir.path()).unwrap();
    assert_eq!(values(&reader, &reader.read_full().unwrap()), raw());
    reader.close();
}
