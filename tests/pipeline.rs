use std::io::Cursor;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use duibi_core::{
    fingerprint, is_valid_key, list_latest, normalize, CompareError, ComparisonStore, Ingestor,
    SledStore,
};
use image::{DynamicImage, ImageFormat, RgbImage};
use sha1::{Digest, Sha1};

fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

fn dimensions(bytes: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(bytes).unwrap();
    (img.width(), img.height())
}

#[test]
fn end_to_end_jpeg_and_png() {
    let left_raw = encode(1024, 768, ImageFormat::Jpeg);
    let right_raw = encode(400, 300, ImageFormat::Png);
    let submitter = "a@example.com";

    let left = normalize(&left_raw).unwrap();
    let right = normalize(&right_raw).unwrap();
    assert_eq!(dimensions(&left), (400, 300));
    assert_eq!(dimensions(&right), (400, 300));
    assert_eq!(image::guess_format(&right).unwrap(), ImageFormat::Jpeg);

    let mut hasher = Sha1::new();
    hasher.update(&left);
    hasher.update(&right);
    hasher.update(submitter.as_bytes());
    let expected = hex::encode(&hasher.finalize()[..16]);
    assert_eq!(fingerprint(&left, &right, submitter), expected);

    let store = Arc::new(SledStore::temporary().unwrap());
    let ingestor = Ingestor::new(store.clone());
    let key = ingestor.ingest(&left_raw, &right_raw, submitter, "").unwrap();

    assert_eq!(key, expected);
    assert!(is_valid_key(&key));

    let record = ingestor.get(&key).unwrap();
    assert_eq!(record.left, left);
    assert_eq!(record.right, right);
    assert_eq!(record.submitter, submitter);
    assert_eq!(record.title, "");
}

#[test]
fn repeated_ingest_keeps_one_record() {
    let store = Arc::new(SledStore::temporary().unwrap());
    let ingestor = Ingestor::new(store.clone());
    let left = encode(2000, 1000, ImageFormat::Png);
    let right = encode(50, 80, ImageFormat::Jpeg);

    let first = ingestor.ingest(&left, &right, "s", "first title").unwrap();
    let second = ingestor.ingest(&left, &right, "s", "second title").unwrap();

    assert_eq!(first, second);
    assert_eq!(store.count().unwrap(), 1);
    assert_eq!(list_latest(store.as_ref()).unwrap().len(), 1);
    assert_eq!(dimensions(&ingestor.get(&first).unwrap().left), (400, 200));
}

#[test]
fn failed_decode_stores_nothing() {
    let store = Arc::new(SledStore::temporary().unwrap());
    let ingestor = Ingestor::new(store.clone());
    let good = encode(10, 10, ImageFormat::Png);

    let err = ingestor.ingest(&good, b"GIF89a not supported", "s", "").unwrap_err();
    assert!(matches!(err, CompareError::InvalidImageFormat));
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn listing_is_newest_first_on_disk_store() {
    let store = Arc::new(SledStore::temporary().unwrap());
    let ingestor = Ingestor::new(store.clone());
    let right = encode(10, 10, ImageFormat::Png);

    let mut expected = Vec::new();
    for (i, at) in [5_i64, 50, 500, 1, 100].into_iter().enumerate() {
        let left = encode(10 + i as u32, 10, ImageFormat::Png);
        let when = Utc.timestamp_opt(1_600_000_000 + at, 0).unwrap();
        let key = ingestor.ingest_at(&left, &right, "s", "", when).unwrap();
        expected.push((at, key));
    }
    expected.sort_by(|a, b| b.0.cmp(&a.0));

    let keys: Vec<String> = ingestor.list().unwrap().iter().map(|c| c.key()).collect();
    let expected: Vec<String> = expected.into_iter().map(|(_, k)| k).collect();
    assert_eq!(keys, expected);
}
