//! End-to-end tests across keys, messages, packages and archives.
//!
//! These use full-size 2048-bit keys and go through PEM files on disk the way
//! the CLI does.

use hybridcrypt::archive::{Archive, BundleArchive};
use hybridcrypt::crypto::{KeyPair, PublicKey};
use hybridcrypt::message;
use hybridcrypt::package::{
    decrypt_package, encrypt_package, encrypt_package_with, EncryptOptions, Package, PackageView,
    Stage, HEADER_LEN_SIZE,
};
use hybridcrypt::Error;
use std::fs;
use std::sync::OnceLock;

fn keys() -> &'static [KeyPair] {
    static KEYS: OnceLock<Vec<KeyPair>> = OnceLock::new();
    KEYS.get_or_init(|| (0..2).map(|_| KeyPair::generate(2048).unwrap()).collect())
}

/// A short message under a 2048-bit key is one segment and comes back intact.
#[test]
fn message_hello_world() {
    let pair = &keys()[0];
    let encoded = message::encrypt_text("hello world", pair.public_key()).unwrap();

    assert_eq!(message::segment_count(&encoded), 1);
    assert!(!encoded.contains(message::DELIMITER));
    assert_eq!(message::decrypt(&encoded, pair).unwrap(), "hello world");
}

/// 500 bytes at 214 bytes per block needs three segments.
#[test]
fn message_spans_three_segments() {
    let pair = &keys()[0];
    let text = "m".repeat(500);
    let encoded = message::encrypt_text(&text, pair.public_key()).unwrap();

    assert_eq!(message::chunk_size(256).unwrap(), 214);
    assert_eq!(message::segment_count(&encoded), 3);
    assert_eq!(message::decrypt(&encoded, pair).unwrap(), text);
}

/// Two recipients share one ciphertext; each header holds a 256-byte wrap.
#[test]
fn package_two_recipients() {
    let pairs = keys();
    let payload: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();
    let recipients: Vec<PublicKey> = pairs.iter().map(|p| p.public_key().clone()).collect();

    let packages = encrypt_package(&payload, &recipients).unwrap();
    assert_eq!(packages.len(), 2);

    for (package, pair) in packages.iter().zip(pairs) {
        let bytes = package.to_bytes().unwrap();
        assert_eq!(&bytes[..HEADER_LEN_SIZE], &256u32.to_be_bytes());
        assert_eq!(bytes.len(), HEADER_LEN_SIZE + 256 + payload.len());

        let view = PackageView::parse(&bytes).unwrap();
        assert_eq!(view.header_len(), 256);
        assert_eq!(view.ciphertext, packages[0].ciphertext());

        assert_eq!(decrypt_package(&bytes, pair).unwrap(), payload);
    }

    let cross = packages[0].to_bytes().unwrap();
    let err = decrypt_package(&cross, &pairs[1]).unwrap_err();
    assert!(matches!(err.root(), Error::KeyMismatch));
    assert_eq!(err.stage(), Some(Stage::UnwrapBundle));
}

/// Keys saved to PEM, files archived, packaged, written, read back, unpacked.
#[test]
fn archive_package_end_to_end() {
    let work = tempfile::tempdir().unwrap();

    let key_path = work.path().join("bob.pem");
    let public_path = keys()[1].save_pem_files(&key_path).unwrap();
    let recipient = PublicKey::load_pem_file(&public_path).unwrap();

    let src = work.path().join("report");
    fs::create_dir_all(src.join("figures")).unwrap();
    fs::write(src.join("summary.txt"), "quarterly numbers").unwrap();
    fs::write(src.join("figures").join("chart.bin"), vec![0xA5u8; 4096]).unwrap();

    let payload = BundleArchive::new().pack(&[src]).unwrap();
    let options = EncryptOptions::default().parallel(true);
    let packages = encrypt_package_with(&payload, &[recipient], &options).unwrap();

    let package_path = work.path().join("report_1.epkg");
    let file = fs::File::create(&package_path).unwrap();
    packages[0].write_to(file).unwrap();

    let on_disk = fs::read(&package_path).unwrap();
    assert_eq!(Package::parse(&on_disk).unwrap().ciphertext(), packages[0].ciphertext());

    let holder = KeyPair::load_pem_file(&key_path).unwrap();
    let decrypted = decrypt_package(&on_disk, &holder).unwrap();

    let out = work.path().join("out");
    fs::create_dir_all(&out).unwrap();
    let written = BundleArchive::new().unpack(&decrypted, &out).unwrap();

    assert_eq!(written.len(), 2);
    assert_eq!(
        fs::read_to_string(out.join("report").join("summary.txt")).unwrap(),
        "quarterly numbers"
    );
    assert_eq!(
        fs::read(out.join("report").join("figures").join("chart.bin")).unwrap(),
        vec![0xA5u8; 4096]
    );
}

/// A package cut short inside the wrapped bundle is reported as truncated.
#[test]
fn truncated_package_file() {
    let pair = &keys()[0];
    let packages = encrypt_package(b"short lived", &[pair.public_key().clone()]).unwrap();
    let bytes = packages[0].to_bytes().unwrap();

    let err = decrypt_package(&bytes[..100], pair).unwrap_err();
    match err.root() {
        Error::TruncatedInput { needed, available } => {
            assert_eq!(*needed, HEADER_LEN_SIZE + 256);
            assert_eq!(*available, 100);
        }
        other => panic!("expected TruncatedInput, got: {other:?}"),
    }
}
