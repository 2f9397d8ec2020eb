// SPDX-License-Identifier: MIT

//! End-to-end codec scenarios at the public API.

use std::path::Path;

use ferry_store_core::{
    Derivation, FileHash, FullStorePath, HashEncoding, ParseStorePathError, StoreDir, StorePath,
};

#[test]
fn store_path_textual_roundtrip() {
    let text = "abcdefghijklmnopqrstuvwxyz012345-hello-2.10";
    let path = StorePath::parse(text).unwrap();
    assert_eq!(path.hash_part(), "abcdefghijklmnopqrstuvwxyz012345");
    assert_eq!(path.name(), "hello-2.10");
    assert_eq!(path.to_string(), text);
    assert_eq!(StorePath::parse(&path.to_string()).unwrap(), path);
}

#[test]
fn full_store_path_splits_directory_and_basename() {
    let full = FullStorePath::parse("/nix/store/abcdefghijklmnopqrstuvwxyz012345-hello").unwrap();
    assert_eq!(full.store_dir().as_path(), Path::new("/nix/store"));
    assert_eq!(
        full.store_path(),
        &StorePath::parse("abcdefghijklmnopqrstuvwxyz012345-hello").unwrap()
    );
}

#[test]
fn store_dir_rejects_relative_roots() {
    assert!(matches!(
        StoreDir::new("nix/store"),
        Err(ParseStorePathError::NotAbsolute(_))
    ));
}

#[test]
fn derivation_minimal_scenario() {
    let store_dir = StoreDir::new("/nix/store").unwrap();
    let input = concat!(
        r#"Derive([("out","/nix/store/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-x","","")]"#,
        r#",[],[],"x86_64-linux","/bin/sh",[],[])"#,
    );
    let drv = Derivation::parse(&store_dir, input).unwrap();

    assert_eq!(drv.outputs.len(), 1);
    assert!(drv.outputs.contains_key("out"));
    assert!(drv.input_derivations.is_empty());
    assert!(drv.input_sources.is_empty());
    assert_eq!(drv.builder, Path::new("/bin/sh"));
    assert!(drv.args.is_empty());
    assert!(drv.env.is_empty());
}

#[test]
fn derivation_fixed_output_carries_hash() {
    let store_dir = StoreDir::new("/nix/store").unwrap();
    let digest = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
    let input = format!(
        concat!(
            r#"Derive([("out","/nix/store/xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx-src","sha256","{}")]"#,
            r#",[],[],"x86_64-linux","/bin/sh",[],[])"#,
        ),
        digest
    );
    let drv = Derivation::parse(&store_dir, &input).unwrap();

    let hash = drv.outputs["out"].hash.as_ref().unwrap();
    assert_eq!(hash, &FileHash::parse(&format!("sha256:{digest}")).unwrap());
    assert_eq!(hash.encoding(), HashEncoding::Hex);
}
