// SPDX-License-Identifier: MIT

//! Decoding of realistic wire blobs.

use std::path::PathBuf;

use ferry_cache_client::{KvBlob, NarInfo, NixCacheInfo};

#[test]
fn cache_info_blob() {
    let blob = KvBlob::parse("StoreDir: /nix/store\nWantMassQuery: 1\nPriority: 40\n").unwrap();
    let info = NixCacheInfo::from_blob(&blob).unwrap();
    assert_eq!(info.store_dir, PathBuf::from("/nix/store"));
    assert!(info.want_mass_query);
    assert_eq!(info.priority, Some(40));
}

#[test]
fn narinfo_blob_with_every_key() {
    // keys a serving cache emits, including ones this client has no use
    // for (Compression, Sig); those must be tolerated
    let blob = KvBlob::parse(
        "StorePath: /nix/store/abcdefghijklmnopqrstuvwxyz012345-hello-2.10\n\
         URL: nar/1b8m03r63zqhnjf7l5wnldhh7c134ap5vpj0850ymkq1iyzicy5s.nar\n\
         Compression: none\n\
         FileHash: sha256:1b8m03r63zqhnjf7l5wnldhh7c134ap5vpj0850ymkq1iyzicy5s\n\
         FileSize: 4029176\n\
         NarHash: sha256:1b8m03r63zqhnjf7l5wnldhh7c134ap5vpj0850ymkq1iyzicy5s\n\
         NarSize: 4029184\n\
         References: /nix/store/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-glibc-2.40 /nix/store/abcdefghijklmnopqrstuvwxyz012345-hello-2.10\n\
         Deriver: /nix/store/bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb-hello-2.10.drv\n\
         Sig: cache.example.org-1:signaturesignaturesignature\n",
    )
    .unwrap();

    let info = NarInfo::from_blob(&blob).unwrap();
    assert_eq!(
        info.store_path,
        PathBuf::from("/nix/store/abcdefghijklmnopqrstuvwxyz012345-hello-2.10")
    );
    assert_eq!(
        info.url.as_deref(),
        Some("nar/1b8m03r63zqhnjf7l5wnldhh7c134ap5vpj0850ymkq1iyzicy5s.nar")
    );
    assert_eq!(info.nar_size, 4029184);
    assert_eq!(info.file_size, 4029176);
    assert_eq!(info.references.len(), 2);
    assert_eq!(
        info.deriver,
        Some(PathBuf::from(
            "/nix/store/bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb-hello-2.10.drv"
        ))
    );
}

#[test]
fn empty_references_value_is_rejected_by_the_blob_grammar() {
    // `References:` with nothing after the colon has no VALUE bytes
    assert!(KvBlob::parse("References:\n").is_err());
}

#[test]
fn serialize_parse_is_idempotent_on_a_real_blob() {
    let text = "StoreDir: /nix/store\nWantMassQuery: 1\nPriority: 40\n";
    let parsed = KvBlob::parse(text).unwrap();
    let reparsed = KvBlob::parse(&parsed.serialize()).unwrap();
    assert_eq!(parsed, reparsed);
}
