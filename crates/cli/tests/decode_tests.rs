//! Tests for commands/decode.rs

use vigil_cli::commands::decode::{decode_header, HeaderEncoding};
use vigil_cli::utils::decode_hex;
use vigil_cli::CliError;
use vigil_crypto::BlsPrivateKey;
use vigil_types::{ChainHeader, FaultyLeader, HeaderCodec, TxBlockHeader, VcBlockHeader, H256};

fn vc_header() -> VcBlockHeader {
    let candidate = BlsPrivateKey::from_seed(&[2; 32]).unwrap().public_key();
    let failed = BlsPrivateKey::from_seed(&[3; 32]).unwrap().public_key();
    VcBlockHeader::new(
        1,
        4,
        1,
        "127.0.0.1:30301".parse().unwrap(),
        candidate,
        2,
        vec![FaultyLeader::new(failed, "127.0.0.1:30302".parse().unwrap())],
        H256::keccak256(b"committee"),
        H256::keccak256(b"parent"),
    )
    .unwrap()
}

#[test]
fn test_decode_view_change_hex() {
    let header = vc_header();
    let hex = format!("0x{}", hex::encode(header.serialize()));

    let decoded = decode_header(&decode_hex(&hex).unwrap(), HeaderEncoding::ViewChange).unwrap();
    assert_eq!(decoded, ChainHeader::ViewChange(header.clone()));
    assert_eq!(decoded.hash(), header.compute_hash());
}

#[test]
fn test_decode_tagged_envelope() {
    let key = BlsPrivateKey::from_seed(&[1; 32]).unwrap().public_key();
    let block = ChainHeader::Tx(TxBlockHeader::genesis(key, H256::NIL, 1_700_000_000_000));
    let decoded = decode_header(&block.serialize(), HeaderEncoding::Tagged).unwrap();
    assert_eq!(decoded, block);
}

#[test]
fn test_decode_wrong_kind_or_truncated_fails() {
    let bytes = vc_header().serialize();
    assert!(matches!(
        decode_header(&bytes[..bytes.len() - 1], HeaderEncoding::ViewChange),
        Err(CliError::Decode(_))
    ));
    assert!(matches!(
        decode_header(&bytes, HeaderEncoding::Tx),
        Err(CliError::Decode(_))
    ));
}
