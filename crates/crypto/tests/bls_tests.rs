//! Tests for BLS12-381 signatures and the crypto provider

use vigil_crypto::{
    BlsKeccak, BlsPrivateKey, BlsPublicKey, BlsSignature, CryptoProvider, DomainTag,
};

fn domain() -> DomainTag {
    DomainTag::view_change("vigil-test")
}

#[test]
fn test_key_generation() {
    let sk1 = BlsPrivateKey::random();
    let sk2 = BlsPrivateKey::random();
    assert_ne!(sk1.to_bytes(), sk2.to_bytes());
}

#[test]
fn test_key_from_bytes() {
    let sk = BlsPrivateKey::random();
    let restored = BlsPrivateKey::from_bytes(&sk.to_bytes()).unwrap();
    assert_eq!(sk.public_key(), restored.public_key());
}

#[test]
fn test_private_key_hex_roundtrip() {
    let sk = BlsPrivateKey::from_seed(&[42u8; 32]).unwrap();
    let restored = BlsPrivateKey::from_hex(&sk.to_hex()).unwrap();
    assert_eq!(sk.to_bytes(), restored.to_bytes());
}

#[test]
fn test_sign_verify() {
    let sk = BlsPrivateKey::random();
    let pk = sk.public_key();

    let sig = sk.sign(b"test message", &domain());
    assert!(sig.verify(b"test message", &pk, &domain()));
    assert!(pk.verify(b"test message", &sig, &domain()));
    assert!(!sig.verify(b"wrong message", &pk, &domain()));
}

#[test]
fn test_wrong_key_rejected() {
    let sk = BlsPrivateKey::random();
    let other = BlsPrivateKey::random().public_key();
    let sig = sk.sign(b"payload", &domain());
    assert!(!sig.verify(b"payload", &other, &domain()));
}

#[test]
fn test_signature_bytes_roundtrip() {
    let sk = BlsPrivateKey::random();
    let sig = sk.sign(b"payload", &domain());
    let restored = BlsSignature::from_bytes(&sig.to_bytes()).unwrap();
    assert_eq!(sig, restored);
    assert!(restored.verify(b"payload", &sk.public_key(), &domain()));
}

#[test]
fn test_invalid_public_key_bytes() {
    assert!(BlsPublicKey::from_bytes(&[0xffu8; 48]).is_err());
    assert!(BlsPublicKey::from_hex("abcd").is_err());
}

#[test]
fn test_public_key_ordering_follows_bytes() {
    let mut keys: Vec<_> = (0..5).map(|_| BlsPrivateKey::random().public_key()).collect();
    keys.sort();
    for pair in keys.windows(2) {
        assert!(pair[0].to_bytes() <= pair[1].to_bytes());
    }
}

#[test]
fn test_public_key_serde_json() {
    let pk = BlsPrivateKey::from_seed(&[3u8; 32]).unwrap().public_key();
    let json = serde_json::to_string(&pk).unwrap();
    assert_eq!(json, format!("\"{}\"", pk.to_hex()));
    let back: BlsPublicKey = serde_json::from_str(&json).unwrap();
    assert_eq!(back, pk);
}

#[test]
fn test_provider_aggregate_quorum() {
    let provider = BlsKeccak::new("vigil-test");
    let keys: Vec<_> = (0..4).map(|_| BlsPrivateKey::random()).collect();
    let message = provider.hash(b"view change header");

    let sigs: Vec<_> = keys[..3].iter().map(|k| provider.sign(&message, k)).collect();
    let sig_refs: Vec<_> = sigs.iter().collect();
    let aggregate = provider.aggregate(&sig_refs).unwrap();

    let signers: Vec<_> = keys[..3].iter().map(|k| k.public_key()).collect();
    let signer_refs: Vec<_> = signers.iter().collect();
    assert!(provider.verify_aggregate(&message, &aggregate, &signer_refs));

    let everyone: Vec<_> = keys.iter().map(|k| k.public_key()).collect();
    let everyone_refs: Vec<_> = everyone.iter().collect();
    assert!(!provider.verify_aggregate(&message, &aggregate, &everyone_refs));
}

#[test]
fn test_provider_domain_is_view_change() {
    let provider = BlsKeccak::new("vigil-test");
    assert_eq!(provider.domain(), &domain());
    assert_eq!(provider.domain().chain_id(), "vigil-test");
}
