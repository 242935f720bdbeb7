use murmur_base::{z85, Cert};
use proptest::prelude::*;
use x25519_dalek::{PublicKey, StaticSecret};

/// Derive the matching public key for an arbitrary 32-byte secret.
fn key_pair(secret: [u8; 32]) -> ([u8; 32], [u8; 32]) {
    let public = PublicKey::from(&StaticSecret::from(secret));
    (public.to_bytes(), secret)
}

proptest! {
    /// Raw key material survives construction unchanged.
    #[test]
    fn raw_keys_roundtrip(secret in any::<[u8; 32]>()) {
        let (public, secret) = key_pair(secret);
        prop_assume!(secret != [0u8; 32]);
        let cert = Cert::from_keys(public, secret).expect("valid pair");
        prop_assert_eq!(cert.public_key(), &public);
        prop_assert_eq!(cert.secret_key(), &secret);
    }

    /// Text keys rebuild an equal certificate.
    #[test]
    fn text_keys_roundtrip(secret in any::<[u8; 32]>()) {
        let (public, secret) = key_pair(secret);
        prop_assume!(secret != [0u8; 32]);
        let cert = Cert::from_keys(public, secret).expect("valid pair");
        let rebuilt = Cert::from_keys(cert.public_txt(), cert.secret_txt()).expect("text pair");
        prop_assert_eq!(rebuilt, cert);
    }

    /// Z85 is lossless for any input whose length is a multiple of 4.
    #[test]
    fn z85_roundtrip(words in prop::collection::vec(any::<[u8; 4]>(), 0..64)) {
        let data: Vec<u8> = words.concat();
        let text = z85::encode(&data).expect("encode");
        prop_assert_eq!(text.len(), data.len() / 4 * 5);
        prop_assert_eq!(z85::decode(&text).expect("decode"), data);
    }

    /// Any key length other than 32 or 40 is rejected.
    #[test]
    fn odd_key_lengths_rejected(key in prop::collection::vec(any::<u8>(), 0..80)) {
        prop_assume!(key.len() != 32 && key.len() != 40);
        prop_assert!(Cert::from_public(&key).is_err());
        prop_assert!(Cert::from_keys(&key, &key).is_err());
    }
}
