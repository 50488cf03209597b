//! Signature verification for `CHECK_SIGNATURE`.
//!
//! Every scheme signs the BLAKE2b-256 digest of the message. ed25519 signs
//! the digest bytes; secp256k1 and p256 use the digest as the ECDSA prehash.

use crate::types::hash::Hash;
use crate::types::keys::{PublicKey, Signature, SignatureKind};
use ed25519_dalek::Verifier;
use k256::ecdsa::signature::hazmat::PrehashVerifier;

fn kind_matches(key: &PublicKey, kind: SignatureKind) -> bool {
    matches!(
        (key, kind),
        (_, SignatureKind::Generic)
            | (PublicKey::Ed25519(_), SignatureKind::Ed25519)
            | (PublicKey::Secp256k1(_), SignatureKind::Secp256k1)
            | (PublicKey::P256(_), SignatureKind::P256)
    )
}

fn verify_ed25519(key: &[u8; 32], sig: &[u8; 64], digest: &[u8]) -> bool {
    let Ok(vk) = ed25519_dalek::VerifyingKey::from_bytes(key) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(sig);
    vk.verify(digest, &sig).is_ok()
}

fn verify_secp256k1(key: &[u8; 33], sig: &[u8; 64], digest: &[u8]) -> bool {
    let Ok(vk) = k256::ecdsa::VerifyingKey::from_sec1_bytes(key) else {
        return false;
    };
    let Ok(sig) = k256::ecdsa::Signature::from_slice(sig) else {
        return false;
    };
    vk.verify_prehash(digest, &sig).is_ok()
}

fn verify_p256(key: &[u8; 33], sig: &[u8; 64], digest: &[u8]) -> bool {
    let Ok(vk) = p256::ecdsa::VerifyingKey::from_sec1_bytes(key) else {
        return false;
    };
    let Ok(sig) = p256::ecdsa::Signature::from_slice(sig) else {
        return false;
    };
    vk.verify_prehash(digest, &sig).is_ok()
}

/// Checks `signature` over `message` with `key`.
///
/// Malformed keys or signatures, a signature flavour that does not match the
/// key's curve, and plain verification failures all yield `false`.
pub fn check_signature(key: &PublicKey, signature: &Signature, message: &[u8]) -> bool {
    if !kind_matches(key, signature.kind) {
        return false;
    }
    let digest = Hash::digest(message);
    match key {
        PublicKey::Ed25519(k) => verify_ed25519(k, &signature.bytes, digest.as_slice()),
        PublicKey::Secp256k1(k) => verify_secp256k1(k, &signature.bytes, digest.as_slice()),
        PublicKey::P256(k) => verify_p256(k, &signature.bytes, digest.as_slice()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::keys::to_array;
    use ed25519_dalek::Signer;
    use k256::ecdsa::signature::hazmat::PrehashSigner;

    /// Deterministic ed25519 key pair and a signature of `message`.
    pub(crate) fn ed25519_signed(message: &[u8]) -> (PublicKey, Signature) {
        let sk = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
        let digest = Hash::digest(message);
        let sig = sk.sign(digest.as_slice());
        (
            PublicKey::Ed25519(sk.verifying_key().to_bytes()),
            Signature {
                kind: SignatureKind::Ed25519,
                bytes: sig.to_bytes(),
            },
        )
    }

    fn secp256k1_signed(message: &[u8]) -> (PublicKey, Signature) {
        let sk = k256::ecdsa::SigningKey::from_slice(&[3u8; 32]).unwrap();
        let digest = Hash::digest(message);
        let sig: k256::ecdsa::Signature = sk.sign_prehash(digest.as_slice()).unwrap();
        let sig = sig.normalize_s().unwrap_or(sig);
        let point = sk.verifying_key().to_encoded_point(true);
        (
            PublicKey::Secp256k1(to_array(point.as_bytes())),
            Signature {
                kind: SignatureKind::Secp256k1,
                bytes: to_array(&sig.to_bytes()),
            },
        )
    }

    fn p256_signed(message: &[u8]) -> (PublicKey, Signature) {
        let sk = p256::ecdsa::SigningKey::from_slice(&[5u8; 32]).unwrap();
        let digest = Hash::digest(message);
        let sig: p256::ecdsa::Signature = sk.sign_prehash(digest.as_slice()).unwrap();
        let point = sk.verifying_key().to_encoded_point(true);
        (
            PublicKey::P256(to_array(point.as_bytes())),
            Signature {
                kind: SignatureKind::P256,
                bytes: to_array(&sig.to_bytes()),
            },
        )
    }

    #[test]
    fn valid_signatures_verify() {
        for (key, sig) in [
            ed25519_signed(b"hello"),
            secp256k1_signed(b"hello"),
            p256_signed(b"hello"),
        ] {
            assert!(check_signature(&key, &sig, b"hello"), "{:?}", key.curve());
            assert!(check_signature(&key, &Signature::generic(sig.bytes), b"hello"));
        }
    }

    #[test]
    fn tampered_message_is_false() {
        let (key, sig) = ed25519_signed(b"hello");
        assert!(!check_signature(&key, &sig, b"hellp"));
        let (key, sig) = secp256k1_signed(b"hello");
        assert!(!check_signature(&key, &sig, b""));
    }

    #[test]
    fn garbage_signature_is_false() {
        let (key, _) = ed25519_signed(b"x");
        assert!(!check_signature(&key, &Signature::generic([0xff; 64]), b"x"));
        let (key, _) = p256_signed(b"x");
        assert!(!check_signature(&key, &Signature::generic([0u8; 64]), b"x"));
    }

    #[test]
    fn wrong_flavour_is_false() {
        let (key, sig) = ed25519_signed(b"m");
        let relabelled = Signature {
            kind: SignatureKind::P256,
            ..sig
        };
        assert!(!check_signature(&key, &relabelled, b"m"));
    }

    #[test]
    fn invalid_curve_point_is_false() {
        let key = PublicKey::Secp256k1([0x02; 33]);
        assert!(!check_signature(&key, &Signature::generic([1u8; 64]), b"m"));
    }
}
