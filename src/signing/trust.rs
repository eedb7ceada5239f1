//! ES256 signatures in the libtrust pretty-JWS layout registries expect

use crate::error::SigningError;
use crate::image::{Manifest, SignedManifest};
use crate::signing::ManifestSigner;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{SecondsFormat, Utc};
use ring::rand::SystemRandom;
use ring::signature::{ECDSA_P256_SHA256_FIXED_SIGNING, EcdsaKeyPair, KeyPair};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use sha2::{Digest as _, Sha256};

const INDENT: &[u8] = b"   ";

/// DER prefix of a P-256 SubjectPublicKeyInfo, followed by the 65 byte point
const P256_SPKI_PREFIX: [u8; 26] = [
    0x30, 0x59, 0x30, 0x13, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x08,
    0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, 0x03, 0x42, 0x00,
];

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

pub struct TrustKey {
    pair: EcdsaKeyPair,
    key_id: String,
}

impl TrustKey {
    /// libtrust key id: `ABCD:EFGH:...`, 12 groups of 4
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    fn coordinates(&self) -> (&[u8], &[u8]) {
        // Uncompressed point: 0x04 || x || y
        let point = self.pair.public_key().as_ref();
        (&point[1..33], &point[33..65])
    }
}

#[derive(Serialize)]
struct Jwk<'a> {
    crv: &'static str,
    kid: &'a str,
    kty: &'static str,
    x: String,
    y: String,
}

#[derive(Serialize)]
struct SignatureHeader<'a> {
    jwk: Jwk<'a>,
    alg: &'static str,
}

#[derive(Serialize)]
struct JwsSignature<'a> {
    header: SignatureHeader<'a>,
    signature: String,
    protected: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Protected {
    format_length: usize,
    format_tail: String,
    time: String,
}

pub struct TrustSigner {
    rng: SystemRandom,
}

impl Default for TrustSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustSigner {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl ManifestSigner for TrustSigner {
    type Key = TrustKey;

    fn generate_key(&self) -> Result<TrustKey, SigningError> {
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &self.rng)
            .map_err(|_| SigningError::KeyGeneration("P-256 key generation failed".into()))?;
        let pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &self.rng)
            .map_err(|e| SigningError::KeyGeneration(e.to_string()))?;
        let key_id = key_id(pair.public_key().as_ref());
        Ok(TrustKey { pair, key_id })
    }

    fn sign(&self, manifest: &Manifest, key: &TrustKey) -> Result<SignedManifest, SigningError> {
        let payload = to_indented_json(manifest)?;

        let close = last_non_space(&payload, payload.len())
            .filter(|&i| payload[i] == b'}')
            .ok_or_else(|| SigningError::Serialization("payload is not a JSON object".into()))?;
        let last = last_non_space(&payload, close)
            .ok_or_else(|| SigningError::Serialization("empty JSON object".into()))?;
        let format_length = last + 1;
        let format_tail = &payload[format_length..];

        let protected = Protected {
            format_length,
            format_tail: URL_SAFE_NO_PAD.encode(format_tail),
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        let protected = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&protected)?);

        let signing_input = format!("{}.{}", protected, URL_SAFE_NO_PAD.encode(&payload));
        let signature = key
            .pair
            .sign(&self.rng, signing_input.as_bytes())
            .map_err(|_| SigningError::Signature("ECDSA signing failed".into()))?;

        let (x, y) = key.coordinates();
        let signatures = [JwsSignature {
            header: SignatureHeader {
                jwk: Jwk {
                    crv: "P-256",
                    kid: &key.key_id,
                    kty: "EC",
                    x: URL_SAFE_NO_PAD.encode(x),
                    y: URL_SAFE_NO_PAD.encode(y),
                },
                alg: "ES256",
            },
            signature: URL_SAFE_NO_PAD.encode(signature.as_ref()),
            protected,
        }];

        // Nested lines sit one level deeper than the member they belong to.
        let marshalled = to_indented_json(&signatures)?;
        let mut marshalled_nested = Vec::with_capacity(marshalled.len() + 64);
        for &byte in &marshalled {
            marshalled_nested.push(byte);
            if byte == b'\n' {
                marshalled_nested.extend_from_slice(INDENT);
            }
        }

        let mut raw = Vec::with_capacity(payload.len() + marshalled_nested.len() + 32);
        raw.extend_from_slice(&payload[..format_length]);
        raw.extend_from_slice(b",\n");
        raw.extend_from_slice(INDENT);
        raw.extend_from_slice(b"\"signatures\": ");
        raw.extend_from_slice(&marshalled_nested);
        raw.extend_from_slice(format_tail);

        Ok(SignedManifest::new(manifest.clone(), raw))
    }
}

fn to_indented_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, SigningError> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(INDENT));
    value.serialize(&mut serializer)?;
    Ok(out)
}

fn last_non_space(bytes: &[u8], end: usize) -> Option<usize> {
    bytes[..end].iter().rposition(|b| !b.is_ascii_whitespace())
}

fn key_id(public_point: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(P256_SPKI_PREFIX);
    hasher.update(public_point);
    let hash = hasher.finalize();

    // 240 bits encode to exactly 48 base32 characters, no padding
    let encoded = base32(&hash[..30]);
    encoded
        .as_bytes()
        .chunks(4)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join(":")
}

fn base32(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 8 / 5 + 1);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for &byte in data {
        buffer = (buffer << 8) | byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}
