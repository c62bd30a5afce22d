//! `Tl-Signature` request signing and verification.
//!
//! A signature is a detached-payload JWS (`<header>..<signature>`) with
//! ES512 over
//!
//! ```text
//! {METHOD} {path}\n
//! {Header-Name}: {value}\n      (one line per header listed in tl_headers)
//! {body}
//! ```

use {
    base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD},
    p521::ecdsa::{
        Signature, SigningKey, VerifyingKey,
        signature::{Signer, Verifier},
    },
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

const ALGORITHM: &str = "ES512";
const TL_VERSION: &str = "2";
/// P-521 field element length in bytes.
const COORDINATE_LEN: usize = 66;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("malformed signature: {0}")]
    Malformed(String),

    #[error("unsupported signature: {0}")]
    Unsupported(String),

    #[error("no key with kid {0} in key set")]
    UnknownKeyId(String),

    #[error("signed header {0} missing from request")]
    MissingHeader(String),

    #[error("signature does not match request")]
    Mismatch,

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Base64(#[from] base64::DecodeError),
}

#[derive(Debug, Serialize, Deserialize)]
struct JwsHeader {
    alg: String,
    kid: String,
    #[serde(default)]
    tl_version: Option<String>,
    #[serde(default)]
    tl_headers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jku: Option<String>,
}

/// Published key set (`/.well-known/jwks`).
#[derive(Debug, Clone, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: String,
    #[serde(default)]
    pub crv: Option<String>,
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<String>,
}

impl Jwk {
    fn verifying_key(&self) -> Result<VerifyingKey, SigningError> {
        if self.kty != "EC" || self.crv.as_deref() != Some("P-521") {
            return Err(SigningError::Unsupported(format!(
                "key {} is {} {:?}",
                self.kid, self.kty, self.crv
            )));
        }
        let x = decode_coordinate(self.x.as_deref(), &self.kid)?;
        let y = decode_coordinate(self.y.as_deref(), &self.kid)?;

        let mut sec1 = Vec::with_capacity(1 + 2 * COORDINATE_LEN);
        sec1.push(0x04);
        sec1.extend_from_slice(&x);
        sec1.extend_from_slice(&y);

        VerifyingKey::from_sec1_bytes(&sec1).map_err(|e| SigningError::InvalidKey(e.to_string()))
    }
}

/// JWK coordinates may drop leading zero bytes; pad back to field length.
fn decode_coordinate(value: Option<&str>, kid: &str) -> Result<Vec<u8>, SigningError> {
    let raw = URL_SAFE_NO_PAD.decode(
        value.ok_or_else(|| SigningError::InvalidKey(format!("key {kid} lacks a coordinate")))?,
    )?;
    if raw.len() > COORDINATE_LEN {
        return Err(SigningError::InvalidKey(format!("key {kid} coordinate too long")));
    }
    let mut padded = vec![0u8; COORDINATE_LEN - raw.len()];
    padded.extend_from_slice(&raw);
    Ok(padded)
}

/// Builds the bytes covered by the signature.
fn signing_payload(method: &str, path: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut payload = format!("{} {}\n", method.to_uppercase(), path).into_bytes();
    for (name, value) in headers {
        payload.extend_from_slice(format!("{name}: {value}\n").as_bytes());
    }
    payload.extend_from_slice(body);
    payload
}

fn signing_input(encoded_header: &str, payload: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(encoded_header.len() + 1 + payload.len() * 4 / 3 + 4);
    input.extend_from_slice(encoded_header.as_bytes());
    input.push(b'.');
    input.extend_from_slice(URL_SAFE_NO_PAD.encode(payload).as_bytes());
    input
}

/// Signs outbound requests with the merchant's private key.
pub struct RequestSigner {
    key_id: String,
    key: SigningKey,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    pub fn new(key_id: impl Into<String>, key: SigningKey) -> Self {
        Self {
            key_id: key_id.into(),
            key,
        }
    }

    /// Accepts SEC1 (`EC PRIVATE KEY`) or PKCS#8 (`PRIVATE KEY`) PEM.
    pub fn from_pem(key_id: impl Into<String>, pem: &str) -> Result<Self, SigningError> {
        use p521::pkcs8::DecodePrivateKey;

        let secret = p521::SecretKey::from_sec1_pem(pem)
            .or_else(|_| p521::SecretKey::from_pkcs8_pem(pem))
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        let key = SigningKey::from_bytes(&secret.to_bytes())
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        Ok(Self::new(key_id, key))
    }

    /// Produces a `Tl-Signature` value covering `headers` (in order).
    pub fn sign(
        &self,
        method: &str,
        path: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<String, SigningError> {
        let header = JwsHeader {
            alg: ALGORITHM.to_string(),
            kid: self.key_id.clone(),
            tl_version: Some(TL_VERSION.to_string()),
            tl_headers: Some(
                headers
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            jku: None,
        };
        let encoded_header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let payload = signing_payload(method, path, headers, body);

        let signature: Signature = self.key.sign(&signing_input(&encoded_header, &payload));
        Ok(format!(
            "{encoded_header}..{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }
}

fn parse_header(signature: &str) -> Result<JwsHeader, SigningError> {
    let encoded = signature
        .split('.')
        .next()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| SigningError::Malformed("empty header".into()))?;
    Ok(serde_json::from_slice(&URL_SAFE_NO_PAD.decode(encoded)?)?)
}

/// Key-set URL embedded in the signature header, if any.
pub fn extract_jku(signature: &str) -> Result<Option<String>, SigningError> {
    Ok(parse_header(signature)?.jku)
}

/// An inbound request as it must be verified: raw body, full path.
#[derive(Debug, Clone, Copy)]
pub struct VerifyRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub headers: &'a http::HeaderMap,
    pub body: &'a [u8],
}

/// Verifies `signature` against `request` using the key set `jwks`.
///
/// Paths differing only by a trailing slash are accepted.
pub fn verify(jwks: &Jwks, signature: &str, request: VerifyRequest<'_>) -> Result<(), SigningError> {
    let mut parts = signature.split('.');
    let (Some(encoded_header), Some(detached), Some(encoded_sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(SigningError::Malformed("expected three segments".into()));
    };
    if !detached.is_empty() {
        return Err(SigningError::Malformed("payload must be detached".into()));
    }

    let header = parse_header(signature)?;
    if header.alg != ALGORITHM {
        return Err(SigningError::Unsupported(format!("alg {}", header.alg)));
    }
    if header.tl_version.as_deref().is_some_and(|v| v != TL_VERSION) {
        return Err(SigningError::Unsupported(format!("tl_version {:?}", header.tl_version)));
    }

    let key = jwks
        .keys
        .iter()
        .find(|k| k.kid == header.kid)
        .ok_or_else(|| SigningError::UnknownKeyId(header.kid.clone()))?
        .verifying_key()?;

    let signed_names: Vec<&str> = header
        .tl_headers
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .collect();
    let mut signed_headers = Vec::with_capacity(signed_names.len());
    for name in &signed_names {
        let value = request
            .headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| SigningError::MissingHeader((*name).to_string()))?;
        signed_headers.push((*name, value));
    }

    let signature = Signature::from_slice(&URL_SAFE_NO_PAD.decode(encoded_sig)?)
        .map_err(|e| SigningError::Malformed(e.to_string()))?;

    let toggled = match request.path.strip_suffix('/') {
        Some(trimmed) => trimmed.to_string(),
        None => format!("{}/", request.path),
    };
    for path in [request.path, toggled.as_str()] {
        let payload = signing_payload(request.method, path, &signed_headers, request.body);
        if key
            .verify(&signing_input(encoded_header, &payload), &signature)
            .is_ok()
        {
            return Ok(());
        }
    }
    Err(SigningError::Mismatch)
}
