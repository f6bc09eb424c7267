//! Signed exchange framing, signature header and signed message layout

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ciborium::value::Value;

use super::version::Version;
use crate::error::{Result, ServiceError};

const MAX_SIGNATURE_LENGTH: usize = 16 * 1024;
const MAX_HEADERS_LENGTH: usize = 512 * 1024;
const CERT_SHA256_LENGTH: usize = 32;

/// A parsed, not yet verified, signed exchange
#[derive(Debug, Clone)]
pub struct Envelope {
    pub version: Version,
    /// Fallback URL, which is also the request URL
    pub request_url: String,
    pub signature_header: String,
    /// CBOR-encoded response headers exactly as they appear on the wire
    pub raw_headers: Vec<u8>,
    /// Decoded response headers in wire order
    pub response_headers: Vec<(String, String)>,
    /// Integrity-encoded payload
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let version = Version::from_magic(bytes).ok_or_else(|| {
            malformed("unsupported signed exchange magic")
        })?;
        let mut reader = Reader::new(&bytes[version.magic().len()..]);

        let url_length = reader.read_uint(2)?;
        let request_url = String::from_utf8(reader.read_bytes(url_length)?.to_vec())
            .map_err(|_| malformed("fallback URL is not UTF-8"))?;

        let signature_length = reader.read_uint(3)?;
        if signature_length > MAX_SIGNATURE_LENGTH {
            return Err(malformed(&format!(
                "signature header of {} bytes exceeds {}",
                signature_length, MAX_SIGNATURE_LENGTH
            )));
        }
        let headers_length = reader.read_uint(3)?;
        if headers_length > MAX_HEADERS_LENGTH {
            return Err(malformed(&format!(
                "response headers of {} bytes exceed {}",
                headers_length, MAX_HEADERS_LENGTH
            )));
        }

        let signature_header = String::from_utf8(reader.read_bytes(signature_length)?.to_vec())
            .map_err(|_| malformed("signature header is not UTF-8"))?;
        let raw_headers = reader.read_bytes(headers_length)?.to_vec();
        let response_headers = decode_headers(&raw_headers)?;
        let payload = reader.remaining().to_vec();

        Ok(Self {
            version,
            request_url,
            signature_header,
            raw_headers,
            response_headers,
            payload,
        })
    }

    /// Case-insensitive response header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.response_headers, name)
    }
}

pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn decode_headers(raw: &[u8]) -> Result<Vec<(String, String)>> {
    let value: Value = ciborium::de::from_reader(raw)
        .map_err(|e| malformed(&format!("response headers are not valid CBOR: {}", e)))?;

    let entries = match value {
        Value::Map(entries) => entries,
        _ => return Err(malformed("response headers are not a CBOR map")),
    };

    let mut headers = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        match (key, value) {
            (Value::Bytes(key), Value::Bytes(value)) => {
                let key = String::from_utf8(key)
                    .map_err(|_| malformed("response header name is not UTF-8"))?;
                let value = String::from_utf8(value)
                    .map_err(|_| malformed("response header value is not UTF-8"))?;
                headers.push((key, value));
            }
            _ => return Err(malformed("response header entries must be byte strings")),
        }
    }

    if find_header(&headers, ":status").is_none() {
        return Err(malformed("response headers lack :status"));
    }

    Ok(headers)
}

/// Parameters of one entry of the `Signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    pub label: String,
    pub sig: Vec<u8>,
    pub integrity: String,
    pub cert_url: String,
    pub cert_sha256: Option<Vec<u8>>,
    pub validity_url: String,
    pub date: u64,
    pub expires: u64,
}

impl SignatureParams {
    /// Parse a `Signature` header value into its signatures, in header order.
    /// Never returns an empty list.
    pub fn parse_all(header: &str) -> Result<Vec<Self>> {
        let signatures = split_unquoted(header, ',')
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse_one)
            .collect::<Result<Vec<_>>>()?;

        if signatures.is_empty() {
            return Err(malformed("empty signature header"));
        }
        Ok(signatures)
    }

    fn parse_one(entry: &str) -> Result<Self> {
        let mut parts = split_unquoted(entry, ';').into_iter().map(str::trim);
        let label = parts.next().unwrap_or_default().to_string();

        let mut sig = None;
        let mut integrity = None;
        let mut cert_url = None;
        let mut cert_sha256 = None;
        let mut validity_url = None;
        let mut date = None;
        let mut expires = None;

        for part in parts.filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| malformed(&format!("signature parameter {:?} has no value", part)))?;
            match key.trim() {
                "sig" => sig = Some(parse_byte_sequence(value)?),
                "integrity" => integrity = Some(parse_string(value)?),
                "cert-url" => cert_url = Some(parse_string(value)?),
                "cert-sha256" => {
                    let hash = parse_byte_sequence(value)?;
                    if hash.len() != CERT_SHA256_LENGTH {
                        return Err(malformed(&format!(
                            "cert-sha256 is {} bytes, expected {}",
                            hash.len(),
                            CERT_SHA256_LENGTH
                        )));
                    }
                    cert_sha256 = Some(hash);
                }
                "validity-url" => validity_url = Some(parse_string(value)?),
                "date" => date = Some(parse_integer(value)?),
                "expires" => expires = Some(parse_integer(value)?),
                _ => {}
            }
        }

        Ok(Self {
            label,
            sig: sig.ok_or_else(|| malformed("signature lacks sig"))?,
            integrity: integrity.ok_or_else(|| malformed("signature lacks integrity"))?,
            cert_url: cert_url.ok_or_else(|| malformed("signature lacks cert-url"))?,
            cert_sha256,
            validity_url: validity_url.ok_or_else(|| malformed("signature lacks validity-url"))?,
            date: date.ok_or_else(|| malformed("signature lacks date"))?,
            expires: expires.ok_or_else(|| malformed("signature lacks expires"))?,
        })
    }
}

/// Build the exact byte string covered by the exchange signature
pub fn signed_message(
    version: Version,
    params: &SignatureParams,
    request_url: &str,
    raw_headers: &[u8],
) -> Vec<u8> {
    let mut msg = Vec::with_capacity(
        64 + 64 + params.validity_url.len() + request_url.len() + raw_headers.len() + 64,
    );
    msg.extend_from_slice(&[0x20; 64]);
    msg.extend_from_slice(version.signature_context());
    msg.push(0x00);

    match &params.cert_sha256 {
        Some(hash) => {
            msg.push(CERT_SHA256_LENGTH as u8);
            msg.extend_from_slice(hash);
        }
        None => msg.push(0x00),
    }

    push_length_prefixed(&mut msg, params.validity_url.as_bytes());
    msg.extend_from_slice(&params.date.to_be_bytes());
    msg.extend_from_slice(&params.expires.to_be_bytes());
    push_length_prefixed(&mut msg, request_url.as_bytes());
    push_length_prefixed(&mut msg, raw_headers);
    msg
}

fn push_length_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Split on `separator`, ignoring separators inside double quotes
fn split_unquoted(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == separator && !in_quotes => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn parse_string(value: &str) -> Result<String> {
    let inner = value
        .trim()
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .ok_or_else(|| malformed(&format!("expected quoted string, got {:?}", value)))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(chars.next().ok_or_else(|| malformed("dangling escape in string"))?);
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

fn parse_byte_sequence(value: &str) -> Result<Vec<u8>> {
    let value = value.trim();
    let inner = value
        .strip_prefix('*')
        .and_then(|v| v.strip_suffix('*'))
        .or_else(|| value.strip_prefix(':').and_then(|v| v.strip_suffix(':')))
        .ok_or_else(|| malformed(&format!("expected byte sequence, got {:?}", value)))?;

    STANDARD
        .decode(inner)
        .map_err(|e| malformed(&format!("invalid base64 in byte sequence: {}", e)))
}

fn parse_integer(value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| malformed(&format!("expected integer, got {:?}", value)))
}

fn malformed(reason: &str) -> ServiceError {
    ServiceError::Verification(format!("malformed signed exchange: {}", reason))
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(malformed("unexpected end of input"));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    /// Big-endian unsigned integer of `width` bytes
    fn read_uint(&mut self, width: usize) -> Result<usize> {
        Ok(self
            .read_bytes(width)?
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | *b as usize))
    }

    fn remaining(&self) -> &'a [u8] {
        self.buf
    }
}
