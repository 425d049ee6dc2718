//! Stateless resumption tokens.
//!
//! A continuation request carries nothing but the token, so the token embeds
//! the whole originating filter (metadataPrefix, from, until, set) plus the
//! offset of the next page. The payload is compact JSON, base64url-encoded,
//! with a signature over the filter so that hand-edited tokens are rejected.
//! No server-side session state is kept.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::protocol::{Datestamp, ProtocolError};
use crate::query::HarvestFilter;

/// Bytes of SHA-256 kept in the signature.
const SIGNATURE_BYTES: usize = 8;

/// A decoded resumption token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumptionToken {
    pub filter: HarvestFilter,
    pub offset: usize,
}

#[derive(Serialize, Deserialize)]
struct Payload {
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    prefix: Option<String>,
    #[serde(rename = "f", default, skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    #[serde(rename = "u", default, skip_serializing_if = "Option::is_none")]
    until: Option<String>,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    set: Option<String>,
    #[serde(rename = "o")]
    offset: usize,
    #[serde(rename = "h")]
    signature: String,
}

impl ResumptionToken {
    pub fn new(filter: HarvestFilter, offset: usize) -> Self {
        Self { filter, offset }
    }

    pub fn decode(token: &str) -> Result<Self, ProtocolError> {
        decode(token).map(|(filter, offset)| Self { filter, offset })
    }
}

/// Hex SHA-256 prefix over the filter fields, each terminated by a unit
/// separator so that field boundaries are unambiguous.
pub fn signature(filter: &HarvestFilter) -> String {
    let from = filter.from.map(|d| d.to_string());
    let until = filter.until.map(|d| d.to_string());
    let mut hasher = Sha256::new();
    for part in [
        filter.metadata_prefix.as_deref(),
        from.as_deref(),
        until.as_deref(),
        filter.set.as_deref(),
    ] {
        hasher.update(part.unwrap_or("").as_bytes());
        hasher.update([0x1f]);
    }
    hex::encode(&hasher.finalize()[..SIGNATURE_BYTES])
}

/// Encodes the filter and the offset of the next page.
pub fn encode(filter: &HarvestFilter, offset: usize) -> String {
    let payload = Payload {
        prefix: filter.metadata_prefix.clone(),
        from: filter.from.map(|d| d.to_string()),
        until: filter.until.map(|d| d.to_string()),
        set: filter.set.clone(),
        offset,
        signature: signature(filter),
    };
    // Serializing a struct of strings and integers cannot fail.
    let json = serde_json::to_vec(&payload).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Decodes a token; any malformed or tampered token is `badResumptionToken`.
pub fn decode(token: &str) -> Result<(HarvestFilter, usize), ProtocolError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|_| ProtocolError::bad_resumption_token())?;
    let payload: Payload =
        serde_json::from_slice(&bytes).map_err(|_| ProtocolError::bad_resumption_token())?;

    let from = parse_datestamp(payload.from.as_deref())?;
    let until = parse_datestamp(payload.until.as_deref())?;
    let filter = HarvestFilter {
        metadata_prefix: payload.prefix,
        from,
        until,
        set: payload.set,
    };

    if signature(&filter) != payload.signature {
        return Err(ProtocolError::bad_resumption_token());
    }
    Ok((filter, payload.offset))
}

fn parse_datestamp(value: Option<&str>) -> Result<Option<Datestamp>, ProtocolError> {
    match value {
        None => Ok(None),
        Some(v) => Datestamp::parse(v)
            .map(Some)
            .ok_or_else(ProtocolError::bad_resumption_token),
    }
}
