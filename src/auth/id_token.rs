use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{OidcError, Result};

/// Claims decoded from an OIDC identity token.
///
/// The payload is read without verifying the signature: the token came
/// straight from the token endpoint over the configured transport and is
/// only used for display purposes here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdToken {
    pub iss: String,
    pub sub: String,
    #[serde(default, deserialize_with = "audience")]
    pub aud: Vec<String>,
    pub exp: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(flatten)]
    pub additional_claims: Map<String, Value>,
}

impl IdToken {
    /// Decode the payload segment of a compact JWT.
    pub fn parse(token: &str) -> Result<Self> {
        let mut segments = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(OidcError::InvalidResponse(
                "ID token is not a three-part JWT".to_string(),
            ));
        };
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|err| OidcError::InvalidResponse(format!("ID token payload: {err}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// A string-valued claim outside the registered set (`name`, `email`, ...).
    ///
    /// Missing or non-string claims yield `None`.
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.additional_claims.get(name).and_then(Value::as_str)
    }
}

fn audience<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Audience {
        One(String),
        Many(Vec<String>),
    }
    Ok(match Audience::deserialize(deserializer)? {
        Audience::One(value) => vec![value],
        Audience::Many(values) => values,
    })
}

#[cfg(test)]
pub(crate) fn encode_unsigned(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}
