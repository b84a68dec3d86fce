use crate::config::CredentialConfig;
use base64::{Engine as _, engine::general_purpose};
use http::HeaderMap;
use http::header::AUTHORIZATION;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingHeader,
    InvalidCredentials,
}

impl AuthError {
    pub fn message(self) -> &'static str {
        match self {
            Self::MissingHeader => "Missing Authorization Header",
            Self::InvalidCredentials => "Invalid Authentication Credentials",
        }
    }
}

pub fn parse_basic_credentials(headers: &HeaderMap) -> Result<BasicCredentials, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::MissingHeader)?;
    let encoded = parse_basic_payload(value).ok_or(AuthError::MissingHeader)?;

    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| AuthError::InvalidCredentials)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::InvalidCredentials)?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or(AuthError::InvalidCredentials)?;

    Ok(BasicCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

pub fn authenticate(
    headers: &HeaderMap,
    expected: &CredentialConfig,
) -> Result<BasicCredentials, AuthError> {
    let credentials = parse_basic_credentials(headers)?;
    if credentials.username != expected.username || credentials.password != expected.password {
        return Err(AuthError::InvalidCredentials);
    }
    Ok(credentials)
}

fn parse_basic_payload(value: &str) -> Option<&str> {
    let (scheme, payload) = value.trim().split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    Some(payload.trim())
}
