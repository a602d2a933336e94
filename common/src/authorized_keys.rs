//! Normalization of user-supplied public keys into `authorized_keys` lines.

use crate::error::ComputeError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Comment attached to keys converted from SSH2 format.
pub const SSH2_COMMENT: &str = "cloug@cloug";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFormatError {
    MalformedOpenSsh(String),
    InvalidSsh2Base64(String),
    InvalidKeyBlob(String),
}

impl std::fmt::Display for KeyFormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyFormatError::MalformedOpenSsh(msg) => write!(
                f,
                "failed to parse public key from authorized keys format: {}",
                msg
            ),
            KeyFormatError::InvalidSsh2Base64(msg) => write!(
                f,
                "detected SSH2 format, but contains invalid base64 content: {}",
                msg
            ),
            KeyFormatError::InvalidKeyBlob(msg) => {
                write!(f, "failed to parse public key blob: {}", msg)
            }
        }
    }
}

impl std::error::Error for KeyFormatError {}

impl From<KeyFormatError> for ComputeError {
    fn from(err: KeyFormatError) -> Self {
        ComputeError::Validation(err.to_string())
    }
}

/// Converts an OpenSSH or RFC 4716 (SSH2) public key into a single
/// `<type> <base64> <comment>` line.
pub fn to_authorized_keys_format(input: &str) -> Result<String, KeyFormatError> {
    let normalized = input.trim().replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    match lines.as_slice() {
        [] => Err(KeyFormatError::MalformedOpenSsh("empty key".to_string())),
        [line] => parse_openssh_line(line),
        _ => parse_ssh2_block(&lines),
    }
}

/// Accepts an optional leading options field (`no-pty,from="a b"`), which is
/// dropped from the output. The comment is kept as written.
fn parse_openssh_line(line: &str) -> Result<String, KeyFormatError> {
    match parse_key_fields(line) {
        Ok(key) => Ok(key),
        Err(err) => match strip_options(line) {
            Some(rest) => parse_key_fields(rest).map_err(|_| err),
            None => Err(err),
        },
    }
}

fn split_field(input: &str) -> (&str, &str) {
    match input.find([' ', '\t']) {
        Some(end) => (&input[..end], &input[end..]),
        None => (input, ""),
    }
}

fn parse_key_fields(line: &str) -> Result<String, KeyFormatError> {
    let (declared_type, rest) = split_field(line.trim());
    let (encoded, comment) = split_field(rest.trim_start());
    if declared_type.is_empty() || encoded.is_empty() {
        return Err(KeyFormatError::MalformedOpenSsh(
            "expected key type and base64 key".to_string(),
        ));
    }
    let comment = comment.trim();

    let blob = BASE64
        .decode(encoded)
        .map_err(|e| KeyFormatError::MalformedOpenSsh(format!("invalid base64: {}", e)))?;
    let key_type = blob_key_type(&blob).map_err(KeyFormatError::MalformedOpenSsh)?;
    if key_type != declared_type {
        return Err(KeyFormatError::MalformedOpenSsh(format!(
            "key type {} does not match encoded type {}",
            declared_type, key_type
        )));
    }

    let encoded = BASE64.encode(&blob);
    if comment.is_empty() {
        Ok(format!("{} {}", key_type, encoded))
    } else {
        Ok(format!("{} {} {}", key_type, encoded, comment))
    }
}

/// Returns what follows the options field: everything after the first
/// whitespace outside double quotes. Backslash escapes a quote inside quotes.
fn strip_options(line: &str) -> Option<&str> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ' ' | '\t' if !in_quotes => return Some(line[i..].trim_start()),
            _ => {}
        }
    }
    None
}

fn parse_ssh2_block(lines: &[&str]) -> Result<String, KeyFormatError> {
    let mut body = String::new();
    let mut continuation = false;
    for line in lines {
        // markers and headers contain '-' or ':'; headers may continue with '\'
        if continuation || line.contains([':', '-']) {
            continuation = line.ends_with('\\');
        } else {
            body.push_str(line);
        }
    }

    let blob = BASE64
        .decode(&body)
        .map_err(|e| KeyFormatError::InvalidSsh2Base64(e.to_string()))?;
    let key_type = blob_key_type(&blob).map_err(KeyFormatError::InvalidKeyBlob)?;
    Ok(format!(
        "{} {} {}",
        key_type,
        BASE64.encode(&blob),
        SSH2_COMMENT
    ))
}

/// Walks the length-prefixed fields of a public key blob and returns the
/// leading key type.
fn blob_key_type(blob: &[u8]) -> Result<String, String> {
    let mut rest = blob;
    let mut fields = Vec::new();
    while !rest.is_empty() {
        if rest.len() < 4 {
            return Err("truncated field length".to_string());
        }
        let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        rest = &rest[4..];
        if rest.len() < len {
            return Err("field length exceeds key data".to_string());
        }
        fields.push(&rest[..len]);
        rest = &rest[len..];
    }

    let key_type = fields
        .first()
        .and_then(|field| std::str::from_utf8(field).ok())
        .filter(|name| !name.is_empty() && name.is_ascii())
        .ok_or_else(|| "missing key type".to_string())?;
    if fields.len() < 2 {
        return Err(format!("{} key has no key material", key_type));
    }
    Ok(key_type.to_string())
}
