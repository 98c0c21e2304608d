use base64::{Engine as _, engine::general_purpose};

/// Decodes base64url content whether or not it carries `=` padding.
///
/// Line breaks are ignored and the standard alphabet's `+` and `/` are
/// accepted as well, since some providers hand back either form.
pub fn decode_base64url(data: &str) -> Option<Vec<u8>> {
    let normalized: String = data
        .trim()
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();

    general_purpose::URL_SAFE_NO_PAD
        .decode(normalized.trim_end_matches('='))
        .ok()
}

/// Content of one message part, as the provider handed it over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartData {
    /// Bytes the provider client already decoded.
    Decoded(Vec<u8>),
    /// Text still in base64url transfer form.
    Base64Url(String),
}

impl PartData {
    /// The part as text. Decoded bytes are converted lossily; encoded text
    /// that does not decode counts as an empty body. Never fails.
    pub fn text(&self) -> String {
        match self {
            PartData::Decoded(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            PartData::Base64Url(encoded) => decode_base64url(encoded)
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_default(),
        }
    }
}
