use crate::config::KeyScheme;
use bytes::Bytes;
use rand::Rng;
use time::OffsetDateTime;
use uuid::Uuid;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RANDOM_SUFFIX_LEN: usize = 13;
const MAX_FILE_NAME_LEN: usize = 128;
const FALLBACK_FILE_NAME: &str = "upload";
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A file part received from the browser, fully buffered.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl IncomingFile {
    #[must_use]
    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().filter(|c| !c.is_empty()).unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Builds `<prefix><unique id>-<sanitized file name>`.
    #[must_use]
    pub fn generate(prefix: &str, scheme: KeyScheme, file_name: Option<&str>) -> Self {
        let id = match scheme {
            KeyScheme::TimestampRandom => timestamp_random_id(OffsetDateTime::now_utc()),
            KeyScheme::Uuid => Uuid::new_v4().to_string(),
        };
        Self(format!("{}{id}-{}", normalize_prefix(prefix), sanitize_file_name(file_name)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectLocation {
    Public(String),
    Signed { url: String, expires_at: OffsetDateTime },
}

impl ObjectLocation {
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Public(url) | Self::Signed { url, .. } => url,
        }
    }
}

/// Result of a single upload. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct UploadedObject {
    pub key: ObjectKey,
    pub content_type: String,
    pub size: usize,
    pub location: ObjectLocation,
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() { String::new() } else { format!("{trimmed}/") }
}

pub(crate) fn timestamp_random_id(now: OffsetDateTime) -> String {
    let millis = u64::try_from(now.unix_timestamp_nanos() / 1_000_000).unwrap_or(0);
    let mut rng = rand::thread_rng();
    let suffix: String =
        (0..RANDOM_SUFFIX_LEN).map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())])).collect();
    format!("{}-{suffix}", to_base36(millis))
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        // value % 36 < 36, the index is always in range
        digits.push(BASE36[usize::try_from(value % 36).unwrap_or(0)]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

pub(crate) fn sanitize_file_name(file_name: Option<&str>) -> String {
    let base = file_name.and_then(|name| name.rsplit(['/', '\\']).next()).map(str::trim).unwrap_or_default();

    let sanitized: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .take(MAX_FILE_NAME_LEN)
        .collect();

    if sanitized.trim_matches('.').is_empty() { FALLBACK_FILE_NAME.to_string() } else { sanitized }
}
