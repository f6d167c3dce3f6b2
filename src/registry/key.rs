//! Stream identity
//!
//! A live stream is addressed by `(schema, vhost, app, stream)`. Publishers
//! name the stream part with a string of the form
//! `<stream>[?vhost=<vhost>][&token=<token>]`.

use std::fmt;

use super::error::RegistryError;

const VHOST_PARAM: &str = "vhost=";
const TOKEN_PARAM: &str = "token=";

/// Unique identifier of one live stream slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaKey {
    pub schema: String,
    pub vhost: String,
    pub app: String,
    pub stream: String,
}

impl MediaKey {
    /// All four components must be non-empty
    pub fn new(
        schema: impl Into<String>,
        vhost: impl Into<String>,
        app: impl Into<String>,
        stream: impl Into<String>,
    ) -> Result<Self, RegistryError> {
        let key = Self {
            schema: schema.into(),
            vhost: vhost.into(),
            app: app.into(),
            stream: stream.into(),
        };
        if key.schema.is_empty() {
            return Err(RegistryError::InvalidKey("schema"));
        }
        if key.vhost.is_empty() {
            return Err(RegistryError::InvalidKey("vhost"));
        }
        if key.app.is_empty() {
            return Err(RegistryError::InvalidKey("app"));
        }
        if key.stream.is_empty() {
            return Err(RegistryError::InvalidKey("stream"));
        }
        Ok(key)
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}/{}/{}",
            self.schema.to_ascii_lowercase(),
            self.vhost,
            self.app,
            self.stream
        )
    }
}

/// The stream string given to `publish`, split into its parts.
///
/// Missing parts are left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamPath {
    pub stream: String,
    pub vhost: String,
    pub token: String,
}

impl StreamPath {
    pub fn parse(path: &str) -> Self {
        // the stream id starts at the first alphabetic character
        let start = path
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(0);
        let rest = &path[start..];

        let (stream, query) = match rest.split_once('?') {
            Some((stream, query)) => (stream, Some(query)),
            None => (rest, None),
        };

        let mut parsed = StreamPath {
            stream: stream.to_string(),
            ..Default::default()
        };

        let Some(query) = query else {
            return parsed;
        };
        if let Some(pos) = query.find(VHOST_PARAM) {
            let value = &query[pos + VHOST_PARAM.len()..];
            parsed.vhost = value.split('&').next().unwrap_or_default().to_string();
        }
        if let Some(pos) = query.find(TOKEN_PARAM) {
            let value = &query[pos + TOKEN_PARAM.len()..];
            parsed.token = value.split('&').next().unwrap_or_default().to_string();
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_requires_all_parts() {
        let key = MediaKey::new("RTMP", "a.com", "live", "mystream").unwrap();
        assert_eq!(key.to_string(), "rtmp://a.com/live/mystream");

        assert!(matches!(
            MediaKey::new("", "a.com", "live", "s"),
            Err(RegistryError::InvalidKey("schema"))
        ));
        assert!(matches!(
            MediaKey::new("RTMP", "", "live", "s"),
            Err(RegistryError::InvalidKey("vhost"))
        ));
        assert!(matches!(
            MediaKey::new("RTMP", "a.com", "", "s"),
            Err(RegistryError::InvalidKey("app"))
        ));
        assert!(matches!(
            MediaKey::new("RTMP", "a.com", "live", ""),
            Err(RegistryError::InvalidKey("stream"))
        ));
    }

    #[test]
    fn test_parse_full_path() {
        let path = StreamPath::parse("mystream?vhost=a.com&token=xyz");
        assert_eq!(path.stream, "mystream");
        assert_eq!(path.vhost, "a.com");
        assert_eq!(path.token, "xyz");
    }

    #[test]
    fn test_parse_partial_paths() {
        let path = StreamPath::parse("mystream");
        assert_eq!(path, StreamPath {
            stream: "mystream".into(),
            ..Default::default()
        });

        let path = StreamPath::parse("cam1?token=abc");
        assert_eq!(path.stream, "cam1");
        assert_eq!(path.vhost, "");
        assert_eq!(path.token, "abc");

        let path = StreamPath::parse("cam1?vhost=b.org");
        assert_eq!(path.vhost, "b.org");
        assert_eq!(path.token, "");
    }

    #[test]
    fn test_parse_skips_leading_non_alphabetic() {
        let path = StreamPath::parse("/_42live?vhost=a.com");
        assert_eq!(path.stream, "live");
        assert_eq!(path.vhost, "a.com");

        assert_eq!(StreamPath::parse("").stream, "");
        assert_eq!(StreamPath::parse("1234").stream, "1234");
    }
}
