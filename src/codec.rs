//! Message codecs
//!
//! A codec is the parse/serialize pair a connection uses for its frames. The
//! parse function runs exactly once per inbound frame, at the connection
//! level, before fan-out.
//!
//! Closures cannot be compared, so every codec carries an explicit identity
//! that feeds the connection key. Two configurations with different codecs
//! only share a connection when their identities are equal.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

type ParseFn<M> = dyn Fn(&str) -> Result<M, CodecError> + Send + Sync;
type SerializeFn<M> = dyn Fn(&M) -> Result<String, CodecError> + Send + Sync;

/// Identity of a codec, used when deriving connection keys
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CodecIdentity {
    /// One of the built-in codecs (`json`, `text`)
    Builtin(&'static str),
    /// Caller-supplied codec, named by the caller
    Custom(String),
}

impl fmt::Display for CodecIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecIdentity::Builtin(name) => write!(f, "builtin:{}", name),
            CodecIdentity::Custom(name) => write!(f, "custom:{}", name),
        }
    }
}

/// Parse/serialize pair for one message type
pub struct MessageCodec<M> {
    identity: CodecIdentity,
    parse: Arc<ParseFn<M>>,
    serialize: Arc<SerializeFn<M>>,
}

impl<M> MessageCodec<M> {
    /// Create a codec from caller-supplied functions
    ///
    /// `identity` must change whenever the behavior of the functions changes;
    /// configurations using codecs with the same identity share connections.
    pub fn custom<P, S>(identity: impl Into<String>, parse: P, serialize: S) -> Self
    where
        P: Fn(&str) -> Result<M, CodecError> + Send + Sync + 'static,
        S: Fn(&M) -> Result<String, CodecError> + Send + Sync + 'static,
    {
        Self {
            identity: CodecIdentity::Custom(identity.into()),
            parse: Arc::new(parse),
            serialize: Arc::new(serialize),
        }
    }

    pub fn identity(&self) -> &CodecIdentity {
        &self.identity
    }

    /// Decode one inbound text frame
    pub fn parse(&self, text: &str) -> Result<M, CodecError> {
        (self.parse)(text)
    }

    /// Encode one outbound message
    pub fn serialize(&self, message: &M) -> Result<String, CodecError> {
        (self.serialize)(message)
    }
}

impl<M> MessageCodec<M>
where
    M: Serialize + DeserializeOwned,
{
    /// JSON codec backed by `serde_json`
    pub fn json() -> Self {
        Self {
            identity: CodecIdentity::Builtin("json"),
            parse: Arc::new(|text| serde_json::from_str(text).map_err(CodecError::from)),
            serialize: Arc::new(|message| serde_json::to_string(message).map_err(CodecError::from)),
        }
    }
}

impl MessageCodec<String> {
    /// Pass-through codec for plain text frames
    pub fn text() -> Self {
        Self {
            identity: CodecIdentity::Builtin("text"),
            parse: Arc::new(|text| Ok(text.to_owned())),
            serialize: Arc::new(|message| Ok(message.clone())),
        }
    }
}

impl<M> Clone for MessageCodec<M> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            parse: Arc::clone(&self.parse),
            serialize: Arc::clone(&self.serialize),
        }
    }
}

impl<M> fmt::Debug for MessageCodec<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageCodec")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn test_json_codec() {
        let codec = MessageCodec::<Value>::json();
        assert_eq!(codec.identity(), &CodecIdentity::Builtin("json"));

        let value = codec.parse(r#"{"type":"ping","n":1}"#).unwrap();
        assert_eq!(value, json!({"type": "ping", "n": 1}));
        assert_eq!(codec.serialize(&json!([1, 2])).unwrap(), "[1,2]");
    }

    #[test]
    fn test_json_codec_rejects_garbage() {
        let codec = MessageCodec::<Value>::json();
        assert!(codec.parse("not json").is_err());
    }

    #[test]
    fn test_custom_codec() {
        let codec = MessageCodec::custom(
            "upper",
            |text: &str| Ok(text.to_uppercase()),
            |msg: &String| {
                if msg.is_empty() {
                    Err(CodecError::new("empty"))
                } else {
                    Ok(msg.to_lowercase())
                }
            },
        );

        assert_eq!(codec.identity().to_string(), "custom:upper");
        assert_eq!(codec.parse("abc").unwrap(), "ABC");
        assert_eq!(codec.serialize(&"XY".to_string()).unwrap(), "xy");
        assert_eq!(
            codec.serialize(&String::new()).unwrap_err().message(),
            "empty"
        );
    }

    #[test]
    fn test_text_codec() {
        let codec = MessageCodec::text();
        assert_eq!(codec.identity().to_string(), "builtin:text");
        assert_eq!(codec.parse("hi").unwrap(), "hi");
    }
}
