//! Subject identity for Tether.
//!
//! A subject names a message stream, optionally restricted to a single
//! reader or writer profile. Subjects are used as map keys throughout the
//! client, so equality and the serialized key form must be deterministic.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// A named, ACL-qualified message stream identity.
///
/// The loose forms accepted by the public API (`&str`, `String`, integers)
/// coerce into `Subject { name }` via `From`; the wire also accepts a bare
/// string or number where a subject is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "SubjectRepr", rename_all = "camelCase")]
pub struct Subject {
    /// Stream name.
    pub name: String,

    /// Restrict reads to this profile id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readable_only_by: Option<String>,

    /// Restrict writes to this profile id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writable_only_by: Option<String>,

    /// Client-only subject; never sent to the server.
    #[serde(skip)]
    pub local: bool,
}

impl Subject {
    /// Create a plain subject with no ACL restrictions.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            readable_only_by: None,
            writable_only_by: None,
            local: false,
        }
    }

    /// Restrict reads to a profile.
    #[must_use]
    pub fn readable_only_by(mut self, profile: impl Into<String>) -> Self {
        self.readable_only_by = Some(profile.into());
        self
    }

    /// Restrict writes to a profile.
    #[must_use]
    pub fn writable_only_by(mut self, profile: impl Into<String>) -> Self {
        self.writable_only_by = Some(profile.into());
        self
    }

    /// Mark this subject client-only.
    #[must_use]
    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    /// Deterministic serialized form, used only for map keying.
    ///
    /// Null ACL fields are stripped and `serde_json`'s map (a `BTreeMap` by
    /// default) sorts keys, so two equal subjects always produce the same
    /// key string.
    #[must_use]
    pub fn canonical_key(&self) -> String {
        let mut map = serde_json::Map::new();
        map.insert("name".to_string(), json!(self.name));
        if let Some(ref p) = self.readable_only_by {
            map.insert("readableOnlyBy".to_string(), json!(p));
        }
        if let Some(ref p) = self.writable_only_by {
            map.insert("writableOnlyBy".to_string(), json!(p));
        }
        if self.local {
            map.insert("local".to_string(), json!(true));
        }
        serde_json::Value::Object(map).to_string()
    }
}

impl From<&str> for Subject {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Subject {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<u64> for Subject {
    fn from(name: u64) -> Self {
        Self::new(name.to_string())
    }
}

impl From<i64> for Subject {
    fn from(name: i64) -> Self {
        Self::new(name.to_string())
    }
}

/// Loose wire representation of a subject.
#[derive(Deserialize)]
#[serde(untagged)]
enum SubjectRepr {
    Full {
        name: String,
        #[serde(default, rename = "readableOnlyBy")]
        readable_only_by: Option<String>,
        #[serde(default, rename = "writableOnlyBy")]
        writable_only_by: Option<String>,
    },
    Name(String),
    Number(i64),
}

impl From<SubjectRepr> for Subject {
    fn from(repr: SubjectRepr) -> Self {
        match repr {
            SubjectRepr::Full {
                name,
                readable_only_by,
                writable_only_by,
            } => Self {
                name,
                readable_only_by,
                writable_only_by,
                local: false,
            },
            SubjectRepr::Name(name) => Self::new(name),
            SubjectRepr::Number(n) => Self::new(n.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loose_coercion() {
        let a: Subject = "chat".into();
        let b = Subject::new("chat");
        assert_eq!(a, b);

        let n: Subject = 42u64.into();
        assert_eq!(n.name, "42");
    }

    #[test]
    fn test_canonical_key_deterministic() {
        let a = Subject::new("chat").readable_only_by("p1");
        let b = Subject::new("chat").readable_only_by("p1");
        assert_eq!(a.canonical_key(), b.canonical_key());

        // ACL fields are part of identity
        let c = Subject::new("chat");
        assert_ne!(a.canonical_key(), c.canonical_key());
    }

    #[test]
    fn test_canonical_key_strips_null_acl() {
        let subject = Subject::new("chat");
        assert_eq!(subject.canonical_key(), r#"{"name":"chat"}"#);
    }

    #[test]
    fn test_local_subject_distinct() {
        let remote = Subject::new("notes");
        let local = Subject::new("notes").local();
        assert_ne!(remote.canonical_key(), local.canonical_key());
    }

    #[test]
    fn test_deserialize_bare_string() {
        let subject: Subject = serde_json::from_str(r#""chat""#).unwrap();
        assert_eq!(subject, Subject::new("chat"));

        let subject: Subject = serde_json::from_str("7").unwrap();
        assert_eq!(subject.name, "7");
    }

    #[test]
    fn test_serialize_skips_none() {
        let json = serde_json::to_string(&Subject::new("chat")).unwrap();
        assert_eq!(json, r#"{"name":"chat"}"#);

        let json = serde_json::to_string(&Subject::new("chat").writable_only_by("p9")).unwrap();
        assert_eq!(json, r#"{"name":"chat","writableOnlyBy":"p9"}"#);
    }
}
