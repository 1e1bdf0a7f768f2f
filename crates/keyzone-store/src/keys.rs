//! Name ↔ key mapping.
//!
//! DNS names map onto the store's key hierarchy by reversing their labels:
//! `bar.disco.net.` becomes `/net/disco/bar`. Record data hangs off the base
//! key under a dot-prefixed type segment, e.g. `/net/disco/bar/.A`.

use hickory_proto::rr::{Name, RecordType};

use crate::{Result, StoreError};

/// Converts a DNS name into its base store key, appending `suffix`.
///
/// The trailing dot is dropped, labels are reversed and joined with `/`, and
/// the result is lowercased so that lookups are case-insensitive the way DNS
/// names are.
///
/// `name_to_key("foo.net.", "/.A")` yields `/net/foo/.A`.
pub fn name_to_key(name: &Name, suffix: &str) -> String {
    let name = name.to_lowercase();
    let mut labels: Vec<String> = name
        .iter()
        .map(|label| String::from_utf8_lossy(label).into_owned())
        .collect();
    labels.reverse();

    format!("/{}{}", labels.join("/"), suffix)
}

/// Returns the store key holding records of `rtype` at `name`.
pub fn record_key(name: &Name, rtype: RecordType) -> String {
    name_to_key(name, &format!("/.{rtype}"))
}

/// Converts a base store key back into a fully-qualified DNS name.
///
/// This is the inverse of [`name_to_key`] with an empty suffix: segments are
/// reversed and joined with dots, and the trailing root dot is restored.
pub fn key_to_name(key: &str) -> Result<Name> {
    let mut segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
    segments.reverse();

    let fqdn = format!("{}.", segments.join("."));
    fqdn.parse::<Name>().map_err(|e| StoreError::Backend {
        message: format!("key {key} does not map to a DNS name: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn name_to_key_strips_trailing_dot() {
        let name = Name::from_str("foo.net.").unwrap();
        assert_eq!(name_to_key(&name, ""), "/net/foo");

        let name = Name::from_str("foo.net").unwrap();
        assert_eq!(name_to_key(&name, ""), "/net/foo");
    }

    #[test]
    fn name_to_key_appends_suffix() {
        let name = Name::from_str("foo.net.").unwrap();
        assert_eq!(name_to_key(&name, "/.A"), "/net/foo/.A");
    }

    #[test]
    fn name_to_key_lowercases() {
        let name = Name::from_str("Foo.NET.").unwrap();
        assert_eq!(name_to_key(&name, ""), "/net/foo");
    }

    #[test]
    fn record_key_uses_type_mnemonic() {
        let name = Name::from_str("bar.disco.net.").unwrap();
        assert_eq!(record_key(&name, RecordType::AAAA), "/net/disco/bar/.AAAA");
        assert_eq!(record_key(&name, RecordType::SOA), "/net/disco/bar/.SOA");
    }

    #[test]
    fn key_to_name_inverts_mapping() {
        let name = key_to_name("/net/disco/bar").unwrap();
        assert_eq!(name, Name::from_str("bar.disco.net.").unwrap());
    }

    #[test]
    fn key_roundtrip_normalizes() {
        for input in ["bar.disco.net.", "bar.disco.net", "BAR.Disco.net."] {
            let name = Name::from_str(input).unwrap();
            let roundtripped = key_to_name(&name_to_key(&name, "")).unwrap();
            assert_eq!(roundtripped, Name::from_str("bar.disco.net.").unwrap());
        }
    }
}
