//! Per-type record value parsers.
//!
//! Stored values are plain strings; multi-field record types use tab-separated
//! fields. Parsers never panic: structural problems (wrong field count, wrong
//! delimiter) surface as `NodeConversion`, and field-level problems (bad IP,
//! out-of-range integer, unparseable name) as `BadRecordValue`.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use hickory_proto::rr::rdata::{A, AAAA, CNAME, MX, NS, PTR, SOA, SRV, TXT};
use hickory_proto::rr::{Name, RData, Record, RecordType};

use crate::{ResolveError, Result};

/// Builds a resource record of `rtype` at `name` from a stored value.
///
/// `key` is the store path the value came from and is only used for error
/// context. The record header always carries `name`, the queried name,
/// regardless of whether the value was found via a wildcard key.
pub(crate) fn record_from_value(
    name: &Name,
    rtype: RecordType,
    key: &str,
    value: &str,
    ttl: u32,
) -> Result<Record> {
    let rdata = match rtype {
        RecordType::A => RData::A(A(parse_ipv4(rtype, value)?)),
        RecordType::AAAA => RData::AAAA(AAAA(parse_ipv6(rtype, value)?)),
        RecordType::CNAME => RData::CNAME(CNAME(parse_fqdn(rtype, value)?)),
        RecordType::NS => RData::NS(NS(parse_fqdn(rtype, value)?)),
        RecordType::PTR => RData::PTR(PTR(parse_fqdn(rtype, value)?)),
        RecordType::TXT => RData::TXT(TXT::new(
            value.split('\n').map(str::to_string).collect::<Vec<_>>(),
        )),
        RecordType::MX => parse_mx(key, value)?,
        RecordType::SRV => parse_srv(key, value)?,
        RecordType::SOA => parse_soa(key, value)?,
        other => {
            return Err(ResolveError::node_conversion(
                key,
                other,
                "no parser for this record type",
            ))
        }
    };

    Ok(Record::from_rdata(name.clone(), ttl, rdata))
}

/// `<uint16 preference>\t<fqdn exchange>`
fn parse_mx(key: &str, value: &str) -> Result<RData> {
    let fields: Vec<&str> = value.split('\t').collect();
    if fields.len() != 2 {
        return Err(ResolveError::node_conversion(
            key,
            RecordType::MX,
            format!("expected 2 tab-separated fields, got {}", fields.len()),
        ));
    }

    let preference = parse_u16(RecordType::MX, "preference", fields[0])?;
    let exchange = parse_fqdn(RecordType::MX, fields[1])?;

    Ok(RData::MX(MX::new(preference, exchange)))
}

/// `<uint16 priority>\t<uint16 weight>\t<uint16 port>\t<fqdn target>`
fn parse_srv(key: &str, value: &str) -> Result<RData> {
    let fields: Vec<&str> = value.split('\t').collect();
    if fields.len() != 4 {
        return Err(ResolveError::node_conversion(
            key,
            RecordType::SRV,
            format!("expected 4 tab-separated fields, got {}", fields.len()),
        ));
    }

    let priority = parse_u16(RecordType::SRV, "priority", fields[0])?;
    let weight = parse_u16(RecordType::SRV, "weight", fields[1])?;
    let port = parse_u16(RecordType::SRV, "port", fields[2])?;
    let target = parse_fqdn(RecordType::SRV, fields[3])?;

    Ok(RData::SRV(SRV::new(priority, weight, port, target)))
}

/// `<ns>\t<mbox>\t<uint32 refresh>\t<uint32 retry>\t<uint32 expire>\t<uint32 minttl>`
///
/// The stored value carries no serial; synthesized SOA records use serial 0.
fn parse_soa(key: &str, value: &str) -> Result<RData> {
    let fields: Vec<&str> = value.split('\t').collect();
    if fields.len() != 6 {
        return Err(ResolveError::node_conversion(
            key,
            RecordType::SOA,
            format!("expected 6 tab-separated fields, got {}", fields.len()),
        ));
    }

    let mname = parse_fqdn(RecordType::SOA, fields[0])?;
    let rname = parse_fqdn(RecordType::SOA, fields[1])?;
    let refresh = parse_u32(RecordType::SOA, "refresh", fields[2])?;
    let retry = parse_u32(RecordType::SOA, "retry", fields[3])?;
    let expire = parse_u32(RecordType::SOA, "expire", fields[4])?;
    let minimum = parse_u32(RecordType::SOA, "minttl", fields[5])?;

    Ok(RData::SOA(SOA::new(
        mname,
        rname,
        0,
        refresh as i32,
        retry as i32,
        expire as i32,
        minimum,
    )))
}

fn parse_ipv4(rtype: RecordType, value: &str) -> Result<Ipv4Addr> {
    value
        .trim()
        .parse()
        .map_err(|_| ResolveError::bad_value(rtype, format!("not an IPv4 address: {value:?}")))
}

fn parse_ipv6(rtype: RecordType, value: &str) -> Result<Ipv6Addr> {
    value
        .trim()
        .parse()
        .map_err(|_| ResolveError::bad_value(rtype, format!("not an IPv6 address: {value:?}")))
}

fn parse_u16(rtype: RecordType, field: &str, value: &str) -> Result<u16> {
    value
        .parse()
        .map_err(|_| ResolveError::bad_value(rtype, format!("{field} must be a uint16: {value:?}")))
}

fn parse_u32(rtype: RecordType, field: &str, value: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| ResolveError::bad_value(rtype, format!("{field} must be a uint32: {value:?}")))
}

/// Parses a stored name value, restoring the trailing dot if it was omitted.
fn parse_fqdn(rtype: RecordType, value: &str) -> Result<Name> {
    let fqdn = if value.ends_with('.') {
        value.to_string()
    } else {
        format!("{value}.")
    };

    Name::from_str(&fqdn)
        .map_err(|e| ResolveError::bad_value(rtype, format!("not a domain name ({value:?}): {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Name {
        Name::from_str("bar.disco.net.").unwrap()
    }

    #[test]
    fn a_record() {
        let record =
            record_from_value(&owner(), RecordType::A, "/net/disco/bar/.A", "1.2.3.4", 300)
                .unwrap();

        assert_eq!(record.name(), &owner());
        assert_eq!(record.ttl(), 300);
        match record.data() {
            Some(RData::A(a)) => assert_eq!(a.0, Ipv4Addr::new(1, 2, 3, 4)),
            other => panic!("expected A rdata, got {other:?}"),
        }
    }

    #[test]
    fn a_record_rejects_garbage() {
        let err = record_from_value(&owner(), RecordType::A, "/k", "not-an-ip", 0).unwrap_err();
        assert!(matches!(err, ResolveError::BadRecordValue { .. }));

        let err = record_from_value(&owner(), RecordType::A, "/k", "::1", 0).unwrap_err();
        assert!(matches!(err, ResolveError::BadRecordValue { .. }));
    }

    #[test]
    fn aaaa_record() {
        let record = record_from_value(&owner(), RecordType::AAAA, "/k", "::1", 0).unwrap();
        match record.data() {
            Some(RData::AAAA(a)) => assert_eq!(a.0, Ipv6Addr::LOCALHOST),
            other => panic!("expected AAAA rdata, got {other:?}"),
        }
    }

    #[test]
    fn cname_restores_trailing_dot() {
        let record =
            record_from_value(&owner(), RecordType::CNAME, "/k", "baz.disco.net", 0).unwrap();
        match record.data() {
            Some(RData::CNAME(c)) => {
                assert_eq!(c.0, Name::from_str("baz.disco.net.").unwrap());
                assert!(c.0.is_fqdn());
            }
            other => panic!("expected CNAME rdata, got {other:?}"),
        }
    }

    #[test]
    fn ptr_rejects_non_domain() {
        let err = record_from_value(&owner(), RecordType::PTR, "/k", "...", 0).unwrap_err();
        assert!(matches!(err, ResolveError::BadRecordValue { .. }));
    }

    #[test]
    fn txt_splits_on_line_separator() {
        let record = record_from_value(&owner(), RecordType::TXT, "/k", "foo bar", 600).unwrap();
        match record.data() {
            Some(RData::TXT(txt)) => {
                let strings: Vec<String> = txt
                    .txt_data()
                    .iter()
                    .map(|s| String::from_utf8_lossy(s).into_owned())
                    .collect();
                assert_eq!(strings, vec!["foo bar".to_string()]);
            }
            other => panic!("expected TXT rdata, got {other:?}"),
        }

        let record =
            record_from_value(&owner(), RecordType::TXT, "/k", "line one\nline two", 0).unwrap();
        match record.data() {
            Some(RData::TXT(txt)) => assert_eq!(txt.txt_data().len(), 2),
            other => panic!("expected TXT rdata, got {other:?}"),
        }
    }

    #[test]
    fn mx_record() {
        let record =
            record_from_value(&owner(), RecordType::MX, "/k", "10\tmail.disco.net.", 0).unwrap();
        match record.data() {
            Some(RData::MX(mx)) => {
                assert_eq!(mx.preference(), 10);
                assert_eq!(mx.exchange(), &Name::from_str("mail.disco.net.").unwrap());
            }
            other => panic!("expected MX rdata, got {other:?}"),
        }
    }

    #[test]
    fn srv_record() {
        let record = record_from_value(
            &owner(),
            RecordType::SRV,
            "/k",
            "100\t100\t80\tsome-webserver.disco.net",
            0,
        )
        .unwrap();

        match record.data() {
            Some(RData::SRV(srv)) => {
                assert_eq!(srv.priority(), 100);
                assert_eq!(srv.weight(), 100);
                assert_eq!(srv.port(), 80);
                assert_eq!(
                    srv.target(),
                    &Name::from_str("some-webserver.disco.net.").unwrap()
                );
            }
            other => panic!("expected SRV rdata, got {other:?}"),
        }
    }

    #[test]
    fn srv_rejects_bad_values() {
        let bad = [
            "10 10 80 foo.disco.net",        // wrong delimiter
            "0\t0",                          // not enough fields
            "-10\t10\t80\tfoo.disco.net",    // negative priority
            "10\t-10\t80\tfoo.disco.net",    // negative weight
            "10\t10\t-80\tfoo.disco.net",    // negative port
            "65536\t10\t80\tfoo.disco.net",  // priority overflows u16
            "10\t65536\t80\tfoo.disco.net",  // weight overflows u16
            "10\t10\t65536\tfoo.disco.net",  // port overflows u16
        ];

        for value in bad {
            let result = record_from_value(&owner(), RecordType::SRV, "/k", value, 0);
            assert!(result.is_err(), "expected error for {value:?}");
        }
    }

    #[test]
    fn soa_record() {
        let record = record_from_value(
            &Name::from_str("disco.net.").unwrap(),
            RecordType::SOA,
            "/net/disco/.SOA",
            "ns1.disco.net.\tadmin.disco.net.\t3600\t600\t86400\t10",
            0,
        )
        .unwrap();

        match record.data() {
            Some(RData::SOA(soa)) => {
                assert_eq!(soa.mname(), &Name::from_str("ns1.disco.net.").unwrap());
                assert_eq!(soa.rname(), &Name::from_str("admin.disco.net.").unwrap());
                assert_eq!(soa.refresh(), 3600);
                assert_eq!(soa.retry(), 600);
                assert_eq!(soa.expire(), 86400);
                assert_eq!(soa.minimum(), 10);
            }
            other => panic!("expected SOA rdata, got {other:?}"),
        }
    }

    #[test]
    fn soa_rejects_wrong_arity() {
        let err = record_from_value(
            &owner(),
            RecordType::SOA,
            "/k",
            "ns1.disco.net.\tadmin.disco.net.\t3600",
            0,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::NodeConversion { .. }));
    }

    #[test]
    fn unsupported_type_is_conversion_error() {
        let err = record_from_value(&owner(), RecordType::HINFO, "/k", "whatever", 0).unwrap_err();
        assert!(matches!(err, ResolveError::NodeConversion { .. }));
    }
}
