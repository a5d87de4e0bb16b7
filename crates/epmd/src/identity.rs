use proto::AliveReq;

use crate::Error;

// http://erlang.org/doc/reference_manual/distributed.html (section 13.5)
pub const NODE_TYPE_NORMAL: u8 = 77;
pub const NODE_TYPE_HIDDEN: u8 = 72;
pub const PROTOCOL_TCP_IPV4: u8 = 0;

/// The distribution protocol version range this client speaks.
pub const HIGHEST_VERSION: u16 = 5;
pub const LOWEST_VERSION: u16 = 5;

/// Everything epmd needs to know about the local node. Built once from
/// caller input, immutable afterwards, no I/O involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub full_name: String,
    pub name: String,
    pub domain: String,
    pub port: u16,
    pub epmd_port: u16,
    pub node_type: u8,
    pub protocol: u8,
    pub high_vsn: u16,
    pub low_vsn: u16,
    pub extra: Vec<u8>,
}

impl NodeIdentity {
    pub fn new(
        full_name: impl Into<String>,
        port: u16,
        epmd_port: u16,
        hidden: bool,
    ) -> Result<Self, Error> {
        let full_name = full_name.into();
        let (name, domain) = split_node_name(&full_name)?;
        let (name, domain) = (name.to_string(), domain.to_string());

        Ok(Self {
            full_name,
            name,
            domain,
            port,
            epmd_port,
            node_type: if hidden {
                NODE_TYPE_HIDDEN
            } else {
                NODE_TYPE_NORMAL
            },
            protocol: PROTOCOL_TCP_IPV4,
            high_vsn: HIGHEST_VERSION,
            low_vsn: LOWEST_VERSION,
            extra: Vec::new(),
        })
    }

    pub(crate) fn alive_req(&self) -> AliveReq {
        AliveReq {
            port: self.port,
            node_type: self.node_type,
            protocol: self.protocol,
            high_vsn: self.high_vsn,
            low_vsn: self.low_vsn,
            name: self.name.clone(),
            extra: self.extra.clone(),
        }
    }
}

/// Splits a `name@host` full name, rejecting anything that does not have
/// exactly one `@` with non-empty parts on both sides.
pub fn split_node_name(full_name: &str) -> Result<(&str, &str), Error> {
    let mut parts = full_name.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(domain), None) if !name.is_empty() && !domain.is_empty() => {
            Ok((name, domain))
        }
        _ => Err(Error::InvalidName(full_name.to_string())),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn splits_full_name() {
        let identity = NodeIdentity::new("console@fedora", 30000, 4369, false).unwrap();
        assert_eq!(identity.full_name, "console@fedora");
        assert_eq!(identity.name, "console");
        assert_eq!(identity.domain, "fedora");
        assert_eq!(identity.port, 30000);
        assert_eq!(identity.epmd_port, 4369);
        assert_eq!(identity.node_type, NODE_TYPE_NORMAL);
        assert_eq!(identity.protocol, 0);
        assert_eq!(identity.high_vsn, 5);
        assert_eq!(identity.low_vsn, 5);
        assert!(identity.extra.is_empty());
    }

    #[test]
    fn hidden_node_type() {
        let identity = NodeIdentity::new("console@fedora", 30000, 4369, true).unwrap();
        assert_eq!(identity.node_type, NODE_TYPE_HIDDEN);
    }

    #[test]
    fn rejects_bad_names() {
        for name in ["console", "console@", "@fedora", "a@b@c", "", "@"] {
            assert!(
                matches!(
                    NodeIdentity::new(name, 30000, 4369, false),
                    Err(Error::InvalidName(_))
                ),
                "expected InvalidName for {name:?}"
            );
        }
    }
}
