use std::io::{self, Write};

use byteorder::{BigEndian, WriteBytesExt};
use bytes::Buf;
use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::{Encoder, Error, Len};

///
/// ALIVE2_REQ:
/// 2       1   2       1           1           2           2           2       Nlen        2       Elen
/// Length  120 PortNo  NodeType    Protocol    HighestVsn  LowestVsn   Nlen    NodeName    Elen    Extra
///
/// PortNo
/// The port number on which the node accepts connection requests.
///
/// NodeType
/// 77 = normal Erlang node, 72 = hidden node (C-node).
///
/// Protocol
/// 0 = TCP/IPv4.
///
/// Every request starts with a big-endian u16 counting the opcode byte plus
/// the payload. Responses carry no outer length prefix; their size is fixed
/// or self-describing.
///
pub const ALIVE2_REQ: u8 = 120;
pub const ALIVE2_RESP: u8 = 121;
pub const ALIVE2_X_RESP: u8 = 118;
pub const PORT_PLEASE2_REQ: u8 = 122;
pub const PORT2_RESP: u8 = 119;
pub const NAMES_REQ: u8 = 110;
pub const DUMP_REQ: u8 = 100;
pub const KILL_REQ: u8 = 107;
pub const STOP_REQ: u8 = 115;

/// Every message kind epmd knows about, keyed by its opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    AliveReq,
    AliveResp,
    AliveXResp,
    PortPleaseReq,
    Port2Resp,
    NamesReq,
    DumpReq,
    KillReq,
    StopReq,
}

impl MessageKind {
    pub const fn opcode(self) -> u8 {
        match self {
            Self::AliveReq => ALIVE2_REQ,
            Self::AliveResp => ALIVE2_RESP,
            Self::AliveXResp => ALIVE2_X_RESP,
            Self::PortPleaseReq => PORT_PLEASE2_REQ,
            Self::Port2Resp => PORT2_RESP,
            Self::NamesReq => NAMES_REQ,
            Self::DumpReq => DUMP_REQ,
            Self::KillReq => KILL_REQ,
            Self::StopReq => STOP_REQ,
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            ALIVE2_REQ => Ok(Self::AliveReq),
            ALIVE2_RESP => Ok(Self::AliveResp),
            ALIVE2_X_RESP => Ok(Self::AliveXResp),
            PORT_PLEASE2_REQ => Ok(Self::PortPleaseReq),
            PORT2_RESP => Ok(Self::Port2Resp),
            NAMES_REQ => Ok(Self::NamesReq),
            DUMP_REQ => Ok(Self::DumpReq),
            KILL_REQ => Ok(Self::KillReq),
            STOP_REQ => Ok(Self::StopReq),
            x => Err(Error::UnknownOpcode(x)),
        }
    }
}

/// Registers a node with epmd. The registration lasts as long as the
/// connection that carried it stays open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliveReq {
    pub port: u16,
    pub node_type: u8,
    pub protocol: u8,
    pub high_vsn: u16,
    pub low_vsn: u16,
    pub name: String,
    pub extra: Vec<u8>,
}

impl Encoder for AliveReq {
    type Error = io::Error;

    fn encode<W: Write>(&self, w: &mut W) -> Result<(), io::Error> {
        w.write_u16::<BigEndian>(self.len() as u16)?;
        w.write_u8(ALIVE2_REQ)?;
        w.write_u16::<BigEndian>(self.port)?;
        w.write_u8(self.node_type)?;
        w.write_u8(self.protocol)?;
        w.write_u16::<BigEndian>(self.high_vsn)?;
        w.write_u16::<BigEndian>(self.low_vsn)?;
        w.write_u16::<BigEndian>(self.name.len() as u16)?;
        w.write_all(self.name.as_bytes())?;
        w.write_u16::<BigEndian>(self.extra.len() as u16)?;
        w.write_all(&self.extra)?;
        Ok(())
    }
}

impl Len for AliveReq {
    fn len(&self) -> usize {
        13 + self.name.len() + self.extra.len()
    }
}

// Result = 0 -> ok, result > 0 -> error. A creation of 0 with result 0 is
// still a rejection, epmd never hands out creation 0 for a live name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliveResp {
    pub result: u8,
    pub creation: u16,
}

impl AliveResp {
    /// Opcode, result and creation; a fixed four bytes on the wire.
    pub const LEN: usize = 4;

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < Self::LEN {
            return Err(Error::Truncated {
                need: Self::LEN,
                got: buf.len(),
            });
        }

        let mut buf = buf;
        let opcode = buf.get_u8();
        if opcode != ALIVE2_RESP {
            return Err(Error::MalformedReply {
                expected: ALIVE2_RESP,
                got: opcode,
            });
        }

        Ok(Self {
            result: buf.get_u8(),
            creation: buf.get_u16(),
        })
    }

    /// The creation epmd assigned, or the rejection this reply encodes.
    pub fn creation(&self) -> Result<u16, Error> {
        if self.result != 0 {
            return Err(Error::RequestRejected(self.result));
        }
        if self.creation == 0 {
            return Err(Error::NameCollision);
        }
        Ok(self.creation)
    }
}

/// Asks for the distribution port of a registered node. The name carries no
/// length prefix of its own, it runs to the end of the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortPleaseReq {
    pub name: String,
}

impl Encoder for PortPleaseReq {
    type Error = io::Error;

    fn encode<W: Write>(&self, w: &mut W) -> Result<(), io::Error> {
        w.write_u16::<BigEndian>(self.len() as u16)?;
        w.write_u8(PORT_PLEASE2_REQ)?;
        w.write_all(self.name.as_bytes())?;
        Ok(())
    }
}

impl Len for PortPleaseReq {
    fn len(&self) -> usize {
        1 + self.name.len()
    }
}

// The port is only present when result is 0. Extended fields after the port
// (node type, versions, name echo) are not needed for port resolution and
// are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port2Resp {
    pub result: u8,
    pub port: u16,
}

impl Port2Resp {
    /// Opcode and result, the part of the reply that is always present.
    pub const HEADER_LEN: usize = 2;

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < Self::HEADER_LEN {
            return Err(Error::Truncated {
                need: Self::HEADER_LEN,
                got: buf.len(),
            });
        }

        let mut buf = buf;
        let opcode = buf.get_u8();
        if opcode != PORT2_RESP {
            return Err(Error::MalformedReply {
                expected: PORT2_RESP,
                got: opcode,
            });
        }

        let result = buf.get_u8();
        if result != 0 {
            return Ok(Self { result, port: 0 });
        }

        if buf.remaining() < 2 {
            return Err(Error::Truncated {
                need: Self::HEADER_LEN + 2,
                got: Self::HEADER_LEN + buf.remaining(),
            });
        }

        Ok(Self {
            result,
            port: buf.get_u16(),
        })
    }

    /// The resolved port, or the lookup failure this reply encodes.
    pub fn port(&self) -> Result<u16, Error> {
        if self.result != 0 {
            return Err(Error::NameNotFound);
        }
        Ok(self.port)
    }
}

/// Asks epmd for the names of every node registered with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NamesReq;

impl Encoder for NamesReq {
    type Error = io::Error;

    fn encode<W: Write>(&self, w: &mut W) -> Result<(), io::Error> {
        w.write_u16::<BigEndian>(self.len() as u16)?;
        w.write_u8(NAMES_REQ)?;
        Ok(())
    }
}

impl Len for NamesReq {
    fn len(&self) -> usize {
        1
    }
}

// The format is: io:format("name ~ts at port ~p~n", [NodeName, Port]).
static NAMES_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"name (\S+) at port (\d+)\n").expect("names line regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamesResp {
    pub epmd_port: u32,
    pub nodes: Vec<NodeInfo>,
}

impl NamesResp {
    /// Parses the text that follows the u32 port field of a NAMES reply.
    pub fn parse(epmd_port: u32, text: &[u8]) -> Self {
        let nodes = NAMES_LINE
            .captures_iter(text)
            .map(|m| m.extract())
            .filter_map(|(_, [name, port])| {
                let port = String::from_utf8_lossy(port).parse::<u16>().ok()?;
                Some(NodeInfo {
                    name: String::from_utf8_lossy(name).to_string(),
                    port,
                })
            })
            .collect();

        Self { epmd_port, nodes }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // Symmetric decoder for ALIVE2_REQ, mirrors what epmd itself does with
    // the request bytes.
    fn decode_alive_req(mut buf: &[u8]) -> AliveReq {
        let length = buf.get_u16() as usize;
        assert_eq!(length, buf.remaining());
        assert_eq!(buf.get_u8(), ALIVE2_REQ);

        let port = buf.get_u16();
        let node_type = buf.get_u8();
        let protocol = buf.get_u8();
        let high_vsn = buf.get_u16();
        let low_vsn = buf.get_u16();
        let n = buf.get_u16() as usize;
        let name = String::from_utf8_lossy(&buf[..n]).to_string();
        buf.advance(n);
        let n = buf.get_u16() as usize;
        let extra = buf[..n].to_vec();
        buf.advance(n);
        assert!(!buf.has_remaining());

        AliveReq {
            port,
            node_type,
            protocol,
            high_vsn,
            low_vsn,
            name,
            extra,
        }
    }

    fn decode_port_please_req(mut buf: &[u8]) -> PortPleaseReq {
        let length = buf.get_u16() as usize;
        assert_eq!(length, buf.remaining());
        assert_eq!(buf.get_u8(), PORT_PLEASE2_REQ);

        PortPleaseReq {
            name: String::from_utf8_lossy(buf.chunk()).to_string(),
        }
    }

    #[test]
    fn alive_req_layout() {
        let req = AliveReq {
            port: 30000,
            node_type: 72,
            protocol: 0,
            high_vsn: 5,
            low_vsn: 5,
            name: "node".to_string(),
            extra: vec![],
        };

        let mut buf = vec![];
        req.encode(&mut buf).unwrap();

        assert_eq!(req.len(), 13 + 4);
        assert_eq!(
            buf,
            vec![0, 17, 120, 0x75, 0x30, 72, 0, 0, 5, 0, 5, 0, 4, b'n', b'o', b'd', b'e', 0, 0]
        );
        // node type byte sits right after the opcode and port
        assert_eq!(buf[5], 72);
    }

    #[test]
    fn alive_req_round_trip() {
        let req = AliveReq {
            port: 1234,
            node_type: 77,
            protocol: 0,
            high_vsn: 5,
            low_vsn: 5,
            name: "console".to_string(),
            extra: vec![1, 2, 3],
        };

        let mut buf = vec![];
        req.encode(&mut buf).unwrap();
        assert_eq!(decode_alive_req(&buf), req);
    }

    #[test]
    fn port_please_req_round_trip() {
        let req = PortPleaseReq {
            name: "console".to_string(),
        };

        let mut buf = vec![];
        req.encode(&mut buf).unwrap();
        assert_eq!(buf[..3], [0, 8, 122]);
        assert_eq!(decode_port_please_req(&buf), req);
    }

    #[test]
    fn names_req_layout() {
        let mut buf = vec![];
        NamesReq.encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0, 1, 110]);
    }

    #[test]
    fn alive_resp_creation() {
        let resp = AliveResp::decode(&[121, 0, 0x00, 0x2A]).unwrap();
        assert_eq!(resp.creation(), Ok(42));
    }

    #[test]
    fn alive_resp_creation_zero_is_collision() {
        let resp = AliveResp::decode(&[121, 0, 0, 0]).unwrap();
        assert_eq!(resp.creation(), Err(Error::NameCollision));
    }

    #[test]
    fn alive_resp_rejected() {
        let resp = AliveResp::decode(&[121, 1, 0, 42]).unwrap();
        assert_eq!(resp.creation(), Err(Error::RequestRejected(1)));
    }

    #[test]
    fn alive_resp_wrong_opcode() {
        assert_eq!(
            AliveResp::decode(&[118, 0, 0, 42]),
            Err(Error::MalformedReply {
                expected: 121,
                got: 118
            })
        );
    }

    #[test]
    fn alive_resp_truncated() {
        assert_eq!(
            AliveResp::decode(&[121, 0]),
            Err(Error::Truncated { need: 4, got: 2 })
        );
    }

    #[test]
    fn port2_resp_port() {
        let resp = Port2Resp::decode(&[119, 0, 0x75, 0x30]).unwrap();
        assert_eq!(resp.port(), Ok(30000));
    }

    #[test]
    fn port2_resp_not_found() {
        // error replies stop after the result byte
        let resp = Port2Resp::decode(&[119, 1]).unwrap();
        assert_eq!(resp.port(), Err(Error::NameNotFound));
    }

    #[test]
    fn port2_resp_ignores_extended_fields() {
        let resp = Port2Resp::decode(&[119, 0, 0x04, 0xD2, 77, 0, 0, 5, 0, 5]).unwrap();
        assert_eq!(resp.port(), Ok(1234));
    }

    #[test]
    fn port2_resp_wrong_opcode() {
        assert_eq!(
            Port2Resp::decode(&[121, 0, 0, 0]),
            Err(Error::MalformedReply {
                expected: 119,
                got: 121
            })
        );
    }

    #[test]
    fn message_kind_opcodes() {
        for kind in [
            MessageKind::AliveReq,
            MessageKind::AliveResp,
            MessageKind::AliveXResp,
            MessageKind::PortPleaseReq,
            MessageKind::Port2Resp,
            MessageKind::NamesReq,
            MessageKind::DumpReq,
            MessageKind::KillReq,
            MessageKind::StopReq,
        ] {
            assert_eq!(MessageKind::try_from(kind.opcode()), Ok(kind));
        }

        assert_eq!(MessageKind::try_from(42), Err(Error::UnknownOpcode(42)));
    }

    #[test]
    fn names_resp_parse() {
        let text = b"name console at port 30000\nname worker at port 41234\n";
        let resp = NamesResp::parse(4369, text);

        assert_eq!(resp.epmd_port, 4369);
        assert_eq!(
            resp.nodes,
            vec![
                NodeInfo {
                    name: "console".to_string(),
                    port: 30000
                },
                NodeInfo {
                    name: "worker".to_string(),
                    port: 41234
                },
            ]
        );
    }
}
