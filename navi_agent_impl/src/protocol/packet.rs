//! Reading side of the wire codec.
//!
//! A packet is a 12-byte header (`command`, `id`, `arg_count`, all u32be)
//! followed by `arg_count` arguments. Every argument is an 8-byte argument
//! header (`length`, `type`, both u32be) followed by `length` payload bytes.
//! The layout of the arguments is fixed per command; the parser rejects any
//! packet whose arguments do not match the schema of its command.
use byteorder::{BigEndian, ReadBytesExt};

use crate::{
    protocol::{ArgSchema, CommandCode},
    target::Address,
    AgentError, AgentResult, ErrorCode,
};

// Data arguments larger than this are rejected before any allocation.
pub const MAX_DATA_LEN: u32 = 16 * 1024 * 1024;

// Ceiling for commands whose argument count is peer-controlled.
const MAX_ARG_COUNT: u32 = 4096;

const ARG_INTEGER: u32 = 0;
const ARG_ADDRESS: u32 = 1;
const ARG_DATA: u32 = 2;
const ARG_LONG: u32 = 3;

#[derive(Debug)]
pub struct PacketHeader {
    pub command: CommandCode,
    pub id: u32,
    pub arg_count: u32,
}

/// One decoded request. Integer, address and long arguments are collected
/// into flat vectors in wire order; long values share the address vector.
#[derive(Debug)]
pub struct Packet {
    pub header: PacketHeader,
    pub ints: Vec<u32>,
    pub addresses: Vec<Address>,
    pub data: Vec<u8>,
}

impl Packet {
    /// Reads exactly one packet, blocking until it is complete.
    pub fn parse(rdr: &mut dyn std::io::Read) -> AgentResult<Self> {
        let raw_command = rdr.read_u32::<BigEndian>()?;
        let id = rdr.read_u32::<BigEndian>()?;
        let arg_count = rdr.read_u32::<BigEndian>()?;

        let command = CommandCode::from_u32(raw_command).ok_or_else(|| {
            warn!("Unknown command {raw_command} in packet {id}");
            AgentError::Command(ErrorCode::UnknownCommand)
        })?;

        let mut packet = Self {
            header: PacketHeader {
                command,
                id,
                arg_count,
            },
            ints: Vec::new(),
            addresses: Vec::new(),
            data: Vec::new(),
        };

        let schema = command
            .arg_schema()
            .ok_or(AgentError::Command(ErrorCode::UnknownCommand))?;
        trace!("Parsing packet {id}: command {command:?}, {arg_count} arguments");

        match schema {
            ArgSchema::Simple => packet.expect_arg_count(0)?,
            ArgSchema::Integer => {
                packet.expect_arg_count(1)?;
                packet.read_integer(rdr)?;
            }
            ArgSchema::AddressList => {
                packet.read_integer(rdr)?;
                let n = packet.ints[0];
                if n > MAX_ARG_COUNT {
                    warn!("Address list packet with bad address count {n}");
                    return Err(ErrorCode::MalformedPacket.into());
                }
                packet.expect_arg_count(n + 1)?;
                for _ in 0..n {
                    packet.read_address(rdr)?;
                }
            }
            ArgSchema::Address => {
                packet.expect_arg_count(1)?;
                packet.read_address(rdr)?;
            }
            ArgSchema::AddressPair => {
                packet.expect_arg_count(2)?;
                packet.read_address(rdr)?;
                packet.read_address(rdr)?;
            }
            ArgSchema::SetRegister => {
                packet.expect_arg_count(3)?;
                packet.read_integer(rdr)?;
                packet.read_integer(rdr)?;
                packet.read_address(rdr)?;
            }
            ArgSchema::Search => {
                packet.expect_arg_count(3)?;
                packet.read_address(rdr)?;
                packet.read_address(rdr)?;
                packet.read_data(rdr)?;
            }
            ArgSchema::Data => {
                packet.expect_arg_count(1)?;
                packet.read_data(rdr)?;
            }
            ArgSchema::AddressData => {
                packet.expect_arg_count(2)?;
                packet.read_address(rdr)?;
                packet.read_data(rdr)?;
            }
            ArgSchema::ExceptionSettings => {
                if packet.header.arg_count % 2 != 0 || packet.header.arg_count > MAX_ARG_COUNT {
                    warn!(
                        "Exception settings packet with bad argument count {}",
                        packet.header.arg_count
                    );
                    return Err(ErrorCode::MalformedPacket.into());
                }
                for _ in 0..packet.header.arg_count / 2 {
                    packet.read_long(rdr)?;
                    packet.read_integer(rdr)?;
                }
            }
            ArgSchema::IntegerList => {
                if packet.header.arg_count > MAX_ARG_COUNT {
                    warn!(
                        "Integer list packet with bad argument count {}",
                        packet.header.arg_count
                    );
                    return Err(ErrorCode::MalformedPacket.into());
                }
                for _ in 0..packet.header.arg_count {
                    packet.read_integer(rdr)?;
                }
            }
        }
        Ok(packet)
    }

    fn expect_arg_count(&self, expected: u32) -> AgentResult<()> {
        if self.header.arg_count == expected {
            Ok(())
        } else {
            warn!(
                "Malformed {:?} packet: expected {expected} arguments, found {}",
                self.header.command, self.header.arg_count
            );
            Err(ErrorCode::MalformedPacket.into())
        }
    }

    fn read_arg_header(rdr: &mut dyn std::io::Read, want: u32) -> AgentResult<u32> {
        let length = rdr.read_u32::<BigEndian>()?;
        let arg_type = rdr.read_u32::<BigEndian>()?;
        if arg_type != want {
            warn!("Received argument of type {arg_type}, expected {want}");
            return Err(ErrorCode::MalformedPacket.into());
        }
        Ok(length)
    }

    fn read_integer(&mut self, rdr: &mut dyn std::io::Read) -> AgentResult<()> {
        let length = Self::read_arg_header(rdr, ARG_INTEGER)?;
        if length != 4 {
            warn!("Received integer argument with invalid length {length}");
            return Err(ErrorCode::MalformedPacket.into());
        }
        self.ints.push(rdr.read_u32::<BigEndian>()?);
        Ok(())
    }

    fn read_address_payload(&mut self, rdr: &mut dyn std::io::Read) -> AgentResult<()> {
        let high = rdr.read_u32::<BigEndian>()?;
        let low = rdr.read_u32::<BigEndian>()?;
        self.addresses.push((Address::from(high) << 32) | Address::from(low));
        Ok(())
    }

    fn read_address(&mut self, rdr: &mut dyn std::io::Read) -> AgentResult<()> {
        let length = Self::read_arg_header(rdr, ARG_ADDRESS)?;
        if length != 8 {
            warn!("Received address argument with invalid length {length}");
            return Err(ErrorCode::MalformedPacket.into());
        }
        self.read_address_payload(rdr)
    }

    // Long arguments carry exception codes; they use the address layout and
    // are collected into the address vector.
    fn read_long(&mut self, rdr: &mut dyn std::io::Read) -> AgentResult<()> {
        let length = Self::read_arg_header(rdr, ARG_LONG)?;
        if length != 8 {
            warn!("Received long argument with invalid length {length}");
            return Err(ErrorCode::MalformedPacket.into());
        }
        self.read_address_payload(rdr)
    }

    fn read_data(&mut self, rdr: &mut dyn std::io::Read) -> AgentResult<()> {
        let length = Self::read_arg_header(rdr, ARG_DATA)?;
        if length > MAX_DATA_LEN {
            warn!("Received data argument of {length} bytes, limit is {MAX_DATA_LEN}");
            return Err(ErrorCode::MalformedPacket.into());
        }
        let mut payload = vec![0_u8; length as usize];
        rdr.read_exact(&mut payload)?;
        self.data = payload;
        Ok(())
    }
}

// Writing side helpers shared by the reply module.
pub(crate) fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn put_header(buf: &mut Vec<u8>, command: CommandCode, id: u32, arg_count: u32) {
    put_u32(buf, command.as_u32());
    put_u32(buf, id);
    put_u32(buf, arg_count);
}

pub(crate) fn put_integer_arg(buf: &mut Vec<u8>, value: u32) {
    put_u32(buf, 4);
    put_u32(buf, ARG_INTEGER);
    put_u32(buf, value);
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn put_address_arg(buf: &mut Vec<u8>, address: Address) {
    put_u32(buf, 8);
    put_u32(buf, ARG_ADDRESS);
    put_u32(buf, (address >> 32) as u32);
    put_u32(buf, address as u32);
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn put_data_arg(buf: &mut Vec<u8>, data: &[u8]) {
    put_u32(buf, data.len() as u32);
    put_u32(buf, ARG_DATA);
    buf.extend_from_slice(data);
}

#[cfg(test)]
mod tests {
    use super::{Packet, MAX_DATA_LEN};
    use crate::{protocol::CommandCode, AgentError, ErrorCode};

    fn push_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_be_bytes());
    }

    fn push_address(buf: &mut Vec<u8>, addr: u64) {
        push_u32(buf, 8);
        push_u32(buf, 1);
        push_u32(buf, (addr >> 32) as u32);
        push_u32(buf, addr as u32);
    }

    #[test]
    fn parses_address_list() {
        let mut buf = Vec::new();
        push_u32(&mut buf, CommandCode::SetBreakpoints.as_u32());
        push_u32(&mut buf, 77);
        push_u32(&mut buf, 3);
        push_u32(&mut buf, 4);
        push_u32(&mut buf, 0); // integer
        push_u32(&mut buf, 2);
        push_address(&mut buf, 0x0040_1000);
        push_address(&mut buf, 0x7fff_0000_1234);

        let p = Packet::parse(&mut buf.as_slice()).unwrap();
        assert_eq!(p.header.command, CommandCode::SetBreakpoints);
        assert_eq!(p.header.id, 77);
        assert_eq!(p.ints, vec![2]);
        assert_eq!(p.addresses, vec![0x0040_1000, 0x7fff_0000_1234]);
    }

    #[test]
    fn rejects_wrong_arg_type() {
        let mut buf = Vec::new();
        push_u32(&mut buf, CommandCode::SelectProcess.as_u32());
        push_u32(&mut buf, 1);
        push_u32(&mut buf, 1);
        push_u32(&mut buf, 4);
        push_u32(&mut buf, 2); // data instead of integer
        push_u32(&mut buf, 1234);

        match Packet::parse(&mut buf.as_slice()) {
            Err(AgentError::Command(ErrorCode::MalformedPacket)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejects_wrong_integer_length() {
        let mut buf = Vec::new();
        push_u32(&mut buf, CommandCode::SelectProcess.as_u32());
        push_u32(&mut buf, 1);
        push_u32(&mut buf, 1);
        push_u32(&mut buf, 8); // integers are 4 bytes
        push_u32(&mut buf, 0);
        push_u32(&mut buf, 0);
        push_u32(&mut buf, 1234);

        assert!(matches!(
            Packet::parse(&mut buf.as_slice()),
            Err(AgentError::Command(ErrorCode::MalformedPacket))
        ));
    }

    #[test]
    fn rejects_wrong_simple_arg_count() {
        let mut buf = Vec::new();
        push_u32(&mut buf, CommandCode::Resume.as_u32());
        push_u32(&mut buf, 9);
        push_u32(&mut buf, 1);

        assert!(matches!(
            Packet::parse(&mut buf.as_slice()),
            Err(AgentError::Command(ErrorCode::MalformedPacket))
        ));
    }

    #[test]
    fn rejects_unknown_command() {
        let mut buf = Vec::new();
        push_u32(&mut buf, 4711);
        push_u32(&mut buf, 9);
        push_u32(&mut buf, 0);

        assert!(matches!(
            Packet::parse(&mut buf.as_slice()),
            Err(AgentError::Command(ErrorCode::UnknownCommand))
        ));
    }

    #[test]
    fn rejects_oversized_data() {
        let mut buf = Vec::new();
        push_u32(&mut buf, CommandCode::SelectFile.as_u32());
        push_u32(&mut buf, 9);
        push_u32(&mut buf, 1);
        push_u32(&mut buf, MAX_DATA_LEN + 1);
        push_u32(&mut buf, 2);

        assert!(matches!(
            Packet::parse(&mut buf.as_slice()),
            Err(AgentError::Command(ErrorCode::MalformedPacket))
        ));
    }

    #[test]
    fn short_read_is_fatal() {
        let mut buf = Vec::new();
        push_u32(&mut buf, CommandCode::ReadMemory.as_u32());
        push_u32(&mut buf, 9);
        push_u32(&mut buf, 2);
        push_address(&mut buf, 0x1000);
        // second address argument is missing

        assert!(matches!(
            Packet::parse(&mut buf.as_slice()),
            Err(AgentError::ConnectionClosed)
        ));
    }
}
