//! Writing side of the wire codec: the fixed reply shapes.
//!
//! Every encoder builds one complete packet into a byte buffer which the
//! session sends in a single transport write.
use crate::{
    protocol::packet::{put_address_arg, put_data_arg, put_header, put_integer_arg},
    protocol::CommandCode,
    target::Address,
};

/// A reply without arguments.
pub fn simple(command: CommandCode, id: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    put_header(&mut buf, command, id, 0);
    buf
}

/// A reply with a variable number of integer arguments.
#[allow(clippy::cast_possible_truncation)]
pub fn integers(command: CommandCode, id: u32, values: &[u32]) -> Vec<u8> {
    let mut buf = Vec::new();
    put_header(&mut buf, command, id, values.len() as u32);
    for value in values {
        put_integer_arg(&mut buf, *value);
    }
    buf
}

/// A reply with a variable number of address arguments.
#[allow(clippy::cast_possible_truncation)]
pub fn addresses(command: CommandCode, id: u32, values: &[Address]) -> Vec<u8> {
    let mut buf = Vec::new();
    put_header(&mut buf, command, id, values.len() as u32);
    for value in values {
        put_address_arg(&mut buf, *value);
    }
    buf
}

/// A reply with a single data argument (info strings, register strings,
/// process and file listings).
pub fn data(command: CommandCode, id: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    put_header(&mut buf, command, id, 1);
    put_data_arg(&mut buf, payload);
    buf
}

/// The reply to a memory read: the base address followed by the bytes.
pub fn memory(id: u32, address: Address, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    put_header(&mut buf, CommandCode::ReadMemorySucc, id, 2);
    put_address_arg(&mut buf, address);
    put_data_arg(&mut buf, payload);
    buf
}

/// The per-address result list of a batch breakpoint command: a count,
/// followed by one (address, code) pair per requested breakpoint.
/// Code 0 means the operation succeeded for that address.
#[allow(clippy::cast_possible_truncation)]
pub fn breakpoint_results(
    command: CommandCode,
    id: u32,
    results: &[(Address, u32)],
) -> Vec<u8> {
    let mut buf = Vec::new();
    put_header(&mut buf, command, id, 1 + 2 * results.len() as u32);
    put_integer_arg(&mut buf, results.len() as u32);
    for (address, code) in results {
        put_address_arg(&mut buf, *address);
        put_integer_arg(&mut buf, *code);
    }
    buf
}

/// A breakpoint event: thread id plus the register string.
pub fn event(command: CommandCode, id: u32, tid: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    put_header(&mut buf, command, id, 2);
    put_integer_arg(&mut buf, tid);
    put_data_arg(&mut buf, payload);
    buf
}

/// The reply to an event that suspended the process: thread id, stop
/// address, register string.
pub fn suspended(
    command: CommandCode,
    id: u32,
    tid: u32,
    address: Address,
    payload: &[u8],
) -> Vec<u8> {
    let mut buf = Vec::new();
    put_header(&mut buf, command, id, 3);
    put_integer_arg(&mut buf, tid);
    put_address_arg(&mut buf, address);
    put_data_arg(&mut buf, payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::{breakpoint_results, memory, simple};
    use crate::protocol::CommandCode;

    #[test]
    fn simple_reply_is_bare_header() {
        let buf = simple(CommandCode::Resumed, 0x0102_0304);
        assert_eq!(
            buf,
            [
                0, 0, 0, 38, // command
                1, 2, 3, 4, // id
                0, 0, 0, 0, // arg count
            ]
        );
    }

    #[test]
    fn memory_reply_layout() {
        let buf = memory(7, 0x1_0000_2000, &[0xde, 0xad]);
        assert_eq!(
            buf,
            [
                0, 0, 0, 43, // command
                0, 0, 0, 7, // id
                0, 0, 0, 2, // arg count
                0, 0, 0, 8, 0, 0, 0, 1, // address argument header
                0, 0, 0, 1, 0, 0, 0x20, 0, // high32, low32
                0, 0, 0, 2, 0, 0, 0, 2, // data argument header
                0xde, 0xad,
            ]
        );
    }

    #[test]
    fn breakpoint_results_carry_count_and_pairs() {
        let buf = breakpoint_results(CommandCode::BpSetSucc, 1, &[(0x401000, 0), (0x402000, 35)]);
        // header + count + 2 * (address + code)
        assert_eq!(buf.len(), 12 + 12 + 2 * (16 + 12));
        assert_eq!(&buf[12..24], [0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0, 2]);
    }
}
