
use navi_agent::{
    protocol::{reply, Packet},
    AgentError, CommandCode, ErrorCode,
};

fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn push_address_arg(buf: &mut Vec<u8>, addr: u64) {
    push_u32(buf, 8);
    push_u32(buf, 1);
    push_u32(buf, (addr >> 32) as u32);
    push_u32(buf, addr as u32);
}

fn push_integer_arg(buf: &mut Vec<u8>, v: u32) {
    push_u32(buf, 4);
    push_u32(buf, 0);
    push_u32(buf, v);
}

#[test]
fn test_010_wire() {
    let _log_handle = test_utils::init_logger();
    request_round_trips();
    golden_request_bytes();
    golden_reply_bytes();
    id_is_echoed_in_replies();
    schema_violations_are_rejected();
}

// decode(encode(C, id, A)) = (C, id, A) for representative schemas
fn request_round_trips() {
    // simple
    let mut buf = Vec::new();
    push_u32(&mut buf, CommandCode::Halt.as_u32());
    push_u32(&mut buf, 17);
    push_u32(&mut buf, 0);
    let p = Packet::parse(&mut buf.as_slice()).unwrap();
    assert_eq!(p.header.command, CommandCode::Halt);
    assert_eq!(p.header.id, 17);

    // address list
    let addresses = [0x1000_u64, 0xffff_ffff_0000_0010, 0];
    let mut buf = Vec::new();
    push_u32(&mut buf, CommandCode::RemoveEchoBreakpoints.as_u32());
    push_u32(&mut buf, 18);
    push_u32(&mut buf, 4);
    push_integer_arg(&mut buf, 3);
    for a in addresses {
        push_address_arg(&mut buf, a);
    }
    let p = Packet::parse(&mut buf.as_slice()).unwrap();
    assert_eq!(p.ints, vec![3]);
    assert_eq!(p.addresses, addresses.to_vec());

    // set-register: tid, index, value
    let mut buf = Vec::new();
    push_u32(&mut buf, CommandCode::SetRegister.as_u32());
    push_u32(&mut buf, 19);
    push_u32(&mut buf, 3);
    push_integer_arg(&mut buf, 42);
    push_integer_arg(&mut buf, 7);
    push_address_arg(&mut buf, 0xdead_beef);
    let p = Packet::parse(&mut buf.as_slice()).unwrap();
    assert_eq!(p.ints, vec![42, 7]);
    assert_eq!(p.addresses, vec![0xdead_beef]);

    // address + data
    let mut buf = Vec::new();
    push_u32(&mut buf, CommandCode::WriteMemory.as_u32());
    push_u32(&mut buf, 20);
    push_u32(&mut buf, 2);
    push_address_arg(&mut buf, 0x8000);
    push_u32(&mut buf, 3);
    push_u32(&mut buf, 2);
    buf.extend_from_slice(&[1, 2, 3]);
    let p = Packet::parse(&mut buf.as_slice()).unwrap();
    assert_eq!(p.addresses, vec![0x8000]);
    assert_eq!(p.data, vec![1, 2, 3]);

    // exception settings: alternating long and integer
    let mut buf = Vec::new();
    push_u32(&mut buf, CommandCode::SetExceptionSettings.as_u32());
    push_u32(&mut buf, 21);
    push_u32(&mut buf, 4);
    for (code, action) in [(0xc000_0005_u64, 1_u32), (0x8000_0003, 0)] {
        push_u32(&mut buf, 8);
        push_u32(&mut buf, 3); // long
        push_u32(&mut buf, (code >> 32) as u32);
        push_u32(&mut buf, code as u32);
        push_integer_arg(&mut buf, action);
    }
    let p = Packet::parse(&mut buf.as_slice()).unwrap();
    assert_eq!(p.addresses, vec![0xc000_0005, 0x8000_0003]);
    assert_eq!(p.ints, vec![1, 0]);
}

// The exact byte layout of a request, as the peer produces it.
fn golden_request_bytes() {
    let mut buf = Vec::new();
    push_u32(&mut buf, CommandCode::ValidMemory.as_u32());
    push_u32(&mut buf, 0x0102_0304);
    push_u32(&mut buf, 1);
    push_address_arg(&mut buf, 0x0000_0001_0040_2000);
    assert_eq!(
        buf,
        [
            0, 0, 0, 16, // cmd_validmem
            1, 2, 3, 4, // id
            0, 0, 0, 1, // one argument
            0, 0, 0, 8, // length 8
            0, 0, 0, 1, // address type
            0, 0, 0, 1, // high32
            0, 64, 32, 0, // low32
        ]
    );
    let p = Packet::parse(&mut buf.as_slice()).unwrap();
    assert_eq!(p.addresses, vec![0x0000_0001_0040_2000]);
}

fn golden_reply_bytes() {
    assert_eq!(
        reply::integers(CommandCode::ThreadClosed, 0, &[0x2a]),
        [
            0, 0, 0, 98, // resp_thread_closed
            0, 0, 0, 0, // id 0: unsolicited
            0, 0, 0, 1, // one argument
            0, 0, 0, 4, 0, 0, 0, 0, // integer header
            0, 0, 0, 0x2a,
        ]
    );
    assert_eq!(
        reply::data(CommandCode::Info, 0, b"<info/>"),
        [
            0, 0, 0, 106, // resp_info
            0, 0, 0, 0, // id
            0, 0, 0, 1, // one argument
            0, 0, 0, 7, 0, 0, 0, 2, // data header
            b'<', b'i', b'n', b'f', b'o', b'/', b'>',
        ]
    );
}

fn id_is_echoed_in_replies() {
    for id in [0_u32, 1, 0xffff_ffff] {
        let buf = reply::simple(CommandCode::Resumed, id);
        assert_eq!(&buf[4..8], id.to_be_bytes());
    }
}

fn schema_violations_are_rejected() {
    // READ_MEMORY with one address instead of two
    let mut buf = Vec::new();
    push_u32(&mut buf, CommandCode::ReadMemory.as_u32());
    push_u32(&mut buf, 5);
    push_u32(&mut buf, 1);
    push_address_arg(&mut buf, 0x1000);
    assert!(matches!(
        Packet::parse(&mut buf.as_slice()),
        Err(AgentError::Command(ErrorCode::MalformedPacket))
    ));

    // address argument with integer length
    let mut buf = Vec::new();
    push_u32(&mut buf, CommandCode::ValidMemory.as_u32());
    push_u32(&mut buf, 5);
    push_u32(&mut buf, 1);
    push_u32(&mut buf, 4);
    push_u32(&mut buf, 1);
    push_u32(&mut buf, 0x1000);
    assert!(matches!(
        Packet::parse(&mut buf.as_slice()),
        Err(AgentError::Command(ErrorCode::MalformedPacket))
    ));

    // address-list packet whose count disagrees with the argument count
    let mut buf = Vec::new();
    push_u32(&mut buf, CommandCode::SetBreakpoints.as_u32());
    push_u32(&mut buf, 5);
    push_u32(&mut buf, 5);
    push_integer_arg(&mut buf, 1);
    push_address_arg(&mut buf, 0x1000);
    assert!(matches!(
        Packet::parse(&mut buf.as_slice()),
        Err(AgentError::Command(ErrorCode::MalformedPacket))
    ));
}
