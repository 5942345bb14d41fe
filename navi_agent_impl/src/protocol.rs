//! The wire codec: command codes, packet parsing, reply encoding, and the
//! text payloads sent to the peer. This module is the only place where
//! byte-order conversions happen.
mod command;
mod infostring;
mod packet;
pub mod reply;

pub use command::{ArgSchema, CommandCode};
pub use infostring::{
    exception_raised_string, file_list_string, information_string, module_string,
    process_list_string, process_start_string, register_values_string,
};
pub use packet::{Packet, PacketHeader, MAX_DATA_LEN};
