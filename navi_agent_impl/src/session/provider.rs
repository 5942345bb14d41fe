use crate::target::{Address, ThreadId};

/// Collects the result payload of one command while its handler runs; the
/// controller picks the pieces the reply shape of the command needs.
#[derive(Debug, Default)]
pub struct InformationProvider {
    memory: Vec<u8>,
    text: String,
    tid: ThreadId,
    addresses: Vec<Address>,
    breakpoint_results: Vec<(Address, u32)>,
}

impl InformationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_address(&mut self, address: Address) {
        self.addresses.push(address);
    }

    pub fn address(&self, index: usize) -> Option<Address> {
        self.addresses.get(index).copied()
    }

    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub fn set_tid(&mut self, tid: ThreadId) {
        self.tid = tid;
    }

    pub fn tid(&self) -> ThreadId {
        self.tid
    }

    pub fn set_breakpoint_results(&mut self, results: Vec<(Address, u32)>) {
        self.breakpoint_results = results;
    }

    pub fn breakpoint_results(&self) -> &[(Address, u32)] {
        &self.breakpoint_results
    }

    pub fn set_text(&mut self, text: String) {
        self.text = text;
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_memory(&mut self, memory: Vec<u8>) {
        self.memory = memory;
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }
}
