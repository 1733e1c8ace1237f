//! Transport seam
//!
//! The engine talks to a device only through [`Transport`]. Retry, backoff,
//! timeouts and physical-link exclusivity belong to implementations; the
//! engine serializes its own use of one transport through a mutex.

use crate::error::TransportError;
use crate::registers::RegisterKind;
use std::collections::{BTreeMap, BTreeSet};

#[async_trait::async_trait]
pub trait Transport: Send {
    /// Optional connection status. Default: unknown (None).
    fn is_connected(&self) -> Option<bool> {
        None
    }

    /// Read `count` registers starting at `address`
    async fn read(
        &mut self,
        kind: RegisterKind,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;

    /// Write consecutive holding registers starting at `address`
    async fn write(&mut self, address: u16, words: &[u16]) -> Result<(), TransportError>;
}

/// Operation observed by [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Read {
        kind: RegisterKind,
        address: u16,
        count: u16,
    },
    Write {
        address: u16,
        words: Vec<u16>,
    },
}

/// In-memory register image that records every call.
///
/// Unset registers read as zero. Reads covering a poisoned address and
/// writes touching a poisoned address fail with a Modbus exception.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    holding: BTreeMap<u16, u16>,
    input: BTreeMap<u16, u16>,
    failing_reads: BTreeSet<(RegisterKind, u16)>,
    failing_writes: BTreeSet<u16>,
    calls: Vec<TransportCall>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn bank(&self, kind: RegisterKind) -> &BTreeMap<u16, u16> {
        match kind {
            RegisterKind::Holding => &self.holding,
            RegisterKind::Input => &self.input,
        }
    }

    /// Preload consecutive registers
    pub fn set(&mut self, kind: RegisterKind, address: u16, words: &[u16]) {
        let bank = match kind {
            RegisterKind::Holding => &mut self.holding,
            RegisterKind::Input => &mut self.input,
        };
        for (addr, word) in (address..).zip(words) {
            bank.insert(addr, *word);
        }
    }

    pub fn set_holding(&mut self, address: u16, words: &[u16]) {
        self.set(RegisterKind::Holding, address, words);
    }

    pub fn set_input(&mut self, address: u16, words: &[u16]) {
        self.set(RegisterKind::Input, address, words);
    }

    pub fn holding(&self, address: u16) -> u16 {
        self.holding.get(&address).copied().unwrap_or(0)
    }

    pub fn fail_reads_at(&mut self, kind: RegisterKind, address: u16) {
        self.failing_reads.insert((kind, address));
    }

    pub fn fail_writes_at(&mut self, address: u16) {
        self.failing_writes.insert(address);
    }

    pub fn calls(&self) -> &[TransportCall] {
        &self.calls
    }

    pub fn reads(&self) -> Vec<(RegisterKind, u16, u16)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Read {
                    kind,
                    address,
                    count,
                } => Some((*kind, *address, *count)),
                TransportCall::Write { .. } => None,
            })
            .collect()
    }

    pub fn writes(&self) -> Vec<(u16, Vec<u16>)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Write { address, words } => Some((*address, words.clone())),
                TransportCall::Read { .. } => None,
            })
            .collect()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

fn span(address: u16, count: usize) -> impl Iterator<Item = u16> {
    (u32::from(address)..u32::from(address) + count as u32)
        .filter_map(|a| u16::try_from(a).ok())
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    fn is_connected(&self) -> Option<bool> {
        Some(true)
    }

    async fn read(
        &mut self,
        kind: RegisterKind,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.calls.push(TransportCall::Read {
            kind,
            address,
            count,
        });
        if span(address, usize::from(count)).any(|a| self.failing_reads.contains(&(kind, a))) {
            return Err(TransportError::Exception {
                code: "IllegalDataAddress".to_string(),
            });
        }
        let bank = self.bank(kind);
        Ok(span(address, usize::from(count))
            .map(|a| bank.get(&a).copied().unwrap_or(0))
            .collect())
    }

    async fn write(&mut self, address: u16, words: &[u16]) -> Result<(), TransportError> {
        self.calls.push(TransportCall::Write {
            address,
            words: words.to_vec(),
        });
        if span(address, words.len()).any(|a| self.failing_writes.contains(&a)) {
            return Err(TransportError::Exception {
                code: "SlaveDeviceFailure".to_string(),
            });
        }
        self.set_holding(address, words);
        Ok(())
    }
}
