//! Read planner
//!
//! Groups requested descriptors into as few contiguous read requests as
//! possible. Descriptors are sorted by bank and address and merged greedily
//! while the merged span stays within `max_block_size`. Registers in gaps
//! between descriptors are read and discarded: a few extra words per request
//! cost far less than an extra round trip on a serial link.
//!
//! Planning is a pure function of its inputs, so the same request always
//! yields the same plan.

use crate::error::{Result, SolarmapError};
use crate::registers::{RegisterDescriptor, RegisterKind};

/// Planner limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerConfig {
    max_block_size: u16,
    max_gap: Option<u16>,
}

impl PlannerConfig {
    /// Largest register count a Modbus read request may carry
    pub const MODBUS_MAX_READ: u16 = 125;

    /// Largest register count a Modbus write multiple request may carry
    pub const MODBUS_MAX_WRITE: u16 = 123;

    /// Create a config; `max_block_size` must be in `2..=125`
    pub fn new(max_block_size: u16) -> Result<Self> {
        if !(2..=Self::MODBUS_MAX_READ).contains(&max_block_size) {
            return Err(SolarmapError::validation(
                "max_block_size".to_string(),
                format!(
                    "Must be between 2 and {}, got {}",
                    Self::MODBUS_MAX_READ,
                    max_block_size
                ),
            ));
        }
        Ok(Self {
            max_block_size,
            max_gap: None,
        })
    }

    /// Start a new block when more than `gap` unrequested registers would be read
    pub fn with_max_gap(mut self, gap: Option<u16>) -> Self {
        self.max_gap = gap;
        self
    }

    pub fn max_block_size(&self) -> u16 {
        self.max_block_size
    }

    pub fn max_gap(&self) -> Option<u16> {
        self.max_gap
    }
}

/// One planned read request: `[start, start + length)` in one register bank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBlock<'a> {
    pub kind: RegisterKind,
    pub start: u16,
    pub length: u16,
    /// Descriptors satisfied by this block, in address order
    pub descriptors: Vec<&'a RegisterDescriptor>,
}

impl ReadBlock<'_> {
    /// Exclusive end address
    pub fn end(&self) -> u32 {
        u32::from(self.start) + u32::from(self.length)
    }

    /// Word range of `descriptor` within this block's response
    pub fn slice_range(&self, descriptor: &RegisterDescriptor) -> std::ops::Range<usize> {
        let offset = usize::from(descriptor.address - self.start);
        offset..offset + usize::from(descriptor.word_count)
    }

    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }
}

struct OpenBlock<'a> {
    kind: RegisterKind,
    start: u32,
    end: u32,
    descriptors: Vec<&'a RegisterDescriptor>,
}

impl<'a> OpenBlock<'a> {
    fn new(descriptor: &'a RegisterDescriptor) -> Self {
        Self {
            kind: descriptor.kind,
            start: u32::from(descriptor.address),
            end: descriptor.end(),
            descriptors: vec![descriptor],
        }
    }

    fn accepts(&self, descriptor: &RegisterDescriptor, config: &PlannerConfig) -> bool {
        let merged_end = self.end.max(descriptor.end());
        let gap = u32::from(descriptor.address).saturating_sub(self.end);
        self.kind == descriptor.kind
            && merged_end - self.start <= u32::from(config.max_block_size)
            && config.max_gap.is_none_or(|max| gap <= u32::from(max))
    }

    fn push(&mut self, descriptor: &'a RegisterDescriptor) {
        self.end = self.end.max(descriptor.end());
        self.descriptors.push(descriptor);
    }

    #[allow(clippy::cast_possible_truncation)]
    fn close(self) -> ReadBlock<'a> {
        ReadBlock {
            kind: self.kind,
            start: self.start as u16,
            length: (self.end - self.start) as u16,
            descriptors: self.descriptors,
        }
    }
}

/// Plan the reads covering `requested`.
///
/// Duplicate names are planned once. Blocks come out holding bank first,
/// then in ascending address order; every descriptor lands in exactly one
/// block and no block is longer than `max_block_size`.
pub fn plan_reads<'a>(
    config: &PlannerConfig,
    requested: &[&'a RegisterDescriptor],
) -> Vec<ReadBlock<'a>> {
    let mut sorted: Vec<&'a RegisterDescriptor> = requested.to_vec();
    sorted.sort_by(|a, b| {
        (a.kind, a.address, a.word_count, &a.name).cmp(&(b.kind, b.address, b.word_count, &b.name))
    });
    sorted.dedup_by(|a, b| a.name == b.name);

    let mut blocks = Vec::new();
    let mut current: Option<OpenBlock<'a>> = None;
    for descriptor in sorted {
        let fits = current
            .as_ref()
            .is_some_and(|block| block.accepts(descriptor, config));
        if fits {
            if let Some(block) = current.as_mut() {
                block.push(descriptor);
            }
        } else if let Some(block) = current.replace(OpenBlock::new(descriptor)) {
            blocks.push(block.close());
        }
    }
    if let Some(block) = current {
        blocks.push(block.close());
    }
    blocks
}
