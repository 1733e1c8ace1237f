//! # solarmap - register mapping and bulk transfer for FoxESS inverters
//!
//! Named, typed access to the Modbus registers of FoxESS H1, AC1, AIO-H1
//! and KH solar inverters. Values are described once in a validated register
//! table; reads are coalesced into as few Modbus requests as possible and
//! multi-register settings are written in a declared order with distinct
//! reporting of partial failures.
//!
//! ## Architecture
//!
//! - `registers`: Register descriptor table, inverter models, built-in map
//! - `codec`: Raw words to typed values and back
//! - `planner`: Coalescing of requested registers into read blocks
//! - `reader`: Execution of a read plan with per-descriptor outcomes
//! - `composite`: Multi-register settings, validation rules and writes
//! - `controller`: Per-device host surface over a shared transport
//! - `transport`: Transport seam and an in-memory implementation
//! - `modbus`: Modbus TCP transport
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing

pub mod codec;
pub mod composite;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod modbus;
pub mod planner;
pub mod reader;
pub mod registers;
pub mod transport;

// Re-export commonly used types
pub use codec::{Codec, EnumValue, Ratio, TypedValue};
pub use composite::{CompositeSetting, CompositeValue};
pub use config::Config;
pub use controller::InverterController;
pub use error::{Result, SolarmapError, TransportError, Unavailable};
pub use planner::{PlannerConfig, ReadBlock, plan_reads};
pub use reader::{DecodedValue, ReadResults, ReadSnapshot};
pub use registers::{Encoding, InverterModel, RegisterDescriptor, RegisterKind, RegisterMap};
pub use transport::{MemoryTransport, Transport};
