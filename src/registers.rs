//! Register descriptor table
//!
//! Declarative description of every named value an inverter exposes: where
//! it lives, how wide it is, how to decode it and whether it may be written.
//! Tables are validated once at load time and shared read-only afterwards.

mod foxess;
mod model;

pub use model::InverterModel;

use crate::codec::Ratio;
use crate::composite::{SettingDefinition, SettingsTable};
use crate::error::{Result, SolarmapError};
use crate::logging::get_logger;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Modbus register bank
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RegisterKind {
    /// Holding registers (function 0x03, writable)
    #[default]
    Holding,
    /// Input registers (function 0x04, read-only)
    Input,
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterKind::Holding => f.write_str("holding"),
            RegisterKind::Input => f.write_str("input"),
        }
    }
}

/// Access mode of a register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    #[default]
    ReadOnly,
    ReadWrite,
}

/// How raw register words map to a typed value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Encoding {
    UnsignedInt16,
    UnsignedInt32,
    SignedInt16,
    SignedInt32,
    /// Integer register value multiplied by an exact rational scale
    ScaledDecimal {
        scale: Ratio,
        #[serde(default)]
        signed: bool,
    },
    /// Raw value looked up in a label mapping
    BitEnum { mapping: BTreeMap<u32, String> },
    /// High byte hour, low byte minute
    TimeOfDay,
    /// Zero is false, anything else is true
    Flag,
}

impl Encoding {
    /// Word count the encoding demands, or `None` when 1 and 2 are both valid
    pub fn required_word_count(&self) -> Option<u8> {
        match self {
            Encoding::UnsignedInt16
            | Encoding::SignedInt16
            | Encoding::TimeOfDay
            | Encoding::Flag => Some(1),
            Encoding::UnsignedInt32 | Encoding::SignedInt32 => Some(2),
            Encoding::ScaledDecimal { .. } | Encoding::BitEnum { .. } => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Encoding::UnsignedInt16 => "unsigned_int16",
            Encoding::UnsignedInt32 => "unsigned_int32",
            Encoding::SignedInt16 => "signed_int16",
            Encoding::SignedInt32 => "signed_int32",
            Encoding::ScaledDecimal { .. } => "scaled_decimal",
            Encoding::BitEnum { .. } => "bit_enum",
            Encoding::TimeOfDay => "time_of_day",
            Encoding::Flag => "flag",
        }
    }

    pub fn scaled(scale: Ratio) -> Self {
        Encoding::ScaledDecimal {
            scale,
            signed: false,
        }
    }

    pub fn signed_scaled(scale: Ratio) -> Self {
        Encoding::ScaledDecimal {
            scale,
            signed: true,
        }
    }

    pub fn bit_enum(entries: &[(u32, &str)]) -> Self {
        Encoding::BitEnum {
            mapping: entries
                .iter()
                .map(|(raw, label)| (*raw, (*label).to_string()))
                .collect(),
        }
    }
}

fn default_word_count() -> u8 {
    1
}

/// Immutable description of one named register value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDescriptor {
    /// Unique key
    pub name: String,

    /// First register address
    pub address: u16,

    /// Number of 16-bit words (1 or 2)
    #[serde(default = "default_word_count")]
    pub word_count: u8,

    /// Register bank
    #[serde(default)]
    pub kind: RegisterKind,

    pub encoding: Encoding,

    #[serde(default)]
    pub access: Access,

    /// Models this register exists on
    #[serde(alias = "models")]
    pub applicable_models: BTreeSet<InverterModel>,

    /// Name of a descriptor this one intentionally overlaps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_of: Option<String>,

    /// Display unit for hosts (V, A, kW, %, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl RegisterDescriptor {
    /// Read-only holding register for no model yet; word count follows the encoding
    pub fn new(name: &str, address: u16, encoding: Encoding) -> Self {
        Self {
            name: name.to_string(),
            address,
            word_count: encoding.required_word_count().unwrap_or(1),
            kind: RegisterKind::Holding,
            encoding,
            access: Access::ReadOnly,
            applicable_models: BTreeSet::new(),
            alias_of: None,
            unit: None,
        }
    }

    pub fn words(mut self, word_count: u8) -> Self {
        self.word_count = word_count;
        self
    }

    pub fn input(mut self) -> Self {
        self.kind = RegisterKind::Input;
        self
    }

    pub fn writable(mut self) -> Self {
        self.access = Access::ReadWrite;
        self
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn models(mut self, models: &[InverterModel]) -> Self {
        self.applicable_models = models.iter().copied().collect();
        self
    }

    pub fn alias_of(mut self, name: &str) -> Self {
        self.alias_of = Some(name.to_string());
        self
    }

    /// Exclusive end address
    pub fn end(&self) -> u32 {
        u32::from(self.address) + u32::from(self.word_count)
    }

    pub fn applies_to(&self, model: InverterModel) -> bool {
        self.applicable_models.contains(&model)
    }

    pub fn is_writable(&self) -> bool {
        self.access == Access::ReadWrite
    }

    fn overlaps(&self, other: &RegisterDescriptor) -> bool {
        self.kind == other.kind
            && u32::from(self.address) < other.end()
            && u32::from(other.address) < self.end()
            && self.applicable_models.intersection(&other.applicable_models).next().is_some()
    }

    fn aliases(&self, other: &RegisterDescriptor) -> bool {
        self.alias_of.as_deref() == Some(other.name.as_str())
            || other.alias_of.as_deref() == Some(self.name.as_str())
    }

    /// Per-descriptor problems, independent of the rest of the table
    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let name = &self.name;
        if name.trim().is_empty() {
            problems.push(format!("descriptor at address {} has an empty name", self.address));
        }
        if !(1..=2).contains(&self.word_count) {
            problems.push(format!("{}: word_count {} must be 1 or 2", name, self.word_count));
        } else if let Some(required) = self.encoding.required_word_count()
            && required != self.word_count
        {
            problems.push(format!(
                "{}: {} requires {} word(s), found {}",
                name,
                self.encoding.kind_name(),
                required,
                self.word_count
            ));
        }
        if self.end() > 0x1_0000 {
            problems.push(format!("{}: register range runs past address 65535", name));
        }
        match &self.encoding {
            Encoding::ScaledDecimal { scale, .. } if scale.is_zero() => {
                problems.push(format!("{}: scale must not be zero", name));
            }
            Encoding::BitEnum { mapping } => {
                let limit = if self.word_count == 1 {
                    u32::from(u16::MAX)
                } else {
                    u32::MAX
                };
                if let Some(raw) = mapping.keys().find(|raw| **raw > limit) {
                    problems.push(format!("{}: enum value {} exceeds register width", name, raw));
                }
            }
            _ => {}
        }
        if self.is_writable() && self.kind == RegisterKind::Input {
            problems.push(format!("{}: input registers cannot be writable", name));
        }
        if self.applicable_models.is_empty() {
            problems.push(format!("{}: no applicable models", name));
        }
        if self.alias_of.as_deref() == Some(name.as_str()) {
            problems.push(format!("{}: cannot alias itself", name));
        }
        problems
    }
}

/// Validated, immutable set of register descriptors keyed by name
#[derive(Debug, Clone)]
pub struct RegisterTable {
    by_name: BTreeMap<String, RegisterDescriptor>,
}

impl RegisterTable {
    /// Validate and index descriptors. Every problem found is reported in a
    /// single [`SolarmapError::InvalidDescriptor`].
    pub fn new(descriptors: Vec<RegisterDescriptor>) -> Result<Self> {
        let mut problems = Vec::new();
        let mut by_name = BTreeMap::new();

        for descriptor in descriptors {
            problems.extend(descriptor.problems());
            if by_name.contains_key(&descriptor.name) {
                problems.push(format!("{}: duplicate name", descriptor.name));
                continue;
            }
            by_name.insert(descriptor.name.clone(), descriptor);
        }

        for descriptor in by_name.values() {
            if let Some(target) = &descriptor.alias_of
                && !by_name.contains_key(target)
            {
                problems.push(format!(
                    "{}: alias_of refers to unknown register {}",
                    descriptor.name, target
                ));
            }
        }

        let all: Vec<&RegisterDescriptor> = by_name.values().collect();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                if a.overlaps(b) && !a.aliases(b) {
                    problems.push(format!(
                        "{} and {} overlap in {} registers {}..{}",
                        a.name,
                        b.name,
                        a.kind,
                        a.address.max(b.address),
                        a.end().min(b.end())
                    ));
                }
            }
        }

        if !problems.is_empty() {
            get_logger("registers").error(&format!(
                "Register table rejected with {} problem(s)",
                problems.len()
            ));
            return Err(SolarmapError::InvalidDescriptor { entries: problems });
        }

        Ok(Self { by_name })
    }

    /// Descriptor by name or [`SolarmapError::UnknownRegister`]
    pub fn lookup(&self, name: &str) -> Result<&RegisterDescriptor> {
        self.by_name
            .get(name)
            .ok_or_else(|| SolarmapError::unknown_register(name))
    }

    pub fn get(&self, name: &str) -> Option<&RegisterDescriptor> {
        self.by_name.get(name)
    }

    /// All descriptors that exist on `model`, in name order
    pub fn descriptors_for_model(&self, model: InverterModel) -> Vec<&RegisterDescriptor> {
        self.by_name
            .values()
            .filter(|d| d.applies_to(model))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisterDescriptor> {
        self.by_name.values()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Serialized form of a register map (`registers:` and `settings:`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableDefinition {
    #[serde(default)]
    pub registers: Vec<RegisterDescriptor>,

    #[serde(default)]
    pub settings: Vec<SettingDefinition>,
}

impl TableDefinition {
    /// Built-in FoxESS register map
    pub fn builtin() -> Result<Self> {
        foxess::definition()
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }
}

/// Loaded register and settings tables, shared by every controller
#[derive(Debug, Clone)]
pub struct RegisterMap {
    pub registers: Arc<RegisterTable>,
    pub settings: Arc<SettingsTable>,
}

impl RegisterMap {
    pub fn from_definition(definition: TableDefinition) -> Result<Self> {
        let registers = RegisterTable::new(definition.registers)?;
        let settings = SettingsTable::new(definition.settings, &registers)?;
        get_logger("registers").info(&format!(
            "Loaded {} registers and {} composite settings",
            registers.len(),
            settings.len()
        ));
        Ok(Self {
            registers: Arc::new(registers),
            settings: Arc::new(settings),
        })
    }

    pub fn builtin() -> Result<Self> {
        Self::from_definition(TableDefinition::builtin()?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_definition(TableDefinition::from_file(path)?)
    }
}
