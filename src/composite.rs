//! Composite settings
//!
//! A composite setting is one logical value (a charge period, a set of SoC
//! limits) spread over several registers. Writes go through
//! `Validate -> EncodeAll -> WriteSequential -> Commit`; the first two phases
//! touch no device state, the third writes registers in the order the
//! setting declares and reports [`SolarmapError::PartialWrite`] if the
//! sequence breaks midway. Modbus has no multi-register transactions, so
//! there is no rollback.

use crate::codec::{Codec, Ratio, TypedValue};
use crate::error::{Result, SolarmapError};
use crate::logging::StructuredLogger;
use crate::registers::{InverterModel, RegisterDescriptor, RegisterTable};
use crate::transport::Transport;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One field of a composite setting and the register backing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingField {
    pub field: String,
    pub register: String,
}

/// Validation rule over the full logical value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SettingRule {
    /// Inclusive numeric bounds
    Range { field: String, min: Ratio, max: Ratio },
    Min { field: String, min: Ratio },
    Max { field: String, max: Ratio },
    /// `start < end`, or both midnight for an unset window
    TimeWindow { start: String, end: String },
    /// Numeric `lower <= upper`
    Ordered { lower: String, upper: String },
    /// An enabled window must not be the empty midnight-to-midnight window
    EnabledRequiresWindow {
        enable: String,
        start: String,
        end: String,
    },
}

impl SettingRule {
    fn fields(&self) -> Vec<&str> {
        match self {
            SettingRule::Range { field, .. }
            | SettingRule::Min { field, .. }
            | SettingRule::Max { field, .. } => vec![field.as_str()],
            SettingRule::TimeWindow { start, end } => vec![start.as_str(), end.as_str()],
            SettingRule::Ordered { lower, upper } => vec![lower.as_str(), upper.as_str()],
            SettingRule::EnabledRequiresWindow { enable, start, end } => {
                vec![enable.as_str(), start.as_str(), end.as_str()]
            }
        }
    }

    /// `Err(message)` when the value breaks the rule
    fn check(&self, value: &CompositeValue) -> std::result::Result<(), String> {
        match self {
            SettingRule::Range { field, min, max } => {
                let v = number(value, field)?;
                if v < *min || v > *max {
                    return Err(format!("{} must be between {} and {}, got {}", field, min, max, v));
                }
            }
            SettingRule::Min { field, min } => {
                let v = number(value, field)?;
                if v < *min {
                    return Err(format!("{} must be at least {}, got {}", field, min, v));
                }
            }
            SettingRule::Max { field, max } => {
                let v = number(value, field)?;
                if v > *max {
                    return Err(format!("{} must be at most {}, got {}", field, max, v));
                }
            }
            SettingRule::TimeWindow { start, end } => {
                let (s, e) = (time(value, start)?, time(value, end)?);
                let unset = s == NaiveTime::MIN && e == NaiveTime::MIN;
                if !unset && s >= e {
                    return Err(format!(
                        "{} ({}) must be before {} ({})",
                        start,
                        s.format("%H:%M"),
                        end,
                        e.format("%H:%M")
                    ));
                }
            }
            SettingRule::Ordered { lower, upper } => {
                let (l, u) = (number(value, lower)?, number(value, upper)?);
                if l > u {
                    return Err(format!("{} ({}) must not exceed {} ({})", lower, l, upper, u));
                }
            }
            SettingRule::EnabledRequiresWindow { enable, start, end } => {
                let enabled = value
                    .get(enable)
                    .and_then(TypedValue::as_flag)
                    .ok_or_else(|| format!("{} must be a flag", enable))?;
                if enabled && time(value, start)? == time(value, end)? {
                    return Err(format!("{} is set but the window is empty", enable));
                }
            }
        }
        Ok(())
    }
}

fn number(value: &CompositeValue, field: &str) -> std::result::Result<Ratio, String> {
    value
        .get(field)
        .and_then(TypedValue::as_ratio)
        .ok_or_else(|| format!("{} must be numeric", field))
}

fn time(value: &CompositeValue, field: &str) -> std::result::Result<NaiveTime, String> {
    value
        .get(field)
        .and_then(TypedValue::as_time)
        .ok_or_else(|| format!("{} must be a time of day", field))
}

/// Serialized form of a composite setting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingDefinition {
    pub name: String,

    /// Fields in write order
    pub fields: Vec<SettingField>,

    #[serde(default)]
    pub rules: Vec<SettingRule>,
}

/// Logical value of a composite setting, keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompositeValue(BTreeMap<String, TypedValue>);

impl CompositeValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<V: Into<TypedValue>>(mut self, field: &str, value: V) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, field: &str, value: TypedValue) -> Option<TypedValue> {
        self.0.insert(field.to_string(), value)
    }

    pub fn get(&self, field: &str) -> Option<&TypedValue> {
        self.0.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Phase of a composite write, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    Validate,
    EncodeAll,
    WriteSequential,
    Commit,
}

impl fmt::Display for WritePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WritePhase::Validate => "validate",
            WritePhase::EncodeAll => "encode",
            WritePhase::WriteSequential => "write",
            WritePhase::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// One encoded register write of a composite setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWrite {
    pub field: String,
    pub register: String,
    pub address: u16,
    pub words: Vec<u16>,
}

/// Resolved, immutable composite setting
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeSetting {
    name: String,
    fields: Vec<(String, RegisterDescriptor)>,
    rules: Vec<SettingRule>,
    models: BTreeSet<InverterModel>,
}

impl CompositeSetting {
    /// Resolve a definition against the register table, collecting problems
    fn resolve(
        definition: SettingDefinition,
        registers: &RegisterTable,
        problems: &mut Vec<String>,
    ) -> Option<Self> {
        let name = definition.name;
        let before = problems.len();
        let mut fields: Vec<(String, RegisterDescriptor)> = Vec::new();
        let mut models: Option<BTreeSet<InverterModel>> = None;

        if definition.fields.is_empty() {
            problems.push(format!("{}: setting has no fields", name));
        }
        for SettingField { field, register } in definition.fields {
            if fields.iter().any(|(f, _)| *f == field) {
                problems.push(format!("{}: duplicate field {}", name, field));
                continue;
            }
            let Some(descriptor) = registers.get(&register) else {
                problems.push(format!("{}: field {} uses unknown register {}", name, field, register));
                continue;
            };
            if !descriptor.is_writable() {
                problems.push(format!("{}: register {} is read-only", name, register));
            }
            models = Some(match models {
                Some(acc) => acc
                    .intersection(&descriptor.applicable_models)
                    .copied()
                    .collect(),
                None => descriptor.applicable_models.clone(),
            });
            fields.push((field, descriptor.clone()));
        }

        for rule in &definition.rules {
            for field in rule.fields() {
                if !fields.iter().any(|(f, _)| f == field) {
                    problems.push(format!("{}: rule refers to unknown field {}", name, field));
                }
            }
        }

        let models = models.unwrap_or_default();
        if !fields.is_empty() && models.is_empty() {
            problems.push(format!("{}: registers share no inverter model", name));
        }

        (problems.len() == before).then_some(Self {
            name,
            fields,
            rules: definition.rules,
            models,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field names in write order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(f, _)| f.as_str()).collect()
    }

    /// Field/descriptor pairs in write order
    pub fn fields(&self) -> &[(String, RegisterDescriptor)] {
        &self.fields
    }

    pub fn rules(&self) -> &[SettingRule] {
        &self.rules
    }

    pub fn applies_to(&self, model: InverterModel) -> bool {
        self.models.contains(&model)
    }

    /// Check the full value: exactly the declared fields, then every rule
    pub fn validate(&self, value: &CompositeValue) -> Result<()> {
        for (field, _) in &self.fields {
            if value.get(field).is_none() {
                return Err(SolarmapError::invalid_setting(
                    &self.name,
                    format!("missing field {}", field),
                ));
            }
        }
        if let Some(extra) = value
            .fields()
            .find(|f| !self.fields.iter().any(|(known, _)| known == f))
        {
            return Err(SolarmapError::invalid_setting(
                &self.name,
                format!("unknown field {}", extra),
            ));
        }
        for rule in &self.rules {
            rule.check(value)
                .map_err(|message| SolarmapError::invalid_setting(&self.name, message))?;
        }
        Ok(())
    }

    /// Encode every field; fails without side effects
    pub fn encode_all(&self, value: &CompositeValue, codec: &Codec) -> Result<Vec<PlannedWrite>> {
        self.fields
            .iter()
            .map(|(field, descriptor)| {
                let typed = value.get(field).ok_or_else(|| {
                    SolarmapError::invalid_setting(&self.name, format!("missing field {}", field))
                })?;
                let words = codec.encode(&descriptor.encoding, descriptor.word_count, typed)?;
                Ok(PlannedWrite {
                    field: field.clone(),
                    register: descriptor.name.clone(),
                    address: descriptor.address,
                    words,
                })
            })
            .collect()
    }

    /// Assemble a value from decoded register values
    pub fn assemble<F>(&self, mut lookup: F) -> Result<CompositeValue>
    where
        F: FnMut(&RegisterDescriptor) -> Result<TypedValue>,
    {
        let mut value = CompositeValue::new();
        for (field, descriptor) in &self.fields {
            value.insert(field, lookup(descriptor)?);
        }
        Ok(value)
    }
}

/// Validated, immutable set of composite settings keyed by name
#[derive(Debug, Clone, Default)]
pub struct SettingsTable {
    by_name: BTreeMap<String, CompositeSetting>,
}

impl SettingsTable {
    pub fn new(definitions: Vec<SettingDefinition>, registers: &RegisterTable) -> Result<Self> {
        let mut problems = Vec::new();
        let mut by_name = BTreeMap::new();
        for definition in definitions {
            if by_name.contains_key(&definition.name) {
                problems.push(format!("{}: duplicate setting", definition.name));
                continue;
            }
            if let Some(setting) = CompositeSetting::resolve(definition, registers, &mut problems) {
                by_name.insert(setting.name.clone(), setting);
            }
        }
        if problems.is_empty() {
            Ok(Self { by_name })
        } else {
            Err(SolarmapError::InvalidDescriptor { entries: problems })
        }
    }

    pub fn lookup(&self, name: &str) -> Result<&CompositeSetting> {
        self.by_name
            .get(name)
            .ok_or_else(|| SolarmapError::UnknownSetting {
                name: name.to_string(),
            })
    }

    pub fn get(&self, name: &str) -> Option<&CompositeSetting> {
        self.by_name.get(name)
    }

    pub fn for_model(&self, model: InverterModel) -> Vec<&CompositeSetting> {
        self.by_name.values().filter(|s| s.applies_to(model)).collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Runs composite writes against a transport
pub struct CompositeWriter<'a> {
    codec: &'a Codec,
    logger: &'a StructuredLogger,
}

impl<'a> CompositeWriter<'a> {
    pub fn new(codec: &'a Codec, logger: &'a StructuredLogger) -> Self {
        Self { codec, logger }
    }

    pub async fn write<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        setting: &CompositeSetting,
        value: &CompositeValue,
    ) -> Result<()> {
        let name = setting.name();

        let mut phase = WritePhase::Validate;
        self.trace_phase(name, phase);
        if let Err(e) = setting.validate(value) {
            self.logger.warn(&format!("Rejected {}: {}", name, e));
            return Err(e);
        }

        phase = WritePhase::EncodeAll;
        self.trace_phase(name, phase);
        let writes = setting.encode_all(value, self.codec)?;

        phase = WritePhase::WriteSequential;
        self.trace_phase(name, phase);
        let mut succeeded: Vec<String> = Vec::with_capacity(writes.len());
        for write in &writes {
            if let Err(source) = transport.write(write.address, &write.words).await {
                if succeeded.is_empty() {
                    self.logger.error(&format!(
                        "First write of {} failed at {}; device state unknown: {}",
                        name, write.field, source
                    ));
                    return Err(source.into());
                }
                self.logger.error(&format!(
                    "Partial write of {}: {:?} applied, {} failed: {}",
                    name, succeeded, write.field, source
                ));
                return Err(SolarmapError::PartialWrite {
                    setting: name.to_string(),
                    succeeded,
                    failed: write.field.clone(),
                    source,
                });
            }
            succeeded.push(write.field.clone());
        }

        phase = WritePhase::Commit;
        self.trace_phase(name, phase);
        self.logger.info(&format!(
            "Wrote {} ({} registers)",
            name,
            writes.len()
        ));
        Ok(())
    }

    fn trace_phase(&self, setting: &str, phase: WritePhase) {
        self.logger.trace(&format!("{}: {}", setting, phase));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::get_logger;
    use crate::registers::Encoding;
    use crate::transport::MemoryTransport;

    fn registers() -> RegisterTable {
        let rw = |name: &str, address: u16, encoding: Encoding| {
            RegisterDescriptor::new(name, address, encoding)
                .writable()
                .models(&[InverterModel::H1])
        };
        RegisterTable::new(vec![
            rw("period_enable", 41001, Encoding::Flag),
            rw("period_start", 41002, Encoding::TimeOfDay),
            rw("period_end", 41003, Encoding::TimeOfDay),
            RegisterDescriptor::new("battery_soc", 31038, Encoding::UnsignedInt16)
                .input()
                .models(&[InverterModel::H1]),
        ])
        .unwrap()
    }

    fn period_definition() -> SettingDefinition {
        SettingDefinition {
            name: "charge_period".to_string(),
            fields: vec![
                SettingField {
                    field: "end".to_string(),
                    register: "period_end".to_string(),
                },
                SettingField {
                    field: "start".to_string(),
                    register: "period_start".to_string(),
                },
                SettingField {
                    field: "enable".to_string(),
                    register: "period_enable".to_string(),
                },
            ],
            rules: vec![
                SettingRule::TimeWindow {
                    start: "start".to_string(),
                    end: "end".to_string(),
                },
                SettingRule::EnabledRequiresWindow {
                    enable: "enable".to_string(),
                    start: "start".to_string(),
                    end: "end".to_string(),
                },
            ],
        }
    }

    fn period(start: (u32, u32), end: (u32, u32), enable: bool) -> CompositeValue {
        CompositeValue::new()
            .with("start", NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap())
            .with("end", NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap())
            .with("enable", enable)
    }

    #[test]
    fn test_time_window_rules() {
        let table = SettingsTable::new(vec![period_definition()], &registers()).unwrap();
        let setting = table.lookup("charge_period").unwrap();
        assert!(setting.validate(&period((1, 0), (5, 30), true)).is_ok());
        assert!(setting.validate(&period((0, 0), (0, 0), false)).is_ok());
        assert!(setting.validate(&period((6, 0), (5, 0), true)).is_err());
        assert!(setting.validate(&period((0, 0), (0, 0), true)).is_err());
        assert!(setting.validate(&period((5, 0), (5, 0), false)).is_err());
    }

    #[test]
    fn test_missing_and_unknown_fields() {
        let table = SettingsTable::new(vec![period_definition()], &registers()).unwrap();
        let setting = table.lookup("charge_period").unwrap();
        let missing = CompositeValue::new().with("start", NaiveTime::MIN);
        assert!(matches!(
            setting.validate(&missing),
            Err(SolarmapError::InvalidSetting { .. })
        ));
        let extra = period((1, 0), (2, 0), true).with("bogus", 1u32);
        assert!(matches!(
            setting.validate(&extra),
            Err(SolarmapError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_resolution_rejects_bad_definitions() {
        let mut bad = period_definition();
        bad.fields.push(SettingField {
            field: "soc".to_string(),
            register: "battery_soc".to_string(),
        });
        bad.fields.push(SettingField {
            field: "ghost".to_string(),
            register: "missing".to_string(),
        });
        bad.rules.push(SettingRule::Min {
            field: "nope".to_string(),
            min: Ratio::ZERO,
        });
        let err = SettingsTable::new(vec![bad], &registers()).unwrap_err();
        let SolarmapError::InvalidDescriptor { entries } = err else {
            panic!("expected InvalidDescriptor");
        };
        let text = entries.join("\n");
        assert!(text.contains("register battery_soc is read-only"));
        assert!(text.contains("unknown register missing"));
        assert!(text.contains("unknown field nope"));
    }

    #[test]
    fn test_numeric_rules() {
        let value = CompositeValue::new()
            .with("min_soc", 15u32)
            .with("max_soc", 10u32);
        let ordered = SettingRule::Ordered {
            lower: "min_soc".to_string(),
            upper: "max_soc".to_string(),
        };
        assert!(ordered.check(&value).is_err());
        let range = SettingRule::Range {
            field: "min_soc".to_string(),
            min: Ratio::from_integer(10),
            max: Ratio::from_integer(100),
        };
        assert!(range.check(&value).is_ok());
        let max = SettingRule::Max {
            field: "min_soc".to_string(),
            max: Ratio::from_integer(14),
        };
        assert!(max.check(&value).is_err());
    }

    #[tokio::test]
    async fn test_writes_follow_declared_order() {
        let table = SettingsTable::new(vec![period_definition()], &registers()).unwrap();
        let setting = table.lookup("charge_period").unwrap();
        let codec = Codec::default();
        let logger = get_logger("composite");
        let mut transport = MemoryTransport::new();

        CompositeWriter::new(&codec, &logger)
            .write(&mut transport, setting, &period((1, 30), (5, 0), true))
            .await
            .unwrap();

        let addresses: Vec<u16> = transport.writes().iter().map(|(a, _)| *a).collect();
        assert_eq!(addresses, vec![41003, 41002, 41001]);
        assert_eq!(transport.holding(41002), 0x011E);
        assert_eq!(transport.holding(41003), 0x0500);
        assert_eq!(transport.holding(41001), 1);
    }

    #[tokio::test]
    async fn test_partial_write_reported() {
        let table = SettingsTable::new(vec![period_definition()], &registers()).unwrap();
        let setting = table.lookup("charge_period").unwrap();
        let codec = Codec::default();
        let logger = get_logger("composite");
        let mut transport = MemoryTransport::new();
        transport.fail_writes_at(41002);

        let err = CompositeWriter::new(&codec, &logger)
            .write(&mut transport, setting, &period((1, 30), (5, 0), true))
            .await
            .unwrap_err();
        match err {
            SolarmapError::PartialWrite {
                succeeded, failed, ..
            } => {
                assert_eq!(succeeded, vec!["end".to_string()]);
                assert_eq!(failed, "start");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.holding(41001), 0);
    }

    #[tokio::test]
    async fn test_first_write_failure_is_plain_transport_error() {
        let table = SettingsTable::new(vec![period_definition()], &registers()).unwrap();
        let setting = table.lookup("charge_period").unwrap();
        let codec = Codec::default();
        let logger = get_logger("composite");
        let mut transport = MemoryTransport::new();
        transport.fail_writes_at(41003);

        let err = CompositeWriter::new(&codec, &logger)
            .write(&mut transport, setting, &period((1, 30), (5, 0), true))
            .await
            .unwrap_err();
        assert!(matches!(err, SolarmapError::Transport(_)));
        // A failed first write may still have reached the device
        assert!(!err.is_side_effect_free());
    }
}
