use solarmap::codec::TypedValue;
use solarmap::composite::CompositeValue;
use solarmap::error::SolarmapError;
use solarmap::registers::{InverterModel, RegisterMap, TableDefinition};
use std::fs;

const CUSTOM_MAP: &str = r#"
registers:
  - name: export_limit
    address: 46616
    encoding:
      type: scaled_decimal
      scale: 0.001
    access: read_write
    models: [H1, AC1]
    unit: kW
  - name: reserve_soc
    address: 46617
    encoding: { type: unsigned_int16 }
    access: read_write
    models: [H1, AC1]
  - name: grid_frequency
    address: 31017
    kind: input
    encoding:
      type: scaled_decimal
      scale: 1/100
    models: [H1, AC1, AIO-H1, KH]
settings:
  - name: export_control
    fields:
      - { field: limit, register: export_limit }
      - { field: reserve, register: reserve_soc }
    rules:
      - { rule: max, field: limit, max: 10 }
      - { rule: range, field: reserve, min: 10, max: 100 }
"#;

#[test]
fn custom_map_loads_from_file() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("registers.yaml");
    fs::write(&path, CUSTOM_MAP).unwrap();

    let map = RegisterMap::from_file(&path).unwrap();
    assert_eq!(map.registers.len(), 3);
    let setting = map.settings.lookup("export_control").unwrap();
    assert_eq!(setting.field_names(), vec!["limit", "reserve"]);
    assert!(setting.applies_to(InverterModel::Ac1));
    assert!(!setting.applies_to(InverterModel::Kh));

    let too_high = CompositeValue::new()
        .with("limit", "12.5".parse::<solarmap::Ratio>().unwrap())
        .with("reserve", 20u32);
    assert!(matches!(
        setting.validate(&too_high),
        Err(SolarmapError::InvalidSetting { .. })
    ));
    let ok = CompositeValue::new()
        .with("limit", "3.68".parse::<solarmap::Ratio>().unwrap())
        .with("reserve", TypedValue::Unsigned(20));
    assert!(setting.validate(&ok).is_ok());
}

#[test]
fn invalid_table_reports_every_problem() {
    let yaml = r#"
registers:
  - name: a
    address: 100
    word_count: 1
    encoding: { type: unsigned_int32 }
    models: [H1]
  - name: b
    address: 100
    encoding: { type: unsigned_int16 }
    models: [H1]
"#;
    let definition = TableDefinition::from_yaml(yaml).unwrap();
    let err = RegisterMap::from_definition(definition).unwrap_err();
    match err {
        SolarmapError::InvalidDescriptor { entries } => {
            assert_eq!(entries.len(), 2, "{entries:?}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn settings_must_reference_writable_registers() {
    let yaml = r#"
registers:
  - name: soc
    address: 31038
    kind: input
    encoding: { type: unsigned_int16 }
    models: [H1]
settings:
  - name: bogus
    fields:
      - { field: soc, register: soc }
"#;
    let definition = TableDefinition::from_yaml(yaml).unwrap();
    assert!(matches!(
        RegisterMap::from_definition(definition),
        Err(SolarmapError::InvalidDescriptor { .. })
    ));
}

#[test]
fn builtin_map_covers_every_model() {
    let map = RegisterMap::builtin().unwrap();
    for model in InverterModel::ALL {
        assert!(!map.registers.descriptors_for_model(model).is_empty());
        assert_eq!(map.settings.for_model(model).len(), 3, "{model}");
    }
}
