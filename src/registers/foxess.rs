//! Built-in FoxESS register map
//!
//! Measurements live in the input bank (31000..), energy counters at
//! 32000.. and writable settings in the holding bank (41000..).

use super::{Encoding, InverterModel, RegisterDescriptor, TableDefinition};
use crate::codec::Ratio;
use crate::composite::{SettingDefinition, SettingField, SettingRule};
use crate::error::{Result, SolarmapError};

use InverterModel::{AioH1, H1, Kh};

/// Models with PV inputs
const HYBRID: &[InverterModel] = &[H1, AioH1, Kh];
const ALL: &[InverterModel] = &InverterModel::ALL;

fn scale(numer: i64, denom: i64) -> Result<Ratio> {
    Ratio::new(numer, denom)
        .ok_or_else(|| SolarmapError::config(format!("Invalid scale {}/{}", numer, denom)))
}

fn measurement(
    name: &str,
    address: u16,
    encoding: Encoding,
    unit: &str,
    models: &[InverterModel],
) -> RegisterDescriptor {
    RegisterDescriptor::new(name, address, encoding)
        .input()
        .unit(unit)
        .models(models)
}

fn setting(name: &str, address: u16, encoding: Encoding) -> RegisterDescriptor {
    RegisterDescriptor::new(name, address, encoding)
        .writable()
        .models(ALL)
}

fn registers() -> Result<Vec<RegisterDescriptor>> {
    let tenth = scale(1, 10)?;
    let hundredth = scale(1, 100)?;
    let thousandth = scale(1, 1000)?;
    let volts = || Encoding::scaled(tenth);
    let amps = || Encoding::signed_scaled(tenth);
    let kilowatts = || Encoding::signed_scaled(thousandth);
    let celsius = || Encoding::signed_scaled(tenth);
    let kwh = || Encoding::scaled(tenth);

    let mut registers = vec![
        measurement("pv1_voltage", 31000, volts(), "V", HYBRID),
        measurement("pv1_current", 31001, amps(), "A", HYBRID),
        measurement("pv1_power", 31002, kilowatts(), "kW", HYBRID),
        measurement("pv2_voltage", 31003, volts(), "V", HYBRID),
        measurement("pv2_current", 31004, amps(), "A", HYBRID),
        measurement("pv2_power", 31005, kilowatts(), "kW", HYBRID),
        measurement("pv3_voltage", 31050, volts(), "V", &[Kh]),
        measurement("pv3_current", 31051, amps(), "A", &[Kh]),
        measurement("pv3_power", 31052, kilowatts(), "kW", &[Kh]),
        measurement("pv4_voltage", 31053, volts(), "V", &[Kh]),
        measurement("pv4_current", 31054, amps(), "A", &[Kh]),
        measurement("pv4_power", 31055, kilowatts(), "kW", &[Kh]),
        measurement("grid_voltage", 31014, volts(), "V", ALL),
        measurement("grid_current", 31015, amps(), "A", ALL),
        measurement("grid_power", 31016, kilowatts(), "kW", ALL),
        measurement("grid_frequency", 31017, Encoding::scaled(hundredth), "Hz", ALL),
        measurement("ct2_power", 31026, kilowatts(), "kW", ALL),
        measurement("feed_in_power", 31027, kilowatts(), "kW", ALL),
        measurement("load_power", 31028, kilowatts(), "kW", ALL),
        measurement("ambient_temp", 31032, celsius(), "°C", ALL),
        measurement("inverter_temp", 31033, celsius(), "°C", ALL),
        measurement("battery_voltage", 31034, volts(), "V", ALL),
        measurement("battery_current", 31035, amps(), "A", ALL),
        measurement("battery_soc", 31038, Encoding::UnsignedInt16, "%", ALL),
        measurement(
            "bms_kwh_remaining",
            31039,
            Encoding::scaled(hundredth),
            "kWh",
            ALL,
        ),
        RegisterDescriptor::new(
            "inverter_state",
            31041,
            Encoding::bit_enum(&[
                (0, "self_test"),
                (1, "waiting"),
                (2, "checking"),
                (3, "on_grid"),
                (4, "off_grid"),
                (5, "fault"),
                (6, "permanent_fault"),
                (7, "standby"),
                (8, "upgrading"),
                (9, "fct"),
                (10, "illegal"),
            ]),
        )
        .input()
        .models(ALL),
        RegisterDescriptor::new("inverter_state_raw", 31041, Encoding::UnsignedInt16)
            .input()
            .models(ALL)
            .alias_of("inverter_state"),
        measurement("battery_temp", 31042, celsius(), "°C", ALL),
    ];

    let energy = [
        ("solar_energy_total", 32000, HYBRID),
        ("solar_energy_today", 32002, HYBRID),
        ("battery_charge_total", 32003, ALL),
        ("battery_charge_today", 32005, ALL),
        ("battery_discharge_total", 32006, ALL),
        ("battery_discharge_today", 32008, ALL),
        ("feed_in_energy_total", 32009, ALL),
        ("feed_in_energy_today", 32011, ALL),
        ("grid_consumption_energy_total", 32012, ALL),
        ("grid_consumption_energy_today", 32014, ALL),
        ("load_energy_total", 32021, ALL),
        ("load_energy_today", 32023, ALL),
    ];
    for (name, address, models) in energy {
        let words = if name.ends_with("_total") { 2 } else { 1 };
        registers.push(measurement(name, address, kwh(), "kWh", models).words(words));
    }

    registers.extend([
        setting(
            "work_mode",
            41000,
            Encoding::bit_enum(&[(0, "self_use"), (1, "feed_in_first"), (2, "back_up")]),
        ),
        setting("charge_period_1_enable", 41001, Encoding::Flag),
        setting("charge_period_1_start", 41002, Encoding::TimeOfDay),
        setting("charge_period_1_end", 41003, Encoding::TimeOfDay),
        setting("charge_period_2_enable", 41004, Encoding::Flag),
        setting("charge_period_2_start", 41005, Encoding::TimeOfDay),
        setting("charge_period_2_end", 41006, Encoding::TimeOfDay),
        setting("max_charge_current", 41007, Encoding::scaled(tenth)).unit("A"),
        setting("max_discharge_current", 41008, Encoding::scaled(tenth)).unit("A"),
        setting("min_soc", 41009, Encoding::UnsignedInt16).unit("%"),
        setting("max_soc", 41010, Encoding::UnsignedInt16).unit("%"),
        setting("min_soc_on_grid", 41011, Encoding::UnsignedInt16).unit("%"),
        setting("export_power_limit", 41012, Encoding::UnsignedInt16).unit("W"),
    ]);
    Ok(registers)
}

fn fields(pairs: &[(&str, &str)]) -> Vec<SettingField> {
    pairs
        .iter()
        .map(|(field, register)| SettingField {
            field: (*field).to_string(),
            register: (*register).to_string(),
        })
        .collect()
}

/// Charge period written as `end, start, enable`.
///
/// Enabling a period or moving an enabled one never exposes an enabled
/// window that is incomplete: `enable` goes last. Disabling gets no such
/// protection. Going from an enabled `01:00-05:00` to a disabled
/// `00:00-00:00`, the first write leaves an enabled `01:00-00:00` window
/// until `enable` is cleared.
fn charge_period(index: u8) -> SettingDefinition {
    let name = format!("charge_period_{}", index);
    let end = format!("{}_end", name);
    let start = format!("{}_start", name);
    let enable = format!("{}_enable", name);
    SettingDefinition {
        fields: fields(&[
            ("end", end.as_str()),
            ("start", start.as_str()),
            ("enable", enable.as_str()),
        ]),
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
        name,
    }
}

fn soc_limits() -> SettingDefinition {
    let percent = |field: &str| SettingRule::Range {
        field: field.to_string(),
        min: Ratio::from_integer(10),
        max: Ratio::from_integer(100),
    };
    let ordered = |lower: &str, upper: &str| SettingRule::Ordered {
        lower: lower.to_string(),
        upper: upper.to_string(),
    };
    SettingDefinition {
        name: "battery_soc_limits".to_string(),
        fields: fields(&[
            ("max_soc", "max_soc"),
            ("min_soc", "min_soc"),
            ("min_soc_on_grid", "min_soc_on_grid"),
        ]),
        rules: vec![
            percent("max_soc"),
            percent("min_soc"),
            percent("min_soc_on_grid"),
            ordered("min_soc", "max_soc"),
            ordered("min_soc_on_grid", "max_soc"),
            ordered("min_soc", "min_soc_on_grid"),
        ],
    }
}

pub(super) fn definition() -> Result<TableDefinition> {
    Ok(TableDefinition {
        registers: registers()?,
        settings: vec![charge_period(1), charge_period(2), soc_limits()],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{RegisterKind, RegisterMap};
    use InverterModel::Ac1;

    #[test]
    fn test_builtin_table_is_valid() {
        let map = RegisterMap::from_definition(definition().unwrap()).unwrap();
        assert_eq!(map.settings.len(), 3);
        let soc = map.registers.lookup("battery_soc").unwrap();
        assert_eq!((soc.kind, soc.address), (RegisterKind::Input, 31038));
    }

    #[test]
    fn test_ac1_has_no_pv_strings() {
        let map = RegisterMap::from_definition(definition().unwrap()).unwrap();
        let ac1 = map.registers.descriptors_for_model(Ac1);
        assert!(ac1.iter().all(|d| !d.name.starts_with("pv")));
        assert!(ac1.iter().any(|d| d.name == "battery_soc"));
        let kh = map.registers.descriptors_for_model(Kh);
        assert!(kh.iter().any(|d| d.name == "pv4_power"));
    }

    #[test]
    fn test_charge_period_write_order() {
        let map = RegisterMap::from_definition(definition().unwrap()).unwrap();
        let period = map.settings.lookup("charge_period_2").unwrap();
        assert_eq!(period.field_names(), vec!["end", "start", "enable"]);
        let addresses: Vec<u16> = period.fields().iter().map(|(_, d)| d.address).collect();
        assert_eq!(addresses, vec![41006, 41005, 41004]);
        assert!(period.applies_to(H1));
    }
}
