use super::*;

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            ip: "192.168.1.100".to_string(),
            port: 502,
            unit_id: 247,
            connect_timeout_ms: 5000,
            operation_timeout_ms: 3000,
        }
    }
}

impl Default for InverterConfig {
    fn default() -> Self {
        Self {
            model: InverterModel::H1,
            max_block_size: 50,
            max_gap: None,
            rounding_tolerance: 1e-6,
            register_file: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/solarmap.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            modbus: ModbusConfig::default(),
            inverter: InverterConfig::default(),
            logging: LoggingConfig::default(),
            poll_interval_ms: 10_000,
        }
    }
}
