//! Inverter controller
//!
//! Host-facing surface for one device: plans and runs read cycles, encodes
//! single writes and drives composite writes. All traffic to the device goes
//! through one mutex around the transport, held for a whole read cycle or a
//! whole write, so cycles and writes never interleave.

use crate::codec::{Codec, TypedValue};
use crate::composite::{CompositeSetting, CompositeValue, CompositeWriter, SettingsTable};
use crate::config::InverterConfig;
use crate::error::{Result, SolarmapError, Unavailable};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::planner::{PlannerConfig, ReadBlock, plan_reads};
use crate::reader::{BulkReader, ReadResults};
use crate::registers::{InverterModel, RegisterDescriptor, RegisterMap, RegisterTable};
use crate::transport::Transport;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Engine bound to one device and its transport
pub struct InverterController<T: Transport> {
    model: InverterModel,
    registers: Arc<RegisterTable>,
    settings: Arc<SettingsTable>,
    planner: PlannerConfig,
    codec: Codec,
    reader: BulkReader,
    transport: Arc<Mutex<T>>,
    logger: StructuredLogger,
}

impl<T: Transport> InverterController<T> {
    pub fn new(
        model: InverterModel,
        map: &RegisterMap,
        planner: PlannerConfig,
        codec: Codec,
        transport: T,
    ) -> Self {
        let context = LogContext::new("controller").with_device(model.as_str());
        let logger = get_logger_with_context(context.clone());
        let reader = BulkReader::with_logger(get_logger_with_context(LogContext {
            component: "reader".to_string(),
            ..context
        }));
        Self {
            model,
            registers: Arc::clone(&map.registers),
            settings: Arc::clone(&map.settings),
            planner,
            codec,
            reader,
            transport: Arc::new(Mutex::new(transport)),
            logger,
        }
    }

    /// Build from the `inverter` configuration section
    pub fn from_config(config: &InverterConfig, map: &RegisterMap, transport: T) -> Result<Self> {
        Ok(Self::new(
            config.model,
            map,
            config.planner()?,
            Codec::new(config.rounding_tolerance),
            transport,
        ))
    }

    /// Shared handle to the transport, e.g. for reconnecting between cycles
    pub fn transport(&self) -> Arc<Mutex<T>> {
        Arc::clone(&self.transport)
    }

    pub fn model(&self) -> InverterModel {
        self.model
    }

    /// Descriptors that exist on `model`, in name order
    pub fn descriptor_table(&self, model: InverterModel) -> Vec<&RegisterDescriptor> {
        self.registers.descriptors_for_model(model)
    }

    /// Composite settings available on this device's model
    pub fn settings_for_model(&self) -> Vec<&CompositeSetting> {
        self.settings.for_model(self.model)
    }

    /// Descriptor by name; registers of other models count as unknown
    fn resolve(&self, name: &str) -> Result<&RegisterDescriptor> {
        let descriptor = self.registers.lookup(name)?;
        if !descriptor.applies_to(self.model) {
            return Err(SolarmapError::unknown_register(name));
        }
        Ok(descriptor)
    }

    fn setting(&self, name: &str) -> Result<&CompositeSetting> {
        let setting = self.settings.lookup(name)?;
        if !setting.applies_to(self.model) {
            return Err(SolarmapError::UnknownSetting {
                name: name.to_string(),
            });
        }
        Ok(setting)
    }

    /// Read plan for `names` without touching the device
    pub fn plan<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<ReadBlock<'_>>> {
        let descriptors = names
            .iter()
            .map(|name| self.resolve(name.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(plan_reads(&self.planner, &descriptors))
    }

    /// Read the named values in one cycle. Unknown names fail before any I/O;
    /// device failures show up per name as [`Unavailable`].
    pub async fn read_values<S: AsRef<str>>(&self, names: &[S]) -> Result<ReadResults> {
        let blocks = self.plan(names)?;
        let mut transport = self.transport.lock().await;
        Ok(self.reader.execute(&mut *transport, &blocks).await)
    }

    /// Read every register of this device's model
    pub async fn read_all(&self) -> ReadResults {
        let descriptors = self.registers.descriptors_for_model(self.model);
        let blocks = plan_reads(&self.planner, &descriptors);
        let mut transport = self.transport.lock().await;
        self.reader.execute(&mut *transport, &blocks).await
    }

    /// Encode and write one register
    pub async fn write_value(&self, name: &str, value: &TypedValue) -> Result<()> {
        let descriptor = self.resolve(name)?;
        if !descriptor.is_writable() {
            return Err(SolarmapError::ReadOnly {
                name: name.to_string(),
            });
        }
        let words = self
            .codec
            .encode(&descriptor.encoding, descriptor.word_count, value)?;

        let mut transport = self.transport.lock().await;
        match transport.write(descriptor.address, &words).await {
            Ok(()) => {
                self.logger
                    .info(&format!("Wrote {} = {} at {}", name, value, descriptor.address));
                Ok(())
            }
            Err(e) => {
                self.logger.error(&format!("Write of {} failed: {}", name, e));
                Err(e.into())
            }
        }
    }

    /// Validate, encode and write a composite setting in its declared order
    pub async fn write_composite(&self, setting: &str, value: &CompositeValue) -> Result<()> {
        let setting = self.setting(setting)?;
        let mut transport = self.transport.lock().await;
        CompositeWriter::new(&self.codec, &self.logger)
            .write(&mut *transport, setting, value)
            .await
    }

    /// Read a composite setting's registers as one cycle
    pub async fn read_composite(&self, setting: &str) -> Result<CompositeValue> {
        let setting = self.setting(setting)?;
        let descriptors: Vec<&RegisterDescriptor> =
            setting.fields().iter().map(|(_, d)| d).collect();
        let blocks = plan_reads(&self.planner, &descriptors);
        let mut results = {
            let mut transport = self.transport.lock().await;
            self.reader.execute(&mut *transport, &blocks).await
        };
        setting.assemble(|descriptor| {
            let outcome = results.remove(&descriptor.name).unwrap_or_else(|| {
                Err(Unavailable::new(format!("{} was not read", descriptor.name)))
            });
            match outcome {
                Ok(decoded) => Ok(decoded.value),
                Err(unavailable) => Err(SolarmapError::Unavailable(Unavailable::new(format!(
                    "{}.{}: {}",
                    setting.name(),
                    descriptor.name,
                    unavailable.reason
                )))),
            }
        })
    }

    /// Raw holding-register write of at most 123 words. Every address must
    /// belong to a writable register of this model.
    pub async fn write_registers(&self, address: u16, words: &[u16]) -> Result<()> {
        if words.is_empty() {
            return Err(SolarmapError::invalid_input("no registers to write"));
        }
        if words.len() > usize::from(PlannerConfig::MODBUS_MAX_WRITE) {
            return Err(SolarmapError::out_of_range(format!(
                "write of {} registers exceeds the Modbus limit of {}",
                words.len(),
                PlannerConfig::MODBUS_MAX_WRITE
            )));
        }
        let end = u32::from(address) + words.len() as u32;
        if end > 0x1_0000 {
            return Err(SolarmapError::out_of_range(format!(
                "write of {} registers at {} runs past address 65535",
                words.len(),
                address
            )));
        }
        let writable: Vec<&RegisterDescriptor> = self
            .registers
            .descriptors_for_model(self.model)
            .into_iter()
            .filter(|d| d.is_writable())
            .collect();
        for target in u32::from(address)..end {
            let covered = writable
                .iter()
                .any(|d| u32::from(d.address) <= target && target < d.end());
            if !covered {
                return Err(SolarmapError::ReadOnly {
                    name: format!("register {}", target),
                });
            }
        }

        let mut transport = self.transport.lock().await;
        transport.write(address, words).await.map_err(|e| {
            self.logger
                .error(&format!("Raw write at {} failed: {}", address, e));
            SolarmapError::from(e)
        })?;
        self.logger.info(&format!(
            "Wrote {} raw register(s) at {}",
            words.len(),
            address
        ));
        Ok(())
    }
}
