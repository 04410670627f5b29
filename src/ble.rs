//! Bluetooth LE sink.
//!
//! Finding and connecting to the printer is left to the caller; this only
//! turns a connected peripheral into a [`Sink`].

use async_trait::async_trait;
use btleplug::api::bleuuid::uuid_from_u16;
use btleplug::api::{Characteristic, Peripheral, WriteType};
use uuid::Uuid;

use crate::config::DEFAULT_MTU;
use crate::error::Result;
use crate::transport::Sink;

/// Characteristics the known printer firmwares accept print data on.
pub const WRITE_CHARACTERISTICS: [Uuid; 3] = [
    uuid_from_u16(0xAE01),
    uuid_from_u16(0xFF02),
    uuid_from_u16(0xAB01),
];

pub fn is_write_characteristic(uuid: &Uuid) -> bool {
    WRITE_CHARACTERISTICS.contains(uuid)
}

/// Writes print data to a GATT characteristic, without response.
pub struct BleSink<P> {
    peripheral: P,
    characteristic: Characteristic,
    mtu: usize,
}

impl<P: Peripheral> BleSink<P> {
    pub fn new(peripheral: P, characteristic: Characteristic) -> Self {
        Self {
            peripheral,
            characteristic,
            mtu: DEFAULT_MTU,
        }
    }

    /// Picks the first known write characteristic of a connected peripheral
    /// whose services have been discovered.
    pub fn find(peripheral: P) -> Option<Self> {
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| is_write_characteristic(&c.uuid))?;
        log::debug!("using write characteristic {}", characteristic.uuid);
        Some(Self::new(peripheral, characteristic))
    }

    /// Overrides the negotiated MTU.
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    pub fn characteristic(&self) -> &Characteristic {
        &self.characteristic
    }
}

#[async_trait]
impl<P: Peripheral> Sink for BleSink<P> {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.characteristic, data, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    fn mtu(&self) -> usize {
        self.mtu
    }
}
