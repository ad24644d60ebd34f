//zigbee device profile payloads carried in AF messages to endpoint 0

use deku::{ self, prelude::* };

use crate::{ error::Error, types::Eui64 };

//zdo commands are in profile = 0, command set as cluster id
pub const DEVICE_ANNCE: u16 = 0x0013;

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZdoCapability {
	#[deku(bits = 1)]
	pub allocate_address: bool,
	#[deku(bits = 1)]
	pub security_capability: bool,
	#[deku(bits = 1, pad_bits_before = "2")]
	pub receiver_on_when_idle: bool,
	#[deku(bits = 1)]
	pub power_source: bool,
	#[deku(bits = 1)]
	pub device_type: u8,
	#[deku(bits = 1)]
	pub alternate_pan_coordinator: bool,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
pub struct ZdoDeviceAnnce {
	pub nwk_addr: u16,
	pub ieee_addr: Eui64,
	pub capability: ZdoCapability
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZdoCommand {
	DeviceAnnce(ZdoDeviceAnnce),
	Raw(Vec<u8>)
}

impl ZdoCommand {
	pub fn from_buf(buf: &[u8], cluster_id: u16) -> Result<Self, Error> {
		match cluster_id {
			DEVICE_ANNCE => Ok(Self::DeviceAnnce(ZdoDeviceAnnce::try_from(buf)?)),
			_ => Ok(Self::Raw(buf.to_vec()))
		}
	}
}

#[derive(Debug, DekuRead)]
struct ZdpRaw {
	sequence_number: u8,
	#[deku(read_all)]
	payload: Vec<u8>
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZdpFrame {
	pub sequence_number: u8,
	pub command: ZdoCommand
}

impl ZdpFrame {
	pub fn from_buf(buf: &[u8], cluster_id: u16) -> Result<Self, Error> {
		let raw = ZdpRaw::try_from(buf)?;

		Ok(ZdpFrame {
			sequence_number: raw.sequence_number,
			command: ZdoCommand::from_buf(&raw.payload, cluster_id)?
		})
	}
}
