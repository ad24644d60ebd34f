//shared z-stack wire types

use deku::{ self, prelude::* };
use hex::FromHex;
use serde::Deserialize;
use std::str::FromStr;

use crate::error::Error;

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
#[deku(id_type = "u8")]
pub enum Status {
	#[deku(id = "0x00")]
	Success,
	#[deku(id = "0x01")]
	Failure,
	#[deku(id = "0x02")]
	InvalidParameter,
	#[deku(id = "0x09")]
	NvItemUninit, //NV item not initialized
	#[deku(id = "0x0A")]
	NvOperFailed,
	#[deku(id = "0x0C")]
	NvBadItemLen,
	#[deku(id = "0x10")]
	MemError,
	#[deku(id = "0x11")]
	BufferFull,
	#[deku(id = "0x12")]
	UnsupportedMode,
	#[deku(id = "0x13")]
	MacMemError,
	#[deku(id = "0x80")]
	ZdoInvalidRequestType,
	#[deku(id = "0x82")]
	ZdoInvalidEndpoint,
	#[deku(id = "0x84")]
	ZdoUnsupported,
	#[deku(id = "0x85")]
	ZdoTimeout,
	#[deku(id = "0x86")]
	ZdoNoMatch,
	#[deku(id = "0x87")]
	ZdoTableFull,
	#[deku(id = "0xA1")]
	SecNoKey,
	#[deku(id = "0xA3")]
	SecMaxFrmCount, //frame counter exhausted
	#[deku(id = "0xB1")]
	ApsFail,
	#[deku(id = "0xB2")]
	ApsTableFull,
	#[deku(id = "0xB3")]
	ApsIllegalRequest,
	#[deku(id = "0xB6")]
	ApsNotSupported,
	#[deku(id = "0xB7")]
	ApsNoAck,
	#[deku(id = "0xC1")]
	NwkInvalidParam,
	#[deku(id = "0xC2")]
	NwkInvalidRequest,
	#[deku(id = "0xC3")]
	NwkNotPermitted,
	#[deku(id = "0xC4")]
	NwkStartupFailure,
	#[deku(id = "0xC7")]
	NwkTableFull,
	#[deku(id = "0xC8")]
	NwkUnknownDevice,
	#[deku(id = "0xCA")]
	NwkNoNetworks,
	#[deku(id = "0xCC")]
	NwkNoAck,
	#[deku(id = "0xCD")]
	NwkNoRoute, //no route to the destination, a route discovery may help
	#[deku(id = "0xE1")]
	MacChannelAccessFailure,
	#[deku(id = "0xE9")]
	MacNoAck,
	#[deku(id = "0xF0")]
	MacTransactionExpired,
	#[deku(id_pat = "_")]
	Unknown(u8),
}

impl Status {
	pub fn is_success(&self) -> bool {
		*self == Status::Success
	}
}

impl core::fmt::Display for Status {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		match self {
			Self::Unknown(code) => write!(f, "Unknown({code:#04x})"),
			s => write!(f, "{s:?}")
		}
	}
}

//ieee address, serialized little endian, displayed most significant byte first
#[derive(Debug, DekuRead, DekuWrite, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[serde(try_from = "String")]
pub struct Eui64(pub u64);

impl Eui64 {
	pub fn to_le_bytes(&self) -> [u8; 8] {
		self.0.to_le_bytes()
	}
}

impl core::fmt::Display for Eui64 {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		let b = self.0.to_be_bytes();

		write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7])
	}
}

impl FromStr for Eui64 {
	type Err = hex::FromHexError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let digits: String = s.chars().filter(|c| *c != ':').collect();

		Ok(Eui64(u64::from_be_bytes(<[u8; 8]>::from_hex(digits)?)))
	}
}

impl TryFrom<String> for Eui64 {
	type Error = hex::FromHexError;

	fn try_from(s: String) -> Result<Self, Self::Error> {
		s.parse()
	}
}

//128-bit key
#[derive(Debug, DekuRead, DekuWrite, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(try_from = "String")]
pub struct KeyData {
	pub contents: [u8; 16],
}

impl KeyData {
	pub fn random() -> Self {
		KeyData { contents: rand::random() }
	}
}

impl TryFrom<String> for KeyData {
	type Error = hex::FromHexError;

	fn try_from(s: String) -> Result<Self, Self::Error> {
		Ok(KeyData { contents: <[u8; 16]>::from_hex(s)? })
	}
}

//802.15.4 channel bitmask, bit n is channel n
#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq, Default)]
pub struct Channels(pub u32);

impl Channels {
	pub const NO_CHANNELS: Channels = Channels(0);
	pub const MIN_CHANNEL: u8 = 11;
	pub const MAX_CHANNEL: u8 = 26;

	pub fn from_channel_list(channels: &[u8]) -> Result<Self, Error> {
		let mut mask = 0;

		for channel in channels {
			if !(Self::MIN_CHANNEL..=Self::MAX_CHANNEL).contains(channel) {
				return Err(Error::Config(format!("Invalid channel: {channel}")));
			}

			mask |= 1 << channel;
		}

		Ok(Channels(mask))
	}

	pub fn channels(&self) -> Vec<u8> {
		(Self::MIN_CHANNEL..=Self::MAX_CHANNEL).filter(|c| self.0 & (1 << c) != 0).collect()
	}
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
#[deku(id_type = "u8")]
pub enum Bool {
	#[deku(id = "0x00")]
	False,
	#[deku(id = "0x01")]
	True,
}

impl From<bool> for Bool {
	fn from(b: bool) -> Self {
		if b { Bool::True } else { Bool::False }
	}
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
pub struct PanId(pub u16);

impl PanId {
	//0xFFFF lets the radio pick a PAN id
	pub const ANY: PanId = PanId(0xFFFF);
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
pub struct StartupOptions(pub u8);

impl StartupOptions {
	pub const NONE: StartupOptions = StartupOptions(0x00);
	pub const CLEAR_CONFIG: StartupOptions = StartupOptions(0x01);
	pub const CLEAR_STATE: StartupOptions = StartupOptions(0x02);
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLogicalType(pub u8);

impl DeviceLogicalType {
	pub const COORDINATOR: DeviceLogicalType = DeviceLogicalType(0x00);
	pub const ROUTER: DeviceLogicalType = DeviceLogicalType(0x01);
	pub const END_DEVICE: DeviceLogicalType = DeviceLogicalType(0x02);
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
#[deku(id_type = "u8")]
pub enum ResetType {
	#[deku(id = "0x00")]
	Hard,
	#[deku(id = "0x01")]
	Soft,
}

//zdo state reported by ZDO_STATE_CHANGE_IND
#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
#[deku(id_type = "u8")]
pub enum DeviceState {
	#[deku(id = "0x00")]
	InitializedNotStarted,
	#[deku(id = "0x01")]
	InitializedNotConnected,
	#[deku(id = "0x02")]
	DiscoveringPans,
	#[deku(id = "0x03")]
	Joining,
	#[deku(id = "0x06")]
	JoinedAsEndDevice,
	#[deku(id = "0x07")]
	JoinedAsRouter,
	#[deku(id = "0x08")]
	StartingAsCoordinator,
	#[deku(id = "0x09")]
	StartedAsCoordinator,
	#[deku(id = "0x0A")]
	LostParent,
	#[deku(id_pat = "_")]
	Unknown(u8),
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
#[deku(id_type = "u8")]
pub enum StartupState {
	#[deku(id = "0x00")]
	RestoredNetworkState,
	#[deku(id = "0x01")]
	NewNetworkState,
	#[deku(id = "0x02")]
	NotStarted,
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
pub struct BdbCommissioningMode(pub u8);

impl BdbCommissioningMode {
	pub const INITIALIZATION: BdbCommissioningMode = BdbCommissioningMode(0x00);
	pub const TOUCHLINK: BdbCommissioningMode = BdbCommissioningMode(0x01);
	pub const NETWORK_STEERING: BdbCommissioningMode = BdbCommissioningMode(0x02);
	pub const NETWORK_FORMATION: BdbCommissioningMode = BdbCommissioningMode(0x04);
	pub const FINDING_BINDING: BdbCommissioningMode = BdbCommissioningMode(0x08);
}

pub const ADDR_MODE_NWK: u8 = 0x02;

//route discovery options
pub const ROUTE_DISCOVERY_SUPPRESS: u8 = 0x00;
pub const ROUTE_DISCOVERY_ENABLE: u8 = 0x01;
pub const ROUTE_DISCOVERY_FORCE: u8 = 0x02;

//AF transmit options
pub const TRANSMIT_OPTIONS_NONE: u8 = 0x00;
pub const TRANSMIT_OPTIONS_APS_ACK: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ZStackVersion {
	Home12,
	V30,
	V330
}

impl ZStackVersion {
	pub fn from_product_id(product_id: u8) -> Self {
		match product_id {
			0 => Self::Home12,
			1 => Self::V30,
			_ => Self::V330
		}
	}
}

impl core::fmt::Display for ZStackVersion {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		match self {
			Self::Home12 => write!(f, "Home 1.2"),
			Self::V30 => write!(f, "3.0.x"),
			Self::V330 => write!(f, "3.30+"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn eui64_display_and_wire_order() {
		let ieee: Eui64 = "00:11:22:33:44:55:66:77".parse().unwrap();

		assert_eq!(ieee, Eui64(0x0011223344556677));
		assert_eq!(ieee.to_string(), "00:11:22:33:44:55:66:77");
		assert_eq!(ieee.to_bytes().unwrap(), vec![0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 0x00]);
	}

	#[test]
	fn unknown_status_code_is_kept() {
		let status = Status::try_from([0x42u8].as_slice()).unwrap();

		assert_eq!(status, Status::Unknown(0x42));
		assert_eq!(Status::try_from([0xCDu8].as_slice()).unwrap(), Status::NwkNoRoute);
	}

	#[test]
	fn channel_mask_from_list() {
		let channels = Channels::from_channel_list(&[11, 15, 26]).unwrap();

		assert_eq!(channels.0, (1 << 11) | (1 << 15) | (1 << 26));
		assert_eq!(channels.channels(), vec![11, 15, 26]);
		assert!(Channels::from_channel_list(&[27]).is_err());
	}

	#[test]
	fn version_ordering() {
		assert!(ZStackVersion::from_product_id(0) < ZStackVersion::V30);
		assert!(ZStackVersion::from_product_id(2) > ZStackVersion::Home12);
	}
}
