use serde::Deserialize;
use std::{ fs, path::Path };

use crate::{ error::Error, types::{ Eui64, KeyData } };

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
	#[serde(default)]
	pub device: DeviceConfig,
	#[serde(default)]
	pub znp: ZnpConfig,
	#[serde(default)]
	pub network: NetworkConfig
}

impl Config {
	pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
		let data = fs::read_to_string(path)?;

		Ok(serde_json::from_str::<Config>(&data)?)
	}
}

#[derive(Deserialize, Debug, Clone)]
pub struct DeviceConfig {
	#[serde(default)]
	pub path: String,
	#[serde(default = "DeviceConfig::default_baudrate")]
	pub baudrate: u32
}

impl DeviceConfig {
	fn default_baudrate() -> u32 {
		115_200
	}
}

impl Default for DeviceConfig {
	fn default() -> Self {
		DeviceConfig { path: String::new(), baudrate: Self::default_baudrate() }
	}
}

//timeouts of the command correlator
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ZnpConfig {
	#[serde(default = "ZnpConfig::default_sreq_timeout")]
	pub sreq_timeout_ms: u64,
	#[serde(default = "ZnpConfig::default_arsp_timeout")]
	pub arsp_timeout_ms: u64,
	#[serde(default = "ZnpConfig::default_reset_timeout")]
	pub reset_timeout_ms: u64
}

impl ZnpConfig {
	fn default_sreq_timeout() -> u64 {
		15_000
	}

	fn default_arsp_timeout() -> u64 {
		30_000
	}

	fn default_reset_timeout() -> u64 {
		5_000
	}
}

impl Default for ZnpConfig {
	fn default() -> Self {
		ZnpConfig {
			sreq_timeout_ms: Self::default_sreq_timeout(),
			arsp_timeout_ms: Self::default_arsp_timeout(),
			reset_timeout_ms: Self::default_reset_timeout()
		}
	}
}

//identity of a newly formed network, missing values are randomized
#[derive(Deserialize, Debug, Clone)]
pub struct NetworkConfig {
	#[serde(default = "NetworkConfig::default_channel")]
	pub channel: u8,
	pub pan_id: Option<u16>,
	pub extended_pan_id: Option<Eui64>,
	pub key: Option<KeyData>
}

impl NetworkConfig {
	fn default_channel() -> u8 {
		15
	}
}

impl Default for NetworkConfig {
	fn default() -> Self {
		NetworkConfig { channel: Self::default_channel(), pan_id: None, extended_pan_id: None, key: None }
	}
}
