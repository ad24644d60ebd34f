//open coordinator backup document and its restore onto the radio

use std::sync::Arc;
use serde::{ Deserialize, Deserializer, de };
use serde_json::Value;
use tracing::{ info, warn };

use crate::{
	api::Znp,
	application::{ Application, ApplicationListener, StartMode },
	config::{ Config, NetworkConfig },
	error::Error,
	nvram::{ Nib, NwkActiveKeyItems, NwkKeyDesc, OsalNvId },
	security::{ self, StoredDevice, StoredLinkKey },
	transport::SerialTransport,
	types::{ Channels, Eui64, KeyData, ZStackVersion }
};

pub const BACKUP_FORMAT: &str = "zigpy/open-coordinator-backup";
pub const BACKUP_VERSION: u64 = 1;
pub const DEFAULT_COUNTER_INCREMENT: u32 = 2500;

//16-bit values are stored as hex with the most significant byte first
fn reversed_u16<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
	let s = String::deserialize(deserializer)?;
	let bytes = <[u8; 2] as hex::FromHex>::from_hex(&s).map_err(|e| de::Error::custom(format!("{s:?}: {e}")))?;

	Ok(u16::from_be_bytes(bytes))
}

//an empty seed is the same as none
fn optional_key<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<KeyData>, D::Error> {
	match Option::<String>::deserialize(deserializer)? {
		None => Ok(None),
		Some(s) if s.is_empty() => Ok(None),
		Some(s) => KeyData::try_from(s).map(Some).map_err(de::Error::custom)
	}
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct BackupNetworkKey {
	pub key: KeyData,
	pub sequence_number: u8,
	pub frame_counter: u32
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct BackupLinkKey {
	pub key: KeyData,
	pub tx_counter: u32,
	pub rx_counter: u32
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct BackupDevice {
	#[serde(deserialize_with = "reversed_u16")]
	pub nwk_address: u16,
	pub ieee_address: Eui64,
	pub link_key: Option<BackupLinkKey>
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ZStackSpecific {
	#[serde(default, deserialize_with = "optional_key")]
	pub tclk_seed: Option<KeyData>
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct StackSpecific {
	#[serde(default)]
	pub zstack: ZStackSpecific
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct BackupDocument {
	#[serde(deserialize_with = "reversed_u16")]
	pub pan_id: u16,
	pub extended_pan_id: Eui64,
	pub coordinator_ieee: Eui64,
	pub network_key: BackupNetworkKey,
	pub channel: u8,
	pub channel_mask: Vec<u8>,
	pub nwk_update_id: u8,
	pub security_level: u8,
	#[serde(default)]
	pub devices: Vec<BackupDevice>,
	#[serde(default)]
	pub stack_specific: StackSpecific
}

impl BackupDocument {
	//metadata is checked on the untyped document, so any shape fails closed
	pub fn check_metadata(document: &Value) -> Result<(), Error> {
		let metadata = document.get("metadata");
		let format = metadata.and_then(|m| m.get("format"));

		if format.and_then(Value::as_str) != Some(BACKUP_FORMAT) {
			return Err(Error::UnsupportedBackupFormat(format!("format not recognized: {}", format.unwrap_or(&Value::Null))));
		}

		let version = metadata.and_then(|m| m.get("version"));

		if version.and_then(Value::as_u64) != Some(BACKUP_VERSION) {
			return Err(Error::UnsupportedBackupFormat(format!("version is not compatible: {}", version.unwrap_or(&Value::Null))));
		}

		Ok(())
	}

	pub fn from_value(document: Value) -> Result<Self, Error> {
		Self::check_metadata(&document)?;

		let document: BackupDocument = serde_json::from_value(document).map_err(|e| Error::InvalidBackup(e.to_string()))?;

		Channels::from_channel_list(&document.channel_mask)?;

		Ok(document)
	}

	pub fn devices(&self) -> Vec<StoredDevice> {
		self.devices.iter().map(|d| StoredDevice {
			nwk: d.nwk_address,
			ieee: d.ieee_address,
			link_key: d.link_key.as_ref().map(|k| StoredLinkKey { key: k.key, tx_counter: k.tx_counter, rx_counter: k.rx_counter })
		}).collect()
	}

	pub fn network_config(&self) -> NetworkConfig {
		NetworkConfig {
			channel: self.channel,
			pan_id: Some(self.pan_id),
			extended_pan_id: Some(self.extended_pan_id),
			key: Some(self.network_key.key)
		}
	}
}

struct Silent;

impl ApplicationListener for Silent {}

//replays the document into the radio, every security counter ends up counter_increment ahead of the backup
pub async fn restore(znp: &Znp, document: Value, counter_increment: u32) -> Result<(), Error> {
	let backup = BackupDocument::from_value(document)?;
	let devices = backup.devices();
	let frame_counter = security::advance_counter(backup.network_key.frame_counter, counter_increment)?;

	//counters of every device are checked before the radio is touched
	security::build_device_tables(&devices, backup.stack_specific.zstack.tclk_seed.as_ref(), counter_increment)?;

	if counter_increment == 0 {
		warn!("Restoring without a counter increment, frame counters may be reused");
	}

	let app = Application::new(znp.clone(), backup.network_config(), Arc::new(Silent))?;

	app.startup(StartMode::ForceForm).await?;

	let nvram = znp.nvram();

	nvram.load_network_info().await?;
	znp.reset().await?;

	nvram.write(OsalNvId::EXTADDR, &backup.coordinator_ieee).await?;

	let mut nib: Nib = nvram.read(OsalNvId::NIB).await?;

	nib.channel_list = Channels::from_channel_list(&backup.channel_mask)?;
	nib.nwk_update_id = backup.nwk_update_id;
	nib.security_level = backup.security_level;
	nvram.write(OsalNvId::NIB, &nib).await?;

	let version = znp.zstack_version().await?;
	let seed = match backup.stack_specific.zstack.tclk_seed {
		Some(seed) if version > ZStackVersion::Home12 => {
			nvram.write_create(OsalNvId::TCLK_SEED, &seed).await?;
			Some(seed)
		},
		_ => None
	};

	let key_info = NwkActiveKeyItems {
		active: NwkKeyDesc { key_seq_num: backup.network_key.sequence_number, key: backup.network_key.key },
		frame_counter
	};

	nvram.write(OsalNvId::NWKKEY, &key_info).await?;
	nvram.write(OsalNvId::NWK_ACTIVE_KEY_INFO, &key_info.active).await?;
	nvram.write(OsalNvId::NWK_ALTERN_KEY_INFO, &key_info.active).await?;

	security::write_tc_frame_counter(znp, frame_counter, version, backup.extended_pan_id).await?;
	security::write_devices(znp, &devices, seed.as_ref(), counter_increment, version).await?;

	znp.reset().await?;
	app.shutdown();

	info!("Restored network 0x{:04X} with {} devices, frame counter {frame_counter}", backup.pan_id, devices.len());

	Ok(())
}

//opens the radio described by config and restores the document onto it
pub async fn restore_network(config: &Config, document: Value, counter_increment: u32) -> Result<(), Error> {
	BackupDocument::check_metadata(&document)?;

	let znp = Znp::new(config.znp.clone())?;
	let transport = SerialTransport::open(&config.device, znp.dispatcher())?;

	znp.set_transport(Arc::new(transport));

	let result = restore(&znp, document, counter_increment).await;

	znp.close();

	result
}
