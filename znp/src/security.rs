//stored devices, trust center link keys and security frame counters

use tracing::{ debug, info };

use crate::{
	api::Znp,
	error::Error,
	nvram::{ AddrMgrEntry, ApsKeyData, ExNvId, NvId, NvItem, NwkActiveKeyItems, NwkSecMaterialDesc, OsalNvId, TclkDevEntry },
	types::{ Eui64, KeyData, ZStackVersion }
};

//legacy tables span a fixed id range
const LEGACY_TCLK_TABLE_SIZE: usize = 0x01FF - 0x0111 + 1;
const LEGACY_APS_KEY_DATA_TABLE_SIZE: usize = 0x02FF - 0x0201 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredLinkKey {
	pub key: KeyData,
	pub tx_counter: u32,
	pub rx_counter: u32
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDevice {
	pub nwk: u16,
	pub ieee: Eui64,
	pub link_key: Option<StoredLinkKey>
}

//counters only move forward, an overflow is an error rather than a wrap to 0
pub fn advance_counter(counter: u32, increment: u32) -> Result<u32, Error> {
	counter.checked_add(increment).ok_or(Error::CounterOverflow)
}

fn rotate(key: &KeyData, shift: i32) -> KeyData {
	let mut contents = key.contents;
	let n = shift.rem_euclid(contents.len() as i32) as usize;

	contents.rotate_left(n);

	KeyData { contents }
}

fn xor_ieee(key: &KeyData, ieee: Eui64) -> KeyData {
	let ieee = ieee.to_le_bytes();
	let mut contents = key.contents;

	for (i, b) in contents.iter_mut().enumerate() {
		*b ^= ieee[i % ieee.len()];
	}

	KeyData { contents }
}

//link key a device derives from the seed
pub fn compute_key(ieee: Eui64, seed: &KeyData, shift: u8) -> KeyData {
	xor_ieee(&rotate(seed, shift as i32), ieee)
}

pub fn compute_tclk_seed(ieee: Eui64, key: &KeyData, shift: u8) -> KeyData {
	rotate(&xor_ieee(key, ieee), -(shift as i32))
}

//rotation of the seed producing the key, if any
pub fn find_key_shift(ieee: Eui64, key: &KeyData, seed: &KeyData) -> Option<u8> {
	(0x00..=0x0F).find(|shift| compute_tclk_seed(ieee, key, *shift) == *seed)
}

pub async fn write_tc_frame_counter(znp: &Znp, counter: u32, version: ZStackVersion, extended_pan_id: Eui64) -> Result<(), Error> {
	let nvram = znp.nvram();

	match version {
		ZStackVersion::Home12 => {
			let mut key_info: NwkActiveKeyItems = nvram.read(OsalNvId::NWKKEY).await?;

			key_info.frame_counter = counter;
			nvram.write(OsalNvId::NWKKEY, &key_info).await?;
		},
		ZStackVersion::V30 => {
			nvram.write_create(OsalNvId::LEGACY_NWK_SEC_MATERIAL_TABLE_START, &NwkSecMaterialDesc { frame_counter: counter, extended_pan_id }).await?;
		},
		ZStackVersion::V330 => {
			nvram.write_create(NvId::ex(ExNvId::NWK_SEC_MATERIAL_TABLE, 0), &NwkSecMaterialDesc { frame_counter: counter, extended_pan_id }).await?;
		}
	}

	info!("Trust center frame counter set to {counter}");

	Ok(())
}

#[derive(Debug, Default, PartialEq)]
pub struct DeviceTables {
	pub addr_mgr: Vec<AddrMgrEntry>,
	pub tclk: Vec<TclkDevEntry>,
	pub aps_key_data: Vec<ApsKeyData>
}

//splits devices into address manager entries, seed hashed keys and plain keys
pub fn build_device_tables(devices: &[StoredDevice], seed: Option<&KeyData>, counter_increment: u32) -> Result<DeviceTables, Error> {
	let mut tables = DeviceTables::default();

	for device in devices {
		let mut entry_type = AddrMgrEntry::USER;

		if let Some(link_key) = &device.link_key {
			entry_type |= AddrMgrEntry::SECURITY;

			let tx_frame_counter = advance_counter(link_key.tx_counter, counter_increment)?;
			let rx_frame_counter = advance_counter(link_key.rx_counter, counter_increment)?;

			match seed.and_then(|seed| find_key_shift(device.ieee, &link_key.key, seed)) {
				Some(shift) => tables.tclk.push(TclkDevEntry {
					tx_frame_counter,
					rx_frame_counter,
					ext_addr: device.ieee,
					key_attributes: TclkDevEntry::VERIFIED_KEY,
					key_type: TclkDevEntry::KEY_TYPE_NONE,
					seed_shift: shift
				}),
				None => tables.aps_key_data.push(ApsKeyData { key: link_key.key, tx_frame_counter, rx_frame_counter })
			}
		}

		tables.addr_mgr.push(AddrMgrEntry { entry_type, nwk_addr: device.nwk, ext_addr: device.ieee });
	}

	Ok(tables)
}

pub async fn write_devices(znp: &Znp, devices: &[StoredDevice], seed: Option<&KeyData>, counter_increment: u32, version: ZStackVersion) -> Result<(), Error> {
	let tables = build_device_tables(devices, seed, counter_increment)?;
	let nvram = znp.nvram();

	if version >= ZStackVersion::V330 {
		for (i, entry) in tables.addr_mgr.iter().enumerate() {
			nvram.write_create(NvId::ex(ExNvId::ADDRMGR, i as u16), entry).await?;
		}

		for (i, entry) in tables.tclk.iter().enumerate() {
			nvram.write_create(NvId::ex(ExNvId::TCLK_TABLE, i as u16), entry).await?;
		}

		for (i, entry) in tables.aps_key_data.iter().enumerate() {
			nvram.write_create(NvId::ex(ExNvId::APS_KEY_DATA_TABLE, i as u16), entry).await?;
		}
	}
	else {
		//the legacy address manager is one item holding the whole table
		let stored = nvram.read_raw(OsalNvId::ADDRMGR.into()).await?;
		let capacity = stored.len() / AddrMgrEntry::SIZE;

		if tables.addr_mgr.len() > capacity {
			return Err(Error::InvalidBackup(format!("{} devices do not fit the address manager table of {capacity}", tables.addr_mgr.len())));
		}

		if tables.tclk.len() > LEGACY_TCLK_TABLE_SIZE || tables.aps_key_data.len() > LEGACY_APS_KEY_DATA_TABLE_SIZE {
			return Err(Error::InvalidBackup("Too many link keys for the legacy key tables".to_string()));
		}

		let mut addr_mgr = Vec::with_capacity(stored.len());

		for i in 0..capacity {
			addr_mgr.extend(tables.addr_mgr.get(i).unwrap_or(&AddrMgrEntry::EMPTY).to_nv_bytes()?);
		}

		addr_mgr.resize(stored.len(), 0xFF);
		nvram.write_raw(OsalNvId::ADDRMGR.into(), &addr_mgr, false).await?;

		for (i, entry) in tables.tclk.iter().enumerate() {
			nvram.write_create(OsalNvId::LEGACY_TCLK_TABLE_START.offset(i as u16), entry).await?;
		}

		for (i, entry) in tables.aps_key_data.iter().enumerate() {
			nvram.write_create(OsalNvId::LEGACY_APS_LINK_KEY_DATA_START.offset(i as u16), entry).await?;
		}
	}

	debug!("Wrote {} devices, {} hashed and {} plain link keys", tables.addr_mgr.len(), tables.tclk.len(), tables.aps_key_data.len());

	Ok(())
}
