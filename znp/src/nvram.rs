//persistent store accessor: typed NV items addressed by symbolic id

use deku::{ self, prelude::*, DekuError };
use tracing::{ debug, trace };

use crate::{
	api::Znp,
	commands::{ sys, Request, Response },
	error::Error,
	types::{ Bool, Channels, Eui64, KeyData, Status, ZStackVersion }
};

//legacy OSAL items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OsalNvId(pub u16);

impl OsalNvId {
	pub const EXTADDR: OsalNvId = OsalNvId(0x0001);
	pub const STARTUP_OPTION: OsalNvId = OsalNvId(0x0003);
	pub const NIB: OsalNvId = OsalNvId(0x0021);
	pub const ADDRMGR: OsalNvId = OsalNvId(0x0023);
	pub const EXTENDED_PAN_ID: OsalNvId = OsalNvId(0x002D);
	pub const NWK_ACTIVE_KEY_INFO: OsalNvId = OsalNvId(0x003A);
	pub const NWK_ALTERN_KEY_INFO: OsalNvId = OsalNvId(0x003B);
	pub const BDBNODEISONANETWORK: OsalNvId = OsalNvId(0x0055);
	pub const PRECFGKEY: OsalNvId = OsalNvId(0x0062);
	pub const PRECFGKEYS_ENABLE: OsalNvId = OsalNvId(0x0063);
	pub const LEGACY_NWK_SEC_MATERIAL_TABLE_START: OsalNvId = OsalNvId(0x0075);
	pub const NWKKEY: OsalNvId = OsalNvId(0x0082);
	pub const PANID: OsalNvId = OsalNvId(0x0083);
	pub const CHANLIST: OsalNvId = OsalNvId(0x0084);
	pub const LOGICAL_TYPE: OsalNvId = OsalNvId(0x0087);
	pub const ZDO_DIRECT_CB: OsalNvId = OsalNvId(0x008F);
	pub const TCLK_SEED: OsalNvId = OsalNvId(0x0101);
	pub const LEGACY_TCLK_TABLE_START: OsalNvId = OsalNvId(0x0111);
	pub const LEGACY_APS_LINK_KEY_DATA_START: OsalNvId = OsalNvId(0x0201);

	pub fn offset(&self, index: u16) -> OsalNvId {
		OsalNvId(self.0 + index)
	}
}

//Z-Stack 3.30 extended tables, entries are addressed by sub id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExNvId(pub u16);

impl ExNvId {
	pub const ADDRMGR: ExNvId = ExNvId(0x0001);
	pub const TCLK_TABLE: ExNvId = ExNvId(0x0004);
	pub const APS_KEY_DATA_TABLE: ExNvId = ExNvId(0x0006);
	pub const NWK_SEC_MATERIAL_TABLE: ExNvId = ExNvId(0x0007);
}

pub const ZSTACK_SYS_ID: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NvId {
	Osal(OsalNvId),
	Ex {
		item: ExNvId,
		sub_id: u16
	}
}

impl NvId {
	pub fn ex(item: ExNvId, sub_id: u16) -> Self {
		NvId::Ex { item, sub_id }
	}
}

impl From<OsalNvId> for NvId {
	fn from(id: OsalNvId) -> Self {
		NvId::Osal(id)
	}
}

impl core::fmt::Display for NvId {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		match self {
			Self::Osal(id) => write!(f, "OSAL[{:#06x}]", id.0),
			Self::Ex { item, sub_id } => write!(f, "EX[{:#06x}][{:#06x}]", item.0, sub_id)
		}
	}
}

//anything deku can (de)serialize can be stored
pub trait NvItem: Sized {
	fn to_nv_bytes(&self) -> Result<Vec<u8>, DekuError>;
	fn from_nv_bytes(buf: &[u8]) -> Result<Self, DekuError>;
}

impl<T> NvItem for T where T: DekuContainerWrite + for<'a> TryFrom<&'a [u8], Error = DekuError> {
	fn to_nv_bytes(&self) -> Result<Vec<u8>, DekuError> {
		self.to_bytes()
	}

	fn from_nv_bytes(buf: &[u8]) -> Result<Self, DekuError> {
		T::try_from(buf)
	}
}

//records

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq, Default)]
pub struct NwkKeyDesc {
	pub key_seq_num: u8,
	pub key: KeyData
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq, Default)]
pub struct NwkActiveKeyItems {
	pub active: NwkKeyDesc,
	pub frame_counter: u32
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
pub struct NwkSecMaterialDesc {
	pub frame_counter: u32,
	pub extended_pan_id: Eui64
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
pub struct AddrMgrEntry {
	pub entry_type: u8,
	pub nwk_addr: u16,
	pub ext_addr: Eui64
}

impl AddrMgrEntry {
	pub const USER: u8 = 0x01;
	pub const SECURITY: u8 = 0x02;
	pub const SIZE: usize = 11;

	pub const EMPTY: AddrMgrEntry = AddrMgrEntry { entry_type: 0x00, nwk_addr: 0xFFFF, ext_addr: Eui64(0xFFFF_FFFF_FFFF_FFFF) };
}

//hashed trust center link key entry, the key is derived from the TCLK seed rotated by seed_shift
#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
pub struct TclkDevEntry {
	pub tx_frame_counter: u32,
	pub rx_frame_counter: u32,
	pub ext_addr: Eui64,
	pub key_attributes: u8,
	pub key_type: u8,
	pub seed_shift: u8
}

impl TclkDevEntry {
	pub const PROVISIONAL_KEY: u8 = 0x00;
	pub const VERIFIED_KEY: u8 = 0x02;
	pub const KEY_TYPE_NONE: u8 = 0x00;
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq)]
pub struct ApsKeyData {
	pub key: KeyData,
	pub tx_frame_counter: u32,
	pub rx_frame_counter: u32
}

//packed network information base
#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq, Eq)]
pub struct Nib {
	pub sequence_num: u8,
	pub passive_ack_timeout: u8,
	pub max_broadcast_retries: u8,
	pub max_children: u8,
	pub max_depth: u8,
	pub max_routers: u8,
	pub dummy_neighbor_table: u8,
	pub broadcast_delivery_time: u8,
	pub report_constant_cost: u8,
	pub route_disc_retries: u8,
	pub dummy_routing_table: u8,
	pub secure_all_frames: u8,
	pub security_level: u8,
	pub sym_link: u8,
	pub capability_flags: u8,
	pub transaction_persistence_time: u16,
	pub nwk_protocol_version: u8,
	pub route_discovery_time: u8,
	pub route_expiry_time: u8,
	pub nwk_dev_address: u16,
	pub nwk_logical_channel: u8,
	pub nwk_coord_address: u16,
	pub nwk_coord_ext_address: Eui64,
	pub nwk_pan_id: u16,
	pub nwk_state: u8,
	pub channel_list: Channels,
	pub beacon_order: u8,
	pub super_frame_order: u8,
	pub scan_duration: u8,
	pub batt_life_ext: u8,
	pub allocated_router_addresses: u32,
	pub allocated_end_device_addresses: u32,
	pub node_depth: u8,
	pub extended_pan_id: Eui64,
	pub nwk_key_loaded: Bool,
	pub spare1: NwkKeyDesc,
	pub spare2: NwkKeyDesc,
	pub spare3: u8,
	pub spare4: u8,
	pub nwk_link_status_period: u8,
	pub nwk_router_age_limit: u8,
	pub nwk_use_multicast: Bool,
	pub nwk_is_concentrator: Bool,
	pub nwk_concentrator_discovery_time: u8,
	pub nwk_concentrator_radius: u8,
	pub nwk_all_fresh: u8,
	pub nwk_manager_addr: u16,
	pub nwk_total_transmissions: u16,
	pub nwk_update_id: u8
}

impl Nib {
	pub const SIZE: usize = 110;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
	pub ieee: Eui64,
	pub nwk: u16,
	pub channel: u8,
	pub channels: Channels,
	pub pan_id: u16,
	pub extended_pan_id: Eui64,
	pub nwk_update_id: u8,
	pub security_level: u8,
	pub network_key: KeyData,
	pub network_key_seq: u8
}

//largest value chunk fitting into one MT frame
const CHUNK: usize = 244;

pub struct NvRam<'a> {
	znp: &'a Znp
}

impl<'a> NvRam<'a> {
	pub fn new(znp: &'a Znp) -> Self {
		NvRam { znp }
	}

	fn check_available(&self) -> Result<(), Error> {
		if self.znp.is_connected() { Ok(()) } else { Err(Error::StoreUnavailable) }
	}

	//stored item length, 0 when missing
	pub async fn length(&self, id: NvId) -> Result<usize, Error> {
		self.check_available()?;

		let request = match id {
			NvId::Osal(OsalNvId(id)) => Request::SysOsalNvLength(sys::OsalNvLength { id }),
			NvId::Ex { item, sub_id } => Request::SysNvLength(sys::NvLength { sys_id: ZSTACK_SYS_ID, item_id: item.0, sub_id })
		};

		match self.znp.send_request(request).await? {
			Response::SysOsalNvLength(r) => Ok(r.length as usize),
			Response::SysNvLength(r) => Ok(r.length as usize),
			r => Err(Error::UnexpectedResponse(r.header()))
		}
	}

	pub async fn read_raw(&self, id: NvId) -> Result<Vec<u8>, Error> {
		let length = self.length(id).await?;

		if length == 0 {
			return Err(Error::NvItemNotFound(id));
		}

		let mut value = Vec::with_capacity(length);

		while value.len() < length {
			let offset = value.len();

			let request = match id {
				NvId::Osal(OsalNvId(id)) => Request::SysOsalNvRead(sys::OsalNvRead {
					id,
					offset: u8::try_from(offset).map_err(|_| Error::Unsupported("OSAL NV items longer than 255 bytes"))?
				}),
				NvId::Ex { item, sub_id } => Request::SysNvRead(sys::NvRead {
					sys_id: ZSTACK_SYS_ID,
					item_id: item.0,
					sub_id,
					offset: offset as u16,
					len: (length - offset).min(CHUNK) as u8
				})
			};

			let (status, chunk) = match self.znp.send_request(request).await? {
				Response::SysOsalNvRead(r) => (r.status, r.value),
				Response::SysNvRead(r) => (r.status, r.value),
				r => return Err(Error::UnexpectedResponse(r.header()))
			};

			match status {
				Status::Success => {},
				Status::NvItemUninit => return Err(Error::NvItemNotFound(id)),
				status => return Err(Error::InvalidStatus { command: "NV read", status })
			}

			if chunk.is_empty() {
				return Err(Error::TypeMismatch { id, reason: format!("read stopped at {offset} of {length} bytes") });
			}

			value.extend_from_slice(&chunk);
		}

		value.truncate(length);
		trace!("Read {id}: {value:02x?}");

		Ok(value)
	}

	//writes over an existing item of the same length, a missing item is created only when asked to
	pub async fn write_raw(&self, id: NvId, value: &[u8], create: bool) -> Result<(), Error> {
		let length = self.length(id).await?;

		if length == 0 {
			if !create {
				return Err(Error::NvItemNotFound(id));
			}

			self.create_item(id, value).await?;
		}
		else if length != value.len() {
			return Err(Error::TypeMismatch { id, reason: format!("stored length {length}, value length {}", value.len()) });
		}

		for (i, chunk) in value.chunks(CHUNK).enumerate() {
			let offset = i * CHUNK;

			let request = match id {
				NvId::Osal(OsalNvId(id)) => Request::SysOsalNvWrite(sys::OsalNvWrite {
					id,
					offset: u8::try_from(offset).map_err(|_| Error::Unsupported("OSAL NV items longer than 255 bytes"))?,
					len: chunk.len() as u8,
					value: chunk.to_vec()
				}),
				NvId::Ex { item, sub_id } => Request::SysNvWrite(sys::NvWrite {
					sys_id: ZSTACK_SYS_ID,
					item_id: item.0,
					sub_id,
					offset: offset as u16,
					len: chunk.len() as u8,
					value: chunk.to_vec()
				})
			};

			self.znp.request_status(request).await?;
		}

		debug!("Wrote {id}: {value:02x?}");

		Ok(())
	}

	async fn create_item(&self, id: NvId, value: &[u8]) -> Result<(), Error> {
		let length = u16::try_from(value.len()).map_err(|_| Error::TypeMismatch { id, reason: format!("value too long: {}", value.len()) })?;

		let request = match id {
			NvId::Osal(OsalNvId(id)) => {
				let init = &value[..value.len().min(CHUNK)];

				Request::SysOsalNvItemInit(sys::OsalNvItemInit { id, item_len: length, value_len: init.len() as u8, value: init.to_vec() })
			},
			NvId::Ex { item, sub_id } => Request::SysNvCreate(sys::NvCreate { sys_id: ZSTACK_SYS_ID, item_id: item.0, sub_id, length: length as u32 })
		};

		//item init reports NvItemUninit when it had to create the item
		match self.znp.send_request(request).await?.status() {
			Some(Status::Success) | Some(Status::NvItemUninit) => {
				debug!("Created {id}, {length} bytes");
				Ok(())
			},
			Some(status) => Err(Error::InvalidStatus { command: "NV create", status }),
			None => Err(Error::UnexpectedResponse(id_header(id)))
		}
	}

	pub async fn read<T: NvItem>(&self, id: impl Into<NvId>) -> Result<T, Error> {
		let id = id.into();
		let raw = self.read_raw(id).await?;

		T::from_nv_bytes(&raw).map_err(|e| Error::TypeMismatch { id, reason: e.to_string() })
	}

	pub async fn write<T: NvItem>(&self, id: impl Into<NvId>, value: &T) -> Result<(), Error> {
		self.write_raw(id.into(), &value.to_nv_bytes()?, false).await
	}

	pub async fn write_create<T: NvItem>(&self, id: impl Into<NvId>, value: &T) -> Result<(), Error> {
		self.write_raw(id.into(), &value.to_nv_bytes()?, true).await
	}

	pub async fn load_network_info(&self) -> Result<NetworkInfo, Error> {
		let nib = match self.read::<Nib>(OsalNvId::NIB).await {
			Ok(nib) => nib,
			Err(Error::NvItemNotFound(_)) => return Err(Error::NotOnNetwork),
			Err(e) => return Err(e)
		};

		if nib.nwk_logical_channel == 0 || nib.nwk_key_loaded != Bool::True {
			return Err(Error::NotOnNetwork);
		}

		let ieee: Eui64 = self.read(OsalNvId::EXTADDR).await?;
		let key: NwkKeyDesc = self.read(OsalNvId::NWK_ACTIVE_KEY_INFO).await?;

		Ok(NetworkInfo {
			ieee,
			nwk: nib.nwk_dev_address,
			channel: nib.nwk_logical_channel,
			channels: nib.channel_list,
			pan_id: nib.nwk_pan_id,
			extended_pan_id: nib.extended_pan_id,
			nwk_update_id: nib.nwk_update_id,
			security_level: nib.security_level,
			network_key: key.key,
			network_key_seq: key.key_seq_num
		})
	}

	//Z-Stack 3.x keeps an explicit "on a network" flag next to the NIB
	pub async fn is_on_network(&self, version: ZStackVersion) -> Result<bool, Error> {
		if version >= ZStackVersion::V30 {
			match self.read_raw(OsalNvId::BDBNODEISONANETWORK.into()).await {
				Ok(v) if v.first() != Some(&1) => return Ok(false),
				Ok(_) => {},
				Err(Error::NvItemNotFound(_)) => return Ok(false),
				Err(e) => return Err(e)
			}
		}

		match self.load_network_info().await {
			Ok(_) => Ok(true),
			Err(Error::NotOnNetwork) => Ok(false),
			Err(e) => Err(e)
		}
	}
}

fn id_header(id: NvId) -> crate::commands::CommandHeader {
	match id {
		NvId::Osal(_) => sys::OSAL_NV_ITEM_INIT.response(),
		NvId::Ex { .. } => sys::NV_CREATE.response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn record_sizes() {
		assert_eq!(NwkKeyDesc::default().to_bytes().unwrap().len(), 17);
		assert_eq!(NwkActiveKeyItems::default().to_bytes().unwrap().len(), 21);
		assert_eq!(AddrMgrEntry::EMPTY.to_bytes().unwrap().len(), AddrMgrEntry::SIZE);

		let tclk = TclkDevEntry { tx_frame_counter: 0, rx_frame_counter: 0, ext_addr: Eui64(0), key_attributes: 0, key_type: 0, seed_shift: 0 };
		assert_eq!(tclk.to_bytes().unwrap().len(), 19);
	}

	#[test]
	fn nib_round_trip_keeps_length() {
		let mut raw = vec![0u8; Nib::SIZE];
		raw[22] = 15; //logical channel

		let nib = Nib::from_nv_bytes(&raw).unwrap();

		assert_eq!(nib.nwk_logical_channel, 15);
		assert_eq!(nib.to_nv_bytes().unwrap(), raw);
		assert!(Nib::from_nv_bytes(&raw[..Nib::SIZE - 1]).is_err());
	}

	#[test]
	fn nv_id_display() {
		assert_eq!(NvId::from(OsalNvId::NIB).to_string(), "OSAL[0x0021]");
		assert_eq!(NvId::ex(ExNvId::TCLK_TABLE, 3).to_string(), "EX[0x0004][0x0003]");
	}
}
