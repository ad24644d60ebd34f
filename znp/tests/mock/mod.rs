//in-memory radio answering requests the way Z-Stack does, callbacks are dispatched before send returns

#![allow(dead_code)]

use std::{ collections::{ HashMap, VecDeque }, sync::{ Arc, Mutex, MutexGuard } };
use znp::{
	api::{ Dispatcher, Znp },
	commands::{ af, sys, zdo, Callback, CommandHeader, Frame, Request, Response, StatusRsp },
	config::ZnpConfig,
	error::Error,
	nvram::{ AddrMgrEntry, ExNvId, Nib, NvItem, NwkActiveKeyItems, NwkKeyDesc, OsalNvId },
	transport::Transport,
	types::{ BdbCommissioningMode, Bool, Channels, DeviceState, Eui64, KeyData, PanId, StartupState, Status }
};

pub const RADIO_IEEE: Eui64 = Eui64(0x00124B0011223344);
pub const ADDRMGR_ENTRIES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NvKey {
	Osal(u16),
	Ex(u16, u16)
}

impl NvKey {
	pub fn osal(id: OsalNvId) -> Self {
		NvKey::Osal(id.0)
	}

	pub fn ex(item: ExNvId, sub_id: u16) -> Self {
		NvKey::Ex(item.0, sub_id)
	}
}

pub struct RadioState {
	pub nv: HashMap<NvKey, Vec<u8>>,
	pub sent: Vec<Request>,
	pub product_id: u8,
	pub data_request_status: VecDeque<Status>,
	pub confirm_status: Status,
	pub startup_state: StartupState,
	pub silent: bool,
	pub closed: bool
}

fn bytes<T: NvItem>(value: &T) -> Vec<u8> {
	value.to_nv_bytes().unwrap()
}

impl RadioState {
	fn new(product_id: u8) -> Self {
		let mut nv = HashMap::new();
		let addr_mgr: Vec<u8> = (0..ADDRMGR_ENTRIES).flat_map(|_| bytes(&AddrMgrEntry::EMPTY)).collect();

		nv.insert(NvKey::osal(OsalNvId::EXTADDR), bytes(&RADIO_IEEE));
		nv.insert(NvKey::osal(OsalNvId::NIB), vec![0; Nib::SIZE]);
		nv.insert(NvKey::osal(OsalNvId::STARTUP_OPTION), vec![0]);
		nv.insert(NvKey::osal(OsalNvId::LOGICAL_TYPE), vec![1]);
		nv.insert(NvKey::osal(OsalNvId::PRECFGKEY), vec![0; 16]);
		nv.insert(NvKey::osal(OsalNvId::PRECFGKEYS_ENABLE), vec![0]);
		nv.insert(NvKey::osal(OsalNvId::CHANLIST), bytes(&Channels(1 << 11)));
		nv.insert(NvKey::osal(OsalNvId::ZDO_DIRECT_CB), vec![0]);
		nv.insert(NvKey::osal(OsalNvId::PANID), vec![0xFF, 0xFF]);
		nv.insert(NvKey::osal(OsalNvId::EXTENDED_PAN_ID), vec![0; 8]);
		nv.insert(NvKey::osal(OsalNvId::NWKKEY), bytes(&NwkActiveKeyItems::default()));
		nv.insert(NvKey::osal(OsalNvId::NWK_ACTIVE_KEY_INFO), bytes(&NwkKeyDesc::default()));
		nv.insert(NvKey::osal(OsalNvId::NWK_ALTERN_KEY_INFO), bytes(&NwkKeyDesc::default()));
		nv.insert(NvKey::osal(OsalNvId::BDBNODEISONANETWORK), vec![0]);
		nv.insert(NvKey::osal(OsalNvId::ADDRMGR), addr_mgr);

		RadioState {
			nv,
			sent: Vec::new(),
			product_id,
			data_request_status: VecDeque::new(),
			confirm_status: Status::Success,
			startup_state: StartupState::RestoredNetworkState,
			silent: false,
			closed: false
		}
	}

	pub fn item<T: NvItem>(&self, key: NvKey) -> Option<T> {
		self.nv.get(&key).map(|v| T::from_nv_bytes(v).unwrap())
	}

	fn set<T: NvItem>(&mut self, key: NvKey, value: &T) {
		self.nv.insert(key, bytes(value));
	}

	fn write_at(&mut self, key: NvKey, offset: usize, value: &[u8]) -> Status {
		match self.nv.get_mut(&key) {
			Some(v) if offset + value.len() <= v.len() => {
				v[offset..offset + value.len()].copy_from_slice(value);
				Status::Success
			},
			Some(_) => Status::NvBadItemLen,
			None => Status::NvItemUninit
		}
	}

	fn read_at(&self, key: NvKey, offset: usize, len: usize) -> (Status, Vec<u8>) {
		match self.nv.get(&key) {
			Some(v) if offset <= v.len() => (Status::Success, v[offset..].iter().take(len).copied().collect()),
			Some(_) => (Status::NvBadItemLen, vec![]),
			None => (Status::NvItemUninit, vec![])
		}
	}

	//what BDB formation leaves behind
	fn form(&mut self) {
		let channels: Channels = self.item(NvKey::osal(OsalNvId::CHANLIST)).unwrap_or_default();
		let key: KeyData = self.item(NvKey::osal(OsalNvId::PRECFGKEY)).unwrap_or_default();
		let extended_pan_id: Eui64 = self.item(NvKey::osal(OsalNvId::EXTENDED_PAN_ID)).unwrap_or_default();
		let pan_id = match self.item::<PanId>(NvKey::osal(OsalNvId::PANID)) {
			Some(PanId(0xFFFF)) | None => 0x1A62,
			Some(PanId(p)) => p
		};

		let mut nib: Nib = self.item(NvKey::osal(OsalNvId::NIB)).unwrap();

		nib.nwk_logical_channel = channels.channels().first().copied().unwrap_or(Channels::MIN_CHANNEL);
		nib.channel_list = channels;
		nib.nwk_pan_id = pan_id;
		nib.extended_pan_id = extended_pan_id;
		nib.nwk_dev_address = 0x0000;
		nib.nwk_key_loaded = Bool::True;
		nib.security_level = 5;
		self.set(NvKey::osal(OsalNvId::NIB), &nib);

		let active = NwkKeyDesc { key_seq_num: 0, key };

		self.set(NvKey::osal(OsalNvId::NWK_ACTIVE_KEY_INFO), &active);
		self.set(NvKey::osal(OsalNvId::NWK_ALTERN_KEY_INFO), &active);
		self.set(NvKey::osal(OsalNvId::NWKKEY), &NwkActiveKeyItems { active, frame_counter: 0 });
		self.nv.insert(NvKey::osal(OsalNvId::BDBNODEISONANETWORK), vec![1]);
	}

	fn handle(&mut self, request: &Request) -> Vec<Frame> {
		fn rsp(r: Response) -> Frame {
			Frame::Response(r)
		}

		let ok = StatusRsp { status: Status::Success };

		match request {
			Request::SysVersion => vec![rsp(Response::SysVersion(sys::VersionRsp { transport_rev: 2, product_id: self.product_id, major_rel: 2, minor_rel: 7, maint_rel: 1, extra: vec![] }))],
			Request::SysResetReq(_) => vec![Frame::Callback(Callback::SysResetInd(sys::ResetInd { reason: 0, transport_rev: 2, product_id: self.product_id, major_rel: 2, minor_rel: 7, hw_rev: 1 }))],
			Request::SysOsalNvLength(r) => {
				let length = self.nv.get(&NvKey::Osal(r.id)).map_or(0, |v| v.len() as u16);
				vec![rsp(Response::SysOsalNvLength(sys::OsalNvLengthRsp { length }))]
			},
			Request::SysNvLength(r) => {
				let length = self.nv.get(&NvKey::Ex(r.item_id, r.sub_id)).map_or(0, |v| v.len() as u32);
				vec![rsp(Response::SysNvLength(sys::NvLengthRsp { length }))]
			},
			Request::SysOsalNvRead(r) => {
				let (status, value) = self.read_at(NvKey::Osal(r.id), r.offset as usize, 244);
				vec![rsp(Response::SysOsalNvRead(sys::OsalNvReadRsp { status, len: value.len() as u8, value }))]
			},
			Request::SysNvRead(r) => {
				let (status, value) = self.read_at(NvKey::Ex(r.item_id, r.sub_id), r.offset as usize, r.len as usize);
				vec![rsp(Response::SysNvRead(sys::NvReadRsp { status, len: value.len() as u8, value }))]
			},
			Request::SysOsalNvItemInit(r) => {
				let key = NvKey::Osal(r.id);
				let status = if self.nv.contains_key(&key) {
					Status::Success
				}
				else {
					let mut value = vec![0; r.item_len as usize];
					value[..r.value.len()].copy_from_slice(&r.value);
					self.nv.insert(key, value);
					Status::NvItemUninit
				};

				vec![rsp(Response::SysOsalNvItemInit(StatusRsp { status }))]
			},
			Request::SysNvCreate(r) => {
				self.nv.entry(NvKey::Ex(r.item_id, r.sub_id)).or_insert_with(|| vec![0; r.length as usize]);
				vec![rsp(Response::SysNvCreate(ok))]
			},
			Request::SysOsalNvWrite(r) => {
				let status = self.write_at(NvKey::Osal(r.id), r.offset as usize, &r.value);
				vec![rsp(Response::SysOsalNvWrite(StatusRsp { status }))]
			},
			Request::SysNvWrite(r) => {
				let status = self.write_at(NvKey::Ex(r.item_id, r.sub_id), r.offset as usize, &r.value);
				vec![rsp(Response::SysNvWrite(StatusRsp { status }))]
			},
			Request::AfDataRequest(r) => {
				let status = self.data_request_status.pop_front().unwrap_or(Status::Success);
				let mut frames = vec![rsp(Response::AfDataRequest(StatusRsp { status }))];

				if status.is_success() {
					frames.push(Frame::Callback(Callback::AfDataConfirm(af::DataConfirm { status: self.confirm_status, endpoint: r.dst_endpoint, tsn: r.tsn })));
				}

				frames
			},
			Request::ZdoMgmtPermitJoinReq(_) => vec![
				rsp(Response::ZdoMgmtPermitJoinReq(ok)),
				Frame::Callback(Callback::ZdoMgmtPermitJoinRsp(zdo::MgmtPermitJoinRsp { src_addr: 0x0000, status: Status::Success }))
			],
			Request::ZdoStartupFromApp(_) => {
				let mut frames = vec![rsp(Response::ZdoStartupFromApp(zdo::StartupFromAppRsp { state: self.startup_state }))];

				if self.startup_state != StartupState::NotStarted {
					frames.push(state_change(DeviceState::StartedAsCoordinator));
				}

				frames
			},
			Request::ZdoExtRouteDisc(_) => vec![rsp(Response::ZdoExtRouteDisc(ok))],
			Request::AppCnfBdbSetChannel(_) => vec![rsp(Response::AppCnfBdbSetChannel(ok))],
			Request::AppCnfBdbStartCommissioning(r) => {
				let mut frames = vec![rsp(Response::AppCnfBdbStartCommissioning(ok))];

				if r.mode == BdbCommissioningMode::NETWORK_FORMATION {
					self.form();
					frames.push(state_change(DeviceState::StartedAsCoordinator));
				}

				frames
			}
		}
	}
}

pub fn state_change(state: DeviceState) -> Frame {
	Frame::Callback(Callback::ZdoStateChangeInd(zdo::StateChangeInd { state }))
}

pub fn test_config() -> ZnpConfig {
	ZnpConfig { sreq_timeout_ms: 500, arsp_timeout_ms: 500, reset_timeout_ms: 500 }
}

pub struct MockRadio {
	state: Mutex<RadioState>,
	dispatcher: Dispatcher
}

impl MockRadio {
	pub fn connect(znp: &Znp, product_id: u8) -> Arc<MockRadio> {
		let radio = Arc::new(MockRadio { state: Mutex::new(RadioState::new(product_id)), dispatcher: znp.dispatcher() });

		znp.set_transport(radio.clone());

		radio
	}

	pub fn state(&self) -> MutexGuard<'_, RadioState> {
		self.state.lock().unwrap()
	}

	pub fn sent_headers(&self) -> Vec<CommandHeader> {
		self.state().sent.iter().map(|r| r.header()).collect()
	}

	pub fn count(&self, header: CommandHeader) -> usize {
		self.sent_headers().into_iter().filter(|h| *h == header).count()
	}

	pub fn item<T: NvItem>(&self, key: NvKey) -> Option<T> {
		self.state().item(key)
	}
}

impl Transport for MockRadio {
	fn send(&self, request: &Request) -> Result<(), Error> {
		let frames = {
			let mut state = self.state();

			if state.closed {
				return Err(Error::LinkError("mock radio closed".to_string()));
			}

			state.sent.push(request.clone());

			if state.silent { vec![] } else { state.handle(request) }
		};

		for frame in frames {
			self.dispatcher.dispatch(frame);
		}

		Ok(())
	}

	fn close(&self) {
		self.state().closed = true;
	}
}
