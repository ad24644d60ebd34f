//coordinator lifecycle: startup, network formation, unicast sends and device events

use std::{ collections::HashMap, sync::{ Arc, Mutex } };
use tracing::{ debug, error, info, warn };

use crate::{
	api::{ Matcher, SubscriptionId, Znp },
	commands::{ af, app_config, zdo, Callback, Frame, Request, Response },
	config::NetworkConfig,
	error::Error,
	nvram::OsalNvId,
	types::{
		BdbCommissioningMode, Bool, Channels, DeviceLogicalType, DeviceState, Eui64, KeyData, PanId, StartupOptions,
		StartupState, Status, ADDR_MODE_NWK, ROUTE_DISCOVERY_FORCE, TRANSMIT_OPTIONS_NONE
	},
	zdp::{ self, ZdoCapability, ZdoCommand, ZdpFrame }
};

const RADIUS: u8 = 2 * 0x0F;
const START_DELAY: u16 = 100;
const COORDINATOR_NWK: u16 = 0x0000;
const ZDO_ENDPOINT: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationState {
	Uninitialized,
	Starting,
	FormingNetwork,
	JoiningExisting,
	Commissioning,
	Started,
	Failed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
	//use the stored network, fail when there is none
	Resume,
	//form only when the radio is not on a network
	AutoForm,
	//always form from the configured identity
	ForceForm
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
	pub ieee: Eui64,
	pub nwk: u16,
	pub capability: Option<ZdoCapability>,
	pub lqi: Option<u8>
}

//event sink, called from the frame dispatch path so it must not block on the radio
pub trait ApplicationListener: Send + Sync {
	fn device_joined(&self, _nwk: u16, _ieee: Eui64, _parent_nwk: u16) {}
	fn message_received(&self, _sender: &Device, _cluster_id: u16, _src_endpoint: u8, _dst_endpoint: u8, _data: &[u8]) {}
}

//keyed by ieee, nwk is an alias that may move between devices
#[derive(Default)]
struct Devices {
	by_ieee: HashMap<Eui64, Device>,
	by_nwk: HashMap<u16, Eui64>
}

impl Devices {
	fn join(&mut self, nwk: u16, ieee: Eui64, capability: Option<ZdoCapability>) {
		if let Some(old) = self.by_nwk.insert(nwk, ieee) {
			if old != ieee {
				debug!("Address 0x{nwk:04X} moved from {old} to {ieee}");
			}
		}

		let device = self.by_ieee.entry(ieee).or_insert(Device { ieee, nwk, capability, lqi: None });

		if device.nwk != nwk {
			info!("Device {ieee} changed address 0x{:04X} -> 0x{nwk:04X}", device.nwk);

			if self.by_nwk.get(&device.nwk) == Some(&ieee) {
				self.by_nwk.remove(&device.nwk);
			}

			device.nwk = nwk;
		}

		if capability.is_some() {
			device.capability = capability;
		}
	}

	fn by_nwk_mut(&mut self, nwk: u16) -> Option<&mut Device> {
		let ieee = self.by_nwk.get(&nwk)?;

		self.by_ieee.get_mut(ieee)
	}

	fn remove(&mut self, ieee: Eui64) -> Option<Device> {
		let device = self.by_ieee.remove(&ieee)?;

		if self.by_nwk.get(&device.nwk) == Some(&ieee) {
			self.by_nwk.remove(&device.nwk);
		}

		Some(device)
	}
}

struct Shared {
	state: Mutex<ApplicationState>,
	devices: Mutex<Devices>,
	listener: Arc<dyn ApplicationListener>
}

impl Shared {
	fn devices(&self) -> std::sync::MutexGuard<'_, Devices> {
		self.devices.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn on_incoming_msg(&self, msg: &af::IncomingMsg) {
		if msg.cluster_id == zdp::DEVICE_ANNCE && msg.dst_endpoint == ZDO_ENDPOINT {
			match ZdpFrame::from_buf(&msg.data, msg.cluster_id) {
				Ok(ZdpFrame { command: ZdoCommand::DeviceAnnce(annce), .. }) => {
					info!("ZDO device announce: 0x{:04X}, {}, {:?}", annce.nwk_addr, annce.ieee_addr, annce.capability);

					self.devices().join(annce.nwk_addr, annce.ieee_addr, Some(annce.capability));
					self.listener.device_joined(annce.nwk_addr, annce.ieee_addr, COORDINATOR_NWK);
				},
				Ok(_) => {},
				Err(e) => warn!("Malformed device announce from 0x{:04X}: {e}", msg.src_addr)
			}
		}

		//lock released before the listener runs
		let sender = match self.devices().by_nwk_mut(msg.src_addr) {
			Some(device) => {
				device.lqi = Some(msg.lqi);
				device.clone()
			},
			None => {
				warn!("Received an AF message from an unknown device: 0x{:04X}", msg.src_addr);
				return;
			}
		};

		self.listener.message_received(&sender, msg.cluster_id, msg.src_endpoint, msg.dst_endpoint, &msg.data);
	}
}

pub struct Application {
	znp: Znp,
	config: NetworkConfig,
	shared: Arc<Shared>,
	subscription: SubscriptionId
}

impl Application {
	pub fn new(znp: Znp, config: NetworkConfig, listener: Arc<dyn ApplicationListener>) -> Result<Self, Error> {
		let shared = Arc::new(Shared {
			state: Mutex::new(ApplicationState::Uninitialized),
			devices: Mutex::new(Devices::default()),
			listener
		});

		let s = shared.clone();
		let subscription = znp.subscribe(Matcher::new(af::INCOMING_MSG), move |frame| {
			if let Frame::Callback(Callback::AfIncomingMsg(msg)) = frame {
				s.on_incoming_msg(msg);
			}
		})?;

		Ok(Application { znp, config, shared, subscription })
	}

	pub fn znp(&self) -> &Znp {
		&self.znp
	}

	pub fn state(&self) -> ApplicationState {
		*self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn set_state(&self, state: ApplicationState) {
		let mut s = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());

		if *s != state {
			debug!("Application state {:?} -> {state:?}", *s);
			*s = state;
		}
	}

	//any error leaves the application Failed
	fn check<T>(&self, result: Result<T, Error>) -> Result<T, Error> {
		if let Err(e) = &result {
			error!("Network lifecycle failed: {e}");
			self.set_state(ApplicationState::Failed);
		}

		result
	}

	pub async fn startup(&self, mode: StartMode) -> Result<(), Error> {
		self.set_state(ApplicationState::Starting);

		let result = self.try_startup(mode).await;

		self.check(result)
	}

	async fn try_startup(&self, mode: StartMode) -> Result<(), Error> {
		self.znp.reset().await?;

		let version = self.znp.zstack_version().await?;
		let on_network = self.znp.nvram().is_on_network(version).await?;

		info!("Connected to Z-Stack {version}, on a network: {on_network}");

		let form = match mode {
			StartMode::Resume if !on_network => return Err(Error::NotOnNetwork),
			StartMode::Resume => false,
			StartMode::AutoForm => !on_network,
			StartMode::ForceForm => true
		};

		if form {
			self.try_form_network(self.config.channel, self.config.pan_id, self.config.extended_pan_id).await?;

			//leaves the radio stopped, so the start below reports the state change again
			self.znp.reset().await?;
		}
		else {
			self.set_state(ApplicationState::JoiningExisting);
		}

		self.start_network().await
	}

	async fn start_network(&self) -> Result<(), Error> {
		let started = self.znp.callback_waiter(Self::started_as_coordinator())?;

		match self.znp.send_request(Request::ZdoStartupFromApp(zdo::StartupFromApp { start_delay: START_DELAY })).await? {
			Response::ZdoStartupFromApp(rsp) if rsp.state == StartupState::NotStarted => return Err(Error::NetworkStartFailed),
			Response::ZdoStartupFromApp(rsp) => debug!("Startup state: {:?}", rsp.state),
			r => return Err(Error::UnexpectedResponse(r.header()))
		}

		started.wait(self.znp.arsp_timeout()).await?;

		self.set_state(ApplicationState::Started);
		info!("Network started");

		Ok(())
	}

	fn started_as_coordinator() -> Matcher {
		Matcher::new(zdo::STATE_CHANGE_IND).when(|f| matches!(f, Frame::Callback(Callback::ZdoStateChangeInd(ind)) if ind.state == DeviceState::StartedAsCoordinator))
	}

	//steering leaves the coordinator started and open for joining
	pub async fn form_network(&self, channel: u8, pan_id: Option<u16>, extended_pan_id: Option<Eui64>) -> Result<(), Error> {
		let result = self.try_form_network(channel, pan_id, extended_pan_id).await;

		self.check(result)?;
		self.set_state(ApplicationState::Started);

		Ok(())
	}

	async fn try_form_network(&self, channel: u8, pan_id: Option<u16>, extended_pan_id: Option<Eui64>) -> Result<(), Error> {
		self.set_state(ApplicationState::FormingNetwork);

		let nvram = self.znp.nvram();
		let channels = Channels::from_channel_list(&[channel])?;

		//only read on startup, the reset below applies them
		nvram.write_create(OsalNvId::STARTUP_OPTION, &StartupOptions::CLEAR_STATE).await?;
		nvram.write_create(OsalNvId::LOGICAL_TYPE, &DeviceLogicalType::COORDINATOR).await?;
		nvram.write_create(OsalNvId::PRECFGKEY, &self.config.key.unwrap_or_else(KeyData::random)).await?;
		nvram.write_create(OsalNvId::PRECFGKEYS_ENABLE, &Bool::True).await?;
		nvram.write_create(OsalNvId::CHANLIST, &channels).await?;
		nvram.write_create(OsalNvId::ZDO_DIRECT_CB, &Bool::True).await?;
		nvram.write_create(OsalNvId::PANID, &pan_id.map_or(PanId::ANY, PanId)).await?;
		nvram.write_create(OsalNvId::EXTENDED_PAN_ID, &extended_pan_id.unwrap_or_else(|| Eui64(rand::random()))).await?;

		self.znp.reset().await?;

		self.set_state(ApplicationState::Commissioning);

		self.znp.request_status(Request::AppCnfBdbSetChannel(app_config::BdbSetChannel { is_primary: Bool::True, channel: channels })).await?;
		self.znp.request_status(Request::AppCnfBdbSetChannel(app_config::BdbSetChannel { is_primary: Bool::False, channel: Channels::NO_CHANNELS })).await?;

		//formation can take a while because of the energy scan
		self.znp.request_callback_rsp(
			Request::AppCnfBdbStartCommissioning(app_config::BdbStartCommissioning { mode: BdbCommissioningMode::NETWORK_FORMATION }),
			Self::started_as_coordinator()
		).await?;

		self.znp.request_status(Request::AppCnfBdbStartCommissioning(app_config::BdbStartCommissioning { mode: BdbCommissioningMode::NETWORK_STEERING })).await?;

		info!("Formed network on channel {channel}");

		Ok(())
	}

	async fn data_request(&self, request: &af::DataRequest) -> Result<Status, Error> {
		match self.znp.send_request(Request::AfDataRequest(request.clone())).await? {
			Response::AfDataRequest(rsp) => Ok(rsp.status),
			r => Err(Error::UnexpectedResponse(r.header()))
		}
	}

	//unicast, returns once the radio confirms the delivery
	pub async fn request(&self, device: &Device, cluster_id: u16, src_endpoint: u8, dst_endpoint: u8, tsn: u8, data: &[u8]) -> Result<(), Error> {
		if data.len() > af::MAX_DATA_LEN {
			return Err(Error::PayloadTooLong(data.len()));
		}

		let request = af::DataRequest {
			dst_addr: device.nwk,
			dst_endpoint,
			src_endpoint,
			cluster_id,
			tsn,
			options: TRANSMIT_OPTIONS_NONE,
			radius: RADIUS,
			len: data.len() as u8,
			data: data.to_vec()
		};

		//the confirm may come before the response returns
		let confirm = self.znp.callback_waiter(Matcher::new(af::DATA_CONFIRM).when(move |f| {
			matches!(f, Frame::Callback(Callback::AfDataConfirm(c)) if c.endpoint == dst_endpoint && c.tsn == tsn)
		}))?;

		let mut status = self.data_request(&request).await?;

		if status == Status::NwkNoRoute {
			warn!("No route to 0x{:04X}, forcing route discovery and resending", device.nwk);

			self.znp.request_status(Request::ZdoExtRouteDisc(zdo::ExtRouteDisc { dst: device.nwk, options: ROUTE_DISCOVERY_FORCE, radius: RADIUS })).await?;

			status = self.data_request(&request).await?;

			if !status.is_success() {
				return Err(Error::SendFailed { status, reason: "Failed to send a message after discovering route" });
			}
		}
		else if !status.is_success() {
			return Err(Error::SendFailed { status, reason: "Invalid response status" });
		}

		match confirm.wait(self.znp.arsp_timeout()).await? {
			Callback::AfDataConfirm(c) if c.status.is_success() => {
				debug!("Delivered tsn {tsn} to 0x{:04X}", device.nwk);
				Ok(())
			},
			Callback::AfDataConfirm(c) => Err(Error::DeliveryFailed { status: c.status }),
			c => Err(Error::UnexpectedResponse(c.header()))
		}
	}

	pub async fn mrequest(&self, _group_id: u16, _cluster_id: u16, _src_endpoint: u8, _tsn: u8, _data: &[u8]) -> Result<(), Error> {
		Err(Error::Unsupported("Multicast send"))
	}

	pub async fn broadcast(&self, _address: u16, _cluster_id: u16, _src_endpoint: u8, _dst_endpoint: u8, _radius: u8, _tsn: u8, _data: &[u8]) -> Result<(), Error> {
		Err(Error::Unsupported("Broadcast send"))
	}

	pub async fn force_remove(&self, _device: &Device) -> Result<(), Error> {
		Err(Error::Unsupported("Forced device removal"))
	}

	//opens the coordinator for joining, 0 closes it
	pub async fn permit(&self, duration: u8) -> Result<(), Error> {
		let request = Request::ZdoMgmtPermitJoinReq(zdo::MgmtPermitJoinReq {
			addr_mode: ADDR_MODE_NWK,
			dst_addr: COORDINATOR_NWK,
			duration,
			tc_significance: 0
		});
		let matcher = Matcher::new(zdo::MGMT_PERMIT_JOIN_RSP).when(|f| matches!(f, Frame::Callback(Callback::ZdoMgmtPermitJoinRsp(r)) if r.src_addr == COORDINATOR_NWK));

		match self.znp.request_callback_rsp(request, matcher).await? {
			Callback::ZdoMgmtPermitJoinRsp(r) if r.status.is_success() => {
				info!("Permit join for {duration}s");
				Ok(())
			},
			Callback::ZdoMgmtPermitJoinRsp(r) => Err(Error::InvalidStatus { command: "ZDO.MgmtPermitJoinRsp", status: r.status }),
			c => Err(Error::UnexpectedResponse(c.header()))
		}
	}

	pub fn device(&self, ieee: Eui64) -> Option<Device> {
		self.shared.devices().by_ieee.get(&ieee).cloned()
	}

	pub fn device_by_nwk(&self, nwk: u16) -> Option<Device> {
		self.shared.devices().by_nwk_mut(nwk).map(|d| d.clone())
	}

	pub fn add_device(&self, ieee: Eui64, nwk: u16) {
		self.shared.devices().join(nwk, ieee, None);
	}

	pub fn remove_device(&self, ieee: Eui64) -> Option<Device> {
		self.shared.devices().remove(ieee)
	}

	pub fn shutdown(&self) {
		self.znp.close();
		info!("Application shut down");
	}
}

impl Drop for Application {
	fn drop(&mut self) {
		self.znp.unsubscribe(self.subscription);
	}
}
