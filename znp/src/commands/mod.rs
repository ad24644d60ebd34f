//typed MT frame registry
//
//every frame is identified by its two header bytes: cmd0 = type << 5 | subsystem, cmd1 = command id.
//requests travel to the radio, responses (SRSP) and callbacks (AREQ) travel back.

use deku::{ self, prelude::*, DekuError };
use std::{ collections::HashMap, sync::OnceLock };

use crate::{ error::Error, types::Status };

pub mod af;
pub mod app_config;
pub mod sys;
pub mod zdo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
	Poll = 0,
	Sreq = 1,
	Areq = 2,
	Srsp = 3
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
	RpcError = 0x00,
	Sys = 0x01,
	Mac = 0x02,
	Af = 0x04,
	Zdo = 0x05,
	Util = 0x07,
	AppConfig = 0x0F
}

impl Subsystem {
	pub fn from_u8(v: u8) -> Option<Self> {
		Some(match v {
			0x00 => Self::RpcError,
			0x01 => Self::Sys,
			0x02 => Self::Mac,
			0x04 => Self::Af,
			0x05 => Self::Zdo,
			0x07 => Self::Util,
			0x0F => Self::AppConfig,
			_ => return None
		})
	}
}

#[derive(Debug, DekuRead, DekuWrite, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandHeader {
	pub cmd0: u8,
	pub cmd1: u8
}

impl CommandHeader {
	pub const fn new(command_type: CommandType, subsystem: Subsystem, id: u8) -> Self {
		CommandHeader {
			cmd0: (command_type as u8) << 5 | subsystem as u8,
			cmd1: id
		}
	}

	pub const fn sreq(subsystem: Subsystem, id: u8) -> Self {
		Self::new(CommandType::Sreq, subsystem, id)
	}

	pub const fn areq(subsystem: Subsystem, id: u8) -> Self {
		Self::new(CommandType::Areq, subsystem, id)
	}

	//SRSP header answering this SREQ
	pub const fn response(&self) -> Self {
		CommandHeader {
			cmd0: (CommandType::Srsp as u8) << 5 | (self.cmd0 & 0x1F),
			cmd1: self.cmd1
		}
	}

	pub fn command_type(&self) -> CommandType {
		match self.cmd0 >> 5 {
			0 => CommandType::Poll,
			1 => CommandType::Sreq,
			2 => CommandType::Areq,
			_ => CommandType::Srsp
		}
	}

	pub fn subsystem(&self) -> Option<Subsystem> {
		Subsystem::from_u8(self.cmd0 & 0x1F)
	}

	pub fn id(&self) -> u8 {
		self.cmd1
	}
}

impl core::fmt::Display for CommandHeader {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		match self.subsystem() {
			Some(s) => write!(f, "{:?}:{:?}:{:#04x}", self.command_type(), s, self.cmd1),
			None => write!(f, "{:#04x}:{:#04x}", self.cmd0, self.cmd1)
		}
	}
}

//generic responses

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct StatusRsp {
	pub status: Status
}

pub const RPC_ERROR: CommandHeader = CommandHeader::new(CommandType::Srsp, Subsystem::RpcError, 0x00);

//sent by the radio instead of the SRSP when it rejects a request
#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct RpcErrorRsp {
	pub error_code: u8,
	pub request_cmd0: u8,
	pub request_cmd1: u8
}

impl RpcErrorRsp {
	pub fn request_header(&self) -> CommandHeader {
		CommandHeader { cmd0: self.request_cmd0, cmd1: self.request_cmd1 }
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
	SysVersion,
	SysResetReq(sys::ResetReq),
	SysOsalNvItemInit(sys::OsalNvItemInit),
	SysOsalNvRead(sys::OsalNvRead),
	SysOsalNvWrite(sys::OsalNvWrite),
	SysOsalNvLength(sys::OsalNvLength),
	SysNvCreate(sys::NvCreate),
	SysNvLength(sys::NvLength),
	SysNvRead(sys::NvRead),
	SysNvWrite(sys::NvWrite),
	AfDataRequest(af::DataRequest),
	ZdoMgmtPermitJoinReq(zdo::MgmtPermitJoinReq),
	ZdoStartupFromApp(zdo::StartupFromApp),
	ZdoExtRouteDisc(zdo::ExtRouteDisc),
	AppCnfBdbStartCommissioning(app_config::BdbStartCommissioning),
	AppCnfBdbSetChannel(app_config::BdbSetChannel),
}

impl Request {
	pub fn header(&self) -> CommandHeader {
		match self {
			Self::SysVersion => sys::VERSION,
			Self::SysResetReq(_) => sys::RESET_REQ,
			Self::SysOsalNvItemInit(_) => sys::OSAL_NV_ITEM_INIT,
			Self::SysOsalNvRead(_) => sys::OSAL_NV_READ,
			Self::SysOsalNvWrite(_) => sys::OSAL_NV_WRITE,
			Self::SysOsalNvLength(_) => sys::OSAL_NV_LENGTH,
			Self::SysNvCreate(_) => sys::NV_CREATE,
			Self::SysNvLength(_) => sys::NV_LENGTH,
			Self::SysNvRead(_) => sys::NV_READ,
			Self::SysNvWrite(_) => sys::NV_WRITE,
			Self::AfDataRequest(_) => af::DATA_REQUEST,
			Self::ZdoMgmtPermitJoinReq(_) => zdo::MGMT_PERMIT_JOIN_REQ,
			Self::ZdoStartupFromApp(_) => zdo::STARTUP_FROM_APP,
			Self::ZdoExtRouteDisc(_) => zdo::EXT_ROUTE_DISC,
			Self::AppCnfBdbStartCommissioning(_) => app_config::BDB_START_COMMISSIONING,
			Self::AppCnfBdbSetChannel(_) => app_config::BDB_SET_CHANNEL,
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			Self::SysVersion => "SYS.Version",
			Self::SysResetReq(_) => "SYS.ResetReq",
			Self::SysOsalNvItemInit(_) => "SYS.OSALNVItemInit",
			Self::SysOsalNvRead(_) => "SYS.OSALNVRead",
			Self::SysOsalNvWrite(_) => "SYS.OSALNVWrite",
			Self::SysOsalNvLength(_) => "SYS.OSALNVLength",
			Self::SysNvCreate(_) => "SYS.NVCreate",
			Self::SysNvLength(_) => "SYS.NVLength",
			Self::SysNvRead(_) => "SYS.NVRead",
			Self::SysNvWrite(_) => "SYS.NVWrite",
			Self::AfDataRequest(_) => "AF.DataRequest",
			Self::ZdoMgmtPermitJoinReq(_) => "ZDO.MgmtPermitJoinReq",
			Self::ZdoStartupFromApp(_) => "ZDO.StartupFromApp",
			Self::ZdoExtRouteDisc(_) => "ZDO.ExtRouteDisc",
			Self::AppCnfBdbStartCommissioning(_) => "APP_CNF.BDBStartCommissioning",
			Self::AppCnfBdbSetChannel(_) => "APP_CNF.BDBSetChannel",
		}
	}

	//AREQ requests have no synchronous response
	pub fn response_header(&self) -> Option<CommandHeader> {
		let header = self.header();

		match header.command_type() {
			CommandType::Sreq => Some(header.response()),
			_ => None
		}
	}

	pub fn payload(&self) -> Result<Vec<u8>, DekuError> {
		match self {
			Self::SysVersion => Ok(Vec::new()),
			Self::SysResetReq(r) => r.to_bytes(),
			Self::SysOsalNvItemInit(r) => r.to_bytes(),
			Self::SysOsalNvRead(r) => r.to_bytes(),
			Self::SysOsalNvWrite(r) => r.to_bytes(),
			Self::SysOsalNvLength(r) => r.to_bytes(),
			Self::SysNvCreate(r) => r.to_bytes(),
			Self::SysNvLength(r) => r.to_bytes(),
			Self::SysNvRead(r) => r.to_bytes(),
			Self::SysNvWrite(r) => r.to_bytes(),
			Self::AfDataRequest(r) => r.to_bytes(),
			Self::ZdoMgmtPermitJoinReq(r) => r.to_bytes(),
			Self::ZdoStartupFromApp(r) => r.to_bytes(),
			Self::ZdoExtRouteDisc(r) => r.to_bytes(),
			Self::AppCnfBdbStartCommissioning(r) => r.to_bytes(),
			Self::AppCnfBdbSetChannel(r) => r.to_bytes(),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
	SysVersion(sys::VersionRsp),
	SysOsalNvItemInit(StatusRsp),
	SysOsalNvRead(sys::OsalNvReadRsp),
	SysOsalNvWrite(StatusRsp),
	SysOsalNvLength(sys::OsalNvLengthRsp),
	SysNvCreate(StatusRsp),
	SysNvLength(sys::NvLengthRsp),
	SysNvRead(sys::NvReadRsp),
	SysNvWrite(StatusRsp),
	AfDataRequest(StatusRsp),
	ZdoMgmtPermitJoinReq(StatusRsp),
	ZdoStartupFromApp(zdo::StartupFromAppRsp),
	ZdoExtRouteDisc(StatusRsp),
	AppCnfBdbStartCommissioning(StatusRsp),
	AppCnfBdbSetChannel(StatusRsp),
	RpcError(RpcErrorRsp),
}

impl Response {
	pub fn header(&self) -> CommandHeader {
		match self {
			Self::SysVersion(_) => sys::VERSION.response(),
			Self::SysOsalNvItemInit(_) => sys::OSAL_NV_ITEM_INIT.response(),
			Self::SysOsalNvRead(_) => sys::OSAL_NV_READ.response(),
			Self::SysOsalNvWrite(_) => sys::OSAL_NV_WRITE.response(),
			Self::SysOsalNvLength(_) => sys::OSAL_NV_LENGTH.response(),
			Self::SysNvCreate(_) => sys::NV_CREATE.response(),
			Self::SysNvLength(_) => sys::NV_LENGTH.response(),
			Self::SysNvRead(_) => sys::NV_READ.response(),
			Self::SysNvWrite(_) => sys::NV_WRITE.response(),
			Self::AfDataRequest(_) => af::DATA_REQUEST.response(),
			Self::ZdoMgmtPermitJoinReq(_) => zdo::MGMT_PERMIT_JOIN_REQ.response(),
			Self::ZdoStartupFromApp(_) => zdo::STARTUP_FROM_APP.response(),
			Self::ZdoExtRouteDisc(_) => zdo::EXT_ROUTE_DISC.response(),
			Self::AppCnfBdbStartCommissioning(_) => app_config::BDB_START_COMMISSIONING.response(),
			Self::AppCnfBdbSetChannel(_) => app_config::BDB_SET_CHANNEL.response(),
			Self::RpcError(_) => RPC_ERROR,
		}
	}

	//status of the plain status responses
	pub fn status(&self) -> Option<Status> {
		match self {
			Self::SysOsalNvItemInit(r) | Self::SysOsalNvWrite(r) | Self::SysNvCreate(r) | Self::SysNvWrite(r) |
			Self::AfDataRequest(r) | Self::ZdoMgmtPermitJoinReq(r) | Self::ZdoExtRouteDisc(r) |
			Self::AppCnfBdbStartCommissioning(r) | Self::AppCnfBdbSetChannel(r) => Some(r.status),
			Self::SysOsalNvRead(r) => Some(r.status),
			Self::SysNvRead(r) => Some(r.status),
			_ => None
		}
	}

	pub fn payload(&self) -> Result<Vec<u8>, DekuError> {
		match self {
			Self::SysVersion(r) => r.to_bytes(),
			Self::SysOsalNvItemInit(r) | Self::SysOsalNvWrite(r) | Self::SysNvCreate(r) | Self::SysNvWrite(r) |
			Self::AfDataRequest(r) | Self::ZdoMgmtPermitJoinReq(r) | Self::ZdoExtRouteDisc(r) |
			Self::AppCnfBdbStartCommissioning(r) | Self::AppCnfBdbSetChannel(r) => r.to_bytes(),
			Self::SysOsalNvRead(r) => r.to_bytes(),
			Self::SysOsalNvLength(r) => r.to_bytes(),
			Self::SysNvLength(r) => r.to_bytes(),
			Self::SysNvRead(r) => r.to_bytes(),
			Self::ZdoStartupFromApp(r) => r.to_bytes(),
			Self::RpcError(r) => r.to_bytes(),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callback {
	SysResetInd(sys::ResetInd),
	AfDataConfirm(af::DataConfirm),
	AfIncomingMsg(af::IncomingMsg),
	ZdoStateChangeInd(zdo::StateChangeInd),
	ZdoMgmtPermitJoinRsp(zdo::MgmtPermitJoinRsp),
}

impl Callback {
	pub fn header(&self) -> CommandHeader {
		match self {
			Self::SysResetInd(_) => sys::RESET_IND,
			Self::AfDataConfirm(_) => af::DATA_CONFIRM,
			Self::AfIncomingMsg(_) => af::INCOMING_MSG,
			Self::ZdoStateChangeInd(_) => zdo::STATE_CHANGE_IND,
			Self::ZdoMgmtPermitJoinRsp(_) => zdo::MGMT_PERMIT_JOIN_RSP,
		}
	}

	pub fn payload(&self) -> Result<Vec<u8>, DekuError> {
		match self {
			Self::SysResetInd(c) => c.to_bytes(),
			Self::AfDataConfirm(c) => c.to_bytes(),
			Self::AfIncomingMsg(c) => c.to_bytes(),
			Self::ZdoStateChangeInd(c) => c.to_bytes(),
			Self::ZdoMgmtPermitJoinRsp(c) => c.to_bytes(),
		}
	}
}

//any typed frame, plus frames this driver does not know about
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
	Request(Request),
	Response(Response),
	Callback(Callback),
	Unrecognized {
		header: CommandHeader,
		payload: Vec<u8>
	}
}

impl Frame {
	pub fn header(&self) -> CommandHeader {
		match self {
			Self::Request(r) => r.header(),
			Self::Response(r) => r.header(),
			Self::Callback(c) => c.header(),
			Self::Unrecognized { header, .. } => *header
		}
	}

	pub fn payload(&self) -> Result<Vec<u8>, DekuError> {
		match self {
			Self::Request(r) => r.payload(),
			Self::Response(r) => r.payload(),
			Self::Callback(c) => c.payload(),
			Self::Unrecognized { payload, .. } => Ok(payload.clone())
		}
	}
}

impl From<Response> for Frame {
	fn from(r: Response) -> Self {
		Frame::Response(r)
	}
}

impl From<Callback> for Frame {
	fn from(c: Callback) -> Self {
		Frame::Callback(c)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
	ToRadio,
	FromRadio
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
	Request,
	Response,
	Callback
}

impl FrameKind {
	pub fn direction(&self) -> Direction {
		match self {
			Self::Request => Direction::ToRadio,
			Self::Response | Self::Callback => Direction::FromRadio
		}
	}
}

pub type Decoder = fn(&[u8]) -> Result<Frame, DekuError>;

#[derive(Clone)]
pub struct FrameSchema {
	pub name: &'static str,
	pub header: CommandHeader,
	pub kind: FrameKind,
	decoder: Decoder
}

impl FrameSchema {
	pub const fn new(name: &'static str, header: CommandHeader, kind: FrameKind, decoder: Decoder) -> Self {
		FrameSchema { name, header, kind, decoder }
	}

	pub fn direction(&self) -> Direction {
		self.kind.direction()
	}

	pub fn decode(&self, payload: &[u8]) -> Result<Frame, DekuError> {
		(self.decoder)(payload)
	}
}

impl core::fmt::Debug for FrameSchema {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("FrameSchema").field("name", &self.name).field("header", &self.header).field("kind", &self.kind).finish()
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
	#[error("Frame id {header} ({direction:?}) registered twice: {first} and {second}")]
	Duplicate {
		header: CommandHeader,
		direction: Direction,
		first: &'static str,
		second: &'static str
	}
}

//immutable (direction, header) -> schema table
#[derive(Debug)]
pub struct Registry {
	schemas: HashMap<(Direction, CommandHeader), FrameSchema>
}

impl Registry {
	pub fn build<I: IntoIterator<Item = FrameSchema>>(schemas: I) -> Result<Self, RegistryError> {
		let mut map: HashMap<(Direction, CommandHeader), FrameSchema> = HashMap::new();

		for schema in schemas {
			let key = (schema.direction(), schema.header);

			if let Some(first) = map.get(&key) {
				return Err(RegistryError::Duplicate {
					header: schema.header,
					direction: schema.direction(),
					first: first.name,
					second: schema.name
				});
			}

			map.insert(key, schema);
		}

		Ok(Registry { schemas: map })
	}

	//the registry of every frame this driver speaks, built on first use
	pub fn global() -> Result<&'static Registry, RegistryError> {
		static REGISTRY: OnceLock<Result<Registry, RegistryError>> = OnceLock::new();

		REGISTRY.get_or_init(|| Registry::build(all_schemas())).as_ref().map_err(|e| e.clone())
	}

	pub fn lookup(&self, direction: Direction, header: CommandHeader) -> Result<&FrameSchema, Error> {
		self.schemas.get(&(direction, header)).ok_or(Error::UnknownFrame(header))
	}

	pub fn len(&self) -> usize {
		self.schemas.len()
	}

	pub fn is_empty(&self) -> bool {
		self.schemas.is_empty()
	}

	//frames with an unregistered header decode to Frame::Unrecognized
	pub fn decode(&self, direction: Direction, header: CommandHeader, payload: &[u8]) -> Result<Frame, Error> {
		match self.lookup(direction, header) {
			Ok(schema) => Ok(schema.decode(payload)?),
			Err(Error::UnknownFrame(_)) => Ok(Frame::Unrecognized { header, payload: payload.to_vec() }),
			Err(e) => Err(e)
		}
	}
}

pub fn all_schemas() -> Vec<FrameSchema> {
	let mut schemas = vec![
		FrameSchema::new("RPCError.CommandNotRecognized", RPC_ERROR, FrameKind::Response, |b| Ok(Frame::Response(Response::RpcError(RpcErrorRsp::try_from(b)?)))),
	];

	schemas.extend(sys::schemas());
	schemas.extend(af::schemas());
	schemas.extend(zdo::schemas());
	schemas.extend(app_config::schemas());

	schemas
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn header_bytes() {
		assert_eq!(sys::VERSION, CommandHeader { cmd0: 0x21, cmd1: 0x02 });
		assert_eq!(sys::VERSION.response(), CommandHeader { cmd0: 0x61, cmd1: 0x02 });
		assert_eq!(sys::RESET_IND, CommandHeader { cmd0: 0x41, cmd1: 0x80 });
		assert_eq!(af::DATA_REQUEST.command_type(), CommandType::Sreq);
		assert_eq!(app_config::BDB_SET_CHANNEL.subsystem(), Some(Subsystem::AppConfig));
	}

	#[test]
	fn global_registry_builds() {
		let registry = Registry::global().unwrap();

		assert!(!registry.is_empty());

		let schema = registry.lookup(Direction::FromRadio, zdo::STATE_CHANGE_IND).unwrap();
		assert_eq!(schema.kind, FrameKind::Callback);

		let schema = registry.lookup(Direction::ToRadio, sys::RESET_REQ).unwrap();
		assert_eq!(schema.kind, FrameKind::Request);
	}

	#[test]
	fn every_request_has_a_response_schema() {
		let registry = Registry::global().unwrap();

		for schema in all_schemas().iter().filter(|s| s.kind == FrameKind::Request) {
			if schema.header.command_type() == CommandType::Sreq {
				assert!(registry.lookup(Direction::FromRadio, schema.header.response()).is_ok(), "{}", schema.name);
			}
		}
	}

	#[test]
	fn duplicate_registration_fails() {
		let schemas = vec![
			FrameSchema::new("first", zdo::STATE_CHANGE_IND, FrameKind::Callback, |_| Ok(Frame::Unrecognized { header: zdo::STATE_CHANGE_IND, payload: Vec::new() })),
			FrameSchema::new("second", zdo::STATE_CHANGE_IND, FrameKind::Callback, |_| Ok(Frame::Unrecognized { header: zdo::STATE_CHANGE_IND, payload: Vec::new() })),
		];

		match Registry::build(schemas) {
			Err(RegistryError::Duplicate { first, second, direction, .. }) => {
				assert_eq!((first, second, direction), ("first", "second", Direction::FromRadio));
			},
			r => panic!("unexpected {r:?}")
		}
	}

	#[test]
	fn same_id_in_both_directions_is_allowed() {
		let header = sys::VERSION;
		let schemas = vec![
			FrameSchema::new("req", header, FrameKind::Request, |_| Ok(Frame::Request(Request::SysVersion))),
			FrameSchema::new("rsp", header, FrameKind::Response, |_| Ok(Frame::Unrecognized { header: sys::VERSION, payload: Vec::new() })),
		];

		assert_eq!(Registry::build(schemas).unwrap().len(), 2);
	}

	#[test]
	fn unknown_header_decodes_to_unrecognized() {
		let registry = Registry::global().unwrap();
		let header = CommandHeader { cmd0: 0x47, cmd1: 0x7e };

		assert!(matches!(registry.lookup(Direction::FromRadio, header), Err(Error::UnknownFrame(h)) if h == header));
		assert_eq!(registry.decode(Direction::FromRadio, header, &[1, 2]).unwrap(), Frame::Unrecognized { header, payload: vec![1, 2] });
	}

	#[test]
	fn decodes_rpc_error() {
		let registry = Registry::global().unwrap();
		let frame = registry.decode(Direction::FromRadio, RPC_ERROR, &[0x02, 0x21, 0x02]).unwrap();

		match frame {
			Frame::Response(Response::RpcError(e)) => assert_eq!(e.request_header(), sys::VERSION),
			f => panic!("unexpected {f:?}")
		}
	}
}
