use deku::{ self, prelude::* };

use super::{ CommandHeader, Subsystem, FrameSchema, FrameKind, Frame, Request, Response, Callback, StatusRsp };
use crate::types::{ Status, StartupState, DeviceState };

pub const MGMT_PERMIT_JOIN_REQ: CommandHeader = CommandHeader::sreq(Subsystem::Zdo, 0x36);
pub const STARTUP_FROM_APP: CommandHeader = CommandHeader::sreq(Subsystem::Zdo, 0x40);
pub const EXT_ROUTE_DISC: CommandHeader = CommandHeader::sreq(Subsystem::Zdo, 0x45);
pub const MGMT_PERMIT_JOIN_RSP: CommandHeader = CommandHeader::areq(Subsystem::Zdo, 0xB6);
pub const STATE_CHANGE_IND: CommandHeader = CommandHeader::areq(Subsystem::Zdo, 0xC0);

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct MgmtPermitJoinReq {
	pub addr_mode: u8,
	pub dst_addr: u16,
	pub duration: u8,
	pub tc_significance: u8
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct MgmtPermitJoinRsp {
	pub src_addr: u16,
	pub status: Status
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct StartupFromApp {
	pub start_delay: u16
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct StartupFromAppRsp {
	pub state: StartupState
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct ExtRouteDisc {
	pub dst: u16,
	pub options: u8,
	pub radius: u8
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct StateChangeInd {
	pub state: DeviceState
}

pub fn schemas() -> Vec<FrameSchema> {
	vec![
		FrameSchema::new("ZDO.MgmtPermitJoinReq", MGMT_PERMIT_JOIN_REQ, FrameKind::Request, |b| Ok(Frame::Request(Request::ZdoMgmtPermitJoinReq(MgmtPermitJoinReq::try_from(b)?)))),
		FrameSchema::new("ZDO.MgmtPermitJoinReq", MGMT_PERMIT_JOIN_REQ.response(), FrameKind::Response, |b| Ok(Frame::Response(Response::ZdoMgmtPermitJoinReq(StatusRsp::try_from(b)?)))),
		FrameSchema::new("ZDO.StartupFromApp", STARTUP_FROM_APP, FrameKind::Request, |b| Ok(Frame::Request(Request::ZdoStartupFromApp(StartupFromApp::try_from(b)?)))),
		FrameSchema::new("ZDO.StartupFromApp", STARTUP_FROM_APP.response(), FrameKind::Response, |b| Ok(Frame::Response(Response::ZdoStartupFromApp(StartupFromAppRsp::try_from(b)?)))),
		FrameSchema::new("ZDO.ExtRouteDisc", EXT_ROUTE_DISC, FrameKind::Request, |b| Ok(Frame::Request(Request::ZdoExtRouteDisc(ExtRouteDisc::try_from(b)?)))),
		FrameSchema::new("ZDO.ExtRouteDisc", EXT_ROUTE_DISC.response(), FrameKind::Response, |b| Ok(Frame::Response(Response::ZdoExtRouteDisc(StatusRsp::try_from(b)?)))),
		FrameSchema::new("ZDO.MgmtPermitJoinRsp", MGMT_PERMIT_JOIN_RSP, FrameKind::Callback, |b| Ok(Frame::Callback(Callback::ZdoMgmtPermitJoinRsp(MgmtPermitJoinRsp::try_from(b)?)))),
		FrameSchema::new("ZDO.StateChangeInd", STATE_CHANGE_IND, FrameKind::Callback, |b| Ok(Frame::Callback(Callback::ZdoStateChangeInd(StateChangeInd::try_from(b)?)))),
	]
}
