use deku::{ self, prelude::* };

use super::{ CommandHeader, Subsystem, FrameSchema, FrameKind, Frame, Request, Response, StatusRsp };
use crate::types::{ Bool, Channels, BdbCommissioningMode };

pub const BDB_START_COMMISSIONING: CommandHeader = CommandHeader::sreq(Subsystem::AppConfig, 0x05);
pub const BDB_SET_CHANNEL: CommandHeader = CommandHeader::sreq(Subsystem::AppConfig, 0x08);

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct BdbStartCommissioning {
	pub mode: BdbCommissioningMode
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct BdbSetChannel {
	pub is_primary: Bool,
	pub channel: Channels
}

pub fn schemas() -> Vec<FrameSchema> {
	vec![
		FrameSchema::new("APP_CNF.BDBStartCommissioning", BDB_START_COMMISSIONING, FrameKind::Request, |b| Ok(Frame::Request(Request::AppCnfBdbStartCommissioning(BdbStartCommissioning::try_from(b)?)))),
		FrameSchema::new("APP_CNF.BDBStartCommissioning", BDB_START_COMMISSIONING.response(), FrameKind::Response, |b| Ok(Frame::Response(Response::AppCnfBdbStartCommissioning(StatusRsp::try_from(b)?)))),
		FrameSchema::new("APP_CNF.BDBSetChannel", BDB_SET_CHANNEL, FrameKind::Request, |b| Ok(Frame::Request(Request::AppCnfBdbSetChannel(BdbSetChannel::try_from(b)?)))),
		FrameSchema::new("APP_CNF.BDBSetChannel", BDB_SET_CHANNEL.response(), FrameKind::Response, |b| Ok(Frame::Response(Response::AppCnfBdbSetChannel(StatusRsp::try_from(b)?)))),
	]
}
