use deku::{ self, prelude::* };

use super::{ CommandHeader, Subsystem, FrameSchema, FrameKind, Frame, Request, Response, Callback, StatusRsp };
use crate::types::{ Status, Bool };

pub const DATA_REQUEST: CommandHeader = CommandHeader::sreq(Subsystem::Af, 0x01);
pub const DATA_CONFIRM: CommandHeader = CommandHeader::areq(Subsystem::Af, 0x80);
pub const INCOMING_MSG: CommandHeader = CommandHeader::areq(Subsystem::Af, 0x81);

//fixed DataRequest fields take 10 bytes of the frame
pub const MAX_DATA_LEN: usize = crate::mt::MAX_PAYLOAD_LEN - 10;

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct DataRequest {
	pub dst_addr: u16,
	pub dst_endpoint: u8,
	pub src_endpoint: u8,
	pub cluster_id: u16,
	pub tsn: u8,
	pub options: u8,
	pub radius: u8,
	pub len: u8,
	#[deku(count = "len")]
	pub data: Vec<u8>
}

//over the air result of a DataRequest
#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct DataConfirm {
	pub status: Status,
	pub endpoint: u8,
	pub tsn: u8
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct IncomingMsg {
	pub group_id: u16,
	pub cluster_id: u16,
	pub src_addr: u16,
	pub src_endpoint: u8,
	pub dst_endpoint: u8,
	pub was_broadcast: Bool,
	pub lqi: u8,
	pub security_use: Bool,
	pub timestamp: u32,
	pub tsn: u8,
	pub len: u8,
	#[deku(count = "len")]
	pub data: Vec<u8>,
	//mac source address and radius on newer firmware
	#[deku(read_all)]
	pub extra: Vec<u8>
}

pub fn schemas() -> Vec<FrameSchema> {
	vec![
		FrameSchema::new("AF.DataRequest", DATA_REQUEST, FrameKind::Request, |b| Ok(Frame::Request(Request::AfDataRequest(DataRequest::try_from(b)?)))),
		FrameSchema::new("AF.DataRequest", DATA_REQUEST.response(), FrameKind::Response, |b| Ok(Frame::Response(Response::AfDataRequest(StatusRsp::try_from(b)?)))),
		FrameSchema::new("AF.DataConfirm", DATA_CONFIRM, FrameKind::Callback, |b| Ok(Frame::Callback(Callback::AfDataConfirm(DataConfirm::try_from(b)?)))),
		FrameSchema::new("AF.IncomingMsg", INCOMING_MSG, FrameKind::Callback, |b| Ok(Frame::Callback(Callback::AfIncomingMsg(IncomingMsg::try_from(b)?)))),
	]
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn incoming_msg_layout() {
		let buf = [
			0x00, 0x00, //group
			0x06, 0x00, //cluster
			0xEF, 0xBE, //src addr
			0x01, 0x01, //endpoints
			0x00, 0x8A, 0x00, //broadcast, lqi, security
			0x10, 0x00, 0x00, 0x00, //timestamp
			0x07, 0x02, 0xAA, 0xBB, //tsn, data
			0x1E, //radius
		];
		let msg = IncomingMsg::try_from(buf.as_slice()).unwrap();

		assert_eq!(msg.src_addr, 0xBEEF);
		assert_eq!(msg.lqi, 0x8A);
		assert_eq!(msg.data, vec![0xAA, 0xBB]);
		assert_eq!(msg.extra, vec![0x1E]);
	}
}
