use deku::{ self, prelude::* };

use super::{ CommandHeader, Subsystem, FrameSchema, FrameKind, Frame, Request, Response, Callback, StatusRsp };
use crate::types::{ Status, ResetType };

pub const RESET_REQ: CommandHeader = CommandHeader::areq(Subsystem::Sys, 0x00);
pub const VERSION: CommandHeader = CommandHeader::sreq(Subsystem::Sys, 0x02);
pub const OSAL_NV_ITEM_INIT: CommandHeader = CommandHeader::sreq(Subsystem::Sys, 0x07);
pub const OSAL_NV_READ: CommandHeader = CommandHeader::sreq(Subsystem::Sys, 0x08);
pub const OSAL_NV_WRITE: CommandHeader = CommandHeader::sreq(Subsystem::Sys, 0x09);
pub const OSAL_NV_LENGTH: CommandHeader = CommandHeader::sreq(Subsystem::Sys, 0x13);
pub const NV_CREATE: CommandHeader = CommandHeader::sreq(Subsystem::Sys, 0x30);
pub const NV_LENGTH: CommandHeader = CommandHeader::sreq(Subsystem::Sys, 0x32);
pub const NV_READ: CommandHeader = CommandHeader::sreq(Subsystem::Sys, 0x33);
pub const NV_WRITE: CommandHeader = CommandHeader::sreq(Subsystem::Sys, 0x34);
pub const RESET_IND: CommandHeader = CommandHeader::areq(Subsystem::Sys, 0x80);

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct ResetReq {
	pub reset_type: ResetType
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct VersionRsp {
	pub transport_rev: u8,
	pub product_id: u8,
	pub major_rel: u8,
	pub minor_rel: u8,
	pub maint_rel: u8,
	//newer firmware appends the code revision and bootloader details
	#[deku(read_all)]
	pub extra: Vec<u8>
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct OsalNvItemInit {
	pub id: u16,
	pub item_len: u16,
	pub value_len: u8,
	#[deku(count = "value_len")]
	pub value: Vec<u8>
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct OsalNvRead {
	pub id: u16,
	pub offset: u8
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct OsalNvReadRsp {
	pub status: Status,
	pub len: u8,
	#[deku(count = "len")]
	pub value: Vec<u8>
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct OsalNvWrite {
	pub id: u16,
	pub offset: u8,
	pub len: u8,
	#[deku(count = "len")]
	pub value: Vec<u8>
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct OsalNvLength {
	pub id: u16
}

//0 when the item does not exist
#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct OsalNvLengthRsp {
	pub length: u16
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct NvCreate {
	pub sys_id: u8,
	pub item_id: u16,
	pub sub_id: u16,
	pub length: u32
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct NvLength {
	pub sys_id: u8,
	pub item_id: u16,
	pub sub_id: u16
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct NvLengthRsp {
	pub length: u32
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct NvRead {
	pub sys_id: u8,
	pub item_id: u16,
	pub sub_id: u16,
	pub offset: u16,
	pub len: u8
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct NvReadRsp {
	pub status: Status,
	pub len: u8,
	#[deku(count = "len")]
	pub value: Vec<u8>
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct NvWrite {
	pub sys_id: u8,
	pub item_id: u16,
	pub sub_id: u16,
	pub offset: u16,
	pub len: u8,
	#[deku(count = "len")]
	pub value: Vec<u8>
}

#[derive(Debug, DekuRead, DekuWrite, Clone, PartialEq)]
pub struct ResetInd {
	pub reason: u8,
	pub transport_rev: u8,
	pub product_id: u8,
	pub major_rel: u8,
	pub minor_rel: u8,
	pub hw_rev: u8
}

pub fn schemas() -> Vec<FrameSchema> {
	vec![
		FrameSchema::new("SYS.ResetReq", RESET_REQ, FrameKind::Request, |b| Ok(Frame::Request(Request::SysResetReq(ResetReq::try_from(b)?)))),
		FrameSchema::new("SYS.Version", VERSION, FrameKind::Request, |_| Ok(Frame::Request(Request::SysVersion))),
		FrameSchema::new("SYS.Version", VERSION.response(), FrameKind::Response, |b| Ok(Frame::Response(Response::SysVersion(VersionRsp::try_from(b)?)))),
		FrameSchema::new("SYS.OSALNVItemInit", OSAL_NV_ITEM_INIT, FrameKind::Request, |b| Ok(Frame::Request(Request::SysOsalNvItemInit(OsalNvItemInit::try_from(b)?)))),
		FrameSchema::new("SYS.OSALNVItemInit", OSAL_NV_ITEM_INIT.response(), FrameKind::Response, |b| Ok(Frame::Response(Response::SysOsalNvItemInit(StatusRsp::try_from(b)?)))),
		FrameSchema::new("SYS.OSALNVRead", OSAL_NV_READ, FrameKind::Request, |b| Ok(Frame::Request(Request::SysOsalNvRead(OsalNvRead::try_from(b)?)))),
		FrameSchema::new("SYS.OSALNVRead", OSAL_NV_READ.response(), FrameKind::Response, |b| Ok(Frame::Response(Response::SysOsalNvRead(OsalNvReadRsp::try_from(b)?)))),
		FrameSchema::new("SYS.OSALNVWrite", OSAL_NV_WRITE, FrameKind::Request, |b| Ok(Frame::Request(Request::SysOsalNvWrite(OsalNvWrite::try_from(b)?)))),
		FrameSchema::new("SYS.OSALNVWrite", OSAL_NV_WRITE.response(), FrameKind::Response, |b| Ok(Frame::Response(Response::SysOsalNvWrite(StatusRsp::try_from(b)?)))),
		FrameSchema::new("SYS.OSALNVLength", OSAL_NV_LENGTH, FrameKind::Request, |b| Ok(Frame::Request(Request::SysOsalNvLength(OsalNvLength::try_from(b)?)))),
		FrameSchema::new("SYS.OSALNVLength", OSAL_NV_LENGTH.response(), FrameKind::Response, |b| Ok(Frame::Response(Response::SysOsalNvLength(OsalNvLengthRsp::try_from(b)?)))),
		FrameSchema::new("SYS.NVCreate", NV_CREATE, FrameKind::Request, |b| Ok(Frame::Request(Request::SysNvCreate(NvCreate::try_from(b)?)))),
		FrameSchema::new("SYS.NVCreate", NV_CREATE.response(), FrameKind::Response, |b| Ok(Frame::Response(Response::SysNvCreate(StatusRsp::try_from(b)?)))),
		FrameSchema::new("SYS.NVLength", NV_LENGTH, FrameKind::Request, |b| Ok(Frame::Request(Request::SysNvLength(NvLength::try_from(b)?)))),
		FrameSchema::new("SYS.NVLength", NV_LENGTH.response(), FrameKind::Response, |b| Ok(Frame::Response(Response::SysNvLength(NvLengthRsp::try_from(b)?)))),
		FrameSchema::new("SYS.NVRead", NV_READ, FrameKind::Request, |b| Ok(Frame::Request(Request::SysNvRead(NvRead::try_from(b)?)))),
		FrameSchema::new("SYS.NVRead", NV_READ.response(), FrameKind::Response, |b| Ok(Frame::Response(Response::SysNvRead(NvReadRsp::try_from(b)?)))),
		FrameSchema::new("SYS.NVWrite", NV_WRITE, FrameKind::Request, |b| Ok(Frame::Request(Request::SysNvWrite(NvWrite::try_from(b)?)))),
		FrameSchema::new("SYS.NVWrite", NV_WRITE.response(), FrameKind::Response, |b| Ok(Frame::Response(Response::SysNvWrite(StatusRsp::try_from(b)?)))),
		FrameSchema::new("SYS.ResetInd", RESET_IND, FrameKind::Callback, |b| Ok(Frame::Callback(Callback::SysResetInd(ResetInd::try_from(b)?)))),
	]
}
