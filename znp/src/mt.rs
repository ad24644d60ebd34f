//ZNP general frame: 0xFE | len | cmd0 | cmd1 | data | fcs, fcs is xor over len..data

use crate::commands::{ CommandHeader, Request };
use crate::error::Error;

pub const SOF: u8 = 0xFE;
pub const MAX_PAYLOAD_LEN: usize = 250;

#[derive(Debug, Clone, PartialEq)]
pub struct MtFrame {
	pub header: CommandHeader,
	pub payload: Vec<u8>
}

impl MtFrame {
	pub fn from_request(request: &Request) -> Result<Self, Error> {
		let payload = request.payload()?;

		if payload.len() > MAX_PAYLOAD_LEN {
			return Err(Error::PayloadTooLong(payload.len()));
		}

		Ok(MtFrame { header: request.header(), payload })
	}

	pub fn fcs(buf: &[u8]) -> u8 {
		buf.iter().fold(0, |fcs, b| fcs ^ b)
	}

	pub fn get_buffer_len(buf: &mut Vec<u8>) -> Result<usize, Error> {
		//garbage before start of frame
		match buf.iter().position(|b| *b == SOF) {
			Some(0) => {},
			Some(pos) => { buf.drain(..pos); },
			None => {
				buf.clear();
				return Ok(1);
			}
		}

		if buf.len() < 2 {
			return Ok(2 - buf.len());
		}

		let total = buf[1] as usize + 5;

		Ok(total.saturating_sub(buf.len()))
	}

	pub fn from_buf(buf: &[u8]) -> Result<Self, Error> {
		if buf.len() < 5 || buf[0] != SOF || buf[1] as usize + 5 != buf.len() {
			return Err(Error::LinkError(format!("Malformed frame: {buf:02x?}")));
		}

		let fcs = Self::fcs(&buf[1..buf.len() - 1]);

		if fcs != buf[buf.len() - 1] {
			return Err(Error::LinkError(format!("Invalid frame checksum {:#04x}, expected {fcs:#04x}", buf[buf.len() - 1])));
		}

		Ok(MtFrame {
			header: CommandHeader { cmd0: buf[2], cmd1: buf[3] },
			payload: buf[4..buf.len() - 1].to_vec()
		})
	}

	pub fn as_bytes(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
		if self.payload.len() > MAX_PAYLOAD_LEN {
			return Err(Error::PayloadTooLong(self.payload.len()));
		}

		let start = buf.len();

		buf.push(SOF);
		buf.push(self.payload.len() as u8);
		buf.push(self.header.cmd0);
		buf.push(self.header.cmd1);
		buf.extend_from_slice(&self.payload);

		let fcs = Self::fcs(&buf[start + 1..]);
		buf.push(fcs);

		Ok(())
	}
}

impl frames::Frame for MtFrame {
	type Params = ();

	fn get_buffer_len(buf: &mut Vec<u8>, _params: &Self::Params) -> Result<usize, frames::Error> {
		Ok(MtFrame::get_buffer_len(buf)?)
	}

	fn from_buf(buf: &[u8], _params: &Self::Params) -> Result<Self, frames::Error> {
		Ok(MtFrame::from_buf(buf)?)
	}

	fn as_bytes(&self, _params: &Self::Params, buf: &mut Vec<u8>) -> Result<(), frames::Error> {
		Ok(MtFrame::as_bytes(self, buf)?)
	}
}
