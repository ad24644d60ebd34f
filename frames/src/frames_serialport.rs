use crate::frames::{ Error, FrameRead, FrameWrite };
use serialport::SerialPort;
use std::io::{ Read, Write };

impl FrameRead for Box<dyn SerialPort> {
	fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
		if self.bytes_to_read()? == 0 {
			return Err(Error::WouldBlock)
		}

		Ok(Read::read(self, buf)?)
	}
}

impl FrameWrite for Box<dyn SerialPort> {
	fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
		if self.bytes_to_write()? != 0 {
			return Err(Error::WouldBlock)
		}

		Ok(Write::write(self, buf)?)
	}

	fn flush(&mut self) -> Result<(), Error> {
		Ok(Write::flush(self)?)
	}
}
