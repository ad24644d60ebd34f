#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{0}")]
	Other(String),
	#[cfg(feature="serialport")]
	#[error(transparent)]
	SerialPort(#[from] serialport::Error),
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error("Would block")]
	WouldBlock,
	#[error("Buffer not empty")]
	BufferNotEmpty,
	#[error("Unexpected Eof")]
	UnexpectedEof
}

impl Error {
	//link level errors, the stream has to be reopened
	pub fn need_reset(&self) -> bool {
		match self {
			#[cfg(feature="serialport")]
			Self::SerialPort(_) => true,
			Self::Io(e) => !matches!(e.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted),
			Self::UnexpectedEof => true,
			_ => false
		}
	}
}

//traits for non-blocking non-async read/write (ie. SerialPort)

pub trait FrameRead {
	//read can return WouldBlock in case of there is no data to read
	fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error>;
}

pub trait FrameWrite {
	//write can return WouldBlock in case of there is no place to put outgoing data
	fn write(&mut self, buf: &[u8]) -> Result<usize, Error>;
	fn flush(&mut self) -> Result<(), Error>;
}

#[derive(Default, Debug)]
pub struct FrameBuffer
{
	pub buf: Vec<u8>,
	bytes_to_go: usize
}

impl FrameBuffer {
	pub fn is_empty(&self) -> bool {
		self.bytes_to_go == 0
	}

	pub fn push_frame<F: Frame>(&mut self, frame: &F, params: &F::Params) -> Result<(), Error> {
		if !self.buf.is_empty() {
			return Err(Error::BufferNotEmpty);
		}

		frame.as_bytes(params, &mut self.buf)?;
		self.bytes_to_go = self.buf.len();

		Ok(())
	}
}

pub trait Frame
{
	type Params: Sync;

	//number of bytes still missing for a complete frame, 0 when buf holds a whole frame
	fn get_buffer_len(buf: &mut Vec<u8>, params: &Self::Params) -> Result<usize, Error>;
	fn from_buf(buf: &[u8], params: &Self::Params) -> Result<Self, Error> where Self: Sized;
	fn as_bytes(&self, params: &Self::Params, buf: &mut Vec<u8>) -> Result<(), Error>;

	fn nonblocking_read_frame<R: FrameRead>(r: &mut R, buf: &mut FrameBuffer, params: &Self::Params) -> Result<Option<Self>, Error> where Self: Sized
	{
		if buf.bytes_to_go != 0 {
			let len = buf.buf.len();

			match r.read(&mut buf.buf[len - buf.bytes_to_go..]) {
				Ok(b) => {
					buf.bytes_to_go -= b;
				},
				Err(Error::WouldBlock) => {
				},
				Err(e) => { return Err(e); }
			}
		}

		if buf.bytes_to_go == 0 {
			buf.bytes_to_go = Self::get_buffer_len(&mut buf.buf, params)?;

			if buf.bytes_to_go == 0 {
				let fr = Self::from_buf(&buf.buf, params);

				buf.buf.clear();

				return fr.map(Some);
			}

			buf.buf.resize(buf.buf.len() + buf.bytes_to_go, 0);
		}

		Ok(None)
	}

	fn nonblocking_write_frame<W: FrameWrite>(w: &mut W, buf: &mut FrameBuffer) -> Result<bool, Error>
	{
		let buf_len = buf.buf.len();

		match w.write(&buf.buf[buf_len - buf.bytes_to_go..]) {
			Ok(n) => {
				buf.bytes_to_go -= n;

				if buf.bytes_to_go == 0 {
					buf.buf.clear();
					w.flush()?;

					return Ok(true);
				}
			},
			Err(Error::WouldBlock) => {},
			Err(e) => { return Err(e); }
		}

		Ok(false)
	}
}
