//transport adapter boundary and the serial port implementation

use std::{ sync::{ Arc, atomic::{ AtomicBool, Ordering } }, time::Duration };
use async_std::{ channel::{ unbounded, Sender, Receiver, TryRecvError }, task };
use frames::{ Frame as _, FrameBuffer, FrameRead, FrameWrite };
use tracing::{ info, warn };

use crate::{ api::Dispatcher, commands::Request, config::DeviceConfig, error::Error, mt::MtFrame };

//accepts typed requests, received frames go to the Dispatcher handed over on open
pub trait Transport: Send + Sync {
	fn send(&self, request: &Request) -> Result<(), Error>;
	fn close(&self);
}

pub struct SerialTransport {
	tx: Sender<MtFrame>,
	running: Arc<AtomicBool>
}

impl SerialTransport {
	pub fn open(config: &DeviceConfig, dispatcher: Dispatcher) -> Result<Self, Error> {
		let port = serialport::new(&config.path, config.baudrate).
			data_bits(serialport::DataBits::Eight).
			parity(serialport::Parity::None).
			stop_bits(serialport::StopBits::One).
			flow_control(serialport::FlowControl::None).
			timeout(Duration::from_millis(100)).
			open()?;

		info!("Opened {} at {} baud", config.path, config.baudrate);

		Ok(Self::spawn(port, dispatcher))
	}

	//runs the read/write loop over any non-blocking stream
	pub fn spawn<S: FrameRead + FrameWrite + Send + 'static>(stream: S, dispatcher: Dispatcher) -> Self {
		let (tx, rx) = unbounded::<MtFrame>();
		let running = Arc::new(AtomicBool::new(true));
		let r = running.clone();

		task::spawn(async move {
			if let Err(e) = Self::run(stream, rx, &dispatcher, &r).await {
				dispatcher.connection_lost(e);
			}
		});

		SerialTransport { tx, running }
	}

	async fn run<S: FrameRead + FrameWrite>(mut stream: S, rx: Receiver<MtFrame>, dispatcher: &Dispatcher, running: &AtomicBool) -> Result<(), Error> {
		let mut frame_in = FrameBuffer::default();
		let mut frame_out = FrameBuffer::default();

		while running.load(Ordering::Relaxed) {
			let mut idle = true;

			if frame_out.is_empty() {
				match rx.try_recv() {
					Ok(frame) => if let Err(e) = frame_out.push_frame(&frame, &()) {
						warn!("Dropping outgoing frame {}: {e}", frame.header);
					},
					Err(TryRecvError::Closed) => break,
					Err(TryRecvError::Empty) => {}
				}
			}

			if !frame_out.is_empty() {
				idle = false;
				MtFrame::nonblocking_write_frame(&mut stream, &mut frame_out)?;
			}

			match MtFrame::nonblocking_read_frame(&mut stream, &mut frame_in, &()) {
				Ok(Some(frame)) => {
					idle = false;
					dispatcher.dispatch_raw(frame.header, &frame.payload);
				},
				Ok(None) => {},
				Err(e) if e.need_reset() => return Err(e.into()),
				Err(e) => warn!("Dropping malformed frame: {e}")
			}

			if idle {
				task::sleep(Duration::from_millis(1)).await;
			}
		}

		info!("Serial loop stopped");

		Ok(())
	}
}

impl Transport for SerialTransport {
	fn send(&self, request: &Request) -> Result<(), Error> {
		if !self.running.load(Ordering::Relaxed) {
			return Err(Error::LinkError("Serial port closed".to_string()));
		}

		self.tx.try_send(MtFrame::from_request(request)?).map_err(|e| Error::LinkError(e.to_string()))
	}

	fn close(&self) {
		self.running.store(false, Ordering::Relaxed);
		self.tx.close();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{ api::{ Matcher, Znp }, commands::{ af, sys, Callback }, config::ZnpConfig };
	use std::{ collections::VecDeque, sync::Mutex };

	//loopback stream, bytes written are kept, reads serve a preloaded queue
	#[derive(Clone, Default)]
	struct Loopback {
		input: Arc<Mutex<VecDeque<u8>>>,
		output: Arc<Mutex<Vec<u8>>>
	}

	impl FrameRead for Loopback {
		fn read(&mut self, buf: &mut [u8]) -> Result<usize, frames::Error> {
			let mut input = self.input.lock().unwrap();

			if input.is_empty() {
				return Err(frames::Error::WouldBlock);
			}

			let n = buf.len().min(input.len());

			for b in buf.iter_mut().take(n) {
				*b = input.pop_front().unwrap();
			}

			Ok(n)
		}
	}

	impl FrameWrite for Loopback {
		fn write(&mut self, buf: &[u8]) -> Result<usize, frames::Error> {
			self.output.lock().unwrap().extend_from_slice(buf);
			Ok(buf.len())
		}

		fn flush(&mut self) -> Result<(), frames::Error> {
			Ok(())
		}
	}

	#[async_std::test]
	async fn serial_loop_writes_and_dispatches() {
		let znp = Znp::new(ZnpConfig::default()).unwrap();
		let stream = Loopback::default();

		//garbage, then a reset indication
		stream.input.lock().unwrap().extend([0x00, 0xFE, 0x06, 0x41, 0x80, 0x02, 0x02, 0x01, 0x02, 0x07, 0x01, 0xC2]);

		let waiter = znp.callback_waiter(Matcher::new(sys::RESET_IND)).unwrap();
		let transport = SerialTransport::spawn(stream.clone(), znp.dispatcher());

		transport.send(&Request::SysVersion).unwrap();

		assert!(matches!(waiter.wait(Duration::from_secs(1)).await, Ok(Callback::SysResetInd(ind)) if ind.product_id == 1));

		task::sleep(Duration::from_millis(20)).await;
		assert_eq!(*stream.output.lock().unwrap(), vec![0xFE, 0x00, 0x21, 0x02, 0x23]);

		transport.close();
		assert!(transport.send(&Request::SysVersion).is_err());
	}

	#[async_std::test]
	async fn oversized_request_fails_only_its_caller() {
		let znp = Znp::new(ZnpConfig::default()).unwrap();
		let stream = Loopback::default();
		let transport = Arc::new(SerialTransport::spawn(stream.clone(), znp.dispatcher()));

		znp.set_transport(transport.clone());

		let waiter = znp.callback_waiter(Matcher::new(sys::RESET_IND)).unwrap();
		let request = Request::AfDataRequest(af::DataRequest {
			dst_addr: 0x1234,
			dst_endpoint: 1,
			src_endpoint: 1,
			cluster_id: 6,
			tsn: 1,
			options: 0,
			radius: 30,
			len: 245,
			data: vec![0; 245]
		});

		assert!(matches!(transport.send(&request), Err(Error::PayloadTooLong(255))));

		task::sleep(Duration::from_millis(20)).await;
		assert!(znp.is_connected());

		//the session keeps working
		stream.input.lock().unwrap().extend([0xFE, 0x06, 0x41, 0x80, 0x02, 0x02, 0x01, 0x02, 0x07, 0x01, 0xC2]);

		assert!(matches!(waiter.wait(Duration::from_secs(1)).await, Ok(Callback::SysResetInd(_))));

		transport.send(&Request::SysVersion).unwrap();
		task::sleep(Duration::from_millis(20)).await;
		assert_eq!(*stream.output.lock().unwrap(), vec![0xFE, 0x00, 0x21, 0x02, 0x23]);

		znp.close();
	}
}
