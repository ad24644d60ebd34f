//command correlator, pairs outgoing requests with their responses and callbacks

use std::{ sync::{ Arc, Weak, Mutex, RwLock }, time::Duration };
use async_std::{ future::timeout, sync::Mutex as AsyncMutex };
use futures::channel::oneshot;
use tracing::{ debug, error, trace, warn };

use crate::{
	commands::{ sys, CommandHeader, Direction, Frame, Request, Response, Callback, Registry },
	config::ZnpConfig,
	error::Error,
	nvram::NvRam,
	transport::Transport,
	types::{ ResetType, ZStackVersion }
};

pub type Predicate = Arc<dyn Fn(&Frame) -> bool + Send + Sync>;
pub type Handler = Arc<dyn Fn(&Frame) + Send + Sync>;

type Slot = oneshot::Sender<Result<Frame, Error>>;

//frame header plus optional predicate over the decoded fields
#[derive(Clone)]
pub struct Matcher {
	pub header: CommandHeader,
	predicate: Option<Predicate>
}

impl Matcher {
	pub fn new(header: CommandHeader) -> Self {
		Matcher { header, predicate: None }
	}

	pub fn when<F: Fn(&Frame) -> bool + Send + Sync + 'static>(mut self, predicate: F) -> Self {
		self.predicate = Some(Arc::new(predicate));
		self
	}

	pub fn has_predicate(&self) -> bool {
		self.predicate.is_some()
	}

	pub fn matches(&self, frame: &Frame) -> bool {
		frame.header() == self.header && self.predicate.as_ref().map_or(true, |p| p(frame))
	}
}

impl core::fmt::Debug for Matcher {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		write!(f, "Matcher({}{})", self.header, if self.has_predicate() { ", predicate" } else { "" })
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerKind {
	Pending,
	Waiter
}

struct PendingRequest {
	id: u64,
	matcher: Matcher,
	request: CommandHeader,
	slot: Slot
}

impl PendingRequest {
	fn matches(&self, frame: &Frame) -> bool {
		match frame {
			Frame::Response(Response::RpcError(e)) => e.request_header() == self.request,
			f => self.matcher.matches(f)
		}
	}
}

struct CallbackWait {
	id: u64,
	matcher: Matcher,
	slot: Slot
}

struct Subscription {
	id: u64,
	matcher: Matcher,
	handler: Handler
}

#[derive(Default)]
struct Listeners {
	next_id: u64,
	closed: bool,
	pending: Vec<PendingRequest>,
	waiters: Vec<CallbackWait>,
	subscriptions: Vec<Subscription>
}

impl Listeners {
	fn next_id(&mut self) -> u64 {
		self.next_id += 1;
		self.next_id
	}
}

struct Inner {
	config: ZnpConfig,
	registry: &'static Registry,
	listeners: Mutex<Listeners>,
	transport: RwLock<Option<Arc<dyn Transport>>>,
	//Z-Stack processes one SREQ at a time
	sreq_lock: AsyncMutex<()>,
	version: Mutex<Option<ZStackVersion>>
}

impl Inner {
	fn listeners(&self) -> std::sync::MutexGuard<'_, Listeners> {
		self.listeners.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn dispatch_incoming(&self, frame: Frame) {
		if let Frame::Unrecognized { header, payload } = &frame {
			warn!("Dropping unknown frame {header}: {payload:02x?}");
			return;
		}

		debug!("Received {frame:?}");

		let handlers: Vec<Handler> = {
			let mut listeners = self.listeners();

			//first registered first served, at most one pending request per frame
			if let Some(i) = listeners.pending.iter().position(|p| p.matches(&frame)) {
				let pending = listeners.pending.remove(i);
				_ = pending.slot.send(Ok(frame.clone()));
			}

			let (matched, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut listeners.waiters).into_iter().partition(|w| w.matcher.matches(&frame));
			listeners.waiters = waiting;

			for waiter in matched {
				_ = waiter.slot.send(Ok(frame.clone()));
			}

			listeners.subscriptions.iter().filter(|s| s.matcher.matches(&frame)).map(|s| s.handler.clone()).collect()
		};

		//outside of the lock, handlers may (un)subscribe
		for handler in handlers {
			handler(&frame);
		}
	}

	fn fail_all(&self, closed: bool) {
		let mut listeners = self.listeners();

		listeners.closed = closed;

		for pending in listeners.pending.drain(..) {
			_ = pending.slot.send(Err(Error::LinkClosed));
		}

		for waiter in listeners.waiters.drain(..) {
			_ = waiter.slot.send(Err(Error::LinkClosed));
		}

		listeners.subscriptions.clear();
	}
}

//receive side handed to a transport
#[derive(Clone)]
pub struct Dispatcher {
	inner: Weak<Inner>
}

impl Dispatcher {
	pub fn dispatch(&self, frame: Frame) {
		if let Some(inner) = self.inner.upgrade() {
			inner.dispatch_incoming(frame);
		}
	}

	//decodes a frame received from the radio, undecodable frames are dropped
	pub fn dispatch_raw(&self, header: CommandHeader, payload: &[u8]) {
		if let Some(inner) = self.inner.upgrade() {
			match inner.registry.decode(Direction::FromRadio, header, payload) {
				Ok(frame) => inner.dispatch_incoming(frame),
				Err(e) => warn!("Dropping frame {header}, decode failed: {e}")
			}
		}
	}

	pub fn connection_lost(&self, e: Error) {
		if let Some(inner) = self.inner.upgrade() {
			error!("Connection lost: {e}");

			if let Ok(mut transport) = inner.transport.write() {
				*transport = None;
			}

			inner.fail_all(true);
		}
	}
}

//one-shot wait registered ahead of the frame it waits for, deregistered on drop
pub struct CallbackWaiter {
	znp: Znp,
	id: u64,
	rx: oneshot::Receiver<Result<Frame, Error>>
}

impl CallbackWaiter {
	pub async fn wait(mut self, t: Duration) -> Result<Callback, Error> {
		match timeout(t, &mut self.rx).await {
			Err(_) => Err(Error::Timeout),
			Ok(Err(oneshot::Canceled)) => Err(Error::LinkClosed),
			Ok(Ok(Ok(Frame::Callback(c)))) => Ok(c),
			Ok(Ok(Ok(f))) => Err(Error::UnexpectedResponse(f.header())),
			Ok(Ok(Err(e))) => Err(e)
		}
	}
}

impl Drop for CallbackWaiter {
	fn drop(&mut self) {
		self.znp.remove_listener(ListenerKind::Waiter, self.id);
	}
}

struct PendingGuard<'a> {
	znp: &'a Znp,
	id: u64
}

impl Drop for PendingGuard<'_> {
	fn drop(&mut self) {
		self.znp.remove_listener(ListenerKind::Pending, self.id);
	}
}

//session handle, cheap to clone
#[derive(Clone)]
pub struct Znp {
	inner: Arc<Inner>
}

impl Znp {
	pub fn new(config: ZnpConfig) -> Result<Self, Error> {
		Ok(Znp {
			inner: Arc::new(Inner {
				config,
				registry: Registry::global()?,
				listeners: Mutex::new(Listeners::default()),
				transport: RwLock::new(None),
				sreq_lock: AsyncMutex::new(()),
				version: Mutex::new(None)
			})
		})
	}

	pub fn config(&self) -> &ZnpConfig {
		&self.inner.config
	}

	pub fn registry(&self) -> &'static Registry {
		self.inner.registry
	}

	pub fn dispatcher(&self) -> Dispatcher {
		Dispatcher { inner: Arc::downgrade(&self.inner) }
	}

	pub fn set_transport(&self, transport: Arc<dyn Transport>) {
		self.inner.listeners().closed = false;

		match self.inner.transport.write() {
			Ok(mut t) => *t = Some(transport),
			Err(e) => *e.into_inner() = Some(transport)
		}
	}

	fn transport(&self) -> Result<Arc<dyn Transport>, Error> {
		let transport = self.inner.transport.read().unwrap_or_else(|e| e.into_inner());

		transport.clone().ok_or(Error::LinkClosed)
	}

	pub fn is_connected(&self) -> bool {
		self.transport().is_ok()
	}

	pub fn nvram(&self) -> NvRam<'_> {
		NvRam::new(self)
	}

	fn sreq_timeout(&self) -> Duration {
		Duration::from_millis(self.inner.config.sreq_timeout_ms)
	}

	pub fn arsp_timeout(&self) -> Duration {
		Duration::from_millis(self.inner.config.arsp_timeout_ms)
	}

	fn register_pending(&self, matcher: Matcher, request: CommandHeader) -> Result<(u64, oneshot::Receiver<Result<Frame, Error>>), Error> {
		let mut listeners = self.inner.listeners();

		if listeners.closed {
			return Err(Error::LinkClosed);
		}

		if !matcher.has_predicate() && listeners.pending.iter().any(|p| p.matcher.header == matcher.header && !p.matcher.has_predicate()) {
			return Err(Error::DuplicateListener(matcher.header));
		}

		let (tx, rx) = oneshot::channel();
		let id = listeners.next_id();

		listeners.pending.push(PendingRequest { id, matcher, request, slot: tx });

		Ok((id, rx))
	}

	fn remove_listener(&self, kind: ListenerKind, id: u64) {
		let mut listeners = self.inner.listeners();

		match kind {
			ListenerKind::Pending => listeners.pending.retain(|p| p.id != id),
			ListenerKind::Waiter => listeners.waiters.retain(|w| w.id != id)
		}
	}

	//number of outstanding requests and callback waits
	pub fn pending_count(&self) -> (usize, usize) {
		let listeners = self.inner.listeners();

		(listeners.pending.len(), listeners.waiters.len())
	}

	pub async fn send_request(&self, request: Request) -> Result<Response, Error> {
		self.send_request_matching(request, None).await
	}

	//the response must also satisfy the predicate, other frames are left to other listeners
	pub async fn send_request_matching(&self, request: Request, predicate: Option<Predicate>) -> Result<Response, Error> {
		let response_header = request.response_header().ok_or(Error::Unsupported("Waiting for a response to an AREQ"))?;
		let matcher = Matcher { header: response_header, predicate };

		let _sreq = self.inner.sreq_lock.lock().await;

		let (id, rx) = self.register_pending(matcher, request.header())?;
		let _guard = PendingGuard { znp: self, id };

		debug!("Sending {request:?}");
		self.transport()?.send(&request)?;

		let frame = match timeout(self.sreq_timeout(), rx).await {
			Err(_) => {
				warn!("Timeout waiting for {} response", request.name());
				return Err(Error::Timeout);
			},
			Ok(Err(oneshot::Canceled)) => return Err(Error::LinkClosed),
			Ok(Ok(r)) => r?
		};

		match frame {
			Frame::Response(Response::RpcError(e)) => Err(Error::CommandNotRecognized { request: request.header(), code: e.error_code }),
			Frame::Response(r) => Ok(r),
			f => Err(Error::UnexpectedResponse(f.header()))
		}
	}

	//sends the request and fails unless the response carries a success status
	pub async fn request_status(&self, request: Request) -> Result<Response, Error> {
		let name = request.name();
		let response = self.send_request(request).await?;

		match response.status() {
			Some(status) if !status.is_success() => Err(Error::InvalidStatus { command: name, status }),
			_ => Ok(response)
		}
	}

	//fire and forget
	pub fn send(&self, request: Request) -> Result<(), Error> {
		debug!("Sending {request:?}");
		self.transport()?.send(&request)
	}

	pub fn callback_waiter(&self, matcher: Matcher) -> Result<CallbackWaiter, Error> {
		let mut listeners = self.inner.listeners();

		if listeners.closed {
			return Err(Error::LinkClosed);
		}

		let (tx, rx) = oneshot::channel();
		let id = listeners.next_id();

		trace!("Waiting for {matcher:?}");
		listeners.waiters.push(CallbackWait { id, matcher, slot: tx });

		Ok(CallbackWaiter { znp: self.clone(), id, rx })
	}

	pub async fn await_callback(&self, matcher: Matcher, t: Option<Duration>) -> Result<Callback, Error> {
		self.callback_waiter(matcher)?.wait(t.unwrap_or(self.arsp_timeout())).await
	}

	//the callback wait is registered before the request is sent, so an early callback is not lost
	pub async fn request_callback_rsp(&self, request: Request, callback: Matcher) -> Result<Callback, Error> {
		let waiter = self.callback_waiter(callback)?;

		self.request_status(request).await?;

		waiter.wait(self.arsp_timeout()).await
	}

	pub fn subscribe<F: Fn(&Frame) + Send + Sync + 'static>(&self, matcher: Matcher, handler: F) -> Result<SubscriptionId, Error> {
		let mut listeners = self.inner.listeners();

		if listeners.closed {
			return Err(Error::LinkClosed);
		}

		let id = listeners.next_id();

		listeners.subscriptions.push(Subscription { id, matcher, handler: Arc::new(handler) });

		Ok(SubscriptionId(id))
	}

	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let mut listeners = self.inner.listeners();
		let len = listeners.subscriptions.len();

		listeners.subscriptions.retain(|s| s.id != id.0);
		listeners.subscriptions.len() != len
	}

	pub fn dispatch_incoming(&self, frame: Frame) {
		self.inner.dispatch_incoming(frame);
	}

	pub fn connection_lost(&self, e: Error) {
		self.dispatcher().connection_lost(e);
	}

	pub fn close(&self) {
		let transport = match self.inner.transport.write() {
			Ok(mut t) => t.take(),
			Err(e) => e.into_inner().take()
		};

		if let Some(transport) = transport {
			transport.close();
		}

		self.inner.fail_all(true);
	}

	pub async fn reset(&self) -> Result<sys::ResetInd, Error> {
		let waiter = self.callback_waiter(Matcher::new(sys::RESET_IND))?;

		self.send(Request::SysResetReq(sys::ResetReq { reset_type: ResetType::Soft }))?;

		match waiter.wait(Duration::from_millis(self.inner.config.reset_timeout_ms)).await? {
			Callback::SysResetInd(ind) => {
				debug!("Radio reset, reason: {}", ind.reason);
				Ok(ind)
			},
			c => Err(Error::UnexpectedResponse(c.header()))
		}
	}

	pub async fn version(&self) -> Result<sys::VersionRsp, Error> {
		match self.send_request(Request::SysVersion).await? {
			Response::SysVersion(v) => {
				let version = ZStackVersion::from_product_id(v.product_id);

				debug!("Z-Stack {version}, version {}.{}.{}", v.major_rel, v.minor_rel, v.maint_rel);
				*self.inner.version.lock().unwrap_or_else(|e| e.into_inner()) = Some(version);

				Ok(v)
			},
			r => Err(Error::UnexpectedResponse(r.header()))
		}
	}

	//last detected firmware generation, queried from the radio on first use
	pub async fn zstack_version(&self) -> Result<ZStackVersion, Error> {
		if let Some(version) = *self.inner.version.lock().unwrap_or_else(|e| e.into_inner()) {
			return Ok(version);
		}

		Ok(ZStackVersion::from_product_id(self.version().await?.product_id))
	}
}
