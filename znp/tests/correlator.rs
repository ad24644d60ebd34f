mod mock;

use std::time::Duration;
use async_std::task;
use mock::{ state_change, test_config, MockRadio };
use proptest::prelude::*;
use znp::{
	commands::{ af, sys, Callback, CommandHeader, Frame, Request, Response, Subsystem },
	types::{ DeviceState, Status },
	Error, Matcher, Znp
};

fn version(product_id: u8) -> Frame {
	Frame::Response(Response::SysVersion(sys::VersionRsp { transport_rev: 2, product_id, major_rel: 2, minor_rel: 7, maint_rel: 1, extra: vec![] }))
}

fn data_confirm(endpoint: u8, tsn: u8) -> Frame {
	Frame::Callback(Callback::AfDataConfirm(af::DataConfirm { status: Status::Success, endpoint, tsn }))
}

async fn wait_pending(znp: &Znp) {
	while znp.pending_count().0 == 0 {
		task::sleep(Duration::from_millis(1)).await;
	}
}

#[async_std::test]
async fn mock_radio_answers_requests() {
	let znp = Znp::new(test_config()).unwrap();
	let _radio = MockRadio::connect(&znp, 1);

	assert!(matches!(znp.send_request(Request::SysVersion).await, Ok(Response::SysVersion(v)) if v.product_id == 1));
	assert_eq!(znp.reset().await.unwrap().product_id, 1);
	assert_eq!(znp.pending_count(), (0, 0));
}

#[async_std::test]
async fn a_request_completes_at_most_once() {
	let znp = Znp::new(test_config()).unwrap();
	let radio = MockRadio::connect(&znp, 2);

	radio.state().silent = true;

	let z = znp.clone();
	let request = task::spawn(async move { z.send_request(Request::SysVersion).await });

	wait_pending(&znp).await;

	znp.dispatch_incoming(version(2));
	znp.dispatch_incoming(version(0));

	assert!(matches!(request.await, Ok(Response::SysVersion(v)) if v.product_id == 2));
	assert_eq!(znp.pending_count(), (0, 0));

	//the next request is not resolved by the stale duplicate
	let z = znp.clone();
	let request = task::spawn(async move { z.send_request(Request::SysVersion).await });

	wait_pending(&znp).await;
	znp.dispatch_incoming(version(1));

	assert!(matches!(request.await, Ok(Response::SysVersion(v)) if v.product_id == 1));
}

#[async_std::test]
async fn closing_fails_outstanding_requests() {
	let znp = Znp::new(test_config()).unwrap();
	let radio = MockRadio::connect(&znp, 2);

	radio.state().silent = true;

	let z = znp.clone();
	let request = task::spawn(async move { z.send_request(Request::SysVersion).await });
	let waiter = znp.callback_waiter(Matcher::new(af::DATA_CONFIRM)).unwrap();

	wait_pending(&znp).await;
	znp.close();

	assert!(matches!(request.await, Err(Error::LinkClosed)));
	assert!(matches!(waiter.wait(Duration::from_secs(1)).await, Err(Error::LinkClosed)));
	assert!(matches!(znp.callback_waiter(Matcher::new(af::DATA_CONFIRM)), Err(Error::LinkClosed)));
	assert!(radio.state().closed);
}

#[async_std::test]
async fn callback_arriving_with_the_response_is_not_lost() {
	let znp = Znp::new(test_config()).unwrap();
	let _radio = MockRadio::connect(&znp, 2);

	//the mock dispatches the confirm before send_request returns
	let confirm = znp.callback_waiter(Matcher::new(af::DATA_CONFIRM).when(|f| matches!(f, Frame::Callback(Callback::AfDataConfirm(c)) if c.tsn == 3))).unwrap();
	let request = Request::AfDataRequest(af::DataRequest {
		dst_addr: 0x1234,
		dst_endpoint: 1,
		src_endpoint: 1,
		cluster_id: 6,
		tsn: 3,
		options: 0,
		radius: 30,
		len: 1,
		data: vec![0x00]
	});

	assert!(matches!(znp.request_status(request).await, Ok(Response::AfDataRequest(_))));
	assert!(matches!(confirm.wait(Duration::from_millis(100)).await, Ok(Callback::AfDataConfirm(c)) if c.endpoint == 1));
}

proptest! {
	#[test]
	fn unmatched_frames_change_nothing(tsn in 1u8.., endpoint in any::<u8>(), cmd1 in 0xF0u8.., payload in proptest::collection::vec(any::<u8>(), 0..16)) {
		let znp = Znp::new(test_config()).unwrap();

		let _tsn_zero = znp.callback_waiter(Matcher::new(af::DATA_CONFIRM).when(|f| matches!(f, Frame::Callback(Callback::AfDataConfirm(c)) if c.tsn == 0))).unwrap();
		let _started = znp.callback_waiter(Matcher::new(sys::RESET_IND)).unwrap();

		let before = znp.pending_count();

		znp.dispatch_incoming(data_confirm(endpoint, tsn));
		znp.dispatch_incoming(state_change(DeviceState::Joining));
		znp.dispatch_incoming(Frame::Unrecognized { header: CommandHeader::areq(Subsystem::Zdo, cmd1), payload: payload.clone() });
		znp.dispatcher().dispatch_raw(CommandHeader::areq(Subsystem::Zdo, cmd1), &payload);

		prop_assert_eq!(znp.pending_count(), before);
		prop_assert_eq!(before, (0, 2));
	}
}
