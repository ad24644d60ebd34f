use crate::{ commands::{ CommandHeader, RegistryError }, nvram::NvId, types::Status };

#[derive(Debug, thiserror::Error)]
pub enum Error {
	//transport
	#[error("Link error: {0}")]
	LinkError(String),
	#[error("Link closed")]
	LinkClosed,
	#[error("Timeout")]
	Timeout,
	#[error("Payload too long: {0} bytes")]
	PayloadTooLong(usize),
	#[error("Unknown frame: {0}")]
	UnknownFrame(CommandHeader),

	//correlation
	#[error(transparent)]
	Registry(#[from] RegistryError),
	#[error("A listener for {0} without predicate is already pending")]
	DuplicateListener(CommandHeader),
	#[error("Command {request} not recognized by the radio (error code: {code:#04x})")]
	CommandNotRecognized {
		request: CommandHeader,
		code: u8
	},
	#[error("Unexpected response: {0}")]
	UnexpectedResponse(CommandHeader),
	#[error("{command} failed with status {status}")]
	InvalidStatus {
		command: &'static str,
		status: Status
	},

	//persistent store
	#[error("Persistent store unavailable, session not started")]
	StoreUnavailable,
	#[error("NV item {0} does not exist")]
	NvItemNotFound(NvId),
	#[error("NV item {id} type mismatch: {reason}")]
	TypeMismatch {
		id: NvId,
		reason: String
	},

	//lifecycle
	#[error("Network failed to start")]
	NetworkStartFailed,
	#[error("Device is not a part of a network")]
	NotOnNetwork,
	#[error("Send failed with status {status}: {reason}")]
	SendFailed {
		status: Status,
		reason: &'static str
	},
	#[error("Delivery failed with status {status}")]
	DeliveryFailed {
		status: Status
	},
	#[error("{0} is not supported")]
	Unsupported(&'static str),

	//backup
	#[error("Unsupported backup format: {0}")]
	UnsupportedBackupFormat(String),
	#[error("Invalid backup: {0}")]
	InvalidBackup(String),
	#[error("Frame counter overflow")]
	CounterOverflow,

	#[error("Config error: {0}")]
	Config(String),

	#[error(transparent)]
	Deku(#[from] deku::DekuError),
	#[error(transparent)]
	Json(#[from] serde_json::Error),
	#[error(transparent)]
	Hex(#[from] hex::FromHexError),
	#[error(transparent)]
	SerialPort(#[from] serialport::Error),
	#[error(transparent)]
	Frames(#[from] frames::Error),
	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl From<Error> for frames::Error {
	fn from(e: Error) -> Self {
		match e {
			Error::Frames(e) => e,
			e => frames::Error::Other(e.to_string())
		}
	}
}
