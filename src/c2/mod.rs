//! Silicon Labs C2 interface: two-wire programming protocol for C8051 / EFM8
//! microcontrollers (see application note AN127, "Flash programming via the
//! C2 interface").
//!
//! Lines: C2CK (clock, always driven by us) and C2D (bidirectional data).
//! Each clock pulse ("strobe") is a short LOW period; the device samples C2D
//! on the rising edge, and data driven by the device is valid after it.
//!
//! Frame layout (bits sent LSB first):
//! - START: a single strobe with C2D released
//! - 2-bit instruction
//! - instruction dependent body:
//!   - 0b11 ADDRESS WRITE: 8-bit address
//!   - 0b10 ADDRESS READ: receive 8-bit status
//!   - 0b01 DATA WRITE: 2-bit length (always 0: one byte), 8-bit data, WAIT
//!   - 0b00 DATA READ: 2-bit length (always 0: one byte), WAIT, receive 8-bit data
//! - STOP: a single strobe with C2D released
//!
//! WAIT: strobe until the device pulls C2D HIGH; there is no timeout in the
//! protocol.
//!
//! On top of these four transactions the flash programming interface (FPI)
//! exchanges command and response bytes through the FPDAT register; the
//! status returned by ADDRESS READ carries the InBusy / OutReady flags that
//! pace this exchange.

mod consts;
mod hardware;
mod low_level;
mod operations;
mod status;

pub use self::consts::{
	Command,
	Instruction,
	registers,
	status_bits,
	COMMAND_OK,
	FPCTL_KEYS,
	ERASE_ARMING_SEQUENCE,
	MAX_BLOCK_SIZE,
};

pub use self::hardware::{
	CriticalSection,
	Direction,
	Hardware,
	busy_wait,
	reliable_sleep,
	timing,
};

pub use self::low_level::LowLevel;

pub use self::operations::{
	BlockSize,
	Flash,
	FlashConfig,
};

pub use self::status::{
	Status,
	StatusPolling,
};
