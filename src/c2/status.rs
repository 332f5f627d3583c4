use std::fmt;

use super::{
	COMMAND_OK,
	Command,
	LowLevel,
	status_bits::*,
};

/// Status byte as returned by ADDRESS READ.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Status(pub u8);

impl Status {
	pub fn is_busy(&self) -> bool {
		0 != self.0 & BUSY
	}
	pub fn is_error(&self) -> bool {
		0 != self.0 & ERROR
	}
	// device still consuming the last byte written to FPDAT
	pub fn is_in_busy(&self) -> bool {
		0 != self.0 & IN_BUSY
	}
	// device has a byte ready to be read from FPDAT
	pub fn is_out_ready(&self) -> bool {
		0 != self.0 & OUT_READY
	}

	pub fn matches(&self, mask: u8, expected: bool) -> bool {
		(0 != self.0 & mask) == expected
	}
}

impl fmt::Display for Status {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:02x}", self.0)
	}
}

impl fmt::Debug for Status {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:02x} (", self.0)?;
		if self.is_busy() { write!(f, " [BUSY]")?; }
		if self.is_error() { write!(f, " [ERROR]")?; }
		if self.is_in_busy() { write!(f, " [INBUSY]")?; }
		if self.is_out_ready() { write!(f, " [OUTREADY]")?; }
		write!(f, " )")
	}
}

/// Pacing of the flash programming interface through the status flags.
///
/// Every poll is a fresh ADDRESS READ; the flags only change on the device
/// side.
pub trait StatusPolling: LowLevel {
	/// Poll until `(status & mask) != 0` equals `expected`. Blocks forever if
	/// the device never gets there.
	fn wait_for_bit(&mut self, mask: u8, expected: bool) -> Status {
		loop {
			let status = Status(self.address_read());
			if status.matches(mask, expected) {
				return status;
			}
		}
	}

	/// Like `wait_for_bit`, but gives up after `max_polls` reads.
	fn wait_for_bit_bounded(&mut self, mask: u8, expected: bool, max_polls: u32) -> crate::AResult<Status> {
		let mut last = None;
		for _ in 0..max_polls {
			let status = Status(self.address_read());
			if status.matches(mask, expected) {
				return Ok(status);
			}
			last = Some(status);
		}
		bail!(
			"C2 timeout waiting for status mask 0x{:02x} to become {} (last status: {:?})",
			mask, expected, last,
		);
	}

	/// AN127 "WriteCommand": data write, then wait until InBusy clears.
	fn data_write_with_busy(&mut self, value: u8) {
		self.data_write(value);
		self.wait_for_bit(IN_BUSY, false);
	}

	/// AN127 "ReadData": wait until OutReady is set, then data read.
	fn data_read_with_ready(&mut self) -> u8 {
		self.wait_for_bit(OUT_READY, true);
		self.data_read()
	}

	/// Reads the pending response byte; anything but 0x0d is a failure.
	fn ok_or_not(&mut self) -> bool {
		let response = self.data_read();
		if response != COMMAND_OK {
			debug!("C2 command response 0x{:02x}, expected 0x{:02x}", response, COMMAND_OK);
			return false;
		}
		true
	}

	/// Common preamble of the FPI commands: select the flash data register,
	/// send the command and check the response.
	fn command_init(&mut self, data_register: u8, command: Command) -> bool {
		trace!("C2 command {:?}", command);
		self.address_write(data_register);
		self.data_write_with_busy(command.code());
		self.wait_for_bit(OUT_READY, true);
		self.ok_or_not()
	}
}

impl<H: LowLevel + ?Sized> StatusPolling for H {
}
