use std::ops::{
	Deref,
	DerefMut,
};

use super::{
	CriticalSection,
	Direction,
	Hardware,
	Instruction,
	timing,
};

/// A single C2 frame between START and STOP.
///
/// Holds the critical section for the whole frame: dropping it sends STOP
/// and only then allows preemption again.
pub(super) struct Transaction<'a, H: ?Sized + Hardware + 'a>(CriticalSection<'a, H>);

impl<'a, H: ?Sized + Hardware> Drop for Transaction<'a, H> {
	fn drop(&mut self) {
		self._stop();
	}
}

impl<'a, H: ?Sized + Hardware> Deref for Transaction<'a, H> {
	type Target = H;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl<'a, H: ?Sized + Hardware> DerefMut for Transaction<'a, H> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.0
	}
}

pub(super) trait InternalLowLevel: Hardware {
	// C2CK low, then high; the device samples C2D on the rising edge and
	// drives its next bit afterwards.
	fn strobe(&mut self) {
		self.set_clock(false);
		self.delay_ns(timing::STROBE_LOW_NS);
		self.set_clock(true);
		self.delay_ns(timing::STROBE_HIGH_NS);
	}

	fn write_bit(&mut self, bit: bool) {
		self.set_data(bit);
		self.strobe();
	}

	// C2D must be an input
	fn read_bit(&mut self) -> bool {
		self.strobe();
		self.read_data()
	}

	// lowest two bits, LSB first
	fn write_two_bits(&mut self, value: u8) {
		self.write_bit(0 != value & 0b01);
		self.write_bit(0 != value & 0b10);
	}

	fn write_byte(&mut self, value: u8) {
		for bit in 0..8 {
			self.write_bit(0 != value & (1 << bit));
		}
	}

	// C2D must be an input
	fn read_byte(&mut self) -> u8 {
		let mut value = 0u8;
		for bit in 0..8 {
			if self.read_bit() {
				value |= 1 << bit;
			}
		}
		value
	}

	// strobe until the device releases C2D; no timeout.
	fn wait(&mut self) {
		loop {
			self.strobe();
			if self.read_data() {
				return;
			}
		}
	}

	fn _stop(&mut self) {
		self.set_data_direction(Direction::Input);
		self.strobe();
	}

	fn start_transaction(&mut self, instruction: Instruction) -> Transaction<Self> {
		let mut tx = Transaction(CriticalSection::enter(self));
		tx.strobe(); // START; C2D is still released
		tx.set_data_direction(Direction::Output);
		tx.write_two_bits(instruction.code());
		tx
	}
}

impl<H: Hardware + ?Sized> InternalLowLevel for H {
}

/// The four basic C2 transactions.
///
/// The device keeps the address register between transactions; data
/// transactions always use the register selected by the last address write.
pub trait LowLevel: Hardware {
	fn address_write(&mut self, address: u8) {
		let mut tx = self.start_transaction(Instruction::AddressWrite);
		tx.write_byte(address);
	}

	/// Returns the status byte (InBusy / OutReady flags of the FPI).
	fn address_read(&mut self) -> u8 {
		let mut tx = self.start_transaction(Instruction::AddressRead);
		tx.set_data_direction(Direction::Input);
		tx.read_byte()
	}

	fn data_write(&mut self, value: u8) {
		let mut tx = self.start_transaction(Instruction::DataWrite);
		tx.write_two_bits(0); // length: 1 byte
		tx.write_byte(value);
		tx.set_data_direction(Direction::Input);
		tx.wait();
	}

	fn data_read(&mut self) -> u8 {
		let mut tx = self.start_transaction(Instruction::DataRead);
		tx.write_two_bits(0); // length: 1 byte
		tx.set_data_direction(Direction::Input);
		tx.wait();
		tx.read_byte()
	}
}

impl<H: Hardware + ?Sized> LowLevel for H {
}
