//! Linux host backend: C2CK and C2D on two lines of a GPIO character device.
//!
//! Userspace can't disable interrupts; the closest we get is blocking all
//! signals for the duration of a C2 frame so no signal handler stretches a
//! clock pulse. The kernel may still preempt us: run with a realtime
//! scheduling policy on an otherwise idle core if frames get corrupted.

mod chip;
mod signals;

pub use self::chip::{
	ChipLines,
	DEFAULT_CHIP,
};
pub use self::signals::SignalBlocker;

use std::path::Path;

use gpiocdev::line::Offset;

use crate::c2::{
	Direction,
	Hardware,
};

/// Level and direction access to requested GPIO lines.
pub trait Lines {
	fn set(&mut self, offset: Offset, high: bool) -> gpiocdev::Result<()>;
	fn get(&mut self, offset: Offset) -> gpiocdev::Result<bool>;
	/// `high` is the level driven when switching to output.
	fn set_direction(&mut self, offset: Offset, direction: Direction, high: bool) -> gpiocdev::Result<()>;
}

pub struct LinuxGpio<L: Lines = ChipLines> {
	lines: L,
	clock: Offset,
	data: Offset,
	data_level: bool,
	direction: Direction,
	signals: SignalBlocker,
}

impl LinuxGpio {
	pub fn open(chip: &Path, clock: Offset, data: Offset) -> crate::AResult<Self> {
		ensure!(clock != data, "C2CK and C2D need different GPIO lines (both {})", clock);
		let lines = with_context!(
			("requesting C2CK {} / C2D {} on {}", clock, data, chip.display()),
			Ok(ChipLines::request(chip, clock, data)?)
		)?;
		debug!("C2 lines on {}: C2CK {}, C2D {}", chip.display(), clock, data);
		Ok(LinuxGpio::with_lines(lines, clock, data))
	}
}

impl<L: Lines> LinuxGpio<L> {
	/// Wrap already requested lines; C2CK must be an output driven high and
	/// C2D an input.
	pub fn with_lines(lines: L, clock: Offset, data: Offset) -> Self {
		LinuxGpio {
			lines,
			clock,
			data,
			data_level: true,
			direction: Direction::Input,
			signals: SignalBlocker::new(),
		}
	}
}

impl<L: Lines> Hardware for LinuxGpio<L> {
	fn set_clock(&mut self, high: bool) {
		let clock = self.clock;
		self.lines.set(clock, high)
			.unwrap_or_else(|e| panic!("C2CK (line {}): write failed: {}", clock, e));
	}

	fn set_data(&mut self, high: bool) {
		self.data_level = high;
		if self.direction == Direction::Output {
			let data = self.data;
			self.lines.set(data, high)
				.unwrap_or_else(|e| panic!("C2D (line {}): write failed: {}", data, e));
		}
	}

	fn read_data(&mut self) -> bool {
		let data = self.data;
		self.lines.get(data)
			.unwrap_or_else(|e| panic!("C2D (line {}): read failed: {}", data, e))
	}

	fn set_data_direction(&mut self, direction: Direction) {
		if direction == self.direction {
			return;
		}
		let data = self.data;
		self.lines.set_direction(data, direction, self.data_level)
			.unwrap_or_else(|e| panic!("C2D (line {}): switching to {:?} failed: {}", data, direction, e));
		self.direction = direction;
	}

	fn disable_preemption(&mut self) {
		self.signals.block();
	}

	fn enable_preemption(&mut self) {
		self.signals.restore();
	}
}
