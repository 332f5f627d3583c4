use std::path::Path;

use gpiocdev::line::{
	Offset,
	Value,
};
use gpiocdev::request::{
	Config,
	Request,
};

use super::Lines;
use crate::c2::Direction;

pub const DEFAULT_CHIP: &str = "/dev/gpiochip0";

fn level(high: bool) -> Value {
	if high { Value::Active } else { Value::Inactive }
}

// C2CK is always an output driven high while the request is reconfigured
fn line_config(clock: Offset, data: Offset, direction: Direction, data_high: bool) -> Config {
	let mut config = Config::default();
	config.with_line(clock).as_output(Value::Active);
	match direction {
		Direction::Output => config.with_line(data).as_output(level(data_high)),
		Direction::Input => config.with_line(data).as_input(),
	};
	config
}

/// C2CK and C2D requested together from a GPIO character device.
pub struct ChipLines {
	request: Request,
	clock: Offset,
}

impl ChipLines {
	/// Request both lines; C2CK as output driven high, C2D as input.
	pub fn request(chip: &Path, clock: Offset, data: Offset) -> gpiocdev::Result<Self> {
		let request = Request::from_config(line_config(clock, data, Direction::Input, true))
			.on_chip(chip)
			.with_consumer("c2-flash")
			.request()?;

		Ok(ChipLines {
			request,
			clock,
		})
	}
}

impl Lines for ChipLines {
	fn set(&mut self, offset: Offset, high: bool) -> gpiocdev::Result<()> {
		self.request.set_value(offset, level(high))?;
		Ok(())
	}

	fn get(&mut self, offset: Offset) -> gpiocdev::Result<bool> {
		Ok(self.request.value(offset)? == Value::Active)
	}

	// the whole request gets reconfigured, so C2D is the only other line
	fn set_direction(&mut self, offset: Offset, direction: Direction, high: bool) -> gpiocdev::Result<()> {
		self.request.reconfigure(&line_config(self.clock, offset, direction, high))
	}
}
