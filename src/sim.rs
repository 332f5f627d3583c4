//! Simulated C2 target
//!
//! `SimTarget` implements `Hardware` and decodes the C2 frames from the
//! clock and data line levels, just like a device would. Behind the wire
//! protocol it emulates the C2 registers, a few SFRs and the flash
//! programming interface with an in-memory flash array.
//!
//! Protocol misuse (strobes without a critical section, frames crossing
//! critical sections, driving C2D while the device does) is recorded and
//! can be inspected with `violations()`.

use std::collections::VecDeque;

use crate::c2::{
	COMMAND_OK,
	Command,
	Direction,
	ERASE_ARMING_SEQUENCE,
	FPCTL_KEYS,
	Hardware,
	Instruction,
	MAX_BLOCK_SIZE,
	registers,
	status_bits,
};

/// Response of the simulated FPI to commands it doesn't accept.
pub const REJECTED: u8 = 0x02;

// a longer LOW period on C2CK is a reset
const RESET_MIN_LOW_NS: u64 = 20_000;
// device resets its C2 state machine when C2CK stays low longer
const STROBE_MAX_LOW_NS: u64 = 5_000;
const STROBE_MIN_LOW_NS: u64 = 80;
const STROBE_MIN_HIGH_NS: u64 = 120;
const RESET_MIN_HIGH_NS: u64 = 2_000;

// what the last rising C2CK edge was
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Rise {
	Strobe,
	Reset,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum AfterWait {
	Stop,
	Send,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Frame {
	Idle,
	Instruction { bits: u8, count: u8 },
	Length { instruction: Instruction, count: u8 },
	Receive { instruction: Instruction, value: u8, count: u8 },
	Wait { remaining: u32, then: AfterWait },
	Send { value: u8, count: u8 },
	Stop,
}

#[derive(Clone, PartialEq, Eq, Debug)]
enum Engine {
	Idle,
	Erase { arming: Vec<u8> },
	BlockHeader { command: Command, header: Vec<u8> },
	BlockWrite { address: usize, remaining: usize },
	Direct { command: Command, args: Vec<u8> },
}

pub struct SimTarget {
	// wire state
	clock: bool,
	host_data: bool,
	direction: Direction,
	device_data: bool,
	low_ns: u64,
	high_ns: u64,
	last_rise: Option<Rise>,
	frame: Frame,
	preemption_disabled: bool,

	// device
	device_id: u8,
	revision: u8,
	fpi_version: u8,
	derivative: u8,
	data_register: u8,
	address: u8,
	sfr: [u8; 256],
	flash: Vec<u8>,
	fpctl_progress: usize,
	programming: bool,
	engine: Engine,
	output: VecDeque<u8>,
	ready_countdown: u32,
	in_busy_countdown: u32,

	// behavior knobs
	ready_delay: u32,
	in_busy_polls: u32,
	wait_strobes: u32,
	rejected_commands: Vec<Command>,
	reject_arming: bool,

	// statistics
	strobes: usize,
	address_reads: usize,
	resets: usize,
	settle_ms: u32,
	commands: Vec<Command>,
	violations: Vec<String>,
}

impl Default for SimTarget {
	fn default() -> Self {
		SimTarget::new()
	}
}

impl SimTarget {
	pub fn new() -> Self {
		SimTarget {
			clock: true,
			host_data: true,
			direction: Direction::Input,
			device_data: true,
			low_ns: 0,
			high_ns: 0,
			last_rise: None,
			frame: Frame::Idle,
			preemption_disabled: false,

			device_id: 0x0a, // 'F33x
			revision: 0x02,
			fpi_version: 0x11,
			derivative: 0xd0,
			data_register: registers::FPDAT,
			address: 0,
			sfr: [0u8; 256],
			flash: vec![0xff; 16 * 1024],
			fpctl_progress: 0,
			programming: false,
			engine: Engine::Idle,
			output: VecDeque::new(),
			ready_countdown: 0,
			in_busy_countdown: 0,

			ready_delay: 3,
			in_busy_polls: 1,
			wait_strobes: 2,
			rejected_commands: Vec::new(),
			reject_arming: false,

			strobes: 0,
			address_reads: 0,
			resets: 0,
			settle_ms: 0,
			commands: Vec::new(),
			violations: Vec::new(),
		}
	}

	pub fn with_device_id(mut self, device_id: u8, revision: u8) -> Self {
		self.device_id = device_id;
		self.revision = revision;
		self
	}

	pub fn with_flash_size(mut self, size: usize) -> Self {
		self.flash = vec![0xff; size];
		self
	}

	pub fn with_data_register(mut self, register: u8) -> Self {
		self.data_register = register;
		self
	}

	/// Number of status polls until a response shows OutReady (at least 1).
	///
	/// Direct reads need at least 3 (the default): the InBusy poll after the
	/// last argument and the check that OutReady is still clear both come
	/// before the host waits for the value.
	pub fn with_ready_delay(mut self, polls: u32) -> Self {
		self.ready_delay = polls.max(1);
		self
	}

	/// Number of status polls showing InBusy after each FPDAT write.
	pub fn with_in_busy_polls(mut self, polls: u32) -> Self {
		self.in_busy_polls = polls;
		self
	}

	/// Number of strobes the device holds C2D low during WAIT.
	pub fn with_wait_strobes(mut self, strobes: u32) -> Self {
		self.wait_strobes = strobes;
		self
	}

	pub fn rejecting(mut self, command: Command) -> Self {
		self.rejected_commands.push(command);
		self
	}

	/// Answer every erase arming sequence as invalid.
	pub fn rejecting_erase_arming(mut self) -> Self {
		self.reject_arming = true;
		self
	}

	pub fn flash(&self) -> &[u8] {
		&self.flash
	}

	pub fn flash_mut(&mut self) -> &mut [u8] {
		&mut self.flash
	}

	pub fn sfr(&self, address: u8) -> u8 {
		self.sfr[address as usize]
	}

	pub fn set_sfr(&mut self, address: u8, value: u8) {
		self.sfr[address as usize] = value;
	}

	pub fn is_programming(&self) -> bool {
		self.programming
	}

	/// Commands received by the FPI, accepted or not.
	pub fn commands(&self) -> &[Command] {
		&self.commands
	}

	pub fn strobes(&self) -> usize {
		self.strobes
	}

	pub fn address_reads(&self) -> usize {
		self.address_reads
	}

	pub fn resets(&self) -> usize {
		self.resets
	}

	/// Total milliseconds the host waited with `delay_ms`.
	pub fn settle_ms(&self) -> u32 {
		self.settle_ms
	}

	pub fn violations(&self) -> &[String] {
		&self.violations
	}

	/// Skip the FPCTL key sequence.
	pub fn enter_programming_mode(&mut self) {
		self.programming = true;
	}

	/// Put a byte in the FPDAT output as if a command produced it.
	pub fn queue_response(&mut self, value: u8, ready_delay: u32) {
		if self.output.is_empty() {
			self.ready_countdown = ready_delay.max(1);
		}
		self.output.push_back(value);
	}

	fn violation(&mut self, msg: String) {
		warn!("C2 sim: {}", msg);
		self.violations.push(msg);
	}

	fn reset(&mut self) {
		debug!("C2 sim: reset");
		self.resets += 1;
		self.frame = Frame::Idle;
		self.device_data = true;
		self.address = 0;
		self.fpctl_progress = 0;
		self.programming = false;
		self.engine = Engine::Idle;
		self.output.clear();
		self.ready_countdown = 0;
		self.in_busy_countdown = 0;
	}

	fn push_output(&mut self, value: u8) {
		if self.output.is_empty() {
			self.ready_countdown = self.ready_delay;
		}
		self.output.push_back(value);
	}

	fn pop_output(&mut self) -> u8 {
		let value = self.output.pop_front().unwrap_or(0);
		if !self.output.is_empty() {
			self.ready_countdown = self.ready_delay;
		}
		value
	}

	fn status(&mut self) -> u8 {
		self.address_reads += 1;
		let mut status = 0u8;
		if self.in_busy_countdown > 0 {
			self.in_busy_countdown -= 1;
			status |= status_bits::IN_BUSY;
		} else if self.ready_countdown > 0 {
			self.ready_countdown -= 1;
		}
		if !self.output.is_empty() && 0 == self.ready_countdown {
			status |= status_bits::OUT_READY;
		}
		status
	}

	fn register_write(&mut self, value: u8) {
		let address = self.address;
		if address == registers::FPCTL {
			if value == FPCTL_KEYS[self.fpctl_progress] {
				self.fpctl_progress += 1;
				if self.fpctl_progress == FPCTL_KEYS.len() {
					debug!("C2 sim: programming mode enabled");
					self.programming = true;
					self.fpctl_progress = 0;
				}
			} else {
				self.fpctl_progress = if value == FPCTL_KEYS[0] { 1 } else { 0 };
			}
		} else if address == self.data_register {
			self.in_busy_countdown = self.in_busy_polls;
			self.fpi_input(value);
			return;
		}
		self.sfr[address as usize] = value;
	}

	fn register_read(&mut self) -> u8 {
		match self.address {
			registers::DEVICE_ID => self.device_id,
			registers::DEVICE_REVISION => self.revision,
			a if a == self.data_register => self.pop_output(),
			a => self.sfr[a as usize],
		}
	}

	fn fpi_input(&mut self, value: u8) {
		trace!("C2 sim: FPDAT <- 0x{:02x} ({:?})", value, self.engine);
		let engine = std::mem::replace(&mut self.engine, Engine::Idle);
		self.engine = match engine {
			Engine::Idle => self.fpi_command(value),
			Engine::Erase { mut arming } => {
				arming.push(value);
				if arming.len() < ERASE_ARMING_SEQUENCE.len() {
					Engine::Erase { arming }
				} else {
					if arming[..] == ERASE_ARMING_SEQUENCE[..] && !self.reject_arming {
						for b in self.flash.iter_mut() {
							*b = 0xff;
						}
						self.push_output(COMMAND_OK);
					} else {
						self.push_output(REJECTED);
					}
					Engine::Idle
				}
			},
			Engine::BlockHeader { command, mut header } => {
				header.push(value);
				if header.len() < 3 {
					Engine::BlockHeader { command, header }
				} else {
					let address = ((header[0] as usize) << 8) | header[1] as usize;
					let size = if 0 == header[2] { MAX_BLOCK_SIZE } else { header[2] as usize };
					if address + size > self.flash.len() {
						self.push_output(REJECTED);
						Engine::Idle
					} else {
						self.push_output(COMMAND_OK);
						match command {
							Command::BlockWrite => Engine::BlockWrite { address, remaining: size },
							_ => {
								for i in 0..size {
									let b = self.flash[address + i];
									self.push_output(b);
								}
								Engine::Idle
							},
						}
					}
				}
			},
			Engine::BlockWrite { address, remaining } => {
				// programming can only clear bits
				self.flash[address] &= value;
				if remaining > 1 {
					Engine::BlockWrite { address: address + 1, remaining: remaining - 1 }
				} else {
					self.push_output(COMMAND_OK);
					Engine::Idle
				}
			},
			Engine::Direct { command, mut args } => {
				args.push(value);
				match (command, args.len()) {
					(Command::DirectRead, 2) => {
						let b = self.sfr[args[0] as usize];
						self.push_output(b);
						Engine::Idle
					},
					(Command::DirectWrite, 3) => {
						self.sfr[args[0] as usize] = args[2];
						Engine::Idle
					},
					_ => Engine::Direct { command, args },
				}
			},
		};
	}

	fn fpi_command(&mut self, code: u8) -> Engine {
		// a new command discards unread responses
		self.output.clear();
		self.ready_countdown = 0;

		let command = match Command::from_code(code) {
			Some(c) => c,
			None => {
				self.push_output(REJECTED);
				return Engine::Idle;
			},
		};
		self.commands.push(command);
		if !self.programming || self.rejected_commands.contains(&command) {
			self.push_output(REJECTED);
			return Engine::Idle;
		}

		match command {
			Command::GetVersion => {
				let v = self.fpi_version;
				self.push_output(v);
				Engine::Idle
			},
			Command::GetDerivative => {
				let v = self.derivative;
				self.push_output(v);
				Engine::Idle
			},
			Command::DeviceErase => {
				self.push_output(COMMAND_OK);
				Engine::Erase { arming: Vec::new() }
			},
			Command::BlockRead | Command::BlockWrite => {
				self.push_output(COMMAND_OK);
				Engine::BlockHeader { command, header: Vec::new() }
			},
			Command::DirectRead | Command::DirectWrite => {
				self.push_output(COMMAND_OK);
				Engine::Direct { command, args: Vec::new() }
			},
		}
	}

	fn host_bit(&mut self) -> bool {
		if self.direction != Direction::Output {
			let msg = format!("expected host to drive C2D in {:?}", self.frame);
			self.violation(msg);
		}
		self.host_data
	}

	fn expect_released(&mut self) {
		if self.direction != Direction::Input {
			let msg = format!("host drives C2D in {:?}", self.frame);
			self.violation(msg);
		}
	}

	// rising C2CK edge
	fn strobe(&mut self) {
		self.strobes += 1;
		if !self.preemption_disabled {
			let msg = format!("strobe outside of critical section in {:?}", self.frame);
			self.violation(msg);
		}
		if self.low_ns > STROBE_MAX_LOW_NS && self.frame != Frame::Idle {
			let msg = format!("C2CK low for {} ns in {:?}", self.low_ns, self.frame);
			self.violation(msg);
		}
		if self.low_ns < STROBE_MIN_LOW_NS {
			let msg = format!("C2CK low for only {} ns in {:?}", self.low_ns, self.frame);
			self.violation(msg);
		}

		self.frame = match self.frame {
			Frame::Idle => {
				// START
				self.expect_released();
				Frame::Instruction { bits: 0, count: 0 }
			},
			Frame::Instruction { bits, count } => {
				let bits = if self.host_bit() { bits | (1 << count) } else { bits };
				if count < 1 {
					Frame::Instruction { bits, count: count + 1 }
				} else {
					match Instruction::from_code(bits) {
						Instruction::AddressWrite => Frame::Receive {
							instruction: Instruction::AddressWrite,
							value: 0,
							count: 0,
						},
						Instruction::AddressRead => {
							let value = self.status();
							Frame::Send { value, count: 0 }
						},
						instruction => Frame::Length { instruction, count: 0 },
					}
				}
			},
			Frame::Length { instruction, count } => {
				if self.host_bit() {
					self.violation("only single byte data transfers are supported".to_owned());
				}
				if count < 1 {
					Frame::Length { instruction, count: count + 1 }
				} else if instruction == Instruction::DataWrite {
					Frame::Receive { instruction, value: 0, count: 0 }
				} else {
					Frame::Wait { remaining: self.wait_strobes, then: AfterWait::Send }
				}
			},
			Frame::Receive { instruction, value, count } => {
				let value = if self.host_bit() { value | (1 << count) } else { value };
				if count < 7 {
					Frame::Receive { instruction, value, count: count + 1 }
				} else if instruction == Instruction::AddressWrite {
					self.address = value;
					Frame::Stop
				} else {
					self.register_write(value);
					Frame::Wait { remaining: self.wait_strobes, then: AfterWait::Stop }
				}
			},
			Frame::Wait { remaining, then } => {
				self.expect_released();
				if remaining > 0 {
					self.device_data = false;
					Frame::Wait { remaining: remaining - 1, then }
				} else {
					self.device_data = true;
					match then {
						AfterWait::Stop => Frame::Stop,
						AfterWait::Send => {
							let value = self.register_read();
							Frame::Send { value, count: 0 }
						},
					}
				}
			},
			Frame::Send { value, count } => {
				self.expect_released();
				self.device_data = 0 != value & (1 << count);
				if count < 7 {
					Frame::Send { value, count: count + 1 }
				} else {
					Frame::Stop
				}
			},
			Frame::Stop => {
				self.expect_released();
				self.device_data = true;
				Frame::Idle
			},
		};
	}
}

impl Hardware for SimTarget {
	fn set_clock(&mut self, high: bool) {
		if high && !self.clock {
			self.clock = true;
			self.high_ns = 0;
			if self.low_ns >= RESET_MIN_LOW_NS {
				if !self.preemption_disabled {
					self.violation("reset pulse outside of critical section".to_owned());
				}
				self.reset();
				self.last_rise = Some(Rise::Reset);
			} else {
				self.strobe();
				self.last_rise = Some(Rise::Strobe);
			}
		} else if !high && self.clock {
			let min_high = match self.last_rise {
				Some(Rise::Strobe) => STROBE_MIN_HIGH_NS,
				Some(Rise::Reset) => RESET_MIN_HIGH_NS,
				None => 0,
			};
			if self.high_ns < min_high {
				let msg = format!("C2CK high for only {} ns after {:?}", self.high_ns, self.last_rise);
				self.violation(msg);
			}
			self.clock = false;
			self.low_ns = 0;
		}
	}

	fn set_data(&mut self, high: bool) {
		self.host_data = high;
	}

	fn read_data(&mut self) -> bool {
		match self.direction {
			Direction::Input => self.device_data,
			Direction::Output => self.host_data,
		}
	}

	fn set_data_direction(&mut self, direction: Direction) {
		self.direction = direction;
	}

	fn delay_ns(&mut self, ns: u32) {
		if self.clock {
			self.high_ns += ns as u64;
		} else {
			self.low_ns += ns as u64;
		}
	}

	fn delay_ms(&mut self, ms: u32) {
		self.settle_ms += ms;
		if self.clock {
			self.high_ns += ms as u64 * 1_000_000;
		}
	}

	fn disable_preemption(&mut self) {
		if self.preemption_disabled {
			self.violation("nested critical section".to_owned());
		}
		self.preemption_disabled = true;
	}

	fn enable_preemption(&mut self) {
		if !self.preemption_disabled {
			self.violation("critical section ended twice".to_owned());
		}
		if self.frame != Frame::Idle {
			let msg = format!("critical section ended within frame {:?}", self.frame);
			self.violation(msg);
		}
		self.preemption_disabled = false;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use crate::c2::LowLevel;

	#[test]
	fn address_write_selects_register() {
		let mut target = SimTarget::new();
		target.address_write(0x8f);
		target.data_write(0x42);
		assert_eq!(target.sfr(0x8f), 0x42);
		assert_eq!(target.data_read(), 0x42);
		assert!(target.violations().is_empty());
	}

	#[test]
	fn address_read_returns_status() {
		let mut target = SimTarget::new();
		assert_eq!(target.address_read(), 0x00);
		target.queue_response(0x0d, 1);
		assert_eq!(target.address_read(), status_bits::OUT_READY);
		assert!(target.violations().is_empty());
	}

	#[test]
	fn device_id_registers() {
		let mut target = SimTarget::new().with_device_id(0x16, 0x01);
		target.address_write(registers::DEVICE_ID);
		assert_eq!(target.data_read(), 0x16);
		target.address_write(registers::DEVICE_REVISION);
		assert_eq!(target.data_read(), 0x01);
	}

	#[test]
	fn fpctl_keys_enable_programming() {
		let mut target = SimTarget::new();
		target.address_write(registers::FPCTL);
		for &key in FPCTL_KEYS.iter() {
			assert!(!target.is_programming());
			target.data_write(key);
		}
		assert!(target.is_programming());
	}

	#[test]
	fn fpctl_wrong_order_does_not_enable() {
		let mut target = SimTarget::new();
		target.address_write(registers::FPCTL);
		for &key in [0x02, 0x01, 0x04].iter() {
			target.data_write(key);
		}
		assert!(!target.is_programming());
	}

	#[test]
	fn strobes_without_critical_section_are_flagged() {
		let mut target = SimTarget::new();
		target.set_clock(false);
		target.delay_ns(250);
		target.set_clock(true);
		assert_eq!(target.violations().len(), 1);
	}

	#[test]
	fn long_low_pulse_resets() {
		let mut target = SimTarget::new();
		target.enter_programming_mode();
		target.disable_preemption();
		target.set_clock(false);
		target.delay_us(25);
		target.set_clock(true);
		target.enable_preemption();
		assert_eq!(target.resets(), 1);
		assert_eq!(target.strobes(), 0);
		assert!(!target.is_programming());
		assert!(target.violations().is_empty());
	}

	#[test]
	fn short_clock_phases_are_flagged() {
		let mut target = SimTarget::new();
		target.disable_preemption();
		target.set_clock(false);
		target.delay_ns(40);
		target.set_clock(true);
		assert_eq!(target.violations().len(), 1);
		assert!(target.violations()[0].contains("low for only 40 ns"));

		target.set_clock(false);
		assert_eq!(target.violations().len(), 2);
		assert!(target.violations()[1].contains("high for only 0 ns"));
	}

	#[test]
	fn short_high_after_reset_is_flagged() {
		let mut target = SimTarget::new();
		target.disable_preemption();
		target.set_clock(false);
		target.delay_us(25);
		target.set_clock(true);
		target.delay_us(1);
		target.set_clock(false);
		assert_eq!(target.resets(), 1);
		assert_eq!(target.violations().len(), 1);
		assert!(target.violations()[0].contains("after Some(Reset)"));
	}
}
