use super::{
	Command,
	CriticalSection,
	Direction,
	ERASE_ARMING_SEQUENCE,
	FPCTL_KEYS,
	Hardware,
	LowLevel,
	MAX_BLOCK_SIZE,
	Status,
	StatusPolling,
	registers,
	status_bits::*,
	timing,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FlashConfig {
	/// Address of FPDAT; differs between device families.
	pub data_register: u8,
}

impl Default for FlashConfig {
	fn default() -> Self {
		FlashConfig {
			data_register: registers::FPDAT,
		}
	}
}

/// Size of a block read/write as sent to the device: 1..=255 as is, 256 as 0.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct BlockSize(pub u8);

impl BlockSize {
	pub const MAX: BlockSize = BlockSize(0);

	/// `None` unless `1 <= len <= 256`.
	pub fn new(len: usize) -> Option<Self> {
		match len {
			1..=255 => Some(BlockSize(len as u8)),
			MAX_BLOCK_SIZE => Some(BlockSize::MAX),
			_ => None,
		}
	}

	pub fn len(self) -> usize {
		if 0 == self.0 { MAX_BLOCK_SIZE } else { self.0 as usize }
	}
}

/// A target halted in programming mode, talking through `H`.
pub struct Flash<H: Hardware> {
	hardware: H,
	config: FlashConfig,
}

impl<H: Hardware> Flash<H> {
	pub fn new(hardware: H) -> Self {
		Flash::with_config(hardware, FlashConfig::default())
	}

	pub fn with_config(hardware: H, config: FlashConfig) -> Self {
		Flash {
			hardware,
			config,
		}
	}

	pub fn config(&self) -> FlashConfig {
		self.config
	}

	pub fn hardware(&self) -> &H {
		&self.hardware
	}

	pub fn hardware_mut(&mut self) -> &mut H {
		&mut self.hardware
	}

	pub fn into_hardware(self) -> H {
		self.hardware
	}

	fn command_init(&mut self, command: Command) -> bool {
		if !self.hardware.command_init(self.config.data_register, command) {
			debug!("C2 command {:?} rejected", command);
			return false;
		}
		true
	}

	/// Reset pulse on C2CK; also makes the device listen on C2.
	pub fn reset(&mut self) {
		debug!("C2 reset");
		let mut cs = CriticalSection::enter(&mut self.hardware);
		cs.set_data_direction(Direction::Input);
		cs.set_clock(false);
		cs.delay_us(timing::RESET_LOW_US);
		cs.set_clock(true);
		cs.delay_us(timing::RESET_HIGH_US);
	}

	/// Reset, halt the core and enable the flash programming interface.
	///
	/// The device gives no feedback whether this worked.
	pub fn init_programming_interface(&mut self) {
		self.reset();
		self.hardware.address_write(registers::FPCTL);
		for &key in FPCTL_KEYS.iter() {
			self.hardware.data_write(key);
		}
		self.hardware.delay_ms(timing::PROGRAMMING_SETTLE_MS);
		debug!("C2 programming interface enabled");
	}

	pub fn write_sfr(&mut self, address: u8, value: u8) {
		self.hardware.address_write(address);
		self.hardware.data_write(value);
	}

	pub fn read_sfr(&mut self, address: u8) -> u8 {
		self.hardware.address_write(address);
		self.hardware.data_read()
	}

	pub fn device_id(&mut self) -> u8 {
		self.read_sfr(registers::DEVICE_ID)
	}

	pub fn device_revision(&mut self) -> u8 {
		self.read_sfr(registers::DEVICE_REVISION)
	}

	// query commands answer with the value directly, no status byte
	fn query(&mut self, command: Command) -> u8 {
		self.hardware.address_write(self.config.data_register);
		self.hardware.data_write_with_busy(command.code());
		self.hardware.data_read_with_ready()
	}

	/// Version of the flash programming interface.
	pub fn get_version(&mut self) -> u8 {
		self.query(Command::GetVersion)
	}

	pub fn get_derivative(&mut self) -> u8 {
		self.query(Command::GetDerivative)
	}

	/// Check the device answers status polls (InBusy clear), giving up after
	/// `max_polls` polls instead of hanging on a missing target.
	pub fn ensure_responsive(&mut self, max_polls: u32) -> crate::AResult<Status> {
		self.hardware.wait_for_bit_bounded(IN_BUSY, false, max_polls)
	}

	pub fn write_direct(&mut self, address: u8, value: u8) -> bool {
		if !self.command_init(Command::DirectWrite) {
			return false;
		}
		self.hardware.data_write_with_busy(address);
		self.hardware.data_write_with_busy(1); // byte count
		self.hardware.data_write_with_busy(value);
		true
	}

	/// `None` if the device rejected the command.
	pub fn read_direct(&mut self, address: u8) -> Option<u8> {
		if !self.command_init(Command::DirectRead) {
			return None;
		}
		self.hardware.data_write_with_busy(address);
		self.hardware.data_write_with_busy(1); // byte count
		// AN127: OutReady must drop before the value gets ready
		self.hardware.wait_for_bit(OUT_READY, false);
		Some(self.hardware.data_read_with_ready())
	}

	/// Erase the complete flash (page erase is not supported).
	pub fn erase_device(&mut self) -> bool {
		debug!("C2 device erase");
		if !self.command_init(Command::DeviceErase) {
			return false;
		}
		for &b in ERASE_ARMING_SEQUENCE.iter() {
			self.hardware.data_write_with_busy(b);
		}
		self.hardware.wait_for_bit(OUT_READY, true);
		self.hardware.ok_or_not()
	}

	// command, address (MSB first) and size; checks the response
	fn block_header(&mut self, command: Command, address: u16, size: BlockSize) -> bool {
		if !self.command_init(command) {
			return false;
		}
		self.hardware.data_write_with_busy((address >> 8) as u8);
		self.hardware.data_write_with_busy(address as u8);
		self.hardware.data_write_with_busy(size.0);
		self.hardware.wait_for_bit(OUT_READY, true);
		if !self.hardware.ok_or_not() {
			warn!("C2 {:?} at 0x{:04x} ({} bytes) rejected", command, address, size.len());
			return false;
		}
		true
	}

	/// Write `size` bytes (0 meaning 256) from `data` to flash at `address`.
	///
	/// Returns the number of bytes sent, 0 if the device rejected the
	/// request. Flash only gets programmed correctly after it was erased.
	pub fn write_flash_block(&mut self, address: u16, data: &[u8], size: u8) -> usize {
		let size = BlockSize(size);
		assert!(data.len() >= size.len(), "block data shorter than block size");
		trace!("C2 block write 0x{:04x} ({} bytes)", address, size.len());

		if !self.block_header(Command::BlockWrite, address, size) {
			return 0;
		}
		for &b in &data[..size.len()] {
			self.hardware.data_write_with_busy(b);
		}
		// the final response isn't checked
		self.hardware.wait_for_bit(OUT_READY, true);
		size.len()
	}

	/// Read `size` bytes (0 meaning 256) from flash at `address` into `target`.
	///
	/// Returns the number of bytes read, 0 if the device rejected the request.
	pub fn read_flash_block(&mut self, address: u16, target: &mut [u8], size: u8) -> usize {
		let size = BlockSize(size);
		assert!(target.len() >= size.len(), "block buffer shorter than block size");
		trace!("C2 block read 0x{:04x} ({} bytes)", address, size.len());

		if !self.block_header(Command::BlockRead, address, size) {
			return 0;
		}
		for t in target[..size.len()].iter_mut() {
			*t = self.hardware.data_read_with_ready();
		}
		size.len()
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::sim::SimTarget;

	fn programming_target() -> Flash<SimTarget> {
		let mut flash = Flash::new(SimTarget::new());
		flash.init_programming_interface();
		flash
	}

	#[test]
	fn block_size_encoding() {
		assert_eq!(BlockSize::new(0), None);
		assert_eq!(BlockSize::new(1), Some(BlockSize(1)));
		assert_eq!(BlockSize::new(200), Some(BlockSize(200)));
		assert_eq!(BlockSize::new(256), Some(BlockSize(0)));
		assert_eq!(BlockSize::new(257), None);
		assert_eq!(BlockSize(0).len(), 256);
		assert_eq!(BlockSize(200).len(), 200);
	}

	#[test]
	fn init_enters_programming_mode() {
		let flash = programming_target();
		let sim = flash.hardware();
		assert!(sim.is_programming());
		assert_eq!(sim.resets(), 1);
		assert!(sim.settle_ms() >= 20);
		assert!(sim.violations().is_empty());
	}

	#[test]
	fn reset_leaves_programming_mode() {
		let mut flash = programming_target();
		flash.reset();
		assert!(!flash.hardware().is_programming());
		assert!(!flash.erase_device());
	}

	#[test]
	fn reset_pulse_timing() {
		let mut flash = Flash::new(SimTarget::new());
		flash.reset();
		// the next frame's first falling edge ends the high phase
		assert_eq!(flash.device_id(), 0x0a);
		let sim = flash.hardware();
		assert_eq!(sim.resets(), 1);
		assert!(sim.violations().is_empty(), "{:?}", sim.violations());
	}

	#[test]
	fn device_identification() {
		let mut flash = Flash::new(SimTarget::new().with_device_id(0x16, 0x03));
		flash.init_programming_interface();
		assert_eq!(flash.device_id(), 0x16);
		assert_eq!(flash.device_revision(), 0x03);
		assert_eq!(flash.get_version(), 0x11);
		assert_eq!(flash.get_derivative(), 0xd0);
		assert!(flash.hardware().violations().is_empty());
	}

	#[test]
	fn sfr_access() {
		let mut flash = programming_target();
		flash.write_sfr(0xb6, 0x10);
		assert_eq!(flash.hardware().sfr(0xb6), 0x10);
		flash.hardware_mut().set_sfr(0xb2, 0x83);
		assert_eq!(flash.read_sfr(0xb2), 0x83);
	}

	#[test]
	fn direct_write_then_read() {
		let mut flash = programming_target();
		for &(address, value) in [(0x00u8, 0x00u8), (0x80, 0x5a), (0xb2, 0x83), (0xff, 0xff)].iter() {
			assert!(flash.write_direct(address, value));
			assert_eq!(flash.read_direct(address), Some(value));
		}
		assert!(flash.hardware().violations().is_empty());
	}

	#[test]
	fn direct_read_distinguishes_zero_from_failure() {
		let mut flash = programming_target();
		assert_eq!(flash.read_direct(0x90), Some(0));

		let mut flash = Flash::new(SimTarget::new().rejecting(Command::DirectRead));
		flash.init_programming_interface();
		assert_eq!(flash.read_direct(0x90), None);
	}

	#[test]
	fn direct_write_rejected() {
		let mut flash = Flash::new(SimTarget::new().rejecting(Command::DirectWrite));
		flash.init_programming_interface();
		assert!(!flash.write_direct(0x80, 0x01));
		assert_eq!(flash.hardware().sfr(0x80), 0x00);
	}

	#[test]
	fn erase_device_clears_flash() {
		let mut flash = programming_target();
		flash.hardware_mut().flash_mut()[0x100] = 0x12;
		assert!(flash.erase_device());
		assert!(flash.hardware().flash().iter().all(|&b| b == 0xff));
	}

	#[test]
	fn erase_device_rejected_arming() {
		let mut flash = Flash::new(SimTarget::new().rejecting_erase_arming());
		flash.init_programming_interface();
		flash.hardware_mut().flash_mut()[0] = 0x00;
		assert!(!flash.erase_device());
		assert_eq!(flash.hardware().flash()[0], 0x00);
	}

	#[test]
	fn block_write_and_read_200_bytes() {
		let mut flash = programming_target();
		let data: Vec<u8> = (0..200).map(|i| (i * 7) as u8).collect();
		assert_eq!(flash.write_flash_block(0x0400, &data, 200), 200);
		assert_eq!(&flash.hardware().flash()[0x0400..0x0400 + 200], &data[..]);
		assert_eq!(flash.hardware().flash()[0x0400 + 200], 0xff);

		let mut buf = vec![0u8; 200];
		assert_eq!(flash.read_flash_block(0x0400, &mut buf, 200), 200);
		assert_eq!(buf, data);
		assert!(flash.hardware().violations().is_empty());
	}

	#[test]
	fn block_size_zero_means_256() {
		let mut flash = programming_target();
		let data: Vec<u8> = (0..256).map(|i| i as u8).collect();
		assert_eq!(flash.write_flash_block(0x1000, &data, 0), 256);
		assert_eq!(&flash.hardware().flash()[0x1000..0x1100], &data[..]);

		let mut buf = vec![0u8; 256];
		assert_eq!(flash.read_flash_block(0x1000, &mut buf, 0), 256);
		assert_eq!(buf, data);
	}

	#[test]
	fn block_transfers_rejected() {
		let mut flash = Flash::new(
			SimTarget::new()
				.rejecting(Command::BlockWrite)
				.rejecting(Command::BlockRead)
		);
		flash.init_programming_interface();
		let data = [0u8; 16];
		assert_eq!(flash.write_flash_block(0, &data, 16), 0);
		assert!(flash.hardware().flash().iter().all(|&b| b == 0xff));
		let mut buf = [0u8; 16];
		assert_eq!(flash.read_flash_block(0, &mut buf, 16), 0);
	}

	#[test]
	fn block_out_of_range_rejected_by_status() {
		let mut flash = Flash::new(SimTarget::new().with_flash_size(0x1000));
		flash.init_programming_interface();
		let data = [0u8; 32];
		assert_eq!(flash.write_flash_block(0x0ff0, &data, 32), 0);
		let mut buf = [0u8; 32];
		assert_eq!(flash.read_flash_block(0x0ff0, &mut buf, 32), 0);
		assert!(flash.hardware().violations().is_empty());
	}

	#[test]
	#[should_panic(expected = "block data shorter")]
	fn block_write_short_data_panics() {
		let mut flash = programming_target();
		flash.write_flash_block(0, &[0u8; 10], 0);
	}

	#[test]
	fn alternative_data_register() {
		let config = FlashConfig {
			data_register: registers::FPDAT_ALT,
		};
		let mut flash = Flash::with_config(SimTarget::new().with_data_register(registers::FPDAT_ALT), config);
		flash.init_programming_interface();
		assert!(flash.erase_device());
		assert_eq!(flash.write_flash_block(0, &[1, 2, 3], 3), 3);
		assert_eq!(&flash.hardware().flash()[..3], &[1, 2, 3]);
	}

	#[test]
	fn responsive_probe() {
		let mut flash = programming_target();
		assert!(flash.ensure_responsive(4).is_ok());

		// a target stuck in InBusy
		let mut flash = Flash::new(SimTarget::new().with_in_busy_polls(100));
		flash.init_programming_interface();
		flash.hardware_mut().address_write(registers::FPDAT);
		flash.hardware_mut().data_write(0x55);
		assert!(flash.ensure_responsive(10).is_err());
	}

	#[test]
	fn transactions_stay_within_critical_sections() {
		let mut flash = programming_target();
		assert!(flash.erase_device());
		let data = [0x3cu8; 64];
		assert_eq!(flash.write_flash_block(0x2000, &data, 64), 64);
		let mut buf = [0u8; 64];
		assert_eq!(flash.read_flash_block(0x2000, &mut buf, 64), 64);
		assert!(flash.write_direct(0xa4, 0x01));
		assert_eq!(flash.read_direct(0xa4), Some(0x01));
		assert!(flash.hardware().strobes() > 0);
		assert_eq!(flash.hardware().violations(), &[] as &[String]);
	}

	#[test]
	fn slow_device_wait_states() {
		let mut flash = Flash::new(
			SimTarget::new()
				.with_wait_strobes(40)
				.with_in_busy_polls(5)
				.with_ready_delay(8)
		);
		flash.init_programming_interface();
		assert!(flash.erase_device());
		assert_eq!(flash.write_flash_block(0x10, &[0xaa; 8], 8), 8);
		assert_eq!(flash.read_direct(0x10), Some(0));
		let mut buf = [0u8; 8];
		assert_eq!(flash.read_flash_block(0x10, &mut buf, 8), 8);
		assert_eq!(buf, [0xaa; 8]);
	}
}
