/// 2-bit C2 instruction codes, sent LSB first after START.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Instruction {
	DataRead = 0b00,
	DataWrite = 0b01,
	AddressRead = 0b10,
	AddressWrite = 0b11,
}

impl Instruction {
	pub fn code(self) -> u8 {
		self as u8
	}

	pub fn from_code(code: u8) -> Self {
		match code & 0b11 {
			0b00 => Instruction::DataRead,
			0b01 => Instruction::DataWrite,
			0b10 => Instruction::AddressRead,
			_ => Instruction::AddressWrite,
		}
	}
}

/// Flash programming interface commands, written to FPDAT.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Command {
	GetVersion = 0x01,
	GetDerivative = 0x02,
	DeviceErase = 0x03,
	BlockRead = 0x06,
	BlockWrite = 0x07,
	DirectRead = 0x09,
	DirectWrite = 0x0a,
}

impl Command {
	pub fn code(self) -> u8 {
		self as u8
	}

	pub fn from_code(code: u8) -> Option<Self> {
		Some(match code {
			0x01 => Command::GetVersion,
			0x02 => Command::GetDerivative,
			0x03 => Command::DeviceErase,
			0x06 => Command::BlockRead,
			0x07 => Command::BlockWrite,
			0x09 => Command::DirectRead,
			0x0a => Command::DirectWrite,
			_ => return None,
		})
	}
}

// not issued by this crate: page erase doesn't erase anything on the
// devices we tried, and indirect access isn't needed for programming.
#[allow(dead_code)]
pub(crate) mod unused_commands {
	pub const PAGE_ERASE: u8 = 0x08;
	pub const INDIRECT_READ: u8 = 0x0b;
	pub const INDIRECT_WRITE: u8 = 0x0c;
}

pub mod registers {
	pub const DEVICE_ID: u8 = 0x00;
	pub const DEVICE_REVISION: u8 = 0x01;
	pub const FPCTL: u8 = 0x02; // flash programming control
	pub const FPDAT: u8 = 0xb4; // most devices; check the datasheet
	pub const FPDAT_ALT: u8 = 0xad; // 'F34x, 'F38x, 'T62x/'T32x, EFM8UB2
	pub const FLKEY: u8 = 0xb7; // 'F35x
}

/// Bits in the status byte returned by ADDRESS READ.
pub mod status_bits {
	pub const BUSY: u8 = 1 << 7;
	pub const ERROR: u8 = 1 << 6;
	pub const IN_BUSY: u8 = 1 << 1;
	pub const OUT_READY: u8 = 1 << 0;
}

/// Response byte of a command accepted by the flash programming interface.
pub const COMMAND_OK: u8 = 0x0d;

/// Written to FPCTL (in this order) to halt the core and enable programming.
pub const FPCTL_KEYS: [u8; 3] = [0x02, 0x04, 0x01];

/// Must follow the device erase command, guards against stray erase commands.
pub const ERASE_ARMING_SEQUENCE: [u8; 3] = [0xde, 0xad, 0xa5];

/// Largest block for block read/write; encoded as 0 on the wire.
pub const MAX_BLOCK_SIZE: usize = 256;
