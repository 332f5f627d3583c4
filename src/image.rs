//! Raw binary images: program, verify and dump flash in block sized chunks.

use crate::c2::{
	BlockSize,
	Flash,
	Hardware,
	MAX_BLOCK_SIZE,
};

// the FPI addresses flash with 16 bits
const ADDRESS_SPACE: usize = 0x1_0000;

fn check_range(base: u16, len: usize) -> crate::AResult<()> {
	ensure!(len > 0, "empty image");
	ensure!(base as usize + len <= ADDRESS_SPACE,
		"0x{:x} bytes at 0x{:04x} exceed the 16-bit flash address space", len, base
	);
	Ok(())
}

fn chunks(base: u16, len: usize) -> impl Iterator<Item = (u16, BlockSize, std::ops::Range<usize>)> {
	(0..len).step_by(MAX_BLOCK_SIZE).map(move |offset| {
		let end = std::cmp::min(offset + MAX_BLOCK_SIZE, len);
		let size = BlockSize::new(end - offset).expect("chunk sizes are within 1..=256");
		((base as usize + offset) as u16, size, offset..end)
	})
}

/// Write `image` at `base`, then read it back and compare.
///
/// Flash can only be programmed after an erase; pass `erase = false` only if
/// the target region is known to be blank.
pub fn flash_image<H: Hardware>(flash: &mut Flash<H>, base: u16, image: &[u8], erase: bool) -> crate::AResult<()> {
	check_range(base, image.len())?;

	if erase {
		info!("Erasing device");
		ensure!(flash.erase_device(), "device erase rejected");
	}

	info!("Writing {} bytes at 0x{:04x}", image.len(), base);
	for (address, size, range) in chunks(base, image.len()) {
		let written = flash.write_flash_block(address, &image[range], size.0);
		if written != size.len() {
			bail!("block write of {} bytes at 0x{:04x} rejected", size.len(), address);
		}
	}

	info!("Verifying");
	verify_image(flash, base, image)
}

pub fn verify_image<H: Hardware>(flash: &mut Flash<H>, base: u16, image: &[u8]) -> crate::AResult<()> {
	let data = read_image(flash, base, image.len())?;
	for (offset, (&expected, &actual)) in image.iter().zip(data.iter()).enumerate() {
		ensure!(expected == actual,
			"Verify failed at 0x{:04x}: expected 0x{:02x}, flash is 0x{:02x}", base as usize + offset, expected, actual
		);
	}
	Ok(())
}

pub fn read_image<H: Hardware>(flash: &mut Flash<H>, base: u16, len: usize) -> crate::AResult<Vec<u8>> {
	check_range(base, len)?;

	let mut buf = vec![0u8; len];
	for (address, size, range) in chunks(base, len) {
		let read = flash.read_flash_block(address, &mut buf[range], size.0);
		if read != size.len() {
			bail!("block read of {} bytes at 0x{:04x} rejected", size.len(), address);
		}
	}
	Ok(buf)
}
