#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate c2_flash;
use c2_flash::*;

use std::fs;
use std::io::{
	self,
	Write,
};
use std::path::Path;
use std::process::exit;

use failure::ResultExt;

use c2_flash::c2::{
	Flash,
	FlashConfig,
	Hardware,
};

fn parse_number(s: &str) -> AResult<u32> {
	if s.starts_with("0x") || s.starts_with("0X") {
		Ok(u32::from_str_radix(&s[2..], 16)?)
	} else {
		Ok(s.parse::<u32>()?)
	}
}

fn get_number(matches: &clap::ArgMatches, name: &str, max: u32) -> AResult<u32> {
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	let value = parse_number(param).map_err(|e| {
		let msg = format!("invalid parameter {}: {}", name, e);
		failure::Error::from(e.context(msg))
	})?;
	ensure!(value <= max, "invalid parameter {}: {} (maximum 0x{:x})", name, param, max);
	Ok(value)
}

fn get_optional_number(matches: &clap::ArgMatches, name: &str, max: u32, default: u32) -> AResult<u32> {
	if matches.is_present(name) {
		get_number(matches, name, max)
	} else {
		Ok(default)
	}
}

fn info<H: Hardware>(flash: &mut Flash<H>) -> AResult<()> {
	println!("Device ID:       0x{:02x}", flash.device_id());
	println!("Revision:        0x{:02x}", flash.device_revision());
	println!("FPI version:     0x{:02x}", flash.get_version());
	println!("Derivative:      0x{:02x}", flash.get_derivative());
	Ok(())
}

fn write_file<H: Hardware>(flash: &mut Flash<H>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let path = sub_m.value_of("FILE").ok_or_else(|| format_err!("missing parameter FILE"))?;
	let address = get_optional_number(sub_m, "address", 0xffff, 0)? as u16;
	let erase = !sub_m.is_present("no_erase");

	let image = fs::read(path).with_context(|e| format!("couldn't read image {}: {}", path, e))?;
	image::flash_image(flash, address, &image, erase)?;
	flash.reset();
	info!("Done, target reset");
	Ok(())
}

fn read_to_stdout<H: Hardware>(flash: &mut Flash<H>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address = get_number(sub_m, "ADDRESS", 0xffff)? as u16;
	let length = get_number(sub_m, "LENGTH", 0x1_0000)? as usize;

	let data = image::read_image(flash, address, length)?;
	io::stdout().write_all(&data)?;
	Ok(())
}

fn run<H: Hardware>(flash: &mut Flash<H>, matches: &clap::ArgMatches) -> AResult<()> {
	if let ("reset", _) = matches.subcommand() {
		flash.reset();
		return Ok(());
	}

	let polls = get_optional_number(matches, "poll_limit", !0u32, 1000)?;
	flash.init_programming_interface();
	let status = flash.ensure_responsive(polls).with_context(|e| format!("target not responding on C2: {}", e))?;
	debug!("C2 status: {:?}", status);

	match matches.subcommand() {
		("info", _) => {
			info(flash)
		},
		("erase", _) => {
			ensure!(flash.erase_device(), "device erase rejected");
			flash.reset();
			Ok(())
		},
		("write", Some(sub_m)) => {
			write_file(flash, sub_m)
		},
		("read", Some(sub_m)) => {
			read_to_stdout(flash, sub_m)
		},
		("read_sfr", Some(sub_m)) => {
			let address = get_number(sub_m, "ADDRESS", 0xff)? as u8;
			println!("0x{:02x}", flash.read_sfr(address));
			Ok(())
		},
		("write_sfr", Some(sub_m)) => {
			let address = get_number(sub_m, "ADDRESS", 0xff)? as u8;
			let value = get_number(sub_m, "VALUE", 0xff)? as u8;
			flash.write_sfr(address, value);
			Ok(())
		},
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg chip: --chip +takes_value "GPIO character device (default /dev/gpiochip0)")
		(@arg clock: -c --clock +takes_value "GPIO line connected to C2CK")
		(@arg data: -d --data +takes_value "GPIO line connected to C2D")
		(@arg fpdat: --fpdat +takes_value "address of the FPDAT register (default 0xb4; 0xad on 'F34x, 'F38x, EFM8UB2)")
		(@arg poll_limit: --("poll-limit") +takes_value "status polls before giving up on an unresponsive target (default 1000)")
		(@arg dummy: --dummy "use a simulated target instead of GPIO lines")
		(@subcommand info =>
			(about: "show device id, revision and programming interface version")
		)
		(@subcommand erase =>
			(about: "erase the complete flash")
		)
		(@subcommand write =>
			(about: "erase, write and verify a raw binary image")
			(@arg address: -a --address +takes_value "flash address of the first byte (default 0)")
			(@arg no_erase: -n --("no-erase") "don't erase the device first")
			(@arg FILE: +required "binary image")
		)
		(@subcommand read =>
			(about: "dump flash as binary to stdout")
			(@arg ADDRESS: +required "first flash address")
			(@arg LENGTH: +required "number of bytes")
		)
		(@subcommand read_sfr =>
			(alias: "read-sfr")
			(about: "read a special function register")
			(@arg ADDRESS: +required "SFR address")
		)
		(@subcommand write_sfr =>
			(alias: "write-sfr")
			(about: "write a special function register")
			(@arg ADDRESS: +required "SFR address")
			(@arg VALUE: +required "value")
		)
		(@subcommand reset =>
			(about: "reset the target")
		)
	).get_matches();

	let config = FlashConfig {
		data_register: get_optional_number(&matches, "fpdat", 0xff, FlashConfig::default().data_register as u32)? as u8,
	};

	if matches.is_present("dummy") {
		let target = sim::SimTarget::new().with_data_register(config.data_register);
		let mut flash = Flash::with_config(target, config);
		let result = run(&mut flash, &matches);
		for v in flash.hardware().violations() {
			warn!("C2 protocol violation: {}", v);
		}
		result
	} else {
		let clock = get_number(&matches, "clock", !0u32)?;
		let data = get_number(&matches, "data", !0u32)?;
		let chip = matches.value_of("chip").unwrap_or(gpio::DEFAULT_CHIP);
		let lines = gpio::LinuxGpio::open(Path::new(chip), clock, data)?;
		let mut flash = Flash::with_config(lines, config);
		run(&mut flash, &matches)
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
