use std::ops::{
	Deref,
	DerefMut,
};
use std::thread;
use std::time::{
	Duration,
	Instant,
};

pub mod timing {
	// C2CK low time must be > 80 ns and < 5 µs, otherwise the device resets
	pub const STROBE_LOW_NS: u32 = 250;
	// C2CK high time must be > 120 ns
	pub const STROBE_HIGH_NS: u32 = 250;

	// reset: C2CK low for at least 20 µs, then high for at least 2 µs
	pub const RESET_LOW_US: u32 = 25;
	pub const RESET_HIGH_US: u32 = 4;

	// after writing the FPCTL keys
	pub const PROGRAMMING_SETTLE_MS: u32 = 20;
}

pub fn reliable_sleep(mut duration: Duration) {
	loop {
		let now = Instant::now();
		thread::sleep(duration);
		let elapsed = now.elapsed();
		if elapsed >= duration {
			return;
		}
		duration -= elapsed;
	}
}

/// Spin for (at least) `duration`; sleeping has way too much jitter for
/// sub-microsecond timing.
pub fn busy_wait(duration: Duration) {
	let start = Instant::now();
	while start.elapsed() < duration {
		std::hint::spin_loop();
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Direction {
	Output,
	Input,
}

/// Access to the C2CK and C2D lines of a single target.
///
/// C2CK is always an output. C2D is switched between output and input by the
/// protocol layer; `read_data` is only meaningful while C2D is an input.
pub trait Hardware {
	fn set_clock(&mut self, high: bool);
	fn set_data(&mut self, high: bool);
	fn read_data(&mut self) -> bool;
	fn set_data_direction(&mut self, direction: Direction);

	fn delay_ns(&mut self, ns: u32) {
		busy_wait(Duration::from_nanos(ns as u64));
	}

	fn delay_us(&mut self, us: u32) {
		self.delay_ns(us.saturating_mul(1000));
	}

	fn delay_ms(&mut self, ms: u32) {
		reliable_sleep(Duration::from_millis(ms as u64));
	}

	// Suspend anything that could stretch a clock pulse (interrupts, signal
	// handlers). Never nested; hosts without preemption keep the no-ops.
	fn disable_preemption(&mut self) {
	}

	fn enable_preemption(&mut self) {
	}
}

/// Preemption stays disabled while this is alive.
pub struct CriticalSection<'a, H: ?Sized + Hardware + 'a>(&'a mut H);

impl<'a, H: ?Sized + Hardware> CriticalSection<'a, H> {
	pub fn enter(hardware: &'a mut H) -> Self {
		hardware.disable_preemption();
		CriticalSection(hardware)
	}
}

impl<'a, H: ?Sized + Hardware> Drop for CriticalSection<'a, H> {
	fn drop(&mut self) {
		self.0.enable_preemption();
	}
}

impl<'a, H: ?Sized + Hardware> Deref for CriticalSection<'a, H> {
	type Target = H;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl<'a, H: ?Sized + Hardware> DerefMut for CriticalSection<'a, H> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Default)]
	struct Counter {
		disabled: u32,
		enabled: u32,
	}

	impl Hardware for Counter {
		fn set_clock(&mut self, _high: bool) {}
		fn set_data(&mut self, _high: bool) {}
		fn read_data(&mut self) -> bool { true }
		fn set_data_direction(&mut self, _direction: Direction) {}

		fn disable_preemption(&mut self) {
			self.disabled += 1;
		}
		fn enable_preemption(&mut self) {
			self.enabled += 1;
		}
	}

	#[test]
	fn critical_section_restores_on_drop() {
		let mut hw = Counter::default();
		{
			let cs = CriticalSection::enter(&mut hw);
			assert_eq!(cs.disabled, 1);
			assert_eq!(cs.enabled, 0);
		}
		assert_eq!(hw.disabled, 1);
		assert_eq!(hw.enabled, 1);
	}

	#[test]
	fn critical_section_restores_on_panic() {
		let mut hw = Counter::default();
		let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
			let _cs = CriticalSection::enter(&mut hw);
			panic!("transaction failed");
		}));
		assert!(result.is_err());
		assert_eq!(hw.enabled, 1);
	}

	#[test]
	fn timing_within_device_limits() {
		assert!(timing::STROBE_LOW_NS >= 80 && timing::STROBE_LOW_NS < 5_000);
		assert!(timing::STROBE_HIGH_NS >= 120);
		assert!(timing::RESET_LOW_US >= 20);
		assert!(timing::RESET_HIGH_US >= 2);
	}

	#[test]
	fn busy_wait_waits_at_least_duration() {
		let start = Instant::now();
		busy_wait(Duration::from_micros(50));
		assert!(start.elapsed() >= Duration::from_micros(50));
	}
}
