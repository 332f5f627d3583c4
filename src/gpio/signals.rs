use std::io;
use std::mem;
use std::ptr;

use libc::{
	SIG_BLOCK,
	SIG_SETMASK,
	pthread_sigmask,
	sigfillset,
	sigset_t,
};

/// Blocks all signals for the calling thread until `restore`.
pub struct SignalBlocker {
	saved: Option<sigset_t>,
}

impl SignalBlocker {
	pub fn new() -> Self {
		SignalBlocker {
			saved: None,
		}
	}

	#[cfg(test)]
	pub(crate) fn is_blocking(&self) -> bool {
		self.saved.is_some()
	}

	pub fn block(&mut self) {
		assert!(self.saved.is_none(), "signals already blocked");
		unsafe {
			let mut all: sigset_t = mem::zeroed();
			let mut old: sigset_t = mem::zeroed();
			sigfillset(&mut all);
			let res = pthread_sigmask(SIG_BLOCK, &all, &mut old);
			if 0 != res {
				panic!("pthread_sigmask failed: {}", io::Error::from_raw_os_error(res));
			}
			self.saved = Some(old);
		}
	}

	pub fn restore(&mut self) {
		if let Some(old) = self.saved.take() {
			let res = unsafe { pthread_sigmask(SIG_SETMASK, &old, ptr::null_mut()) };
			if 0 != res {
				panic!("pthread_sigmask failed: {}", io::Error::from_raw_os_error(res));
			}
		}
	}
}

impl Default for SignalBlocker {
	fn default() -> Self {
		SignalBlocker::new()
	}
}

impl Drop for SignalBlocker {
	fn drop(&mut self) {
		self.restore();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use libc::{
		SIGUSR1,
		sigismember,
	};

	fn current_mask() -> sigset_t {
		unsafe {
			let mut current: sigset_t = mem::zeroed();
			assert_eq!(pthread_sigmask(SIG_BLOCK, ptr::null(), &mut current), 0);
			current
		}
	}

	#[test]
	fn block_and_restore() {
		let before = unsafe { sigismember(&current_mask(), SIGUSR1) };
		let mut blocker = SignalBlocker::new();
		blocker.block();
		assert!(blocker.is_blocking());
		assert_eq!(unsafe { sigismember(&current_mask(), SIGUSR1) }, 1);
		blocker.restore();
		assert!(!blocker.is_blocking());
		assert_eq!(unsafe { sigismember(&current_mask(), SIGUSR1) }, before);
	}

	#[test]
	#[should_panic(expected = "already blocked")]
	fn nested_block_panics() {
		let mut blocker = SignalBlocker::new();
		blocker.block();
		blocker.block();
	}
}
