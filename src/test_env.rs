//! Test environment: the POD record placed in a shared cell.
//!
//! Every field is a primitive or a fixed-size byte buffer so the struct can
//! safely live inside a [`crate::shared_cell::SharedCell`] and be written
//! from a forked child without any pointer crossing the fork boundary.

const BUF_SIZE: usize = 2048;

fn write_str(buf: &mut [u8; BUF_SIZE], s: &str) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(BUF_SIZE - 1);
    buf[..n].copy_from_slice(&bytes[..n]);
    buf[n] = 0;
}

fn read_str(buf: &[u8; BUF_SIZE]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[repr(C)]
pub struct TestEnv {
    pub slot_id: u32,
    pub failed: bool,
    pub skipped: bool,
    pub bench_iters: u64,
    pub bench_ns_op: u64,
    test_name: [u8; BUF_SIZE],
    func_name: [u8; BUF_SIZE],
    last_mark_anywhere: [u8; BUF_SIZE],
    last_test_mark: [u8; BUF_SIZE],
    fail_msg: [u8; BUF_SIZE],
}

impl Default for TestEnv {
    fn default() -> Self {
        TestEnv {
            slot_id: 0,
            failed: false,
            skipped: false,
            bench_iters: 0,
            bench_ns_op: 0,
            test_name: [0; BUF_SIZE],
            func_name: [0; BUF_SIZE],
            last_mark_anywhere: [0; BUF_SIZE],
            last_test_mark: [0; BUF_SIZE],
            fail_msg: [0; BUF_SIZE],
        }
    }
}

impl TestEnv {
    /// Resets the slot's env before a new test runs. `failed` (and every
    /// other per-run field) only ever flips forward within a single run, so
    /// the reset at the top of the next test is the only place it clears.
    pub fn reset(&mut self, slot_id: u32, test_name: &str, func_name: &str) {
        *self = TestEnv::default();
        self.slot_id = slot_id;
        write_str(&mut self.test_name, test_name);
        write_str(&mut self.func_name, func_name);
    }

    pub fn test_name(&self) -> String {
        read_str(&self.test_name)
    }

    pub fn set_test_name(&mut self, name: &str) {
        write_str(&mut self.test_name, name);
    }

    pub fn func_name(&self) -> String {
        read_str(&self.func_name)
    }

    pub fn last_mark_anywhere(&self) -> Option<String> {
        let s = read_str(&self.last_mark_anywhere);
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }

    pub fn last_test_mark(&self) -> Option<String> {
        let s = read_str(&self.last_test_mark);
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }

    pub fn fail_msg(&self) -> Option<String> {
        let s = read_str(&self.fail_msg);
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }

    pub fn set_fail_msg(&mut self, msg: &str) {
        write_str(&mut self.fail_msg, msg);
    }

    /// The mark protocol: marks made inside the test's own function
    /// overwrite `last_test_mark` and clear `last_mark_anywhere`; marks made
    /// anywhere else (helper functions, setup/teardown) overwrite only
    /// `last_mark_anywhere`, leaving the "last mark inside the test" intact.
    pub fn mark(&mut self, file: &str, func: &str, line: u32) {
        let loc = format!("{}:{}", file, line);
        if func == self.func_name() {
            write_str(&mut self.last_test_mark, &loc);
            write_str(&mut self.last_mark_anywhere, "");
        } else {
            write_str(&mut self.last_mark_anywhere, &loc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_protocol_distinguishes_inside_vs_outside() {
        let mut env = TestEnv::default();
        env.reset(0, "t", "crate::t");

        env.mark("f.rs", "crate::t", 10);
        assert_eq!(env.last_test_mark().as_deref(), Some("f.rs:10"));
        assert_eq!(env.last_mark_anywhere(), None);

        env.mark("f.rs", "crate::helper", 20);
        assert_eq!(env.last_test_mark().as_deref(), Some("f.rs:10"));
        assert_eq!(env.last_mark_anywhere().as_deref(), Some("f.rs:20"));
    }

    #[test]
    fn reset_clears_failed_flag() {
        let mut env = TestEnv::default();
        env.failed = true;
        env.reset(1, "t", "crate::t");
        assert!(!env.failed);
        assert_eq!(env.slot_id, 1);
    }

    #[test]
    fn set_iter_name_overwrites_visible_name() {
        let mut env = TestEnv::default();
        env.reset(0, "f:0", "crate::f");
        env.set_test_name("f:0:x0");
        assert_eq!(env.test_name(), "f:0:x0");
    }
}
