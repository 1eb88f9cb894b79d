use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// Isolate id of the main (primary) execution context.
pub const DEFAULT_ISOLATE_ID: i32 = 1;

/// How long correlated requests wait for their reply by default.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(750);

/// Well-known parameter keys announced by the VM during connection setup.
pub const PARAM_DEBUG_MESSAGES: &str = "$debug_messages";
pub const PARAM_DEBUG_MESSAGE_SIZE: &str = "$debug_message_size";
pub const PARAM_DEBUG_MESSAGE_FILE: &str = "$debug_message_file";
pub const PARAM_DEBUG_MESSAGE_FILE_SIZE: &str = "$debug_message_file_size";
pub const PARAM_CONSOLE_ERRORS: &str = "$console_errors";

/// Mutable session-wide facts about the attached VM.
///
/// Written from the reader thread (message effects) and the send path,
/// read from anywhere. Fields are individually atomic but not guarded
/// as a unit: readers get best-effort snapshots, which is all the
/// protocol needs.
pub struct SessionState {
    player_version: AtomicU32,
    ptr_size: AtomicU32,
    squelch: AtomicBool,
    wide_lines: AtomicBool,
    vm2: AtomicBool,
    paused: AtomicBool,
    closed: AtomicBool,
    active_isolate: AtomicI32,
    parameters: RwLock<HashMap<String, String>>,
    options: RwLock<HashMap<String, String>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            player_version: AtomicU32::new(0),
            ptr_size: AtomicU32::new(4),
            squelch: AtomicBool::new(false),
            wide_lines: AtomicBool::new(false),
            vm2: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            // No isolate addressed yet; the first routed send always
            // emits a switch frame.
            active_isolate: AtomicI32::new(-1),
            parameters: RwLock::new(HashMap::new()),
            options: RwLock::new(HashMap::new()),
        }
    }

    /// VM runtime version announced during setup.
    pub fn player_version(&self) -> u32 {
        self.player_version.load(Ordering::Relaxed)
    }

    pub fn set_player_version(&self, version: u32) {
        self.player_version.store(version, Ordering::Relaxed);
    }

    /// Pointer width of the VM process in bytes (4 unless told otherwise).
    pub fn ptr_size(&self) -> u32 {
        self.ptr_size.load(Ordering::Relaxed)
    }

    pub fn set_ptr_size(&self, size: u32) {
        self.ptr_size.store(size, Ordering::Relaxed);
    }

    /// Whether trace/output forwarding from the VM is suppressed.
    pub fn squelch(&self) -> bool {
        self.squelch.load(Ordering::Relaxed)
    }

    pub fn set_squelch(&self, enabled: bool) {
        self.squelch.store(enabled, Ordering::Relaxed);
    }

    /// Whether the VM reports wide (32-bit) line numbers.
    pub fn wide_lines(&self) -> bool {
        self.wide_lines.load(Ordering::Relaxed)
    }

    pub fn set_wide_lines(&self, enabled: bool) {
        self.wide_lines.store(enabled, Ordering::Relaxed);
    }

    /// Whether the debugged program runs on the second-generation VM.
    pub fn vm2(&self) -> bool {
        self.vm2.load(Ordering::Relaxed)
    }

    pub fn set_vm2(&self, enabled: bool) {
        self.vm2.store(enabled, Ordering::Relaxed);
    }

    /// Whether execution is currently halted.
    pub fn paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    /// Whether the connection is closed. Latched; never resets.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Latch the closed flag. Returns true for the one call that
    /// performed the false→true transition.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    /// The isolate the most recently sent command was addressed to.
    pub fn active_isolate(&self) -> i32 {
        self.active_isolate.load(Ordering::SeqCst)
    }

    pub(crate) fn set_active_isolate(&self, isolate: i32) {
        self.active_isolate.store(isolate, Ordering::SeqCst);
    }

    pub fn parameter(&self, key: &str) -> Option<String> {
        read_lock(&self.parameters).get(key).cloned()
    }

    pub fn set_parameter(&self, key: impl Into<String>, value: impl Into<String>) {
        write_lock(&self.parameters).insert(key.into(), value.into());
    }

    pub fn parameters(&self) -> HashMap<String, String> {
        read_lock(&self.parameters).clone()
    }

    pub fn option(&self, key: &str) -> Option<String> {
        read_lock(&self.options).get(key).cloned()
    }

    pub fn set_option(&self, key: impl Into<String>, value: impl Into<String>) {
        write_lock(&self.options).insert(key.into(), value.into());
    }

    pub fn options(&self) -> HashMap<String, String> {
        read_lock(&self.options).clone()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
