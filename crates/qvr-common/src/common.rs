// common.rs -- console print layer shared by the collision core
//
// Messages go to the `log` facade under the "qvr" target. A thread-local
// redirect buffer captures the same text for callers that want it (remote
// console, tests).

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};

const LOG_TARGET: &str = "qvr";

static DEVELOPER: AtomicBool = AtomicBool::new(false);

thread_local! {
    static RD_BUFFER: RefCell<Option<String>> = const { RefCell::new(None) };
}

// ============================================================
// Redirect buffer
// ============================================================

/// Begin redirecting console output on this thread into a buffer.
pub fn com_begin_redirect() {
    RD_BUFFER.with(|b| *b.borrow_mut() = Some(String::new()));
}

/// End redirect and return the captured output.
pub fn com_end_redirect() -> Option<String> {
    RD_BUFFER.with(|b| b.borrow_mut().take())
}

fn redirect(msg: &str) {
    RD_BUFFER.with(|b| {
        if let Some(ref mut s) = *b.borrow_mut() {
            s.push_str(msg);
        }
    });
}

// ============================================================
// Developer flag
// ============================================================

/// Mirrors the `developer` cvar; gates `com_dprintf`.
pub fn com_set_developer(on: bool) {
    DEVELOPER.store(on, Ordering::Relaxed);
}

pub fn com_developer() -> bool {
    DEVELOPER.load(Ordering::Relaxed)
}

// ============================================================
// Com_Printf / Com_DPrintf / Com_Warning
// ============================================================

/// General-purpose print.
pub fn com_printf(msg: &str) {
    redirect(msg);
    log::info!(target: LOG_TARGET, "{}", msg.trim_end());
}

/// Developer-only print. Only captured when developer mode is active.
pub fn com_dprintf(msg: &str) {
    if com_developer() {
        redirect(msg);
    }
    log::debug!(target: LOG_TARGET, "{}", msg.trim_end());
}

/// Something recoverable went wrong; always captured.
pub fn com_warning(msg: &str) {
    redirect("WARNING: ");
    redirect(msg);
    log::warn!(target: LOG_TARGET, "{}", msg.trim_end());
}
