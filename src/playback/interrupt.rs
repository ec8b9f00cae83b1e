use std::process::Command;

use anyhow::Result;

#[cfg(unix)]
use anyhow::Context;
#[cfg(unix)]
use std::os::unix::process::CommandExt;

/// Keyboard signals the player owns while it is in the foreground.
#[cfg(unix)]
const PLAYER_SIGNALS: [libc::c_int; 2] = [libc::SIGINT, libc::SIGQUIT];

/// Saved dispositions, put back in reverse order on drop.
#[cfg(unix)]
struct IgnoredSignals {
    saved: Vec<(libc::c_int, libc::sigaction)>,
}

#[cfg(unix)]
impl IgnoredSignals {
    fn install(signals: &[libc::c_int]) -> Result<Self> {
        let mut guard = Self {
            saved: Vec::with_capacity(signals.len()),
        };
        for &signum in signals {
            let previous = set_disposition(signum, libc::SIG_IGN)
                .with_context(|| format!("failed to ignore signal {signum} during playback"))?;
            guard.saved.push((signum, previous));
        }
        Ok(guard)
    }
}

#[cfg(unix)]
impl Drop for IgnoredSignals {
    fn drop(&mut self) {
        while let Some((signum, previous)) = self.saved.pop() {
            // SAFETY: `previous` was filled in by sigaction for this signal.
            if unsafe { libc::sigaction(signum, &previous, std::ptr::null_mut()) } != 0 {
                tracing::warn!(
                    signum,
                    error = %std::io::Error::last_os_error(),
                    "failed to restore signal disposition"
                );
            }
        }
    }
}

#[cfg(unix)]
fn set_disposition(
    signum: libc::c_int,
    handler: libc::sighandler_t,
) -> std::io::Result<libc::sigaction> {
    // SAFETY: both structs are zero-initialised plain data; sigaction only
    // reads `next` and writes `previous`.
    unsafe {
        let mut next: libc::sigaction = std::mem::zeroed();
        next.sa_sigaction = handler;
        libc::sigemptyset(&mut next.sa_mask);
        let mut previous: libc::sigaction = std::mem::zeroed();
        if libc::sigaction(signum, &next, &mut previous) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(previous)
    }
}

/// Runs `f` with Ctrl-C and Ctrl-\ ignored here, so the keys reach only the
/// player and the session still gets to save its final position.
#[cfg(unix)]
pub(crate) fn with_interrupts_ignored<F, R>(f: F) -> Result<R>
where
    F: FnOnce() -> Result<R>,
{
    let _ignored = IgnoredSignals::install(&PLAYER_SIGNALS)?;
    f()
}

#[cfg(not(unix))]
pub(crate) fn with_interrupts_ignored<F, R>(f: F) -> Result<R>
where
    F: FnOnce() -> Result<R>,
{
    f()
}

/// Ignored dispositions survive exec; the spawned player starts from the
/// defaults instead.
#[cfg(unix)]
pub(super) fn restore_default_signals(cmd: &mut Command) {
    // SAFETY: the hook only calls `signal`, which is async-signal-safe.
    unsafe {
        cmd.pre_exec(|| {
            for signum in PLAYER_SIGNALS {
                if libc::signal(signum, libc::SIG_DFL) == libc::SIG_ERR {
                    return Err(std::io::Error::last_os_error());
                }
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
pub(super) fn restore_default_signals(_cmd: &mut Command) {}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Mutex;

    use anyhow::anyhow;

    use super::*;

    /// Dispositions are process-wide; tests that change them take turns.
    static DISPOSITIONS: Mutex<()> = Mutex::new(());

    fn handler_for(signum: libc::c_int) -> libc::sighandler_t {
        unsafe {
            let mut current: libc::sigaction = std::mem::zeroed();
            libc::sigaction(signum, std::ptr::null(), &mut current);
            current.sa_sigaction
        }
    }

    #[test]
    fn player_signals_are_ignored_only_inside_the_call() {
        let _turn = DISPOSITIONS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let before: Vec<_> = PLAYER_SIGNALS.iter().map(|&s| handler_for(s)).collect();

        let inside = with_interrupts_ignored(|| {
            Ok(PLAYER_SIGNALS
                .iter()
                .map(|&s| handler_for(s))
                .collect::<Vec<_>>())
        })
        .expect("guard installs");

        assert!(inside.iter().all(|&handler| handler == libc::SIG_IGN));
        let after: Vec<_> = PLAYER_SIGNALS.iter().map(|&s| handler_for(s)).collect();
        assert_eq!(after, before);
    }

    #[test]
    fn invalid_signal_fails_and_restores_earlier_ones() {
        let _turn = DISPOSITIONS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = handler_for(libc::SIGINT);
        let err = IgnoredSignals::install(&[libc::SIGINT, -1])
            .err()
            .expect("signal -1 is rejected");
        assert!(err.to_string().contains("signal -1"));
        assert_eq!(handler_for(libc::SIGINT), before);
    }

    #[test]
    fn closure_errors_pass_through() {
        let _turn = DISPOSITIONS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let result: Result<()> = with_interrupts_ignored(|| Err(anyhow!("player failed")));
        assert_eq!(result.expect_err("error kept").to_string(), "player failed");
    }
}
