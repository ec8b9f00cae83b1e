use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::PlayingDescriptor;
use super::interrupt::restore_default_signals;
use super::surface::{CapabilityResult, PlaybackSurface, SurfaceEvent};

const TIME_POS_OBSERVER: u64 = 1;
const NO_ORIENTATION: &str = "desktop players have no orientation lock";

/// Direct files played in mpv, with the play head read back over mpv's JSON
/// IPC socket.
pub(crate) struct MpvSurface {
    player_bin: PathBuf,
    child: Option<Child>,
    #[cfg(unix)]
    ipc: Option<ipc::IpcChannel>,
}

impl MpvSurface {
    pub(crate) fn new(player_bin: impl Into<PathBuf>) -> Self {
        Self {
            player_bin: player_bin.into(),
            child: None,
            #[cfg(unix)]
            ipc: None,
        }
    }

    fn child_exited(&mut self) -> bool {
        match self.child.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => false,
            Some(Ok(Some(status))) => {
                debug!(%status, "player exited");
                true
            }
            Some(Err(err)) => {
                warn!("failed to poll player process: {err}");
                true
            }
            None => true,
        }
    }

    #[cfg(unix)]
    fn set_property(&mut self, name: &str, value: Value) -> CapabilityResult {
        let Some(ipc) = self.ipc.as_mut() else {
            return CapabilityResult::denied("player is not connected");
        };
        match ipc.send(&json!({ "command": ["set_property", name, value] })) {
            Ok(()) => CapabilityResult::Granted,
            Err(err) => CapabilityResult::denied(format!("{name}: {err}")),
        }
    }

    #[cfg(not(unix))]
    fn set_property(&mut self, name: &str, _value: Value) -> CapabilityResult {
        CapabilityResult::denied(format!("{name}: player IPC needs a unix socket"))
    }
}

pub(crate) fn player_args(descriptor: &PlayingDescriptor, ipc_path: Option<&str>) -> Vec<String> {
    let mut args = vec![
        format!("--start={:.3}", descriptor.start_offset_secs.max(0.0)),
        "--force-window=yes".to_string(),
    ];
    let title = match &descriptor.subtitle {
        Some(subtitle) => format!("{} - {subtitle}", descriptor.title),
        None => descriptor.title.clone(),
    };
    args.push(format!("--title={title}"));
    if let Some(path) = ipc_path {
        args.push(format!("--input-ipc-server={path}"));
    }
    args.push("--".to_string());
    args.push(descriptor.resolved_url.clone());
    args
}

/// Maps one line of mpv IPC output to a surface event. Replies and events
/// the session does not care about map to `None`.
pub(crate) fn parse_ipc_line(line: &str) -> Option<SurfaceEvent> {
    let message: Value = serde_json::from_str(line.trim()).ok()?;
    match message.get("event").and_then(Value::as_str)? {
        "property-change" => {
            let name = message.get("name").and_then(Value::as_str)?;
            if name != "time-pos" {
                return None;
            }
            message
                .get("data")
                .and_then(Value::as_f64)
                .map(SurfaceEvent::PlayHead)
        }
        "shutdown" => Some(SurfaceEvent::Closed),
        _ => None,
    }
}

impl PlaybackSurface for MpvSurface {
    fn load(&mut self, descriptor: &PlayingDescriptor) -> Result<()> {
        if self.child.is_some() {
            bail!("player already loaded");
        }

        #[cfg(unix)]
        let socket_path = ipc::socket_path();
        #[cfg(unix)]
        let ipc_arg = Some(socket_path.to_string_lossy().into_owned());
        #[cfg(not(unix))]
        let ipc_arg: Option<String> = None;

        let mut cmd = Command::new(&self.player_bin);
        cmd.args(player_args(descriptor, ipc_arg.as_deref()))
            .stdin(Stdio::inherit())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        restore_default_signals(&mut cmd);

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to launch {}", self.player_bin.display()))?;
        self.child = Some(child);

        #[cfg(unix)]
        {
            let mut channel = ipc::IpcChannel::connect(socket_path, || self.child_exited())?;
            channel.send(&json!({
                "command": ["observe_property", TIME_POS_OBSERVER, "time-pos"]
            }))?;
            self.ipc = Some(channel);
        }
        Ok(())
    }

    fn request_fullscreen(&mut self) -> CapabilityResult {
        self.set_property("fullscreen", json!(true))
    }

    fn exit_fullscreen(&mut self) -> CapabilityResult {
        if self.child_exited() {
            return CapabilityResult::denied("player already closed");
        }
        self.set_property("fullscreen", json!(false))
    }

    fn lock_landscape(&mut self) -> CapabilityResult {
        CapabilityResult::denied(NO_ORIENTATION)
    }

    fn unlock_orientation(&mut self) -> CapabilityResult {
        CapabilityResult::denied(NO_ORIENTATION)
    }

    fn force_play(&mut self) -> CapabilityResult {
        self.set_property("pause", json!(false))
    }

    #[cfg(unix)]
    fn next_event(&mut self, wait: Duration) -> SurfaceEvent {
        let Some(ipc) = self.ipc.as_mut() else {
            return SurfaceEvent::Closed;
        };
        match ipc.read_line(wait) {
            ipc::ReadOutcome::Line(line) => parse_ipc_line(&line).unwrap_or(SurfaceEvent::Idle),
            ipc::ReadOutcome::TimedOut => {
                if self.child_exited() {
                    SurfaceEvent::Closed
                } else {
                    SurfaceEvent::Idle
                }
            }
            ipc::ReadOutcome::Eof => SurfaceEvent::Closed,
        }
    }

    #[cfg(not(unix))]
    fn next_event(&mut self, wait: Duration) -> SurfaceEvent {
        std::thread::sleep(wait);
        if self.child_exited() {
            SurfaceEvent::Closed
        } else {
            SurfaceEvent::Idle
        }
    }
}

impl Drop for MpvSurface {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            self.ipc = None;
        }
        if let Some(mut child) = self.child.take()
            && matches!(child.try_wait(), Ok(None))
        {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(unix)]
mod ipc {
    use std::io::{ErrorKind, Read, Write};
    use std::os::unix::net::UnixStream;
    use std::path::PathBuf;
    use std::thread;
    use std::time::Duration;

    use anyhow::{Context, Result, bail};
    use serde_json::Value;
    use uuid::Uuid;

    const CONNECT_ATTEMPTS: u32 = 100;
    const CONNECT_BACKOFF: Duration = Duration::from_millis(50);

    pub(super) fn socket_path() -> PathBuf {
        std::env::temp_dir().join(format!("cinetrack-mpv-{}.sock", Uuid::new_v4().simple()))
    }

    pub(super) enum ReadOutcome {
        Line(String),
        TimedOut,
        Eof,
    }

    pub(super) struct IpcChannel {
        path: PathBuf,
        stream: UnixStream,
        buffer: Vec<u8>,
    }

    impl IpcChannel {
        /// mpv creates the socket some time after it starts, so this retries
        /// until it shows up or `gone` says the player died first.
        pub(super) fn connect(path: PathBuf, mut gone: impl FnMut() -> bool) -> Result<Self> {
            for _ in 0..CONNECT_ATTEMPTS {
                match UnixStream::connect(&path) {
                    Ok(stream) => {
                        return Ok(Self {
                            path,
                            stream,
                            buffer: Vec::new(),
                        });
                    }
                    Err(_) if !gone() => thread::sleep(CONNECT_BACKOFF),
                    Err(err) => {
                        return Err(err).context("player exited before opening its IPC socket");
                    }
                }
            }
            bail!("timed out waiting for player IPC at {}", path.display())
        }

        pub(super) fn send(&mut self, command: &Value) -> Result<()> {
            let mut line = serde_json::to_vec(command).context("failed to encode IPC command")?;
            line.push(b'\n');
            self.stream
                .write_all(&line)
                .context("failed to write to player IPC")
        }

        pub(super) fn read_line(&mut self, wait: Duration) -> ReadOutcome {
            if let Some(line) = self.take_line() {
                return ReadOutcome::Line(line);
            }

            let timeout = wait.max(Duration::from_millis(1));
            if self.stream.set_read_timeout(Some(timeout)).is_err() {
                return ReadOutcome::Eof;
            }

            let mut chunk = [0_u8; 4096];
            match self.stream.read(&mut chunk) {
                Ok(0) => ReadOutcome::Eof,
                Ok(read) => {
                    self.buffer.extend_from_slice(&chunk[..read]);
                    self.take_line().map_or(ReadOutcome::TimedOut, ReadOutcome::Line)
                }
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    ReadOutcome::TimedOut
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => ReadOutcome::TimedOut,
                Err(_) => ReadOutcome::Eof,
            }
        }

        fn take_line(&mut self) -> Option<String> {
            let end = self.buffer.iter().position(|byte| *byte == b'\n')?;
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            Some(String::from_utf8_lossy(&line).trim_end().to_string())
        }
    }

    impl Drop for IpcChannel {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

}
