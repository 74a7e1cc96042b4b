/// Command Runner
/// Backend side of the streaming protocol. Runs a configured command in a
/// PTY (so tools keep their colours), emits every output line on the
/// command's channel in order, then emits `command.done.<code>`.

use super::channel::EventBus;
use super::sentinel::{completion_payload, READ_FAILURE_CODE};
use super::session::Invoker;
use crate::config::{CommandEntry, PtyConfig, ShellConfig};
use crate::error::{Result, ShellError};
use crate::models::{Channel, CommandId, InvokeArgs, Secret};
use parking_lot::Mutex;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub channel: Channel,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, channel: Channel) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            channel,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl From<&CommandEntry> for CommandSpec {
    fn from(entry: &CommandEntry) -> Self {
        Self {
            program: entry.program.clone(),
            args: entry.args.clone(),
            cwd: entry.cwd.clone(),
            channel: entry.channel,
        }
    }
}

/// Splits raw PTY bytes into lines. `\r\n` and `\n` both end a line.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\n' {
                let mut line = std::mem::take(&mut self.pending);
                while line.last() == Some(&b'\r') {
                    line.pop();
                }
                lines.push(String::from_utf8_lossy(&line).into_owned());
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Whatever is left once the stream ends, if anything.
    pub fn finish(self) -> Option<String> {
        let mut line = self.pending;
        while line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&line).into_owned())
        }
    }
}

struct RunningChild {
    command: CommandId,
    pid: Option<u32>,
    killer: Box<dyn ChildKiller + Send + Sync>,
}

pub struct CommandRunner {
    bus: Arc<dyn EventBus>,
    commands: HashMap<CommandId, CommandSpec>,
    cols: u16,
    rows: u16,
    running: Arc<Mutex<HashMap<u64, RunningChild>>>,
    next_run: AtomicU64,
}

impl CommandRunner {
    pub fn new(bus: Arc<dyn EventBus>, pty: &PtyConfig) -> Self {
        Self {
            bus,
            commands: HashMap::new(),
            cols: pty.cols,
            rows: pty.rows,
            running: Arc::new(Mutex::new(HashMap::new())),
            next_run: AtomicU64::new(1),
        }
    }

    pub fn from_config(bus: Arc<dyn EventBus>, config: &ShellConfig) -> Self {
        let mut runner = Self::new(bus, &config.pty);
        for entry in &config.commands {
            runner.register(entry.id.clone(), CommandSpec::from(entry));
        }
        runner
    }

    pub fn register(&mut self, id: CommandId, spec: CommandSpec) {
        self.commands.insert(id, spec);
    }

    pub fn spec(&self, id: &CommandId) -> Option<&CommandSpec> {
        self.commands.get(id)
    }

    pub fn running_count(&self) -> usize {
        self.running.lock().len()
    }

    /// Start `id` in a new PTY. Returns once the process is running; output
    /// and completion arrive on the command's channel.
    pub fn spawn(&self, id: &CommandId, password: Option<Secret>) -> Result<()> {
        let spec = self
            .commands
            .get(id)
            .ok_or_else(|| ShellError::UnknownCommand(id.to_string()))?;

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: self.rows,
                cols: self.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ShellError::Spawn(format!("Failed to open PTY: {}", e)))?;

        // The secret is typed into the PTY; keep it out of the output.
        #[cfg(unix)]
        {
            if password.is_some() {
                disable_echo(pair.master.as_ref());
            }
        }

        let mut cmd = CommandBuilder::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(cwd) = &spec.cwd {
            cmd.cwd(cwd);
        }
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| ShellError::Spawn(format!("Failed to spawn {}: {}", spec.program, e)))?;
        // Our copy of the slave would keep the reader from ever seeing EOF.
        drop(pair.slave);

        let master = pair.master;
        let mut reader = master
            .try_clone_reader()
            .map_err(|e| ShellError::Spawn(format!("Failed to get PTY reader: {}", e)))?;
        let mut writer = master
            .take_writer()
            .map_err(|e| ShellError::Spawn(format!("Failed to get PTY writer: {}", e)))?;

        if let Some(mut password) = password {
            let written = writer
                .write_all(password.expose().as_bytes())
                .and_then(|_| writer.write_all(b"\n"))
                .and_then(|_| writer.flush());
            password.wipe();
            if let Err(e) = written {
                let _ = child.kill();
                return Err(ShellError::Spawn(format!("Failed to send password: {}", e)));
            }
        }

        let run_id = self.next_run.fetch_add(1, Ordering::Relaxed);
        self.running.lock().insert(
            run_id,
            RunningChild {
                command: id.clone(),
                pid: child.process_id(),
                killer: child.clone_killer(),
            },
        );
        log::info!("[Runner] started {} ({}) on {}", id, spec.program, spec.channel);

        let bus = self.bus.clone();
        let channel = spec.channel;
        let running = self.running.clone();
        let command = id.clone();
        thread::spawn(move || {
            let emit = |line: &str| {
                if let Err(e) = bus.emit(channel, line) {
                    log::warn!("[Runner] {}", e);
                }
            };

            let mut splitter = LineSplitter::default();
            let mut read_failed = false;
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        for line in splitter.feed(&buf[..n]) {
                            emit(&line);
                        }
                    }
                    Err(e) if is_pty_closed(&e) => break,
                    Err(e) => {
                        log::error!("[Runner] error reading output of {}: {}", command, e);
                        read_failed = true;
                        break;
                    }
                }
            }
            if let Some(rest) = splitter.finish() {
                emit(&rest);
            }

            let code = match child.wait() {
                Ok(status) => status.exit_code() as i32,
                Err(e) => {
                    log::error!("[Runner] failed to wait for {}: {}", command, e);
                    READ_FAILURE_CODE
                }
            };
            let code = if read_failed { READ_FAILURE_CODE } else { code };

            running.lock().remove(&run_id);
            drop(writer);
            drop(master);
            log::info!("[Runner] {} exited with code {}", command, code);
            emit(&completion_payload(code));
        });

        Ok(())
    }

    /// Kill every command still running. Used on app exit.
    pub fn shutdown(&self) {
        let children: Vec<RunningChild> = self.running.lock().drain().map(|(_, c)| c).collect();
        for mut child in children {
            log::info!("[Runner] killing {}", child.command);
            #[cfg(unix)]
            {
                if let Some(pid) = child.pid {
                    // The child leads its own session; take its descendants too.
                    unsafe {
                        libc::kill(-(pid as i32), libc::SIGTERM);
                    }
                }
            }
            #[cfg(not(unix))]
            let _ = child.pid;
            let _ = child.killer.kill();
        }
    }
}

impl Invoker for CommandRunner {
    fn invoke(&self, command: &CommandId, args: InvokeArgs) -> Result<()> {
        self.spawn(command, args.password)
    }
}

impl Drop for CommandRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(unix)]
fn disable_echo(master: &(dyn MasterPty + Send)) {
    let Some(fd) = master.as_raw_fd() else {
        return;
    };
    unsafe {
        let mut termios: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut termios) == 0 {
            termios.c_lflag &= !libc::ECHO;
            libc::tcsetattr(fd, libc::TCSANOW, &termios);
        }
    }
}

// Linux reports EIO on the master once the slave side has closed.
fn is_pty_closed(e: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        e.raw_os_error() == Some(libc::EIO)
    }
    #[cfg(not(unix))]
    {
        e.kind() == std::io::ErrorKind::BrokenPipe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::channel::LocalBus;

    #[test]
    fn splits_on_newlines_and_strips_carriage_returns() {
        let mut splitter = LineSplitter::default();
        assert_eq!(splitter.feed(b"one\r\ntw"), vec!["one"]);
        assert_eq!(splitter.feed(b"o\n\nthree"), vec!["two", ""]);
        assert_eq!(splitter.finish(), Some("three".to_string()));
    }

    #[test]
    fn empty_tail_is_not_a_line() {
        let mut splitter = LineSplitter::default();
        assert_eq!(splitter.feed(b"done\r\n"), vec!["done"]);
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut splitter = LineSplitter::default();
        assert_eq!(splitter.feed(b"caf\xe9\n"), vec!["caf\u{fffd}"]);
    }

    #[test]
    fn unknown_command_is_an_error() {
        let runner = CommandRunner::new(Arc::new(LocalBus::new()), &PtyConfig::default());
        let err = runner.invoke(&CommandId::new("nope"), InvokeArgs::default());
        assert!(matches!(err, Err(ShellError::UnknownCommand(name)) if name == "nope"));
    }

    #[test]
    fn registers_commands_from_config() {
        let config = ShellConfig::from_json(
            r#"{ "commands": [ { "id": "build", "program": "make", "args": ["all"], "channel": "build-output" } ] }"#,
        )
        .unwrap();
        let runner = CommandRunner::from_config(Arc::new(LocalBus::new()), &config);
        let spec = runner.spec(&CommandId::new("build")).unwrap();
        assert_eq!(spec, &CommandSpec::new("make", Channel::BuildOutput).arg("all"));
        assert_eq!(runner.running_count(), 0);
    }
}
