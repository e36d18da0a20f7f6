//! Prompt-driven CLI transport (telnet-style line session) shared by the OLT drivers.

use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::DriverError;

const IAC: u8 = 0xFF;
const DONT: u8 = 0xFE;
const DO: u8 = 0xFD;
const WONT: u8 = 0xFC;
const WILL: u8 = 0xFB;
const SB: u8 = 0xFA;
const SE: u8 = 0xF0;

pub const DEFAULT_CLI_PORT: u16 = 23;

#[derive(Debug, Clone)]
pub struct CliTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

/// Removes telnet negotiation from `buf`, returning the plain bytes and the
/// refusals to send back (we never enable any option).
fn strip_telnet(buf: &mut BytesMut) -> (Vec<u8>, Vec<u8>) {
    let mut data = Vec::with_capacity(buf.len());
    let mut replies = Vec::new();
    while buf.has_remaining() {
        if buf[0] != IAC {
            data.push(buf.get_u8());
            continue;
        }
        if buf.len() < 2 {
            break;
        }
        match buf[1] {
            IAC => {
                data.push(IAC);
                buf.advance(2);
            }
            cmd @ (DO | DONT | WILL | WONT) => {
                if buf.len() < 3 {
                    break;
                }
                let option = buf[2];
                match cmd {
                    DO => replies.extend_from_slice(&[IAC, WONT, option]),
                    WILL => replies.extend_from_slice(&[IAC, DONT, option]),
                    _ => {}
                }
                buf.advance(3);
            }
            SB => {
                let end = buf.windows(2).position(|w| w == [IAC, SE]);
                match end {
                    Some(pos) => buf.advance(pos + 2),
                    None => break,
                }
            }
            _ => buf.advance(2),
        }
    }
    (data, replies)
}

fn last_line(text: &str) -> &str {
    text.trim_end_matches([' ', '\t'])
        .rsplit(['\n', '\r'])
        .next()
        .unwrap_or("")
}

pub fn is_username_prompt(text: &str) -> bool {
    let line = last_line(text).trim().to_ascii_lowercase();
    line.ends_with("username:") || line.ends_with("login:") || line.ends_with("user name:")
}

pub fn is_password_prompt(text: &str) -> bool {
    last_line(text).trim().to_ascii_lowercase().ends_with("password:")
}

pub fn is_cli_prompt(text: &str) -> bool {
    let line = last_line(text).trim();
    !line.is_empty() && (line.ends_with('#') || line.ends_with('>'))
}

fn is_confirmation(text: &str) -> bool {
    let line = last_line(text).trim().to_ascii_lowercase();
    line.contains("(y/n)")
}

fn is_pager(text: &str) -> bool {
    let line = last_line(text).trim();
    line.contains("--More--") || line.contains("---- More")
}

/// Vendor CLIs report rejected commands inline.
pub fn command_failed(output: &str) -> bool {
    output.lines().any(|line| {
        let line = line.trim().to_ascii_lowercase();
        line.starts_with('%')
            || line.starts_with("error")
            || line.starts_with("failure")
            || line.contains("unknown command")
            || line.contains("invalid input")
    })
}

/// One logged-in CLI session. Commands run one at a time.
pub struct CliSession {
    stream: TcpStream,
    buffer: BytesMut,
    timeout: Duration,
    host: String,
}

impl CliSession {
    pub async fn login(target: &CliTarget) -> Result<Self, DriverError> {
        let stream = timeout(
            target.timeout,
            TcpStream::connect((target.host.as_str(), target.port)),
        )
        .await
        .map_err(|_| DriverError::Connection(format!("connect to {} timed out", target.host)))?
        .map_err(|e| DriverError::Connection(format!("connect to {}: {e}", target.host)))?;

        let mut session = Self {
            stream,
            buffer: BytesMut::with_capacity(4096),
            timeout: target.timeout,
            host: target.host.clone(),
        };

        let banner = session.read_until(|t| is_username_prompt(t) || is_cli_prompt(t)).await?;
        if is_username_prompt(&banner) {
            session.write_line(&target.username).await?;
            session.read_until(is_password_prompt).await?;
            session.write_line(&target.password).await?;
            let reply = session
                .read_until(|t| is_cli_prompt(t) || is_username_prompt(t) || is_password_prompt(t))
                .await?;
            if !is_cli_prompt(&reply) {
                return Err(DriverError::Connection(format!(
                    "login to {} rejected",
                    target.host
                )));
            }
        }
        debug!(host = %target.host, "CLI session established.");
        Ok(session)
    }

    async fn write_line(&mut self, line: &str) -> Result<(), DriverError> {
        let mut bytes = Vec::with_capacity(line.len() + 2);
        bytes.extend_from_slice(line.as_bytes());
        bytes.extend_from_slice(b"\r\n");
        timeout(self.timeout, self.stream.write_all(&bytes))
            .await
            .map_err(|_| DriverError::Connection(format!("write to {} timed out", self.host)))?
            .map_err(|e| DriverError::Connection(e.to_string()))
    }

    /// Reads until `matcher` accepts the accumulated text, answering pagers on the way.
    async fn read_until(&mut self, matcher: impl Fn(&str) -> bool) -> Result<String, DriverError> {
        let mut text = String::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = timeout(self.timeout, self.stream.read(&mut chunk))
                .await
                .map_err(|_| DriverError::Connection(format!("read from {} timed out", self.host)))?
                .map_err(|e| DriverError::Connection(e.to_string()))?;
            if n == 0 {
                return Err(DriverError::Connection(format!(
                    "{} closed the connection",
                    self.host
                )));
            }
            self.buffer.extend_from_slice(&chunk[..n]);
            let (data, replies) = strip_telnet(&mut self.buffer);
            if !replies.is_empty() {
                self.stream
                    .write_all(&replies)
                    .await
                    .map_err(|e| DriverError::Connection(e.to_string()))?;
            }
            text.push_str(&String::from_utf8_lossy(&data));

            if is_pager(&text) {
                let cut = text.rfind(['\n', '\r']).map(|i| i + 1).unwrap_or(0);
                text.truncate(cut);
                self.stream
                    .write_all(b" ")
                    .await
                    .map_err(|e| DriverError::Connection(e.to_string()))?;
                continue;
            }
            if matcher(&text) {
                return Ok(text);
            }
        }
    }

    /// Runs one command and returns its output without the echo and trailing prompt.
    pub async fn execute(&mut self, command: &str) -> Result<String, DriverError> {
        self.write_line(command).await?;
        let mut raw = self.read_until(|t| is_cli_prompt(t) || is_confirmation(t)).await?;
        if is_confirmation(&raw) {
            self.write_line("y").await?;
            raw.push_str(&self.read_until(is_cli_prompt).await?);
        }
        Ok(clean_output(&raw, command))
    }

    /// Runs a script, stopping at the first command the device rejects.
    pub async fn execute_script(&mut self, commands: &[String]) -> Result<String, DriverError> {
        let mut transcript = String::new();
        for command in commands {
            let output = self.execute(command).await?;
            if command_failed(&output) {
                warn!(host = %self.host, command = %command, output = %output.trim(), "OLT rejected command.");
                return Err(DriverError::Command(format!("{command}: {}", output.trim())));
            }
            transcript.push_str(&output);
            transcript.push('\n');
        }
        Ok(transcript)
    }

    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }
}

fn clean_output(raw: &str, command: &str) -> String {
    let mut lines: Vec<&str> = raw.lines().map(|l| l.trim_end_matches('\r')).collect();
    if lines.first().is_some_and(|l| l.trim() == command.trim()) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| is_cli_prompt(l)) {
        lines.pop();
    }
    lines.join("\n")
}

/// Owns the target and a lazily opened session for one driver instance.
pub struct CliConnection {
    target: CliTarget,
    session: Option<CliSession>,
}

impl CliConnection {
    pub fn new(target: CliTarget) -> Self {
        Self {
            target,
            session: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.target.host
    }

    /// Logs in if needed. `setup` runs once after login (e.g. disabling paging).
    pub async fn connect(&mut self, setup: &[&str]) -> Result<(), DriverError> {
        if self.session.is_some() {
            return Ok(());
        }
        let mut session = CliSession::login(&self.target).await?;
        for command in setup {
            session.execute(command).await?;
        }
        self.session = Some(session);
        Ok(())
    }

    pub async fn run(&mut self, command: &str) -> Result<String, DriverError> {
        let session = self.session.as_mut().ok_or(DriverError::NotConnected)?;
        let result = session.execute(command).await;
        if matches!(result, Err(DriverError::Connection(_))) {
            self.session = None;
        }
        result
    }

    pub async fn run_script(&mut self, commands: &[String]) -> Result<String, DriverError> {
        let session = self.session.as_mut().ok_or(DriverError::NotConnected)?;
        let result = session.execute_script(commands).await;
        if matches!(result, Err(DriverError::Connection(_))) {
            self.session = None;
        }
        result
    }

    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }
}
