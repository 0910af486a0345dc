use crate::constants::buffers::MAX_CAPTURE_BYTES;
use crate::constants::network::KEEPALIVE_INTERVAL_SECS;
use crate::errors::OpsError;
use crate::services::registry::ServerProfile;
use ssh2::Session;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub key_file: Option<PathBuf>,
    pub timeout: Duration,
}

impl ConnectTarget {
    // Key-file auth wins over a password when both are present and the key
    // file actually exists on disk. A profile whose credential degraded to
    // nothing fails here, before any dialing happens.
    pub fn from_profile(profile: &ServerProfile) -> Result<Self, OpsError> {
        let key_file = profile
            .key_file_path
            .as_ref()
            .map(PathBuf::from)
            .filter(|path| path.exists());
        if key_file.is_none() && profile.password.is_empty() {
            return Err(OpsError::authentication(format!(
                "No usable credential for '{}'",
                profile.name
            )));
        }
        Ok(Self {
            host: profile.host.clone(),
            port: profile.port,
            username: profile.username.clone(),
            password: profile.password.clone(),
            key_file,
            timeout: Duration::from_secs(profile.timeout_secs),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u128,
}

pub trait Transport: Send {
    fn exec(&mut self, command: &str, timeout: Duration) -> Result<ExecOutput, OpsError>;
    fn close(&mut self);
}

pub trait TransportFactory: Send + Sync {
    fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Transport>, OpsError>;
}

pub struct SshTransportFactory;

impl TransportFactory for SshTransportFactory {
    fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Transport>, OpsError> {
        SshTransport::open(target).map(|transport| Box::new(transport) as Box<dyn Transport>)
    }
}

struct SshTransport {
    session: Session,
}

impl SshTransport {
    fn open(target: &ConnectTarget) -> Result<Self, OpsError> {
        let addr = (target.host.as_str(), target.port)
            .to_socket_addrs()
            .map_err(|err| {
                OpsError::protocol(format!("Failed to resolve {}: {}", target.host, err))
            })?
            .next()
            .ok_or_else(|| {
                OpsError::protocol(format!("No address found for {}", target.host))
            })?;
        let tcp = TcpStream::connect_timeout(&addr, target.timeout).map_err(|err| {
            if err.kind() == std::io::ErrorKind::TimedOut {
                OpsError::timeout(format!("Connection to {} timed out", target.host))
            } else {
                OpsError::protocol(format!("Failed to connect to {}: {}", target.host, err))
            }
        })?;
        tcp.set_read_timeout(Some(target.timeout)).ok();
        tcp.set_write_timeout(Some(target.timeout)).ok();

        let mut session = Session::new()
            .map_err(|_| OpsError::protocol("Failed to create SSH session"))?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(map_ssh_error)?;

        if let Some(key_file) = target.key_file.as_ref() {
            session
                .userauth_pubkey_file(&target.username, None, key_file, None)
                .map_err(|err| {
                    OpsError::authentication(format!("Key authentication failed: {}", err))
                })?;
        } else {
            session
                .userauth_password(&target.username, &target.password)
                .map_err(|err| {
                    OpsError::authentication(format!("Password authentication failed: {}", err))
                })?;
        }
        if !session.authenticated() {
            return Err(OpsError::authentication("SSH authentication failed"));
        }
        session.set_keepalive(true, KEEPALIVE_INTERVAL_SECS);
        Ok(Self { session })
    }
}

impl Transport for SshTransport {
    fn exec(&mut self, command: &str, timeout: Duration) -> Result<ExecOutput, OpsError> {
        let started = Instant::now();
        self.session.set_blocking(true);
        let mut channel = self.session.channel_session().map_err(map_ssh_error)?;
        channel.exec(command).map_err(map_ssh_error)?;
        self.session.set_blocking(false);

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut timed_out = false;
        {
            let mut out_stream = channel.stream(0);
            let mut err_stream = channel.stderr();
            let mut buf = [0u8; 8192];
            loop {
                let mut progressed = false;
                match out_stream.read(&mut buf) {
                    Ok(n) if n > 0 => {
                        push_capped(&mut stdout, &buf[..n]);
                        progressed = true;
                    }
                    Ok(_) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(err) => {
                        self.session.set_blocking(true);
                        return Err(OpsError::protocol(format!(
                            "Reading command output failed: {}",
                            err
                        )));
                    }
                }
                match err_stream.read(&mut buf) {
                    Ok(n) if n > 0 => {
                        push_capped(&mut stderr, &buf[..n]);
                        progressed = true;
                    }
                    Ok(_) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(err) => {
                        self.session.set_blocking(true);
                        return Err(OpsError::protocol(format!(
                            "Reading command output failed: {}",
                            err
                        )));
                    }
                }
                if channel.eof() {
                    break;
                }
                if started.elapsed() > timeout {
                    timed_out = true;
                    break;
                }
                if !progressed {
                    std::thread::sleep(Duration::from_millis(20));
                }
            }
        }

        self.session.set_blocking(true);
        if timed_out {
            let _ = channel.close();
            return Err(OpsError::timeout(format!(
                "Command exceeded {}s timeout",
                timeout.as_secs()
            )));
        }
        let _ = channel.wait_close();
        let exit_code = i64::from(channel.exit_status().unwrap_or(-1));
        Ok(ExecOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
            duration_ms: started.elapsed().as_millis(),
        })
    }

    fn close(&mut self) {
        let _ = self.session.disconnect(None, "session closed", None);
    }
}

fn push_capped(buffer: &mut Vec<u8>, chunk: &[u8]) {
    let remaining = MAX_CAPTURE_BYTES.saturating_sub(buffer.len());
    let take = chunk.len().min(remaining);
    buffer.extend_from_slice(&chunk[..take]);
}

fn map_ssh_error(err: ssh2::Error) -> OpsError {
    let io_err: std::io::Error = err.into();
    match io_err.kind() {
        std::io::ErrorKind::TimedOut => OpsError::timeout("SSH operation timed out"),
        _ => OpsError::protocol(format!("SSH error: {}", io_err)),
    }
}
