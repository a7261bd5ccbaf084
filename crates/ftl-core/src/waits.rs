//! Readiness waits run after a container starts, before it's considered
//! fully up.
//!
//! Grounded on `plugins/waits.py`: TCP/HTTP/HTTPS reachability against the
//! instance's published port mapping, a fixed-duration timer, and an
//! in-container file-presence check. HTTPS SSL/certificate errors propagate
//! as hard failures rather than being swallowed as not-yet-ready, matching
//! the original's `except (ssl.SSLError, ssl.CertificateError): raise`.

use std::net::TcpStream;
use std::time::{Duration, Instant};

use crate::errors::{FtlError, Result};

pub trait WaitCheck: Send {
    /// Returns `Ok(true)` when ready, `Ok(false)` when still waiting, and
    /// `Err` for a hard failure (e.g. an HTTPS certificate error) that should
    /// abort the boot instead of being retried.
    fn ready(&mut self) -> Result<bool>;
    fn description(&self) -> String;
}

pub struct TcpWait {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl WaitCheck for TcpWait {
    fn ready(&mut self) -> Result<bool> {
        let addr = resolve_to_socket_addr(&self.host, self.port)
            .map_err(|e| FtlError::Runtime { message: e.to_string(), code: None, instance: None })?;
        Ok(TcpStream::connect_timeout(&addr, self.timeout).is_ok())
    }

    fn description(&self) -> String {
        format!("TCP on port {}", self.port)
    }
}

fn resolve_to_socket_addr(host: &str, port: u16) -> std::io::Result<std::net::SocketAddr> {
    use std::net::ToSocketAddrs;
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved"))
}

pub struct HttpWait {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub method: String,
    pub timeout: Duration,
    pub expected_codes: std::ops::Range<u16>,
}

impl WaitCheck for HttpWait {
    fn ready(&mut self) -> Result<bool> {
        let agent = ureq_like_get(&self.host, self.port, &self.path, &self.method, self.timeout, false);
        match agent {
            Ok(status) => Ok(self.expected_codes.contains(&status)),
            Err(_) => Ok(false),
        }
    }

    fn description(&self) -> String {
        format!("HTTP on port {}", self.port)
    }
}

pub struct HttpsWait {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub method: String,
    pub timeout: Duration,
    pub expected_codes: std::ops::Range<u16>,
    pub verify_cert: bool,
}

impl WaitCheck for HttpsWait {
    /// TLS/certificate problems are hard errors here: swallowing them as
    /// "not ready yet" would mask a misconfigured image indefinitely.
    fn ready(&mut self) -> Result<bool> {
        match ureq_like_get(&self.host, self.port, &self.path, &self.method, self.timeout, true) {
            Ok(status) => Ok(self.expected_codes.contains(&status)),
            Err(TlsOrIoError::Tls(message)) => Err(FtlError::Runtime { message, code: None, instance: None }),
            Err(TlsOrIoError::Io(_)) => Ok(false),
        }
    }

    fn description(&self) -> String {
        format!("HTTPS on port {}", self.port)
    }
}

enum TlsOrIoError {
    Tls(String),
    Io(std::io::Error),
}

/// Minimal blocking HTTP/HTTPS GET used purely to check readiness; not a
/// general-purpose client. `reqwest::blocking` is reserved for HTTPS where
/// TLS verification matters; plain HTTP uses a raw socket write to avoid
/// pulling the async runtime in for a one-line request.
fn ureq_like_get(
    host: &str,
    port: u16,
    path: &str,
    method: &str,
    timeout: Duration,
    tls: bool,
) -> std::result::Result<u16, TlsOrIoError> {
    if tls {
        let url = format!("https://{host}:{port}{path}");
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(false)
            .build()
            .map_err(|e| TlsOrIoError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        let request = match method {
            "POST" => client.post(&url),
            _ => client.get(&url),
        };
        match request.send() {
            Ok(response) => Ok(response.status().as_u16()),
            Err(e) if e.is_connect() || e.is_timeout() => Err(TlsOrIoError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))),
            Err(e) => Err(TlsOrIoError::Tls(e.to_string())),
        }
    } else {
        use std::io::{Read, Write};
        let mut stream = TcpStream::connect((host, port)).map_err(TlsOrIoError::Io)?;
        stream.set_read_timeout(Some(timeout)).ok();
        stream.set_write_timeout(Some(timeout)).ok();
        let request = format!("{method} {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).map_err(TlsOrIoError::Io)?;
        let mut response = String::new();
        stream.read_to_string(&mut response).map_err(TlsOrIoError::Io)?;
        let status_line = response.lines().next().unwrap_or_default();
        let status = status_line.split_whitespace().nth(1).and_then(|s| s.parse().ok()).unwrap_or(0);
        Ok(status)
    }
}

pub struct TimeWait {
    pub wait_until: Instant,
}

impl TimeWait {
    pub fn new(seconds: u64) -> Self {
        TimeWait { wait_until: Instant::now() + Duration::from_secs(seconds) }
    }
}

impl WaitCheck for TimeWait {
    fn ready(&mut self) -> Result<bool> {
        Ok(Instant::now() >= self.wait_until)
    }

    fn description(&self) -> String {
        "timer".to_string()
    }
}

pub struct FileWait<'a> {
    pub engine: &'a dyn crate::engine::ContainerEngine,
    pub container_id: String,
    pub path: String,
    pub waiting_name: Option<String>,
}

impl<'a> WaitCheck for FileWait<'a> {
    fn ready(&mut self) -> Result<bool> {
        Ok(self.engine.get_archive(&self.container_id, &self.path).map(|bytes| !bytes.is_empty()).unwrap_or(false))
    }

    fn description(&self) -> String {
        self.waiting_name.clone().unwrap_or_else(|| format!("file {}", self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_wait_is_not_ready_immediately() {
        let mut wait = TimeWait::new(60);
        assert!(!wait.ready().unwrap());
    }

    #[test]
    fn time_wait_zero_seconds_is_ready() {
        let mut wait = TimeWait::new(0);
        std::thread::sleep(Duration::from_millis(5));
        assert!(wait.ready().unwrap());
    }
}
