// MIT License - Copyright (c) 2026 Peter Wright
// Job archive transfer over FTP

use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::config::FtpCredentials;
use crate::error::{F4Error, Result};
use crate::transport::direct::open_stream;
use crate::transport::Endpoint;

/// Remote file storage for job archives.
///
/// The sensor exposes its saved jobs over FTP; tests and alternative
/// back ends implement this directly.
#[allow(async_fn_in_trait)]
pub trait JobFileStore {
    /// Fetch `name` from `directory`.
    async fn retrieve(&mut self, directory: &str, name: &str) -> Result<Vec<u8>>;

    /// Write `data` to `directory/name`, replacing any existing file.
    async fn store(&mut self, directory: &str, name: &str, data: &[u8]) -> Result<()>;
}

/// A parsed FTP control reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpReply {
    pub code: u16,
    pub message: String,
}

/// Bytes moved per data-channel read or write.
const DATA_CHUNK: usize = 8192;

/// Minimal passive-mode FTP client, binary transfers only.
///
/// `connect_timeout` also bounds every control reply and every data-channel
/// read or write, so a stalled server fails the transfer instead of hanging.
pub struct FtpClient {
    control: BufReader<TcpStream>,
    peer_ip: IpAddr,
    connect_timeout: Duration,
}

impl FtpClient {
    /// Connect, log in and switch to binary mode.
    pub async fn connect(
        host: &str,
        port: u16,
        credentials: &FtpCredentials,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let endpoint = Endpoint {
            host: host.to_string(),
            port,
        };
        info!("Opening FTP session to {}", endpoint);
        let stream = open_stream(&endpoint, connect_timeout).await?;
        let peer_ip = stream.peer_addr()?.ip();

        let mut client = Self {
            control: BufReader::new(stream),
            peer_ip,
            connect_timeout,
        };
        client.expect(&[220]).await?;

        let user = client
            .command(&format!("USER {}", credentials.username), &[230, 331])
            .await?;
        if user.code == 331 {
            client
                .command(&format!("PASS {}", credentials.password), &[202, 230])
                .await?;
        }
        client.command("TYPE I", &[200]).await?;
        debug!("FTP login as {} accepted", credentials.username);
        Ok(client)
    }

    pub async fn cwd(&mut self, directory: &str) -> Result<()> {
        self.command(&format!("CWD {directory}"), &[200, 250]).await?;
        Ok(())
    }

    /// Download a file from the current directory.
    pub async fn retrieve_file(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut data = self.passive().await?;
        self.command(&format!("RETR {name}"), &[125, 150]).await?;
        let mut contents = Vec::new();
        let mut chunk = vec![0u8; DATA_CHUNK];
        loop {
            let n = bounded(self.connect_timeout, "data read", data.read(&mut chunk)).await?;
            if n == 0 {
                break;
            }
            contents.extend_from_slice(&chunk[..n]);
        }
        drop(data);
        self.expect(&[226, 250]).await?;
        debug!("FTP retrieved {} ({} bytes)", name, contents.len());
        Ok(contents)
    }

    /// Upload a file into the current directory.
    pub async fn store_file(&mut self, name: &str, contents: &[u8]) -> Result<()> {
        let mut data = self.passive().await?;
        self.command(&format!("STOR {name}"), &[125, 150]).await?;
        for piece in contents.chunks(DATA_CHUNK) {
            bounded(self.connect_timeout, "data write", data.write_all(piece)).await?;
        }
        bounded(self.connect_timeout, "data shutdown", data.shutdown()).await?;
        drop(data);
        self.expect(&[226, 250]).await?;
        debug!("FTP stored {} ({} bytes)", name, contents.len());
        Ok(())
    }

    /// End the session.
    pub async fn quit(mut self) -> Result<()> {
        self.command("QUIT", &[221]).await?;
        Ok(())
    }

    async fn passive(&mut self) -> Result<TcpStream> {
        let reply = self.command("PASV", &[227]).await?;
        let (ip, port) = parse_pasv(&reply.message)?;
        // Some devices advertise 0.0.0.0; reuse the control peer then.
        let ip = if ip.is_unspecified() {
            self.peer_ip
        } else {
            IpAddr::V4(ip)
        };
        let addr = SocketAddr::new(ip, port);
        match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(F4Error::Connection {
                addr: addr.to_string(),
                source: e,
            }),
            Err(_) => Err(F4Error::ConnectionTimeout {
                addr: addr.to_string(),
            }),
        }
    }

    async fn command(&mut self, line: &str, expected: &[u16]) -> Result<FtpReply> {
        if line.starts_with("PASS ") {
            debug!("FTP > PASS ****");
        } else {
            debug!("FTP > {}", line);
        }
        let limit = self.connect_timeout;
        let stream = self.control.get_mut();
        let request = format!("{line}\r\n");
        bounded(limit, "command", stream.write_all(request.as_bytes())).await?;
        self.expect(expected).await
    }

    async fn expect(&mut self, expected: &[u16]) -> Result<FtpReply> {
        let reply = self.read_reply().await?;
        if expected.contains(&reply.code) {
            Ok(reply)
        } else {
            Err(F4Error::Ftp {
                code: reply.code,
                message: reply.message,
            })
        }
    }

    async fn read_reply(&mut self) -> Result<FtpReply> {
        let first = self.read_line().await?;
        let (code, separator, text) = split_reply_line(&first)?;
        let mut message = text.to_string();

        if separator == '-' {
            // Multi-line reply: runs until a line starting with "<code> ".
            let terminator = format!("{code} ");
            loop {
                let line = self.read_line().await?;
                if let Some(last) = line.strip_prefix(&terminator) {
                    message.push('\n');
                    message.push_str(last);
                    break;
                }
                message.push('\n');
                message.push_str(&line);
            }
        }

        debug!("FTP < {} {}", code, message);
        Ok(FtpReply { code, message })
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let limit = self.connect_timeout;
        if bounded(limit, "reply", self.control.read_line(&mut line)).await? == 0 {
            return Err(F4Error::InvalidResponse {
                details: "FTP control connection closed".to_string(),
            });
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl JobFileStore for FtpClient {
    async fn retrieve(&mut self, directory: &str, name: &str) -> Result<Vec<u8>> {
        self.cwd(directory).await?;
        self.retrieve_file(name).await
    }

    async fn store(&mut self, directory: &str, name: &str, data: &[u8]) -> Result<()> {
        self.cwd(directory).await?;
        self.store_file(name, data).await
    }
}

/// Run one FTP I/O step, failing with `TimedOut` after `limit`.
async fn bounded<T>(
    limit: Duration,
    what: &str,
    step: impl Future<Output = io::Result<T>>,
) -> Result<T> {
    match timeout(limit, step).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            warn!("FTP {} timed out after {:?}", what, limit);
            Err(F4Error::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("FTP {what} timed out"),
            )))
        }
    }
}

/// Split `"227 Entering..."` into code, separator and text.
fn split_reply_line(line: &str) -> Result<(u16, char, &str)> {
    let invalid = || F4Error::InvalidResponse {
        details: format!("FTP reply: {line:?}"),
    };
    let code = line
        .get(..3)
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(invalid)?;
    let separator = line[3..].chars().next().unwrap_or(' ');
    if separator != ' ' && separator != '-' {
        return Err(invalid());
    }
    let text = line.get(4..).unwrap_or("");
    Ok((code, separator, text))
}

/// Parse the `h1,h2,h3,h4,p1,p2` address of a PASV reply.
pub fn parse_pasv(message: &str) -> Result<(Ipv4Addr, u16)> {
    let invalid = || F4Error::InvalidResponse {
        details: format!("PASV reply: {message:?}"),
    };
    let start = match message.find('(') {
        Some(i) => i + 1,
        None => message.find(|c: char| c.is_ascii_digit()).ok_or_else(invalid)?,
    };
    let end = message[start..]
        .find(|c: char| !(c.is_ascii_digit() || c == ',' || c == ' '))
        .map_or(message.len(), |i| start + i);

    let parts = message[start..end]
        .split(',')
        .map(|p| p.trim().parse::<u8>())
        .collect::<std::result::Result<Vec<u8>, _>>()
        .map_err(|_| invalid())?;
    match parts.as_slice() {
        [a, b, c, d, hi, lo] => Ok((
            Ipv4Addr::new(*a, *b, *c, *d),
            (u16::from(*hi) << 8) | u16::from(*lo),
        )),
        _ => Err(invalid()),
    }
}
