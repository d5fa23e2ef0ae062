//! Minimal telnet client for the router's debug shell.
//!
//! Only what the DG834 busybox `telnetd` needs: every option the server
//! offers is refused, subnegotiations are skipped, and the session reads until
//! the received text ends in a shell prompt.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, trace};

use crate::collector::traits::CollectError;

/// Conventional telnet port.
pub const TELNET_PORT: u16 = 23;

/// Shell prompt: one of `$ % # >` followed by a space at the very end.
pub const PROMPT_PATTERN: &str = r"[$%#>] \z";

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DecodeState {
    #[default]
    Data,
    Iac,
    Negotiate(u8),
    Subnegotiation,
    SubnegotiationIac,
}

/// Splits a telnet byte stream into payload and negotiation replies.
///
/// State survives across calls, so commands split over reads are handled.
#[derive(Debug, Default)]
pub(crate) struct TelnetDecoder {
    state: DecodeState,
}

impl TelnetDecoder {
    /// Appends payload bytes of `input` to `data` and returns the bytes that
    /// must be sent back to the server.
    pub(crate) fn feed(&mut self, input: &[u8], data: &mut Vec<u8>) -> Vec<u8> {
        let mut replies = Vec::new();
        for &b in input {
            self.state = match self.state {
                DecodeState::Data => match b {
                    IAC => DecodeState::Iac,
                    // NUL only pads a bare CR
                    0 => DecodeState::Data,
                    _ => {
                        data.push(b);
                        DecodeState::Data
                    }
                },
                DecodeState::Iac => match b {
                    IAC => {
                        data.push(IAC);
                        DecodeState::Data
                    }
                    DO | DONT | WILL | WONT => DecodeState::Negotiate(b),
                    SB => DecodeState::Subnegotiation,
                    _ => DecodeState::Data,
                },
                DecodeState::Negotiate(command) => {
                    match command {
                        DO => replies.extend_from_slice(&[IAC, WONT, b]),
                        WILL => replies.extend_from_slice(&[IAC, DONT, b]),
                        _ => {}
                    }
                    DecodeState::Data
                }
                DecodeState::Subnegotiation => match b {
                    IAC => DecodeState::SubnegotiationIac,
                    _ => DecodeState::Subnegotiation,
                },
                DecodeState::SubnegotiationIac => match b {
                    SE => DecodeState::Data,
                    _ => DecodeState::Subnegotiation,
                },
            };
        }
        replies
    }
}

/// One telnet session, bounded by a single deadline.
///
/// The connection is closed when the session is dropped.
pub struct TelnetSession {
    stream: TcpStream,
    deadline: Instant,
    decoder: TelnetDecoder,
    received: Vec<u8>,
}

impl TelnetSession {
    /// Connects to `host:port`. `timeout` covers this call and every later
    /// operation on the session.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, CollectError> {
        let deadline = Instant::now() + timeout;
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(CollectError::Connect)?;

        let mut last_error = None;
        for addr in addrs {
            let remaining = remaining_until(deadline)?;
            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(stream) => {
                    debug!("Connected to {}", addr);
                    return Ok(Self {
                        stream,
                        deadline,
                        decoder: TelnetDecoder::default(),
                        received: Vec::new(),
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(match last_error {
            Some(e) if e.kind() == std::io::ErrorKind::TimedOut => CollectError::Timeout,
            Some(e) => CollectError::Connect(e),
            None => CollectError::Connect(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no address for {}", host),
            )),
        })
    }

    /// Reads until the received text matches `prompt` and returns all of it,
    /// prompt included, with CRLF turned into LF.
    pub fn wait_for(&mut self, prompt: &Regex) -> Result<String, CollectError> {
        loop {
            let text = String::from_utf8_lossy(&self.received);
            if prompt.is_match(&text) {
                let text = text.replace("\r\n", "\n");
                self.received.clear();
                return Ok(text);
            }
            self.fill()?;
        }
    }

    /// Sends `command` and returns the output printed before the next prompt.
    ///
    /// Only the prompt match is removed; a last line without a trailing
    /// newline is kept.
    pub fn cmd(&mut self, command: &str, prompt: &Regex) -> Result<String, CollectError> {
        trace!("Sending command: {}", command);
        self.send(format!("{}\r\n", command).as_bytes())?;
        let mut output = self.wait_for(prompt)?;
        if let Some(m) = prompt.find_iter(&output).last() {
            output.truncate(m.start());
        }
        Ok(output)
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), CollectError> {
        let remaining = remaining_until(self.deadline)?;
        self.stream.set_write_timeout(Some(remaining))?;
        self.stream.write_all(bytes)?;
        Ok(())
    }

    fn fill(&mut self) -> Result<(), CollectError> {
        let remaining = remaining_until(self.deadline)?;
        self.stream.set_read_timeout(Some(remaining))?;

        let mut buf = [0u8; 1024];
        let n = match self.stream.read(&mut buf) {
            Ok(0) => return Err(CollectError::ConnectionClosed),
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let replies = self.decoder.feed(&buf[..n], &mut self.received);
        if !replies.is_empty() {
            self.send(&replies)?;
        }
        Ok(())
    }
}

fn remaining_until(deadline: Instant) -> Result<Duration, CollectError> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        Err(CollectError::Timeout)
    } else {
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::avsar::STATS_PATH;
    use crate::collector::mock::DG834_STATS_FIXTURE;
    use std::net::TcpListener;
    use std::thread;

    fn prompt() -> Regex {
        Regex::new(PROMPT_PATTERN).unwrap()
    }

    #[test]
    fn test_prompt_pattern() {
        let re = prompt();
        assert!(re.is_match("BusyBox v0.61\n# "));
        assert!(re.is_match("user@router:~$ "));
        assert!(re.is_match("> "));
        assert!(!re.is_match("# \n"));
        assert!(!re.is_match("DS Margin: 12"));
    }

    #[test]
    fn test_decoder_refuses_options() {
        let mut decoder = TelnetDecoder::default();
        let mut data = Vec::new();
        let replies = decoder.feed(&[IAC, DO, 1, b'h', IAC, WILL, 3, b'i'], &mut data);
        assert_eq!(data, b"hi");
        assert_eq!(replies, vec![IAC, WONT, 1, IAC, DONT, 3]);
    }

    #[test]
    fn test_decoder_handles_split_sequences() {
        let mut decoder = TelnetDecoder::default();
        let mut data = Vec::new();
        assert!(decoder.feed(&[b'a', IAC], &mut data).is_empty());
        let replies = decoder.feed(&[DO, 24, b'b'], &mut data);
        assert_eq!(replies, vec![IAC, WONT, 24]);
        assert_eq!(data, b"ab");
    }

    #[test]
    fn test_decoder_skips_subnegotiation_and_escapes() {
        let mut decoder = TelnetDecoder::default();
        let mut data = Vec::new();
        let input = [IAC, SB, 24, 1, IAC, SE, b'x', IAC, IAC, b'\r', 0, b'y'];
        assert!(decoder.feed(&input, &mut data).is_empty());
        assert_eq!(data, vec![b'x', IAC, b'\r', b'y']);
    }

    #[test]
    fn test_session_runs_command() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(&[IAC, DO, 1]).unwrap();
            stream.write_all(b"\r\n\r\nBusyBox v0.61.pre\r\n# ").unwrap();

            let mut request = Vec::new();
            let mut buf = [0u8; 256];
            while !request.ends_with(b"\r\n") {
                let n = stream.read(&mut buf).unwrap();
                assert!(n > 0);
                request.extend_from_slice(&buf[..n]);
            }

            let body = DG834_STATS_FIXTURE.replace('\n', "\r\n");
            let reply = format!("cat {}\r\n{}# ", STATS_PATH, body);
            stream.write_all(reply.as_bytes()).unwrap();
            request
        });

        let mut session =
            TelnetSession::connect("127.0.0.1", port, Duration::from_secs(5)).unwrap();
        let banner = session.wait_for(&prompt()).unwrap();
        assert!(banner.contains("BusyBox"));
        let output = session
            .cmd(&format!("cat {}", STATS_PATH), &prompt())
            .unwrap();

        let request = server.join().unwrap();
        assert!(request.starts_with(&[IAC, WONT, 1]));
        assert!(request.ends_with(format!("cat {}\r\n", STATS_PATH).as_bytes()));

        assert!(output.contains("DS Connection Rate:\t8128"));
        assert!(!output.contains('\r'));
        assert!(!output.ends_with("# "));
    }

    #[test]
    fn test_cmd_keeps_last_line_before_prompt() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"# ").unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 128];
            while !request.ends_with(b"\r\n") {
                let n = stream.read(&mut buf).unwrap();
                assert!(n > 0);
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(b"DS Margin: 12\r\nUS Payload: 828# ").unwrap();
        });

        let mut session =
            TelnetSession::connect("127.0.0.1", port, Duration::from_secs(5)).unwrap();
        session.wait_for(&prompt()).unwrap();
        let output = session.cmd("cat stats", &prompt()).unwrap();
        server.join().unwrap();

        assert_eq!(output, "DS Margin: 12\nUS Payload: 828");
    }

    #[test]
    fn test_connect_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = TelnetSession::connect("127.0.0.1", port, Duration::from_secs(2))
            .err()
            .unwrap();
        assert!(matches!(err, CollectError::Connect(_)), "got {err}");
    }

    #[test]
    fn test_prompt_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"Login incorrect\r\n").unwrap();
            let mut buf = [0u8; 64];
            while matches!(stream.read(&mut buf), Ok(n) if n > 0) {}
        });

        let mut session =
            TelnetSession::connect("127.0.0.1", port, Duration::from_millis(300)).unwrap();
        let err = session.wait_for(&prompt()).unwrap_err();
        assert!(matches!(err, CollectError::Timeout), "got {err}");
        drop(session);
        server.join().unwrap();
    }

    #[test]
    fn test_connection_closed_before_prompt() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"bye\r\n").unwrap();
        });

        let mut session =
            TelnetSession::connect("127.0.0.1", port, Duration::from_secs(5)).unwrap();
        server.join().unwrap();
        let err = session.wait_for(&prompt()).unwrap_err();
        assert!(
            matches!(err, CollectError::ConnectionClosed | CollectError::Io(_)),
            "got {err}"
        );
    }
}
