//! Secondary channel: the local node manager's plain-text protocol.
//!
//! One command per line; every command is answered by one line that
//! starts with `+OK` or `-ERR`. Independent of the REST channel, so it
//! still works when the server's own management layer is wedged.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use podstop_core::{Credentials, LocalKiller, ManagementError, ServerIdentity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeManagerSettings {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    /// Bounds each reply; KILL waits for the process to exit
    pub read_timeout: Duration,
}

impl Default for NodeManagerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5556,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
        }
    }
}

pub struct NodeManagerKiller {
    settings: NodeManagerSettings,
    credentials: PathBuf,
}

impl NodeManagerKiller {
    pub fn new(settings: NodeManagerSettings, credentials: PathBuf) -> Self {
        Self {
            settings,
            credentials,
        }
    }

    fn open(&self) -> Result<Conversation, ManagementError> {
        let addr = (self.settings.host.as_str(), self.settings.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                ManagementError::Connect(format!("cannot resolve {}", self.settings.host))
            })?;
        let stream = TcpStream::connect_timeout(&addr, self.settings.connect_timeout)
            .map_err(|e| ManagementError::Connect(format!("node manager at {addr}: {e}")))?;
        stream.set_read_timeout(Some(self.settings.read_timeout))?;
        stream.set_write_timeout(Some(self.settings.read_timeout))?;
        Ok(Conversation {
            reader: BufReader::new(stream.try_clone()?),
            writer: stream,
        })
    }
}

impl LocalKiller for NodeManagerKiller {
    fn kill(&self, server: &ServerIdentity) -> Result<(), ManagementError> {
        let credentials = Credentials::load(&self.credentials)
            .map_err(|e| ManagementError::Connect(format!("{e:#}")))?;

        let mut conv = self.open()?;
        log::info!(
            "Connected to node manager at {}:{}",
            self.settings.host,
            self.settings.port
        );
        conv.command(&format!(
            "DOMAIN {} {}",
            server.domain_name,
            server.domain_home.display()
        ))?;
        conv.command(&format!("USER {}", credentials.username))?;
        conv.command(&format!("PASS {}", credentials.password))
            .map_err(|e| match e {
                ManagementError::Rejected(_) => {
                    ManagementError::Rejected("node manager authentication failed".into())
                }
                other => other,
            })?;
        conv.command(&format!("SERVER {}", server.server_name))?;
        conv.command("KILL")?;

        if let Err(e) = conv.command("QUIT") {
            log::debug!("Node manager QUIT: {e}");
        }
        Ok(())
    }
}

struct Conversation {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Conversation {
    /// Send one command line and require a `+OK` reply.
    fn command(&mut self, line: &str) -> Result<(), ManagementError> {
        let verb = line.split(' ').next().unwrap_or(line);
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;

        let mut reply = String::new();
        if self.reader.read_line(&mut reply)? == 0 {
            return Err(ManagementError::Protocol(format!(
                "node manager closed the connection after {verb}"
            )));
        }
        let reply = reply.trim_end();
        if let Some(rest) = reply.strip_prefix("+OK") {
            log::debug!("{verb}: +OK{rest}");
            Ok(())
        } else if let Some(rest) = reply.strip_prefix("-ERR") {
            Err(ManagementError::Rejected(format!("{verb}: {}", rest.trim())))
        } else {
            Err(ManagementError::Protocol(format!(
                "unexpected reply to {verb}: {reply:?}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::mpsc;

    /// Fake node manager: answers `+OK` except for `fail_on`.
    fn serve(fail_on: Option<&'static str>) -> (u16, mpsc::Receiver<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;
            let mut seen = Vec::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    break;
                }
                let line = line.trim_end().to_string();
                let verb = line.split(' ').next().unwrap_or("").to_string();
                seen.push(line);
                if Some(verb.as_str()) == fail_on {
                    writeln!(writer, "-ERR Server not running").unwrap();
                } else {
                    writeln!(writer, "+OK {verb} done").unwrap();
                }
                if verb == "QUIT" {
                    break;
                }
            }
            let _ = tx.send(seen);
        });
        (port, rx)
    }

    fn killer(port: u16, dir: &tempfile::TempDir) -> NodeManagerKiller {
        let key = dir.path().join("key.bin");
        std::fs::write(&key, "username=weblogic\npassword=welcome1\n").unwrap();
        NodeManagerKiller::new(
            NodeManagerSettings {
                port,
                read_timeout: Duration::from_secs(5),
                ..Default::default()
            },
            key,
        )
    }

    fn identity() -> ServerIdentity {
        ServerIdentity::new("domain1", "/u01/domains/domain1", "managed-server1", "admin-server")
    }

    #[test]
    fn kill_sends_full_sequence() {
        let (port, rx) = serve(None);
        let dir = tempfile::tempdir().unwrap();

        killer(port, &dir).kill(&identity()).unwrap();

        let seen = rx.recv().unwrap();
        assert_eq!(
            seen,
            vec![
                "DOMAIN domain1 /u01/domains/domain1",
                "USER weblogic",
                "PASS welcome1",
                "SERVER managed-server1",
                "KILL",
                "QUIT",
            ]
        );
    }

    #[test]
    fn rejected_kill_is_an_error() {
        let (port, _rx) = serve(Some("KILL"));
        let dir = tempfile::tempdir().unwrap();

        let err = killer(port, &dir).kill(&identity()).unwrap_err();
        match err {
            ManagementError::Rejected(msg) => assert!(msg.contains("Server not running")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_password_does_not_echo_secret() {
        let (port, _rx) = serve(Some("PASS"));
        let dir = tempfile::tempdir().unwrap();

        let err = killer(port, &dir).kill(&identity()).unwrap_err();
        assert!(!err.to_string().contains("welcome1"));
        assert!(matches!(err, ManagementError::Rejected(_)));
    }

    #[test]
    fn nothing_listening_is_connect_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let dir = tempfile::tempdir().unwrap();

        let err = killer(port, &dir).kill(&identity()).unwrap_err();
        assert!(matches!(err, ManagementError::Connect(_)));
    }
}
