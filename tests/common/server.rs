//! Fake upstream IRC server.
//!
//! `manual()` hands every accepted connection to the test as a [`Session`]
//! to script by hand. `auto()` registers every connection itself (welcome
//! after USER, PONG for PING) and records what each client sent.

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// One accepted client connection.
pub struct Session {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Session {
    /// Next line from the client, without the terminator.
    pub async fn recv(&mut self) -> anyhow::Result<String> {
        match timeout(Duration::from_secs(5), self.lines.next_line()).await?? {
            Some(line) => Ok(line.trim_end().to_string()),
            None => anyhow::bail!("client closed the connection"),
        }
    }

    pub async fn send(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read lines up to and including USER.
    pub async fn read_registration(&mut self) -> anyhow::Result<Vec<String>> {
        let mut seen = Vec::new();
        loop {
            let line = self.recv().await?;
            let done = line.starts_with("USER ");
            seen.push(line);
            if done {
                return Ok(seen);
            }
        }
    }

    pub async fn welcome(&mut self, nick: &str) -> anyhow::Result<()> {
        self.send(&format!(":irc.test 001 {nick} :Welcome to the test network {nick}"))
            .await
    }
}

pub struct FakeIrcServer {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    sessions: Option<mpsc::UnboundedReceiver<Session>>,
    transcripts: Arc<Mutex<Vec<Arc<Mutex<Vec<String>>>>>>,
    task: JoinHandle<()>,
}

impl FakeIrcServer {
    /// Hand each connection to the test.
    #[allow(dead_code)]
    pub async fn manual() -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut server = Self::spawn(move |session, _| {
            let _ = tx.send(session);
        })
        .await?;
        server.sessions = Some(rx);
        Ok(server)
    }

    /// Register every connection automatically.
    #[allow(dead_code)]
    pub async fn auto() -> anyhow::Result<Self> {
        Self::spawn(|mut session, transcript| {
            tokio::spawn(async move {
                let Ok(lines) = session.read_registration().await else {
                    return;
                };
                let nick = lines
                    .iter()
                    .rev()
                    .find_map(|l| l.strip_prefix("NICK "))
                    .unwrap_or("*")
                    .to_string();
                transcript.lock().extend(lines);
                if session.welcome(&nick).await.is_err() {
                    return;
                }
                while let Some(Ok(Some(line))) =
                    timeout(Duration::from_secs(60), session.lines.next_line()).await.ok()
                {
                    let line = line.trim_end().to_string();
                    if let Some(token) = line.strip_prefix("PING ") {
                        let _ = session.send(&format!(":irc.test PONG irc.test {token}")).await;
                    }
                    transcript.lock().push(line);
                }
            });
        })
        .await
    }

    async fn spawn<F>(on_accept: F) -> anyhow::Result<Self>
    where
        F: Fn(Session, Arc<Mutex<Vec<String>>>) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let accepted = Arc::new(AtomicUsize::new(0));
        let transcripts: Arc<Mutex<Vec<Arc<Mutex<Vec<String>>>>>> = Arc::default();

        let task = {
            let accepted = Arc::clone(&accepted);
            let transcripts = Arc::clone(&transcripts);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    accepted.fetch_add(1, Ordering::SeqCst);
                    let (read, writer) = stream.into_split();
                    let transcript = Arc::new(Mutex::new(Vec::new()));
                    transcripts.lock().push(Arc::clone(&transcript));
                    let session = Session {
                        lines: BufReader::new(read).lines(),
                        writer,
                    };
                    on_accept(session, transcript);
                }
            })
        };

        Ok(Self {
            addr,
            accepted,
            sessions: None,
            transcripts,
            task,
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Wait for the next connection (manual mode).
    #[allow(dead_code)]
    pub async fn next_session(&mut self) -> anyhow::Result<Session> {
        let Some(sessions) = self.sessions.as_mut() else {
            anyhow::bail!("server is not in manual mode");
        };
        match timeout(Duration::from_secs(10), sessions.recv()).await? {
            Some(session) => Ok(session),
            None => anyhow::bail!("listener stopped"),
        }
    }

    /// Lines the `index`-th connection sent (auto mode).
    #[allow(dead_code)]
    pub fn transcript(&self, index: usize) -> Vec<String> {
        self.transcripts
            .lock()
            .get(index)
            .map(|t| t.lock().clone())
            .unwrap_or_default()
    }
}

impl Drop for FakeIrcServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
