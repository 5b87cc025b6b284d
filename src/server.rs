//! Accept loop and per-connection sessions
//!
//! One tokio task per connection, spawned into a JoinSet that is drained
//! on every accept so finished workers are reclaimed under sustained
//! connection churn. A session runs the request/response loop strictly
//! sequentially: the next command is not read until the current response,
//! payload included, is fully sent.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use crate::archive;
use crate::command::{self, Command};
use crate::logger::Logger;
use crate::protocol;
use crate::search::{self, Filter};
use crate::transfer;

/// Peer a primary hands bulk requests to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    pub host: String,
    pub port: u16,
}

impl RedirectTarget {
    /// Parse `host[:port]`, defaulting the port when absent.
    pub fn parse(s: &str) -> Option<RedirectTarget> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        match s.split_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return None;
                }
                port.parse().ok().map(|port| RedirectTarget {
                    host: host.to_string(),
                    port,
                })
            }
            None => Some(RedirectTarget {
                host: s.to_string(),
                port: protocol::DEFAULT_PORT,
            }),
        }
    }
}

pub async fn serve(
    bind: &str,
    root: &Path,
    mirror: Option<RedirectTarget>,
    logger: Arc<dyn Logger>,
) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind {}", bind))?;
    eprintln!("siftd listening on {} root={}", bind, root.display());

    let mut workers: JoinSet<()> = JoinSet::new();
    loop {
        // reap finished connection tasks so the set does not grow unbounded
        while workers.try_join_next().is_some() {}

        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                eprintln!("accept failed: {}", e);
                continue;
            }
        };
        let _ = stream.set_nodelay(true);

        let root = root.to_path_buf();
        let mirror = mirror.clone();
        let logger = Arc::clone(&logger);
        workers.spawn(async move {
            logger.connect(peer);
            let session = Session {
                peer,
                root,
                mirror,
                commands: 0,
                bytes_sent: 0,
            };
            if let Err(e) = session.run(stream, logger.as_ref()).await {
                eprintln!("session {}: {:#}", peer, e);
                logger.error(peer, "session", &format!("{:#}", e));
            }
        });
    }
}

struct Session {
    peer: SocketAddr,
    root: PathBuf,
    mirror: Option<RedirectTarget>,
    commands: u64,
    bytes_sent: u64,
}

impl Session {
    async fn run(mut self, stream: TcpStream, logger: &dyn Logger) -> Result<()> {
        eprintln!("connection from {}", self.peer);
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        loop {
            // await the next command; a zero-length read is a disconnect
            let line = match transfer::read_message(&mut reader).await? {
                Some(line) => line,
                None => break,
            };
            logger.command(self.peer, &line);

            // authoritative validation - the client's pre-flight copy of
            // the same rules is not trusted
            let cmd = match command::parse(&line) {
                Ok(cmd) => cmd,
                Err(e) => {
                    let msg = format!("{}{}", protocol::ERROR_PREFIX, e);
                    transfer::send_line(&mut writer, &msg).await?;
                    continue;
                }
            };
            self.commands += 1;

            if matches!(cmd, Command::Quit) {
                break;
            }

            // redirect policy: a primary offloads every bulk transfer to
            // its mirror; the mirror has no target and so never redirects
            // a request it already owns
            if cmd.is_bulk() {
                if let Some(target) = &self.mirror {
                    let msg = format!(
                        "{}{} {}",
                        protocol::REDIRECT_PREFIX,
                        target.host,
                        target.port
                    );
                    transfer::send_line(&mut writer, &msg).await?;
                    logger.redirect(self.peer, &target.host, target.port);
                    continue;
                }
            }

            self.execute(&cmd, &mut reader, &mut writer, logger).await?;
        }

        eprintln!(
            "session {} closed: commands={} payload_bytes={}",
            self.peer, self.commands, self.bytes_sent
        );
        logger.close(self.peer, self.commands, self.bytes_sent);
        Ok(())
    }

    /// Dispatch one validated command. Search and archive failures are
    /// reported in-band and keep the session alive; an error escaping here
    /// means the stream itself is broken and the session ends.
    async fn execute(
        &mut self,
        cmd: &Command,
        reader: &mut BufReader<OwnedReadHalf>,
        writer: &mut OwnedWriteHalf,
        logger: &dyn Logger,
    ) -> Result<()> {
        match cmd {
            Command::FindFile { name } => {
                match self.locate(name).await? {
                    Some(path) => {
                        transfer::send_line(writer, &path.display().to_string()).await?
                    }
                    None => transfer::send_line(writer, protocol::FILE_NOT_FOUND).await?,
                }
            }
            Command::GetFileTar { name } => match self.locate(name).await? {
                Some(path) => {
                    self.stream_archive(vec![path], reader, writer, logger).await?
                }
                None => transfer::send_line(writer, protocol::NO_FILE_FOUND).await?,
            },
            Command::GetFilesBySize { min, max } => {
                let filter = Filter::SizeRange { min: *min, max: *max };
                self.bulk(filter, reader, writer, logger).await?;
            }
            Command::GetFilesByDate { from, to } => {
                let filter = Filter::from_dates(from, to);
                self.bulk(filter, reader, writer, logger).await?;
            }
            Command::GetFilesByExt { extensions } => {
                let filter = Filter::Extensions(extensions.clone());
                self.bulk(filter, reader, writer, logger).await?;
            }
            Command::Quit => {}
        }
        Ok(())
    }

    async fn locate(&self, name: &str) -> Result<Option<PathBuf>> {
        let root = self.root.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || search::find_by_name(&root, &name))
            .await
            .context("search task")
    }

    async fn bulk(
        &mut self,
        filter: Filter,
        reader: &mut BufReader<OwnedReadHalf>,
        writer: &mut OwnedWriteHalf,
        logger: &dyn Logger,
    ) -> Result<()> {
        let root = self.root.clone();
        let matched = tokio::task::spawn_blocking(move || {
            search::collect_matching(&root, &filter, protocol::MAX_RESULTS)
        })
        .await
        .context("search task")?;

        if matched.is_empty() {
            transfer::send_line(writer, protocol::NO_FILE_FOUND).await?;
            return Ok(());
        }
        self.stream_archive(matched, reader, writer, logger).await
    }

    async fn stream_archive(
        &mut self,
        files: Vec<PathBuf>,
        reader: &mut BufReader<OwnedReadHalf>,
        writer: &mut OwnedWriteHalf,
        logger: &dyn Logger,
    ) -> Result<()> {
        let root = self.root.clone();
        let built = tokio::task::spawn_blocking(move || archive::build_archive(&root, &files))
            .await
            .context("archive task")?;

        // build failures are in-band: report and keep serving
        let (tmp, len) = match built {
            Ok(built) => built,
            Err(e) => {
                let msg = format!("{}{:#}", protocol::ERROR_PREFIX, e);
                transfer::send_line(writer, &msg).await?;
                logger.error(self.peer, "archive", &format!("{:#}", e));
                return Ok(());
            }
        };

        let mut source = match tokio::fs::File::open(tmp.path()).await {
            Ok(f) => f,
            Err(e) => {
                let msg = format!("{}open archive: {}", protocol::ERROR_PREFIX, e);
                transfer::send_line(writer, &msg).await?;
                logger.error(self.peer, "archive", &e.to_string());
                return Ok(());
            }
        };

        // once the length is announced the framing is committed; an error
        // past this point tears the session down
        let sent = transfer::send_file(reader, writer, &mut source, len).await?;
        self.bytes_sent += sent;
        logger.sent(self.peer, sent);
        Ok(())
        // tmp drops here: the temp archive is unlinked, success or failure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_redirect_targets() {
        assert_eq!(
            RedirectTarget::parse("127.0.0.1:8081"),
            Some(RedirectTarget { host: "127.0.0.1".into(), port: 8081 })
        );
        assert_eq!(
            RedirectTarget::parse("mirror.local"),
            Some(RedirectTarget {
                host: "mirror.local".into(),
                port: protocol::DEFAULT_PORT
            })
        );
        assert_eq!(RedirectTarget::parse(""), None);
        assert_eq!(RedirectTarget::parse(":8081"), None);
        assert_eq!(RedirectTarget::parse("host:notaport"), None);
    }
}
