use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Mutex;

pub trait Logger: Send + Sync {
    fn connect(&self, _peer: SocketAddr) {}
    fn command(&self, _peer: SocketAddr, _line: &str) {}
    fn sent(&self, _peer: SocketAddr, _bytes: u64) {}
    fn redirect(&self, _peer: SocketAddr, _host: &str, _port: u16) {}
    fn error(&self, _peer: SocketAddr, _context: &str, _msg: &str) {}
    fn close(&self, _peer: SocketAddr, _commands: u64, _bytes: u64) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl Logger for TextLogger {
    fn connect(&self, peer: SocketAddr) {
        self.line(&format!("CONNECT peer={peer}"));
    }
    fn command(&self, peer: SocketAddr, line: &str) {
        self.line(&format!("COMMAND peer={peer} line={line}"));
    }
    fn sent(&self, peer: SocketAddr, bytes: u64) {
        self.line(&format!("SENT peer={peer} bytes={bytes}"));
    }
    fn redirect(&self, peer: SocketAddr, host: &str, port: u16) {
        self.line(&format!("REDIRECT peer={peer} target={host}:{port}"));
    }
    fn error(&self, peer: SocketAddr, context: &str, msg: &str) {
        self.line(&format!("ERROR peer={peer} ctx={context} msg={msg}"));
    }
    fn close(&self, peer: SocketAddr, commands: u64, bytes: u64) {
        self.line(&format!("CLOSE peer={peer} commands={commands} bytes={bytes}"));
    }
}
