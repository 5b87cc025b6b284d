//! Client-side session logic
//!
//! Commands are validated locally before anything touches the network,
//! then sent as one text line. A `REDIRECT` answer is followed exactly
//! once: close nothing on the primary side, dial the named peer, resubmit
//! the identical command text, and settle the response there. Any response
//! shape we do not recognize is shown to the user as-is, never treated as
//! fatal.

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::cli::ClientOpts;
use crate::command::{self, Command};
use crate::transfer::{self, Response};

pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Connection {
    pub async fn open(addr: &str) -> Result<Connection> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connect {}", addr))?;
        let _ = stream.set_nodelay(true);
        let (read_half, writer) = stream.into_split();
        Ok(Connection {
            reader: BufReader::new(read_half),
            writer,
        })
    }
}

/// What one command ended in, for the interactive loop to report.
#[derive(Debug)]
pub enum Outcome {
    FoundAt(String),
    NotFound,
    ServerError(String),
    Saved { path: PathBuf, bytes: u64 },
    Raw(String),
}

/// Send one validated command and settle its response, following at most
/// one redirect leg.
pub async fn execute(
    conn: &mut Connection,
    line: &str,
    cmd: &Command,
    opts: &ClientOpts,
) -> Result<Outcome> {
    transfer::send_line(&mut conn.writer, line).await?;
    let response = match transfer::read_message(&mut conn.reader).await? {
        Some(response) => response,
        None => bail!("server closed the connection"),
    };

    if let Response::Redirect { host, port } = Response::parse(&response) {
        // the redirected leg resubmits the identical command text; the
        // mirror owns the request from here and will not redirect again
        let addr = format!("{}:{}", host, port);
        let mut mirror = Connection::open(&addr)
            .await
            .with_context(|| format!("follow redirect to {}", addr))?;
        transfer::send_line(&mut mirror.writer, line).await?;
        let response = match transfer::read_message(&mut mirror.reader).await? {
            Some(response) => response,
            None => bail!("mirror closed the connection"),
        };
        return settle(&mut mirror, response, cmd, opts).await;
    }

    settle(conn, response, cmd, opts).await
}

/// Handle every non-redirect response shape. A second `REDIRECT` arriving
/// here (a mirror misbehaving) falls through to the opaque passthrough.
async fn settle(
    conn: &mut Connection,
    response: String,
    cmd: &Command,
    opts: &ClientOpts,
) -> Result<Outcome> {
    match Response::parse(&response) {
        Response::Path(path) => Ok(Outcome::FoundAt(path)),
        Response::NotFound => Ok(Outcome::NotFound),
        Response::Error(msg) => Ok(Outcome::ServerError(msg)),
        Response::Payload(declared) => {
            let name = cmd.archive_name().unwrap_or("payload.bin");
            let dest_path = opts.output_dir.join(name);
            let mut dest = tokio::fs::File::create(&dest_path)
                .await
                .with_context(|| format!("create {}", dest_path.display()))?;

            let bar = if opts.quiet {
                None
            } else {
                let pb = ProgressBar::new(declared);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{bar:40.green} {bytes}/{total_bytes}")
                        .unwrap(),
                );
                Some(pb)
            };

            let bytes = transfer::recv_payload(
                &mut conn.reader,
                &mut conn.writer,
                declared,
                &mut dest,
                |done| {
                    if let Some(pb) = &bar {
                        pb.set_position(done);
                    }
                },
            )
            .await?;
            if let Some(pb) = bar {
                pb.finish();
            }
            Ok(Outcome::Saved { path: dest_path, bytes })
        }
        Response::Redirect { .. } | Response::Other(_) => Ok(Outcome::Raw(response)),
    }
}

/// Interactive prompt loop: read a line, validate, run it, report.
pub async fn run(opts: &ClientOpts) -> Result<()> {
    println!("Connecting to {}...", opts.server);
    let mut conn = Connection::open(&opts.server).await?;
    println!("Connected.");
    print_usage();

    use std::io::Write as _;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("sift> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line == "help" {
            // handled locally, never sent
            print_usage();
            continue;
        }

        // pre-flight validation saves the round trip; the server checks
        // again regardless
        let cmd = match command::parse(&line) {
            Ok(cmd) => cmd,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        if cmd == Command::Quit {
            // quit has no response; just tell the server and leave
            let _ = transfer::send_line(&mut conn.writer, &line).await;
            break;
        }

        match execute(&mut conn, &line, &cmd, opts).await {
            Ok(outcome) => report(&outcome),
            Err(e) => {
                eprintln!("connection lost: {:#}", e);
                break;
            }
        }
    }

    println!("Disconnected.");
    Ok(())
}

fn report(outcome: &Outcome) {
    match outcome {
        Outcome::FoundAt(path) => println!("File found at: {}", path),
        Outcome::NotFound => println!("No files found matching the criteria"),
        Outcome::ServerError(msg) => println!("Server error: {}", msg),
        Outcome::Saved { path, bytes } => {
            println!("File saved as: {} ({} bytes)", path.display(), bytes)
        }
        Outcome::Raw(response) => println!("Server response: {}", response),
    }
}

fn print_usage() {
    println!();
    println!("Commands:");
    println!("  findfile <filename>               find a file by exact name");
    println!("  getftar <filename>                fetch one file as an archive");
    println!("  sgetfiles <size1> <size2>         fetch files with size in [size1,size2] bytes");
    println!("  dgetfiles <date1> <date2>         fetch files modified in [date1,date2] (YYYY-MM-DD)");
    println!("  getfiles <ext1> [ext2] ... [ext6] fetch files matching 1-6 extensions");
    println!("  quit                              end the session");
    println!("  help                              show this message");
    println!();
}
