//! Line Protocol
//!
//! One JSON request per line in, one JSON response per line out.  The connection stays open until
//! the client closes it.  Responses are written by the worker, not by this thread.
//!
//! Lines are queued as raw bytes.  A line that isn't UTF-8 still reaches the parser, and gets an
//! `invalid_request` back in its turn rather than ending the connection.
use std::{
    io::{BufRead, BufReader},
    net::TcpStream,
};

use crossbeam::channel::Sender;
use log::{debug, warn};

use crate::server::worker::{Job, Reply};

fn trim(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |n| n + 1);
    &line[start..end]
}

pub(crate) fn serve(stream: TcpStream, jobs: &Sender<Job>) -> std::io::Result<()> {
    let peer = stream.peer_addr()?;
    debug!("line protocol client {}", peer);

    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }

        let body = trim(&line);
        if body.is_empty() {
            continue;
        }

        let job = Job::Request {
            body: body.to_vec(),
            reply: Reply::Line(stream.try_clone()?),
        };
        if jobs.send(job).is_err() {
            warn!("worker is gone; dropping {}", peer);
            break;
        }
    }

    debug!("line protocol client {} closed", peer);
    Ok(())
}
