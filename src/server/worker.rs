//! The Request Worker
//!
//! Exactly one of these runs per server.  It owns the mounted file system outright, and takes jobs
//! off the queue one at a time, in the order they arrived.  Nothing else can reach the engine, so
//! no two operations ever overlap.
use std::{io::Write, net::TcpStream};

use crossbeam::channel::Receiver;
use futures::sync::oneshot;
use log::{debug, info, trace, warn};
use serde_json::{json, Value};

use crate::{
    block::storage::ContainerStorage,
    error::Result,
    fsimpl::OmniFileSystem,
    server::message::{failure, parse_role, success, Operation, Request},
    session::Session,
};

/// Where a response goes
pub(crate) enum Reply {
    /// Hand it to the HTTP connection that's waiting on the other end
    Http(oneshot::Sender<String>),
    /// Write it, newline terminated, straight back to the client
    Line(TcpStream),
}

pub(crate) enum Job {
    Request { body: Vec<u8>, reply: Reply },
    Shutdown,
}

/// Drain the queue until told to stop, then unmount
pub(crate) fn run<S: ContainerStorage>(
    mut fs: OmniFileSystem<S>,
    jobs: Receiver<Job>,
) -> Result<()> {
    info!("worker started");

    for job in jobs {
        match job {
            Job::Shutdown => break,
            Job::Request { body, reply } => {
                let response = dispatch(&mut fs, &body);
                deliver(reply, response);
            }
        }
    }

    info!("worker stopping");
    fs.unmount()
}

fn deliver(reply: Reply, response: String) {
    match reply {
        Reply::Http(waiter) => {
            if waiter.send(response).is_err() {
                warn!("http client went away before its response was ready");
            }
        }
        Reply::Line(mut stream) => {
            let mut line = response.into_bytes();
            line.push(b'\n');
            if let Err(e) = stream.write_all(&line).and_then(|_| stream.flush()) {
                warn!("unable to write response: {}", e);
            }
        }
    }
}

/// Run one request against the file system, and render the response
pub(crate) fn dispatch<S: ContainerStorage, B: AsRef<[u8]>>(
    fs: &mut OmniFileSystem<S>,
    body: B,
) -> String {
    let request = Request::parse(body);
    trace!("request {:?}", request);

    let operation = match request.operation {
        Ok(op) => op,
        Err(code) => {
            warn!("rejected request {:?}: {}", request.request_id, code);
            return failure(&request.request_id, code);
        }
    };

    match execute(fs, operation) {
        Ok(Ok(payload)) => success(&request.request_id, payload),
        Ok(Err(code)) => {
            warn!("rejected request {:?}: {}", request.request_id, code);
            failure(&request.request_id, code)
        }
        Err(e) => {
            debug!("request {:?} failed: {}", request.request_id, e);
            failure(&request.request_id, e.code())
        }
    }
}

/// The outer error is the engine's; the inner one is a malformed request
fn execute<S: ContainerStorage>(
    fs: &mut OmniFileSystem<S>,
    operation: Operation,
) -> Result<std::result::Result<Value, &'static str>> {
    let payload = match operation {
        Operation::Ping => json!({ "message": "pong" }),

        Operation::UserCreate {
            token,
            username,
            password,
            role,
        } => {
            let role = match parse_role(role.as_ref()) {
                Ok(role) => role,
                Err(code) => return Ok(Err(code)),
            };
            let session = session(fs, token)?;
            fs.create_user(session.as_ref(), &username, &password, role)?;
            json!({})
        }

        Operation::UserLogin { username, password } => {
            let session = fs.login(&username, &password)?;
            json!({
                "token": session.token(),
                "username": session.user().username,
                "role": session.user().role.as_u32(),
            })
        }

        Operation::UserList { token } => {
            let session = session(fs, token)?;
            let users = fs
                .list_users(session.as_ref())?
                .into_iter()
                .map(|u| json!({ "username": u.username, "role": u.role.as_u32() }))
                .collect::<Vec<_>>();
            json!({ "users": users })
        }

        Operation::FileCreate { token, path, data } => {
            let session = session(fs, token)?;
            fs.file_create(session.as_ref(), &path, data.as_bytes())?;
            json!({})
        }

        Operation::FileRead { token, path } => {
            let session = session(fs, token)?;
            let data = fs.file_read(session.as_ref(), &path)?;
            json!({ "data": String::from_utf8_lossy(&data) })
        }

        Operation::FileDelete { token, path } => {
            let session = session(fs, token)?;
            fs.file_delete(session.as_ref(), &path)?;
            json!({})
        }

        Operation::DirCreate { token, path } => {
            let session = session(fs, token)?;
            fs.dir_create(session.as_ref(), &path)?;
            json!({})
        }

        Operation::DirList { token, path } => {
            let session = session(fs, token)?;
            let entries = fs
                .dir_list(session.as_ref(), &path)?
                .into_iter()
                .map(|e| json!({ "name": e.path, "type": e.entry_type.as_u32() }))
                .collect::<Vec<_>>();
            json!({ "entries": entries })
        }

        Operation::FsStat => json!({ "stat": fs.stat() }),
    };

    Ok(Ok(payload))
}

/// Resolve a token, if there is one
fn session<S: ContainerStorage>(
    fs: &OmniFileSystem<S>,
    token: Option<String>,
) -> Result<Option<Session>> {
    match token {
        Some(token) if !token.is_empty() => Ok(Some(fs.resolve(&token)?)),
        _ => Ok(None),
    }
}
