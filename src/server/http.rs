//! HTTP Protocol
//!
//! hyper does the HTTP/1.1 framing: chunked bodies, `Expect: 100-continue`, header limits.  All
//! we do here is route.  One request per connection, a JSON body in, a JSON body out.
//!
//! * `POST` -- the body is a request, queued like any other
//! * `GET` -- shorthand for `fs_stat`
//! * `OPTIONS` -- CORS preflight, answered here without touching the queue
//!
//! Anything else gets a 405.
use std::{io, net::TcpStream};

use {
    crossbeam::channel::Sender,
    futures::{
        future::{self, Either},
        sync::oneshot,
    },
    hyper::{
        header::{
            HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE,
            TRANSFER_ENCODING,
        },
        rt::{Future, Stream},
        server::conn::Http,
        service::service_fn,
        Body, Method, Request, Response, StatusCode,
    },
    log::{debug, trace, warn},
    tokio::{reactor::Handle, runtime::current_thread::Runtime},
};

use crate::server::worker::{Job, Reply};

/// Refuse bodies larger than this
const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

/// What `GET` means
const STAT_REQUEST: &str = r#"{"operation":"fs_stat","request_id":""}"#;

type BoxFut = Box<dyn Future<Item = Response<Body>, Error = hyper::Error> + Send>;

fn reply(status: StatusCode, body: String) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(CONNECTION, HeaderValue::from_static("close"));
    if !body.is_empty() {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        *response.body_mut() = Body::from(body);
    }

    response
}

fn preflight() -> Response<Body> {
    let mut response = reply(StatusCode::NO_CONTENT, String::new());
    let headers = response.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

/// Queue `body` and answer with whatever the worker says
fn round_trip(jobs: &Sender<Job>, body: Vec<u8>) -> BoxFut {
    let (sender, receiver) = oneshot::channel();
    let job = Job::Request {
        body,
        reply: Reply::Http(sender),
    };

    if jobs.send(job).is_err() {
        warn!("worker is gone");
        return Box::new(future::ok(reply(
            StatusCode::SERVICE_UNAVAILABLE,
            String::new(),
        )));
    }

    Box::new(receiver.then(|response| {
        Ok::<_, hyper::Error>(match response {
            Ok(response) => reply(StatusCode::OK, response),
            Err(_) => reply(StatusCode::SERVICE_UNAVAILABLE, String::new()),
        })
    }))
}

/// The declared body length.  `Ok(None)` means the body is chunked.
fn declared_length(req: &Request<Body>) -> Result<Option<usize>, StatusCode> {
    if let Some(len) = req.headers().get(CONTENT_LENGTH) {
        return match len.to_str().ok().and_then(|l| l.parse::<usize>().ok()) {
            Some(len) if len <= MAX_BODY_LEN => Ok(Some(len)),
            Some(_) => Err(StatusCode::PAYLOAD_TOO_LARGE),
            None => Err(StatusCode::BAD_REQUEST),
        };
    }

    if req.headers().contains_key(TRANSFER_ENCODING) {
        Ok(None)
    } else {
        Err(StatusCode::BAD_REQUEST)
    }
}

fn route(req: Request<Body>, jobs: &Sender<Job>) -> BoxFut {
    trace!("received a request: {:?}", req);
    debug!("http {} {}", req.method(), req.uri().path());

    match *req.method() {
        Method::OPTIONS => Box::new(future::ok(preflight())),

        Method::GET => round_trip(jobs, STAT_REQUEST.as_bytes().to_vec()),

        Method::POST => {
            if let Err(status) = declared_length(&req) {
                warn!("rejecting body: {}", status);
                return Box::new(future::ok(reply(status, String::new())));
            }

            let jobs = jobs.clone();
            Box::new(req.into_body().concat2().and_then(move |chunk| {
                if chunk.len() > MAX_BODY_LEN {
                    warn!("chunked body too large");
                    return Either::A(future::ok(reply(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        String::new(),
                    )));
                }
                Either::B(round_trip(&jobs, chunk.to_vec()))
            }))
        }

        _ => {
            let mut response = reply(StatusCode::METHOD_NOT_ALLOWED, String::new());
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, POST, OPTIONS"));
            Box::new(future::ok(response))
        }
    }
}

/// Serve one HTTP connection to completion on this thread
pub(crate) fn serve(stream: TcpStream, jobs: &Sender<Job>) -> io::Result<()> {
    let jobs = jobs.clone();
    let mut runtime = Runtime::new()?;

    let connection = future::lazy(move || {
        tokio::net::TcpStream::from_std(stream, &Handle::default())
    })
    .and_then(move |io| {
        Http::new()
            .http1_only(true)
            .keep_alive(false)
            .serve_connection(io, service_fn(move |req| route(req, &jobs)))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    });

    runtime.block_on(connection)
}

#[cfg(test)]
mod test {
    use std::thread::spawn;

    use crossbeam::channel::{unbounded, Receiver};

    use super::*;

    /// Answer every queued request with its own body
    fn echo_worker(queue: Receiver<Job>) {
        spawn(move || {
            for job in queue {
                if let Job::Request {
                    body,
                    reply: Reply::Http(sender),
                } = job
                {
                    let _ = sender.send(String::from_utf8_lossy(&body).into_owned());
                }
            }
        });
    }

    fn send(req: Request<Body>, jobs: &Sender<Job>) -> (StatusCode, String) {
        let response = route(req, jobs).wait().unwrap();
        let status = response.status();
        let body = response.into_body().concat2().wait().unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn preflight_skips_the_queue() {
        let (jobs, queue) = unbounded();
        let req = Request::builder()
            .method(Method::OPTIONS)
            .body(Body::empty())
            .unwrap();

        let response = route(req, &jobs).wait().unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(response.headers().contains_key(ACCESS_CONTROL_ALLOW_METHODS));
        assert!(queue.is_empty());
    }

    #[test]
    fn get_means_stat() {
        let (jobs, queue) = unbounded();
        echo_worker(queue);

        let req = Request::builder()
            .method(Method::GET)
            .uri("/")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            send(req, &jobs),
            (StatusCode::OK, STAT_REQUEST.to_string())
        );
    }

    #[test]
    fn post_bodies() {
        let (jobs, queue) = unbounded();
        echo_worker(queue);

        let req = Request::builder()
            .method(Method::POST)
            .header(CONTENT_LENGTH, "7")
            .body(Body::from("{\"a\":1}"))
            .unwrap();
        assert_eq!(send(req, &jobs), (StatusCode::OK, "{\"a\":1}".to_string()));

        let req = Request::builder()
            .method(Method::POST)
            .header(TRANSFER_ENCODING, "chunked")
            .body(Body::from("{\"b\":2}"))
            .unwrap();
        assert_eq!(send(req, &jobs), (StatusCode::OK, "{\"b\":2}".to_string()));
    }

    #[test]
    fn bad_lengths() {
        let (jobs, _queue) = unbounded();

        let req = Request::builder()
            .method(Method::POST)
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(req, &jobs).0, StatusCode::BAD_REQUEST);

        let req = Request::builder()
            .method(Method::POST)
            .header(CONTENT_LENGTH, &*(MAX_BODY_LEN + 1).to_string())
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(req, &jobs).0, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn other_methods() {
        let (jobs, _queue) = unbounded();
        let req = Request::builder()
            .method(Method::DELETE)
            .body(Body::empty())
            .unwrap();
        let response = route(req, &jobs).wait().unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, POST, OPTIONS");
    }

    #[test]
    fn worker_gone() {
        let (jobs, queue) = unbounded();
        drop(queue);

        let req = Request::builder()
            .method(Method::GET)
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(req, &jobs).0, StatusCode::SERVICE_UNAVAILABLE);
    }
}
