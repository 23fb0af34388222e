//! Test doubles: a scripted transport, a sleeper that only records and a
//! loopback HTTP server for the reqwest-backed code.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::Value;

use crate::gcp::transport::{Method, Transport, TransportError};
use crate::provision::poll::Sleeper;

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

/// Replies to each `(method, url)` from a queue of canned responses. The last
/// response of a queue is repeated once the others are used up; unscripted
/// requests fail with HTTP 404.
#[derive(Default)]
pub struct ScriptedTransport {
    script: RefCell<HashMap<(Method, String), VecDeque<Result<Value, TransportError>>>>,
    calls: RefCell<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn on<I>(self, method: Method, url: impl Into<String>, responses: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.script
            .borrow_mut()
            .entry((method, url.into()))
            .or_default()
            .extend(responses.into_iter().map(Ok));
        self
    }

    pub fn fail(self, method: Method, url: impl Into<String>, err: TransportError) -> Self {
        self.script
            .borrow_mut()
            .entry((method, url.into()))
            .or_default()
            .push_back(Err(err));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, method: Method, url: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.method == method && c.url == url)
            .count()
    }

    /// Number of calls whose URL contains `fragment`.
    pub fn count_matching(&self, fragment: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.url.contains(fragment))
            .count()
    }
}

impl Transport for ScriptedTransport {
    fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        self.calls.borrow_mut().push(Call {
            method,
            url: url.to_string(),
            body: body.cloned(),
        });
        let mut script = self.script.borrow_mut();
        let Some(queue) = script.get_mut(&(method, url.to_string())) else {
            return Err(TransportError::Status {
                status: 404,
                body: format!("unscripted {method} {url}"),
            });
        };
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        next.unwrap_or_else(|| {
            Err(TransportError::Status {
                status: 404,
                body: format!("unscripted {method} {url}"),
            })
        })
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    slept: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, d: Duration) {
        self.slept.borrow_mut().push(d);
    }
}

/// Plain HTTP/1.1 server on an ephemeral 127.0.0.1 port. Each connection gets
/// the next canned `(status, body)`; the last one repeats. Every response
/// closes the connection, so each request is seen separately.
pub struct LoopbackServer {
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl LoopbackServer {
    pub fn start(responses: &[(u16, &str)]) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let responses: Vec<(u16, String)> =
            responses.iter().map(|(s, b)| (*s, b.to_string())).collect();

        let seen = Arc::clone(&requests);
        thread::spawn(move || {
            for (n, stream) in listener.incoming().enumerate() {
                let Ok(mut stream) = stream else { break };
                let request = read_request(&mut stream);
                seen.lock().unwrap().push(request);
                let (status, body) = &responses[n.min(responses.len() - 1)];
                let _ = write!(
                    stream,
                    "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
            }
        });
        Self { url, requests }
    }

    /// Raw text (request line, headers, body) of every request received.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

fn read_request(stream: &mut std::net::TcpStream) -> String {
    let mut reader = BufReader::new(stream);
    let mut text = String::new();
    let mut content_length = 0;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            return text;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
        let end = line == "\r\n";
        text.push_str(&line);
        if end {
            break;
        }
    }
    let mut body = vec![0; content_length];
    if reader.read_exact(&mut body).is_ok() {
        text.push_str(&String::from_utf8_lossy(&body));
    }
    text
}
