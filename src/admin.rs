//! Admin line protocol.
//!
//! One request per connection: a single `\n`-terminated line, split into at
//! most three tokens (`verb`, `arg1`, `rest`) so a `set` value containing
//! spaces survives intact. The verb handlers are kept as pure functions
//! over `&Store` (`dispatch`) so they can be unit-tested without opening a
//! socket.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::store::Store;

/// Reject a line longer than this before even trying to parse it — bounds
/// the memory a single misbehaving connection can hold the server to.
const MAX_LINE_LEN: usize = 8 * 1024;

pub const SUCCESS: &str = "SUCCESS";
pub const ERROR: &str = "ERROR";
pub const PONG: &str = "PONG";

pub struct AdminHandler {
    store: Arc<Store>,
}

impl AdminHandler {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, conn: TcpStream) {
        // `take` caps how many bytes `read_line` will ever pull off the
        // wire, so a line with no newline (or one past the cap) can't grow
        // `line` unbounded — `read_line` just hits its "EOF" once the cap is
        // reached, same as a real EOF, and the length check below rejects it.
        let mut reader = BufReader::new(conn.take(MAX_LINE_LEN as u64 + 1));
        let mut line = String::new();
        let reply = match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("admin connection closed before sending a line");
                return;
            }
            Ok(_) if line.len() > MAX_LINE_LEN => ERROR.to_string(),
            Ok(_) => {
                let trimmed = line.trim_end_matches(['\n', '\r']);
                self.dispatch_line(trimmed).await
            }
            Err(e) => {
                warn!(error = %e, "error reading admin line");
                return;
            }
        };

        let conn = reader.into_inner().into_inner();
        write_reply(conn, &reply).await;
    }

    async fn dispatch_line(&self, line: &str) -> String {
        let tokens: Vec<&str> = line.trim().splitn(3, ' ').collect();
        match tokens.as_slice() {
            [] => ERROR.to_string(),
            [verb, rest @ ..] => dispatch(&self.store, verb, rest).await,
        }
    }
}

async fn write_reply(mut conn: TcpStream, reply: &str) {
    if let Err(e) = conn.write_all(reply.as_bytes()).await {
        warn!(error = %e, "error writing admin reply");
    }
}

/// Verb dispatch, independent of any socket I/O. `args` is whatever tokens
/// followed the verb (at most two, the second possibly containing embedded
/// spaces since it came from a `splitn(3, ' ')`).
pub async fn dispatch(store: &Store, verb: &str, args: &[&str]) -> String {
    match verb.to_ascii_lowercase().as_str() {
        "ping" => PONG.to_string(),
        "join" => match args {
            [raft_addr, node_id] => match store.join_str(node_id, raft_addr).await {
                Ok(()) => SUCCESS.to_string(),
                Err(e) => e.to_string(),
            },
            _ => ERROR.to_string(),
        },
        "leave" => match args {
            [node_id] => match store.leave_str(node_id).await {
                Ok(()) => SUCCESS.to_string(),
                Err(e) => e.to_string(),
            },
            _ => ERROR.to_string(),
        },
        "get" => match args {
            [key] => match store.get(key) {
                Some(value) => value,
                None => ERROR.to_string(),
            },
            _ => ERROR.to_string(),
        },
        "set" => match args {
            [key, value] => match store.set(key, value).await {
                Ok(()) => SUCCESS.to_string(),
                Err(e) => e.to_string(),
            },
            _ => ERROR.to_string(),
        },
        "del" => match args {
            [key] => match store.delete(key).await {
                Ok(()) => SUCCESS.to_string(),
                Err(e) => e.to_string(),
            },
            _ => ERROR.to_string(),
        },
        _ => ERROR.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splitn_preserves_spaces_in_set_value() {
        let tokens: Vec<&str> = "set foo_1 A 10.0.0.1 more text".trim().splitn(3, ' ').collect();
        assert_eq!(tokens, vec!["set", "foo_1", "A 10.0.0.1 more text"]);
    }

    #[test]
    fn empty_line_has_no_tokens() {
        let tokens: Vec<&str> = "".trim().splitn(3, ' ').collect();
        assert_eq!(tokens, vec![""]);
    }
}
