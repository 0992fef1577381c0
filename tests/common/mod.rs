//! Fake MAPI server used by the connection tests
//!
//! Each test binds a listener on `127.0.0.1:0` and scripts the server side
//! of the conversation with the helpers below.

#![allow(dead_code)]

use std::time::Duration;

use monetdb_rs::packet::encode_message;
use monetdb_rs::Config;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Challenge of a standalone server storing SHA512 password hashes
pub const CHALLENGE: &str = "s4lt:mserver:9:RIPEMD160,SHA512,SHA256,SHA1,MD5:LIT:SHA512:";

/// Challenge of the `monetdbd` daemon in front of the servers
pub const PROXY_CHALLENGE: &str = "pr0xy:merovingian:9:RIPEMD160,SHA512,SHA256,SHA1,MD5:LIT:SHA512:";

/// Bind a listener on an ephemeral local port
pub async fn listen() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Client configuration pointing at a fake server
pub fn config(port: u16) -> Config {
    Config::new("127.0.0.1", port, "demo", "monetdb", "monetdb")
        .connect_timeout(Duration::from_secs(2))
        .auth_timeout(Duration::from_secs(5))
}

/// Read one logical message, joining blocks
pub async fn read_message(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut message = Vec::new();
    loop {
        let mut header = [0u8; 2];
        stream.read_exact(&mut header).await?;
        let raw = u16::from_le_bytes(header);
        let mut payload = vec![0u8; (raw >> 1) as usize];
        stream.read_exact(&mut payload).await?;
        message.extend_from_slice(&payload);
        if raw & 1 == 1 {
            break;
        }
    }
    Ok(String::from_utf8(message).unwrap())
}

/// Write one logical message
pub async fn write_message(stream: &mut TcpStream, text: &str) {
    stream
        .write_all(&encode_message(text.as_bytes()))
        .await
        .unwrap();
}

/// Answer a command with an empty prompt
pub async fn ack(stream: &mut TcpStream) -> String {
    let command = read_message(stream).await.unwrap();
    write_message(stream, "").await;
    command
}

/// Send the challenge and return the client's login response
pub async fn challenge(stream: &mut TcpStream, challenge: &str) -> String {
    write_message(stream, challenge).await;
    read_message(stream).await.unwrap()
}

/// Run a successful login plus the session options sent right after it
///
/// Returns the login response and the option commands, in order.
pub async fn accept_login(stream: &mut TcpStream, options: usize) -> (String, Vec<String>) {
    let response = challenge(stream, CHALLENGE).await;
    write_message(stream, "").await;

    let mut commands = Vec::with_capacity(options);
    for _ in 0..options {
        commands.push(ack(stream).await);
    }
    (response, commands)
}

/// Accept one connection and log it in with default options
pub async fn accept_ready(listener: &TcpListener) -> TcpStream {
    let (mut stream, _) = listener.accept().await.unwrap();
    accept_login(&mut stream, 2).await;
    stream
}

/// A two-column table reply (`id int`, `name varchar`)
pub fn table_reply(query_id: i64, total: u64, rows: &[(Option<i64>, &str)]) -> String {
    let mut reply = format!(
        "&1 {} {} 2 {}\n\
         % sys.t,\tsys.t # table_name\n\
         % id,\tname # name\n\
         % int,\tvarchar # type\n\
         % 1,\t5 # length\n\
         % 32 0,\t0 0 # typesizes\n",
        query_id,
        total,
        rows.len()
    );
    for (id, name) in rows {
        let id = id.map(|v| v.to_string()).unwrap_or_else(|| "NULL".to_string());
        reply.push_str(&format!("[ {},\t\"{}\"\t]\n", id, name));
    }
    reply
}

/// A continuation block for [`table_reply`]
pub fn block_reply(query_id: i64, offset: u64, rows: &[(Option<i64>, &str)]) -> String {
    let mut reply = format!("&6 {} 2 {} {}\n", query_id, rows.len(), offset);
    for (id, name) in rows {
        let id = id.map(|v| v.to_string()).unwrap_or_else(|| "NULL".to_string());
        reply.push_str(&format!("[ {},\t\"{}\"\t]\n", id, name));
    }
    reply
}
