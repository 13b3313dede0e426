//! WebSocket handshake and framing tests over real sockets.

mod common;

use common::{Event, Recorder, any_port, expect_no_event, next_event, package_bytes};
use framebus::{CoreConfig, Framebus};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::{Duration, timeout},
};

const UPGRADE_REQUEST: &str = "GET /bus HTTP/1.1\r\n\
     Host: localhost\r\n\
     Upgrade: websocket\r\n\
     Connection: Upgrade\r\n\
     Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
     Sec-WebSocket-Version: 13\r\n\r\n";

/// Masked client frame around one package.
fn masked_frame(service: u16, command: u16, body: &[u8], key: [u8; 4]) -> Vec<u8> {
    let package = package_bytes(service, command, body);
    let mut frame = vec![0x82];
    match package.len() {
        len if len < 126 => frame.push(0x80 | u8::try_from(len).expect("short length")),
        len => {
            frame.push(0x80 | 126);
            frame.extend_from_slice(&u16::try_from(len).expect("u16 length").to_be_bytes());
        }
    }
    frame.extend_from_slice(&key);
    frame.extend(
        package
            .iter()
            .enumerate()
            .map(|(offset, byte)| byte ^ key[offset % 4]),
    );
    frame
}

/// Read from `client` until the response head terminator arrives.
async fn read_response_head(client: &mut TcpStream) -> String {
    let head = async {
        let mut collected = Vec::new();
        let mut chunk = [0_u8; 256];
        loop {
            let count = client.read(&mut chunk).await.expect("read response");
            assert!(count > 0, "connection closed during handshake");
            collected.extend_from_slice(&chunk[..count]);
            if collected.windows(4).any(|window| window == b"\r\n\r\n") {
                break String::from_utf8(collected).expect("ascii response");
            }
        }
    };
    timeout(Duration::from_secs(5), head)
        .await
        .expect("timed out reading handshake response")
}

async fn upgraded_client(core: &Framebus<Recorder>) -> TcpStream {
    let addr = core.listen_websocket(any_port()).await.expect("bind");
    let mut client = TcpStream::connect(addr).await.expect("connect");
    client
        .write_all(UPGRADE_REQUEST.as_bytes())
        .await
        .expect("write upgrade");
    let response = read_response_head(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    client
}

#[tokio::test]
async fn upgrade_yields_exactly_one_response_and_frames_flow() {
    let (recorder, mut events) = Recorder::new();
    let core = Framebus::new(CoreConfig::default(), recorder);
    let mut client = upgraded_client(&core).await;
    assert!(matches!(next_event(&mut events).await, Event::Connected { .. }));

    let frame = masked_frame(3, 4, b"masked payload", [0x10, 0x20, 0x30, 0x40]);
    client.write_all(&frame).await.expect("write frame");
    assert!(matches!(
        next_event(&mut events).await,
        Event::Package {
            service: 3,
            command: 4,
            body,
            ..
        } if body == b"masked payload"
    ));
    core.graceful_shutdown().await;
}

#[tokio::test]
async fn echoed_packages_come_back_as_unmasked_server_frames() {
    let (mut recorder, mut events) = Recorder::new();
    recorder.echo = true;
    let core = Framebus::new(CoreConfig::default(), recorder);
    let mut client = upgraded_client(&core).await;
    assert!(matches!(next_event(&mut events).await, Event::Connected { .. }));

    client
        .write_all(&masked_frame(1, 2, b"ping", [9, 8, 7, 6]))
        .await
        .expect("write frame");
    assert!(matches!(next_event(&mut events).await, Event::Package { .. }));

    // Server frame: FIN+binary, unmasked 8-byte length, then the package.
    let mut reply = vec![0_u8; 2 + 8];
    timeout(Duration::from_secs(5), client.read_exact(&mut reply))
        .await
        .expect("timed out reading echo")
        .expect("read echo");
    assert_eq!(reply[0], 0x82);
    assert_eq!(reply[1], 8);
    assert_eq!(&reply[2..], package_bytes(1, 2, b"ping"));
    core.graceful_shutdown().await;
}

#[tokio::test]
async fn close_frame_tears_the_connection_down() {
    let (recorder, mut events) = Recorder::new();
    let core = Framebus::new(CoreConfig::default(), recorder);
    let mut client = upgraded_client(&core).await;
    assert!(matches!(next_event(&mut events).await, Event::Connected { .. }));

    let mut bytes = vec![0x88, 0x80, 0, 0, 0, 0];
    bytes.extend(masked_frame(1, 1, b"after close", [0; 4]));
    client.write_all(&bytes).await.expect("write close");

    let mut sink = Vec::new();
    let closed = timeout(Duration::from_secs(5), client.read_to_end(&mut sink))
        .await
        .expect("server should close");
    assert!(matches!(closed, Ok(0) | Err(_)));
    expect_no_event(&mut events).await;
    core.graceful_shutdown().await;
}

#[tokio::test]
async fn non_upgrade_request_is_a_violation() {
    let (recorder, mut events) = Recorder::new();
    let core = Framebus::new(CoreConfig::default(), recorder);
    let addr = core.listen_websocket(any_port()).await.expect("bind");
    let mut client = TcpStream::connect(addr).await.expect("connect");
    assert!(matches!(next_event(&mut events).await, Event::Connected { .. }));

    client
        .write_all(b"POST /login HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .expect("write request");
    let mut sink = Vec::new();
    let closed = timeout(Duration::from_secs(5), client.read_to_end(&mut sink))
        .await
        .expect("server should close");
    assert_eq!(closed.expect("clean close"), 0);
    expect_no_event(&mut events).await;
    core.graceful_shutdown().await;
}
