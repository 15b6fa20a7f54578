//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


use futures_util::{SinkExt, StreamExt};
use muportal_gateway::config::{TelnetConfig, TelnetOptions};
use muportal_gateway::connection::{ConnectionCallbacks, ConnectionId, TransportKind};
use muportal_gateway::listener::ListenerState;
use muportal_gateway::manager::{ListenerBinding, NetworkManager};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::Role;

#[derive(Debug, PartialEq)]
enum Event {
    Ready(ConnectionId),
    Command(ConnectionId, String),
    Disconnected(ConnectionId),
}

fn telnet_config() -> TelnetConfig {
    TelnetConfig {
        options: TelnetOptions::none(),
        transport_timeout_ms: 200,
        ..TelnetConfig::default()
    }
}

fn loopback_manager(kind: TransportKind) -> (NetworkManager, mpsc::UnboundedReceiver<Event>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let mut manager = NetworkManager::new(telnet_config());
    manager.add_address("loopback", IpAddr::from([127, 0, 0, 1]));
    manager.add_binding(ListenerBinding {
        name: "game".to_string(),
        address: "loopback".to_string(),
        port: 0,
        kind,
        tls: None,
    });
    manager.set_connection_callbacks(move |_| {
        let ready = sender.clone();
        let commands = sender.clone();
        let disconnects = sender.clone();
        ConnectionCallbacks::new()
            .on_ready(move |handle| {
                let _ = ready.send(Event::Ready(handle.id()));
            })
            .on_command(move |handle, line| {
                if line == "quit" {
                    let _ = handle.disconnect();
                } else {
                    let _ = handle.send_line(format!("echo: {}", line));
                }
                let _ = commands.send(Event::Command(handle.id(), line));
            })
            .on_disconnect(move |id| {
                let _ = disconnects.send(Event::Disconnected(id));
            })
    });
    (manager, receiver)
}

async fn next(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("Timed out waiting for an event")
        .expect("Event channel closed")
}

async fn started(manager: NetworkManager) -> (Arc<NetworkManager>, SocketAddr) {
    let manager = Arc::new(manager);
    manager.start().await.unwrap();
    let address = manager
        .listener("game")
        .and_then(|listener| listener.local_addr())
        .unwrap();
    (manager, address)
}

#[tokio::test]
async fn test_telnet_over_tcp() {
    let (mut manager, mut events) = loopback_manager(TransportKind::Telnet);
    manager.set_on_connect(|handle| {
        let _ = handle.send_line("Welcome!");
    });
    let (manager, address) = started(manager).await;

    let mut client = TcpStream::connect(address).await.unwrap();
    let Event::Ready(id) = next(&mut events).await else {
        panic!("Expected ready");
    };
    let mut greeting = [0u8; 10];
    timeout(Duration::from_secs(5), client.read_exact(&mut greeting))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&greeting, b"Welcome!\r\n");
    assert_eq!(manager.ready_count(), 1);
    assert_eq!(manager.count_by_kind(TransportKind::Telnet), 1);
    assert_eq!(manager.get(id).unwrap().peer(), client.local_addr().unwrap());

    client.write_all(b"hello\r\n").await.unwrap();
    assert_eq!(next(&mut events).await, Event::Command(id, "hello".to_string()));
    let mut echo = [0u8; 13];
    timeout(Duration::from_secs(5), client.read_exact(&mut echo))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&echo, b"echo: hello\r\n");

    client.write_all(b"quit\r\n").await.unwrap();
    assert_eq!(next(&mut events).await, Event::Command(id, "quit".to_string()));
    assert_eq!(next(&mut events).await, Event::Disconnected(id));
    let mut rest = Vec::new();
    timeout(Duration::from_secs(5), client.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert!(rest.is_empty());
    assert_eq!(manager.connection_count(), 0);
}

#[tokio::test]
async fn test_connection_ids_are_unique() {
    let (manager, mut events) = loopback_manager(TransportKind::Telnet);
    let (_manager, address) = started(manager).await;

    let mut clients = Vec::new();
    let mut ids = Vec::new();
    for _ in 0..4 {
        clients.push(TcpStream::connect(address).await.unwrap());
        match next(&mut events).await {
            Event::Ready(id) => ids.push(id),
            other => panic!("Expected ready, got {:?}", other),
        }
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 4);
}

#[tokio::test]
async fn test_stopped_listener_defers_accepts() {
    let (manager, mut events) = loopback_manager(TransportKind::Telnet);
    let (manager, address) = started(manager).await;
    let listener = manager.listener("game").unwrap();

    listener.stop();
    assert_eq!(listener.state(), ListenerState::Stopped);
    let _client = TcpStream::connect(address).await.unwrap();
    assert!(
        timeout(Duration::from_millis(200), events.recv())
            .await
            .is_err()
    );

    listener.start();
    assert!(listener.is_running());
    assert!(matches!(next(&mut events).await, Event::Ready(_)));
}

#[tokio::test]
async fn test_websocket_upgrade_must_complete_in_time() {
    let (manager, mut events) = loopback_manager(TransportKind::WebSocket);
    let (manager, address) = started(manager).await;

    // Never sends the HTTP upgrade request.
    let _client = TcpStream::connect(address).await.unwrap();
    assert!(matches!(next(&mut events).await, Event::Disconnected(_)));
    assert_eq!(manager.connection_count(), 0);
}

#[tokio::test]
async fn test_websocket_over_tcp() {
    let (manager, mut events) = loopback_manager(TransportKind::WebSocket);
    let (manager, address) = started(manager).await;

    let stream = TcpStream::connect(address).await.unwrap();
    let (mut socket, _) = tokio_tungstenite::client_async(format!("ws://{}/", address), stream)
        .await
        .unwrap();
    let Event::Ready(id) = next(&mut events).await else {
        panic!("Expected ready");
    };
    assert!(manager.get(id).unwrap().capabilities().utf8);

    socket.send(Message::text("look\nlisten")).await.unwrap();
    assert_eq!(next(&mut events).await, Event::Command(id, "look".to_string()));
    assert_eq!(next(&mut events).await, Event::Command(id, "listen".to_string()));

    let mut replies = String::new();
    while replies != "echo: look\necho: listen\n" {
        match timeout(Duration::from_secs(5), socket.next()).await.unwrap() {
            Some(Ok(Message::Text(text))) => replies.push_str(text.as_str()),
            other => panic!("Unexpected message {:?}", other),
        }
    }

    socket.close(None).await.unwrap();
    assert_eq!(next(&mut events).await, Event::Disconnected(id));
}

#[tokio::test]
async fn test_websocket_stream_serves_directly() {
    let (sender, mut events) = mpsc::unbounded_channel();
    let mut manager = NetworkManager::new(telnet_config());
    manager.set_connection_callbacks(move |_| {
        let commands = sender.clone();
        ConnectionCallbacks::new().on_command(move |handle, line| {
            let _ = handle.send_line(line.to_uppercase());
            let _ = commands.send(Event::Command(handle.id(), line));
        })
    });
    let manager = Arc::new(manager);

    let (client, server) = duplex(4096);
    let connection = manager
        .open_connection("192.0.2.20:443".parse().unwrap(), TransportKind::WebSocket, true)
        .unwrap();
    let id = connection.id();
    let handle = connection.handle().clone();
    let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
    tokio::spawn(connection.serve_websocket(server));
    let mut client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;

    client.send(Message::text("north")).await.unwrap();
    assert_eq!(next(&mut events).await, Event::Command(id, "north".to_string()));
    match timeout(Duration::from_secs(5), client.next()).await.unwrap() {
        Some(Ok(Message::Text(text))) => assert_eq!(text.as_str(), "NORTH\n"),
        other => panic!("Unexpected message {:?}", other),
    }
    assert!(handle.is_ready());
    assert!(handle.capabilities().tls);
}

/// Manager for connections served over in-memory streams, reporting disconnects
fn stream_manager(
    telnet: TelnetConfig,
) -> (Arc<NetworkManager>, mpsc::UnboundedReceiver<Event>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let mut manager = NetworkManager::new(telnet);
    manager.set_connection_callbacks(move |_| {
        let ready = sender.clone();
        let disconnects = sender.clone();
        ConnectionCallbacks::new()
            .on_ready(move |handle| {
                let _ = ready.send(Event::Ready(handle.id()));
            })
            .on_disconnect(move |id| {
                let _ = disconnects.send(Event::Disconnected(id));
            })
    });
    (Arc::new(manager), receiver)
}

#[tokio::test(start_paused = true)]
async fn test_websocket_disconnect_with_stalled_reader() {
    let (manager, mut events) = stream_manager(telnet_config());
    let (client, server) = duplex(64);
    let connection = manager
        .open_connection("192.0.2.21:443".parse().unwrap(), TransportKind::WebSocket, false)
        .unwrap();
    let id = connection.id();
    let handle = connection.handle().clone();
    let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
    tokio::spawn(connection.serve_websocket(server));
    assert_eq!(next(&mut events).await, Event::Ready(id));

    // The client side is never read.
    handle.send_text("x".repeat(100 * 1024)).unwrap();
    tokio::task::yield_now().await;
    handle.disconnect().unwrap();

    timeout(Duration::from_secs(5), handle.closed())
        .await
        .expect("connection did not close");
    assert_eq!(next(&mut events).await, Event::Disconnected(id));
    assert!(manager.get(id).is_none());
    assert_eq!(manager.connection_count(), 0);
    assert!(events.try_recv().is_err());
    drop(client);
}

#[tokio::test(start_paused = true)]
async fn test_websocket_output_limit_closes_connection() {
    let config = TelnetConfig {
        max_output: 1024,
        ..telnet_config()
    };
    let (manager, mut events) = stream_manager(config);
    let (client, server) = duplex(64);
    let connection = manager
        .open_connection("192.0.2.22:443".parse().unwrap(), TransportKind::WebSocket, false)
        .unwrap();
    let id = connection.id();
    let handle = connection.handle().clone();
    let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
    tokio::spawn(connection.serve_websocket(server));
    assert_eq!(next(&mut events).await, Event::Ready(id));

    handle.send_text("y".repeat(4096)).unwrap();
    assert_eq!(next(&mut events).await, Event::Disconnected(id));
    assert!(manager.get(id).is_none());
    drop(client);
}

