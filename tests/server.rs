use natter::prelude::*;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::thread;
use std::time::Duration;

fn new_server() -> Server {
    let config = config::Config::default();
    Server::new(&config).expect("Failed to create server")
}

fn expect_connected(events: &[ServerEvent]) -> usize {
    match events {
        [ServerEvent::Connected { id }] => *id,
        other => panic!("Expected a single Connected event, got {other:?}"),
    }
}

#[test]
fn end_to_end_single_client() {
    let mut server = new_server();
    let addr = server
        .listen("127.0.0.1", 11701)
        .expect("Failed to listen");
    assert_eq!(addr.to_string(), "127.0.0.1:11701");

    let mut client = TcpStream::connect(addr).expect("Failed to connect");
    client.write_all(b"hi").expect("Failed to send");

    // Cycle 1: the listener is serviced, the new connection is registered.
    let events = server.fetch_events().expect("Failed to fetch events");
    let id = expect_connected(&events);
    assert_eq!(server.connection_count(), 1);

    // Cycle 2: one drain yields exactly the bytes the client sent.
    let events = server.fetch_events().expect("Failed to fetch events");
    assert_eq!(
        events,
        vec![ServerEvent::Data {
            id,
            data: b"hi".to_vec()
        }]
    );

    // A message split across two sends that both arrive before the next
    // cycle is drained as one contiguous buffer.
    client.write_all(b"hel").expect("Failed to send");
    client.write_all(b"lo").expect("Failed to send");
    thread::sleep(Duration::from_millis(100));

    let events = server.fetch_events().expect("Failed to fetch events");
    assert_eq!(
        events,
        vec![ServerEvent::Data {
            id,
            data: b"hello".to_vec()
        }]
    );

    // Peer close: the next cycle's zero-length read closes the connection.
    drop(client);
    let events = server.fetch_events().expect("Failed to fetch events");
    assert_eq!(events, vec![ServerEvent::Disconnected { id }]);
    assert_eq!(server.connection_count(), 0);

    // With the listener gone and no connections, the server reports itself
    // inactive instead of blocking forever.
    server.close_listener();
    let events = server.fetch_events().expect("Failed to fetch events");
    assert_eq!(events, vec![ServerEvent::Inactive]);
}

#[test]
fn accept_grows_registry_by_exactly_one() {
    let mut server = new_server();
    let addr = server.listen("127.0.0.1", 0).expect("Failed to listen");
    assert_eq!(server.connection_count(), 0);

    let client = TcpStream::connect(addr).expect("Failed to connect");

    let events = server.fetch_events().expect("Failed to fetch events");
    let id = expect_connected(&events);

    assert_eq!(server.connection_count(), 1);
    let peer_addr = server.peer_addr(id).expect("Peer address should be known");
    assert_eq!(peer_addr, client.local_addr().expect("Client address"));
}

#[test]
fn half_close_is_detected_as_disconnect() {
    let mut server = new_server();
    let addr = server.listen("127.0.0.1", 0).expect("Failed to listen");

    let mut client = TcpStream::connect(addr).expect("Failed to connect");
    let events = server.fetch_events().expect("Failed to fetch events");
    let id = expect_connected(&events);

    client.write_all(b"bye").expect("Failed to send");
    client
        .shutdown(Shutdown::Write)
        .expect("Failed to shut down write side");
    thread::sleep(Duration::from_millis(100));

    // One cycle drains the final bytes and observes the zero-length read.
    let events = server.fetch_events().expect("Failed to fetch events");
    assert_eq!(
        events,
        vec![
            ServerEvent::Data {
                id,
                data: b"bye".to_vec()
            },
            ServerEvent::Disconnected { id },
        ]
    );
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn tracks_multiple_clients_independently() {
    let mut server = new_server();
    let addr = server.listen("127.0.0.1", 0).expect("Failed to listen");

    let mut client_a = TcpStream::connect(addr).expect("Failed to connect");
    let events = server.fetch_events().expect("Failed to fetch events");
    let id_a = expect_connected(&events);

    let mut client_b = TcpStream::connect(addr).expect("Failed to connect");
    let events = server.fetch_events().expect("Failed to fetch events");
    let id_b = expect_connected(&events);

    assert_ne!(id_a, id_b);
    assert_eq!(server.connection_count(), 2);

    client_a.write_all(b"from-a").expect("Failed to send");
    let events = server.fetch_events().expect("Failed to fetch events");
    assert_eq!(
        events,
        vec![ServerEvent::Data {
            id: id_a,
            data: b"from-a".to_vec()
        }]
    );

    client_b.write_all(b"from-b").expect("Failed to send");
    let events = server.fetch_events().expect("Failed to fetch events");
    assert_eq!(
        events,
        vec![ServerEvent::Data {
            id: id_b,
            data: b"from-b".to_vec()
        }]
    );

    drop(client_a);
    drop(client_b);
    let mut disconnected = Vec::new();
    while disconnected.len() < 2 {
        for event in server.fetch_events().expect("Failed to fetch events") {
            match event {
                ServerEvent::Disconnected { id } => disconnected.push(id),
                other => panic!("Unexpected event: {other:?}"),
            }
        }
    }
    disconnected.sort_unstable();
    let mut expected = vec![id_a, id_b];
    expected.sort_unstable();
    assert_eq!(disconnected, expected);
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn send_path_delivers_queued_bytes() {
    let mut server = new_server();
    let addr = server.listen("127.0.0.1", 0).expect("Failed to listen");

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).expect("Failed to connect");
        let mut buf = [0u8; 8];
        stream.read_exact(&mut buf).expect("Failed to read");
        buf.to_vec()
    });

    let events = server.fetch_events().expect("Failed to fetch events");
    let id = expect_connected(&events);
    server.send_to(id, b"welcome!".to_vec());

    // Drive the reactor until the peer has read everything and hung up.
    loop {
        let events = server.fetch_events().expect("Failed to fetch events");
        if events
            .iter()
            .any(|e| matches!(e, ServerEvent::Disconnected { .. }))
        {
            break;
        }
    }

    assert_eq!(client.join().expect("Client failed"), b"welcome!");
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn backlog_overflow_does_not_crash_the_server() {
    let mut server = new_server();
    // Default backlog is 3; nothing is accepted until fetch_events runs.
    let addr = server.listen("127.0.0.1", 0).expect("Failed to listen");

    // Four near-simultaneous pending connections. The OS may refuse or delay
    // some of them; each such attempt fails on its own, never the server.
    let clients: Vec<_> = (0..4)
        .map(|_| TcpStream::connect_timeout(&addr, Duration::from_millis(500)))
        .collect();
    let pending = clients.iter().filter(|c| c.is_ok()).count();
    assert!(pending >= 3, "OS should queue at least the backlog");

    let mut connected = 0;
    while connected < pending {
        for event in server.fetch_events().expect("Failed to fetch events") {
            if matches!(event, ServerEvent::Connected { .. }) {
                connected += 1;
            }
        }
    }
    assert_eq!(server.connection_count(), pending);
}
