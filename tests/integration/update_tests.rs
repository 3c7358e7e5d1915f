//! Firmware-update listener over a real loopback socket.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use smartmeter::adapters::ota_server::OtaServer;
use smartmeter::app::ports::{UpdatePort, UpdateStatus};
use smartmeter::ota::OtaState;

const SECRET: &str = "08154711";

fn connect(server: &OtaServer) -> TcpStream {
    let port = server.local_port().expect("listener bound");
    let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
}

/// Service the listener until it reports `want` or gives up.
fn service_until(server: &mut OtaServer, want: impl Fn(UpdateStatus) -> bool) -> UpdateStatus {
    let mut last = UpdateStatus::Idle;
    for now_ms in 0..2_000 {
        last = server.service(now_ms);
        if want(last) {
            break;
        }
        thread::sleep(Duration::from_millis(1));
    }
    last
}

fn reply(mut stream: TcpStream) -> String {
    let mut text = String::new();
    stream.read_to_string(&mut text).unwrap();
    text
}

#[test]
fn image_is_received_and_staged() {
    let mut server = OtaServer::bind(0, SECRET).unwrap();
    assert!(server.is_enabled());

    let image: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let mut client = connect(&server);
    writeln!(client, "SMOTA {} {}", image.len(), SECRET).unwrap();
    client.write_all(&image).unwrap();

    let status = service_until(&mut server, |s| s == UpdateStatus::ReadyToReboot);
    assert_eq!(status, UpdateStatus::ReadyToReboot);
    assert_eq!(server.manager().staged(), image.as_slice());
    assert_eq!(reply(client), "OK\n");

    // Stays armed for the reboot.
    assert_eq!(server.service(5_000), UpdateStatus::ReadyToReboot);
}

#[test]
fn wrong_password_is_turned_away_and_listener_recovers() {
    let mut server = OtaServer::bind(0, SECRET).unwrap();

    let mut intruder = connect(&server);
    intruder.write_all(b"SMOTA 4 letmein!\n").unwrap();
    for now_ms in 0..200 {
        server.service(now_ms);
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(reply(intruder), "ERR auth failed\n");
    assert_eq!(server.manager().state(), OtaState::Idle);

    let mut client = connect(&server);
    write!(client, "SMOTA 4 {}\nabcd", SECRET).unwrap();
    let status = service_until(&mut server, |s| s == UpdateStatus::ReadyToReboot);
    assert_eq!(status, UpdateStatus::ReadyToReboot);
    assert_eq!(server.manager().staged(), b"abcd");
}

#[test]
fn dropped_sender_discards_partial_image() {
    let mut server = OtaServer::bind(0, SECRET).unwrap();

    let mut client = connect(&server);
    write!(client, "SMOTA 64 {}\nhalf", SECRET).unwrap();
    let status = service_until(&mut server, |s| matches!(s, UpdateStatus::Receiving { .. }));
    assert_eq!(status, UpdateStatus::Receiving { written: 4, total: 64 });

    drop(client);
    let status = service_until(&mut server, |s| s == UpdateStatus::Idle);
    assert_eq!(status, UpdateStatus::Idle);
    assert_eq!(server.manager().state(), OtaState::Idle);
    assert!(server.manager().staged().is_empty());
}
