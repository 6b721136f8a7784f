//! Tests of the TraCI client against a scripted server on a loopback socket.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use traffic_payoff::traci::codec::{self, cmd, status, Command, Status, RESPONSE_OFFSET};
use traffic_payoff::{
    ControllerConfig, DetectorQuery, Driver, Error, Phase, SignalActuator, SimulationControl,
    TraciClient,
};

/// What the fake server observed.
#[derive(Debug, Default)]
struct ServerLog {
    steps: u32,
    phases_set: Vec<i32>,
    detector_queries: u32,
    closed: bool,
}

/// Serves a scenario with `steps` steps in which group A detectors see one
/// vehicle and group B detectors see two.
fn spawn_server(steps: u32) -> (u16, JoinHandle<ServerLog>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut log = ServerLog::default();
        let mut phase = 0;
        while let Some(mut message) = read_message(&mut stream) {
            let mut command = Command::decode(&mut message).unwrap();
            let mut reply = BytesMut::new();
            match command.id {
                cmd::GET_VERSION => {
                    ok(&mut reply, command.id);
                    let mut content = BytesMut::new();
                    content.put_i32(21);
                    codec::put_string(&mut content, "SUMO 1.19.0");
                    Command::new(cmd::GET_VERSION, content).encode(&mut reply);
                }
                cmd::SIMSTEP => {
                    log.steps += 1;
                    ok(&mut reply, command.id);
                    reply.put_i32(0);
                }
                cmd::GET_SIM_VARIABLE => {
                    ok(&mut reply, command.id);
                    let pending = steps.saturating_sub(log.steps) as i32;
                    integer_response(&mut reply, &mut command, pending);
                }
                cmd::GET_LANEAREA_VARIABLE => {
                    let mut content = command.content.clone();
                    content.advance(1);
                    let detector = codec::get_string(&mut content).unwrap();
                    if detector.starts_with("cam_") {
                        log.detector_queries += 1;
                        ok(&mut reply, command.id);
                        let count = if detector.starts_with("cam_N") || detector.starts_with("cam_S") { 1 } else { 2 };
                        integer_response(&mut reply, &mut command, count);
                    } else {
                        Status {
                            command: command.id,
                            result: status::ERR,
                            description: format!("Lane area detector '{detector}' is not known"),
                        }
                        .encode(&mut reply);
                    }
                }
                cmd::GET_TL_VARIABLE => {
                    ok(&mut reply, command.id);
                    integer_response(&mut reply, &mut command, phase);
                }
                cmd::SET_TL_VARIABLE => {
                    let mut content = command.content.clone();
                    content.advance(1);
                    codec::get_string(&mut content).unwrap();
                    assert_eq!(content.get_u8(), 0x09);
                    phase = content.get_i32();
                    log.phases_set.push(phase);
                    ok(&mut reply, command.id);
                }
                cmd::CLOSE => {
                    log.closed = true;
                    ok(&mut reply, command.id);
                    write_message(&mut stream, reply);
                    break;
                }
                other => panic!("unexpected command {other:#04x}"),
            }
            write_message(&mut stream, reply);
        }
        log
    });
    (port, handle)
}

fn ok(reply: &mut BytesMut, command: u8) {
    Status {
        command,
        result: status::OK,
        description: String::new(),
    }
    .encode(reply);
}

/// Echoes the variable and object of a get command with an integer value.
fn integer_response(reply: &mut BytesMut, request: &mut Command, value: i32) {
    let variable = request.content.get_u8();
    let object = codec::get_string(&mut request.content).unwrap();
    let mut content = BytesMut::new();
    content.put_u8(variable);
    codec::put_string(&mut content, &object);
    content.put_u8(0x09);
    content.put_i32(value);
    Command::new(request.id + RESPONSE_OFFSET, content).encode(reply);
}

fn read_message(stream: &mut TcpStream) -> Option<Bytes> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).ok()?;
    let mut body = vec![0u8; u32::from_be_bytes(header) as usize - 4];
    stream.read_exact(&mut body).ok()?;
    Some(Bytes::from(body))
}

fn write_message(stream: &mut TcpStream, body: BytesMut) {
    let mut message = BytesMut::new();
    message.put_u32(body.len() as u32 + 4);
    message.put_slice(&body);
    stream.write_all(&message).unwrap();
}

#[test]
fn handshake_reports_version() {
    let (port, server) = spawn_server(0);
    let mut client = TraciClient::connect(("127.0.0.1", port)).unwrap();
    assert_eq!(client.version().unwrap(), (21, "SUMO 1.19.0".to_string()));
    client.close().unwrap();
    assert!(server.join().unwrap().closed);
}

#[test]
fn queries_and_commands_round_trip() {
    let (port, server) = spawn_server(5);
    let mut client = TraciClient::connect(("127.0.0.1", port)).unwrap();

    assert_eq!(client.pending_entities().unwrap(), 5);
    client.advance().unwrap();
    assert_eq!(client.pending_entities().unwrap(), 4);
    assert_eq!(client.last_step_vehicle_count("cam_W_2").unwrap(), 2);
    client.set_phase("Center", 3).unwrap();
    assert_eq!(client.phase("Center").unwrap(), 3);
    client.close().unwrap();
    // Closing twice is harmless.
    client.close().unwrap();

    let log = server.join().unwrap();
    assert_eq!(log.steps, 1);
    assert_eq!(log.phases_set, [3]);
}

#[test]
fn unknown_detector_is_a_command_error() {
    let (port, server) = spawn_server(5);
    let mut client = TraciClient::connect(("127.0.0.1", port)).unwrap();
    let err = client.last_step_vehicle_count("loop_7").unwrap_err();
    match err {
        Error::Command { command, description } => {
            assert_eq!(command, cmd::GET_LANEAREA_VARIABLE);
            assert!(description.contains("loop_7"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    client.close().unwrap();
    server.join().unwrap();
}

/// Test the whole controller over a socket.
#[test]
fn controller_runs_over_traci() {
    let (port, server) = spawn_server(30);
    let client = TraciClient::connect(("127.0.0.1", port)).unwrap();
    let mut driver = Driver::new(client, &ControllerConfig::default()).unwrap();
    let summary = driver.run().unwrap();

    assert_eq!(summary.steps, 30);
    assert_eq!(driver.controller().phase(), Phase::BGreen);

    let log = server.join().unwrap();
    assert_eq!(log.phases_set, [0, 1, 2]);
    assert!(log.closed);
    // Step 11 in A-Green and steps 27 to 29 in B-Green.
    assert_eq!(log.detector_queries, 4 * 12);
}

#[test]
fn oversized_response_is_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_message(&mut stream).unwrap();
        stream.write_all(&u32::MAX.to_be_bytes()).unwrap();
    });

    let err = TraciClient::connect(("127.0.0.1", port)).unwrap_err();
    match err {
        Error::Protocol(msg) => assert!(msg.contains("exceeds"), "{msg}"),
        other => panic!("unexpected error {other:?}"),
    }
    server.join().unwrap();
}
