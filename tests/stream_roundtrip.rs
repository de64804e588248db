use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use slice_viewer::codec::encode;
use slice_viewer::{
    Error, FrameBuffer2D, Inbox, MessageKind, Orientation, PatientRecord, ReceiverState,
    SliceConsumer, StreamReceiver, StreamSender, WireMessage,
};

#[derive(Debug, PartialEq)]
enum Event {
    Image(Orientation, FrameBuffer2D),
    Patient(PatientRecord),
}

#[derive(Default)]
struct Recorder {
    events: Vec<Event>,
}

impl SliceConsumer for Recorder {
    fn on_image_ready(&mut self, orientation: Orientation, frame: FrameBuffer2D) {
        self.events.push(Event::Image(orientation, frame));
    }

    fn on_patient_info_ready(&mut self, record: PatientRecord) {
        self.events.push(Event::Patient(record));
    }
}

/// Poll until `count` messages are pending or the deadline passes
fn wait_for(inbox: &Inbox, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let (images, patients) = inbox.pending();
        if images + patients >= count {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {count} messages, have {images} images and {patients} records"
        );
        thread::sleep(Duration::from_millis(10));
    }
}

fn listening_receiver() -> (StreamReceiver, u16) {
    let mut receiver = StreamReceiver::new();
    let addr = receiver.start_listening_on("127.0.0.1:0").unwrap();
    (receiver, addr.port())
}

#[test]
fn test_image_then_patient_end_to_end() {
    let (mut receiver, port) = listening_receiver();
    let red = FrameBuffer2D::solid(64, 64, [255, 0, 0, 255]).unwrap();

    let mut sender = StreamSender::new();
    sender.connect("127.0.0.1", port).unwrap();
    sender.send_image(&red, Orientation::Axial).unwrap();
    sender
        .send_patient_info(&PatientRecord::new("P1", "Doe"))
        .unwrap();
    sender.disconnect();

    let inbox = receiver.inbox();
    wait_for(&inbox, 2);

    let mut recorder = Recorder::default();
    assert_eq!(inbox.poll(&mut recorder), 2);
    assert_eq!(
        recorder.events,
        vec![
            Event::Image(Orientation::Axial, red),
            Event::Patient(PatientRecord::new("P1", "Doe")),
        ]
    );

    receiver.stop();
    assert_eq!(receiver.state(), ReceiverState::Stopped);
}

#[test]
fn test_unknown_kind_between_valid_frames() {
    let (receiver, port) = listening_receiver();

    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let mut bytes = encode(MessageKind::PatientInfo, br#"{"id":"A","name":"One"}"#).unwrap();
    bytes.extend_from_slice(&42u32.to_le_bytes());
    bytes.extend_from_slice(&3u32.to_le_bytes());
    bytes.extend_from_slice(&[1, 0, 0]);
    bytes.extend_from_slice(
        &WireMessage::PatientInfo(PatientRecord::new("B", "Two"))
            .to_frame()
            .unwrap(),
    );
    // Dribble the bytes out so frames straddle TCP segments
    for chunk in bytes.chunks(5) {
        stream.write_all(chunk).unwrap();
        stream.flush().unwrap();
    }
    drop(stream);

    let inbox = receiver.inbox();
    wait_for(&inbox, 2);
    assert_eq!(inbox.pop_patient(), Some(PatientRecord::new("A", "One")));
    assert_eq!(inbox.pop_patient(), Some(PatientRecord::new("B", "Two")));
    assert!(inbox.is_empty());
}

#[test]
fn test_accepts_next_connection_after_close() {
    let (receiver, port) = listening_receiver();
    let inbox = receiver.inbox();

    for (i, orientation) in Orientation::ALL.into_iter().enumerate() {
        let frame = FrameBuffer2D::solid(3, 5, [i as u8, 1, 2, 255]).unwrap();
        let mut sender = StreamSender::new();
        sender.connect("127.0.0.1", port).unwrap();
        sender.send_image(&frame, orientation).unwrap();
        sender.disconnect();
        wait_for(&inbox, 1);
        assert_eq!(inbox.pop_image(), Some((orientation, frame)));
    }
}

#[test]
fn test_shared_inbox_across_receivers() {
    let inbox = Arc::new(Inbox::new());
    let mut first = StreamReceiver::with_inbox(Arc::clone(&inbox));
    let mut second = StreamReceiver::with_inbox(Arc::clone(&inbox));
    let ports = [
        first.start_listening_on("127.0.0.1:0").unwrap().port(),
        second.start_listening_on("127.0.0.1:0").unwrap().port(),
    ];

    for (i, port) in ports.into_iter().enumerate() {
        let mut sender = StreamSender::new();
        sender.connect("127.0.0.1", port).unwrap();
        sender
            .send_patient_info(&PatientRecord::new(format!("P{i}"), "Shared"))
            .unwrap();
    }

    wait_for(&inbox, 2);
    assert_eq!(inbox.pending(), (0, 2));
}

#[test]
fn test_bind_error_when_port_taken() {
    let (_receiver, port) = listening_receiver();
    let mut other = StreamReceiver::new();
    match other.start_listening_on(&format!("127.0.0.1:{port}")) {
        Err(Error::Bind { address, .. }) => assert_eq!(address, format!("127.0.0.1:{port}")),
        other => panic!("expected Bind error, got {:?}", other),
    }
    assert_eq!(other.state(), ReceiverState::Idle);
}

#[test]
fn test_write_error_after_peer_stops() {
    let (mut receiver, port) = listening_receiver();
    let mut sender = StreamSender::new();
    sender.connect("127.0.0.1", port).unwrap();
    receiver.stop();

    // The peer is gone; the first writes may still be buffered by the OS
    let frame = FrameBuffer2D::solid(128, 128, [9, 9, 9, 255]).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    let err = loop {
        match sender.send_image(&frame, Orientation::Coronal) {
            Ok(()) => {
                assert!(Instant::now() < deadline, "writes never failed");
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => break e,
        }
    };
    assert!(matches!(
        err,
        Error::Write {
            kind: MessageKind::Coronal,
            ..
        }
    ));
}
