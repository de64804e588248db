//! Hand-off between the network read loop and the consumption tick.
//!
//! The read loop pushes decoded messages; the host drains them with
//! [`Inbox::poll`] on its own cadence. Consumers are only ever called from
//! `poll`, never from the network thread.

use crossbeam_queue::SegQueue;

use crate::codec::{PatientRecord, WireMessage};
use crate::enums::Orientation;
use crate::frame::FrameBuffer2D;

/// Receives drained messages on the consumption side
pub trait SliceConsumer {
    fn on_image_ready(&mut self, orientation: Orientation, frame: FrameBuffer2D);

    fn on_patient_info_ready(&mut self, record: PatientRecord);
}

/// Lock-free queues for images and patient records.
#[derive(Default)]
pub struct Inbox {
    images: SegQueue<(Orientation, FrameBuffer2D)>,
    patients: SegQueue<PatientRecord>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_image(&self, orientation: Orientation, frame: FrameBuffer2D) {
        self.images.push((orientation, frame));
    }

    pub fn push_patient(&self, record: PatientRecord) {
        self.patients.push(record);
    }

    pub fn push(&self, message: WireMessage) {
        match message {
            WireMessage::Image { orientation, frame } => self.push_image(orientation, frame),
            WireMessage::PatientInfo(record) => self.push_patient(record),
        }
    }

    pub fn pop_image(&self) -> Option<(Orientation, FrameBuffer2D)> {
        self.images.pop()
    }

    pub fn pop_patient(&self) -> Option<PatientRecord> {
        self.patients.pop()
    }

    /// Messages waiting as (images, patient records)
    pub fn pending(&self) -> (usize, usize) {
        (self.images.len(), self.patients.len())
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.patients.is_empty()
    }

    /// Dispatch at most one image and one patient record, image first.
    ///
    /// Returns the number of messages dispatched.
    pub fn poll<C: SliceConsumer + ?Sized>(&self, consumer: &mut C) -> usize {
        let mut dispatched = 0;
        if let Some((orientation, frame)) = self.images.pop() {
            consumer.on_image_ready(orientation, frame);
            dispatched += 1;
        }
        if let Some(record) = self.patients.pop() {
            consumer.on_patient_info_ready(record);
            dispatched += 1;
        }
        dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[derive(Default)]
    struct Recorder {
        images: Vec<(Orientation, (u32, u32))>,
        patients: Vec<PatientRecord>,
    }

    impl SliceConsumer for Recorder {
        fn on_image_ready(&mut self, orientation: Orientation, frame: FrameBuffer2D) {
            self.images.push((orientation, frame.dim()));
        }

        fn on_patient_info_ready(&mut self, record: PatientRecord) {
            self.patients.push(record);
        }
    }

    #[test]
    fn test_poll_dispatches_one_of_each() {
        let inbox = Inbox::new();
        inbox.push_image(Orientation::Axial, FrameBuffer2D::solid(1, 1, [0; 4]).unwrap());
        inbox.push_image(Orientation::Coronal, FrameBuffer2D::solid(2, 1, [0; 4]).unwrap());
        inbox.push_patient(PatientRecord::new("A", "B"));

        let mut recorder = Recorder::default();
        assert_eq!(inbox.poll(&mut recorder), 2);
        assert_eq!(recorder.images, vec![(Orientation::Axial, (1, 1))]);
        assert_eq!(recorder.patients.len(), 1);
        assert_eq!(inbox.pending(), (1, 0));

        assert_eq!(inbox.poll(&mut recorder), 1);
        assert_eq!(recorder.images[1], (Orientation::Coronal, (2, 1)));
        assert_eq!(inbox.poll(&mut recorder), 0);
        assert!(inbox.is_empty());
    }

    #[test]
    fn test_concurrent_producers() {
        let inbox = Arc::new(Inbox::new());
        let producers: Vec<_> = (0..4)
            .map(|i| {
                let inbox = Arc::clone(&inbox);
                thread::spawn(move || {
                    for j in 0..50 {
                        inbox.push_patient(PatientRecord::new(format!("{i}-{j}"), "x"));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let mut recorder = Recorder::default();
        while inbox.poll(&mut recorder) > 0 {}
        assert_eq!(recorder.patients.len(), 200);
    }
}
