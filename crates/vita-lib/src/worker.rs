//! Runs a [`VitalsProcessor`] on its own thread so a capture loop never
//! blocks on analysis.
//!
//! At most one frame is in flight: `submit` hands a frame over, `recv`
//! collects its result. Frames are therefore processed strictly in
//! submission order and results are never reordered.

use crate::config::ProcessorConfig;
use crate::error::{Result, VitaError};
use crate::pipeline::{FrameResult, VitalsProcessor};
use crate::signal::Frame;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::debug;
use std::thread::JoinHandle;

enum WorkerCommand {
    Process(Frame),
    Reset,
    Shutdown,
}

enum WorkerUpdate {
    Result(Box<FrameResult>),
    ResetDone,
}

pub struct ProcessorWorker {
    command_tx: Sender<WorkerCommand>,
    update_rx: Receiver<WorkerUpdate>,
    worker: Option<JoinHandle<()>>,
    in_flight: bool,
}

impl ProcessorWorker {
    /// Validate `config` and start the processing thread.
    pub fn spawn(config: ProcessorConfig) -> Result<Self> {
        let processor = VitalsProcessor::new(config)?;
        let (command_tx, command_rx) = bounded(1);
        let (update_tx, update_rx) = bounded(1);
        let worker =
            std::thread::spawn(move || Worker::new(processor, command_rx, update_tx).run());
        Ok(Self {
            command_tx,
            update_rx,
            worker: Some(worker),
            in_flight: false,
        })
    }

    pub fn submit(&mut self, frame: Frame) -> Result<()> {
        if self.in_flight {
            return Err(VitaError::FrameInFlight);
        }
        self.command_tx
            .send(WorkerCommand::Process(frame))
            .map_err(|_| VitaError::WorkerStopped)?;
        self.in_flight = true;
        Ok(())
    }

    /// Block until the in-flight frame's result is ready.
    pub fn recv(&mut self) -> Result<FrameResult> {
        if !self.in_flight {
            return Err(VitaError::NothingInFlight);
        }
        self.in_flight = false;
        match self.update_rx.recv() {
            Ok(WorkerUpdate::Result(result)) => Ok(*result),
            Ok(WorkerUpdate::ResetDone) | Err(_) => Err(VitaError::WorkerStopped),
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `Ok(None)` while still busy.
    pub fn try_recv(&mut self) -> Result<Option<FrameResult>> {
        if !self.in_flight {
            return Err(VitaError::NothingInFlight);
        }
        match self.update_rx.try_recv() {
            Ok(WorkerUpdate::Result(result)) => {
                self.in_flight = false;
                Ok(Some(*result))
            }
            Err(crossbeam_channel::TryRecvError::Empty) => Ok(None),
            Ok(WorkerUpdate::ResetDone) | Err(_) => {
                self.in_flight = false;
                Err(VitaError::WorkerStopped)
            }
        }
    }

    pub fn process(&mut self, frame: Frame) -> Result<FrameResult> {
        self.submit(frame)?;
        self.recv()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    /// Start a new session on the worker; refused while a frame is in flight.
    pub fn reset(&mut self) -> Result<()> {
        if self.in_flight {
            return Err(VitaError::FrameInFlight);
        }
        self.command_tx
            .send(WorkerCommand::Reset)
            .map_err(|_| VitaError::WorkerStopped)?;
        match self.update_rx.recv() {
            Ok(WorkerUpdate::ResetDone) => Ok(()),
            _ => Err(VitaError::WorkerStopped),
        }
    }
}

impl Drop for ProcessorWorker {
    fn drop(&mut self) {
        let _ = self.command_tx.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

struct Worker {
    processor: VitalsProcessor,
    command_rx: Receiver<WorkerCommand>,
    update_tx: Sender<WorkerUpdate>,
}

impl Worker {
    fn new(
        processor: VitalsProcessor,
        command_rx: Receiver<WorkerCommand>,
        update_tx: Sender<WorkerUpdate>,
    ) -> Self {
        Self {
            processor,
            command_rx,
            update_tx,
        }
    }

    fn run(mut self) {
        while let Ok(command) = self.command_rx.recv() {
            let update = match command {
                WorkerCommand::Process(frame) => {
                    WorkerUpdate::Result(Box::new(self.processor.process_frame(frame)))
                }
                WorkerCommand::Reset => {
                    self.processor.reset();
                    WorkerUpdate::ResetDone
                }
                WorkerCommand::Shutdown => break,
            };
            if self.update_tx.send(update).is_err() {
                break;
            }
        }
        debug!(
            "processing worker stopped after {} frames",
            self.processor.frames_processed()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{generate, SynthConfig};

    fn frames(seconds: f64) -> Vec<Frame> {
        generate(&SynthConfig {
            duration_s: seconds,
            ..SynthConfig::default()
        })
    }

    #[test]
    fn matches_inline_processing() {
        let frames = frames(10.0);
        let expected = VitalsProcessor::new(ProcessorConfig::default())
            .unwrap()
            .process_all(frames.clone());
        let mut worker = ProcessorWorker::spawn(ProcessorConfig::default()).unwrap();
        let got: Vec<FrameResult> = frames
            .into_iter()
            .map(|f| worker.process(f).unwrap())
            .collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn one_frame_in_flight() {
        let mut worker = ProcessorWorker::spawn(ProcessorConfig::default()).unwrap();
        assert!(matches!(worker.recv(), Err(VitaError::NothingInFlight)));
        worker.submit(Frame::new(1.0, 0)).unwrap();
        assert!(worker.is_busy());
        assert!(matches!(
            worker.submit(Frame::new(1.0, 33)),
            Err(VitaError::FrameInFlight)
        ));
        assert!(matches!(worker.reset(), Err(VitaError::FrameInFlight)));
        let result = worker.recv().unwrap();
        assert_eq!(result.timestamp_ms, 0);
        assert!(!worker.is_busy());
    }

    #[test]
    fn try_recv_eventually_yields() {
        let mut worker = ProcessorWorker::spawn(ProcessorConfig::default()).unwrap();
        worker.submit(Frame::new(1.0, 7)).unwrap();
        let result = loop {
            if let Some(r) = worker.try_recv().unwrap() {
                break r;
            }
            std::thread::yield_now();
        };
        assert_eq!(result.timestamp_ms, 7);
        assert!(matches!(worker.try_recv(), Err(VitaError::NothingInFlight)));
    }

    #[test]
    fn reset_starts_a_new_session() {
        let mut worker = ProcessorWorker::spawn(ProcessorConfig::default()).unwrap();
        for frame in frames(3.0) {
            worker.process(frame).unwrap();
        }
        worker.reset().unwrap();
        // An earlier timestamp is accepted as-is after reset.
        let result = worker.process(Frame::new(1.0, 0)).unwrap();
        assert_eq!(result.timestamp_ms, 0);
        assert_eq!(result.bpm, 0);
    }

    #[test]
    fn invalid_config_fails_to_spawn() {
        let config = ProcessorConfig {
            signal_window: 4,
            ..ProcessorConfig::default()
        };
        assert!(matches!(
            ProcessorWorker::spawn(config),
            Err(VitaError::InvalidConfig(_))
        ));
    }
}
