// MIT License - Copyright (c) 2026 Peter Wright
// Scripted in-memory stream for tests

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use crate::transport::SensorStream;

/// One scripted outcome of `try_read`.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Data(Vec<u8>),
    WouldBlock,
    Closed,
    Fail(io::ErrorKind),
}

impl Step {
    pub(crate) fn data(bytes: &[u8]) -> Self {
        Step::Data(bytes.to_vec())
    }

    /// A text reply as the sensor frames it.
    pub(crate) fn reply(text: &str) -> Self {
        Step::Data(format!("{text}\r\n\x03").into_bytes())
    }
}

type Responder = Box<dyn FnMut(&str) -> Vec<Step> + Send>;

#[derive(Debug, Default)]
struct Recorded {
    reads: usize,
    writes: usize,
    written: Vec<u8>,
    commands: Vec<String>,
    shut_down: bool,
}

/// Shared view of what a [`ScriptedStream`] saw, usable after the stream has
/// been moved into a transport.
#[derive(Debug, Clone, Default)]
pub(crate) struct StreamLog(Arc<Mutex<Recorded>>);

impl StreamLog {
    pub(crate) fn reads(&self) -> usize {
        self.0.lock().unwrap().reads
    }

    pub(crate) fn writes(&self) -> usize {
        self.0.lock().unwrap().writes
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.0.lock().unwrap().written.clone()
    }

    /// Complete command lines received, without the terminator.
    pub(crate) fn commands(&self) -> Vec<String> {
        self.0.lock().unwrap().commands.clone()
    }

    pub(crate) fn shut_down(&self) -> bool {
        self.0.lock().unwrap().shut_down
    }
}

/// Replays scripted read outcomes, then would-blocks forever.
///
/// With a responder attached, every complete command line written to the
/// stream is passed to it and the returned steps are queued as the reply,
/// which makes the stream behave like a simple simulated sensor.
pub(crate) struct ScriptedStream {
    steps: VecDeque<Step>,
    responder: Option<Responder>,
    pending_line: Vec<u8>,
    max_write: usize,
    log: StreamLog,
}

impl ScriptedStream {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            responder: None,
            pending_line: Vec::new(),
            max_write: usize::MAX,
            log: StreamLog::default(),
        }
    }

    pub(crate) fn responding(responder: impl FnMut(&str) -> Vec<Step> + Send + 'static) -> Self {
        let mut stream = Self::new(Vec::new());
        stream.responder = Some(Box::new(responder));
        stream
    }

    /// Accept at most `max` bytes per write call.
    pub(crate) fn with_max_write(mut self, max: usize) -> Self {
        self.max_write = max.max(1);
        self
    }

    pub(crate) fn log(&self) -> StreamLog {
        self.log.clone()
    }
}

impl SensorStream for ScriptedStream {
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(self.max_write);
        let accepted = &buf[..n];
        {
            let mut log = self.log.0.lock().unwrap();
            log.writes += 1;
            log.written.extend_from_slice(accepted);
        }

        for &byte in accepted {
            if byte != b'\r' {
                self.pending_line.push(byte);
                continue;
            }
            let line = String::from_utf8_lossy(&self.pending_line).to_string();
            self.pending_line.clear();
            self.log.0.lock().unwrap().commands.push(line.clone());
            if let Some(responder) = self.responder.as_mut() {
                self.steps.extend(responder(&line));
            }
        }
        Ok(n)
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.log.0.lock().unwrap().reads += 1;
        match self.steps.pop_front() {
            None | Some(Step::WouldBlock) => Err(io::ErrorKind::WouldBlock.into()),
            Some(Step::Closed) => {
                // Stay closed for any later read.
                self.steps.push_front(Step::Closed);
                Ok(0)
            }
            Some(Step::Fail(kind)) => Err(kind.into()),
            Some(Step::Data(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.steps.push_front(Step::Data(bytes.split_off(n)));
                }
                Ok(n)
            }
        }
    }

    async fn readable(&self) -> io::Result<()> {
        match self.steps.front() {
            None | Some(Step::WouldBlock) => std::future::pending().await,
            Some(_) => Ok(()),
        }
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.log.0.lock().unwrap().shut_down = true;
        Ok(())
    }
}
