//! Sink which writes newline-terminated JSON-serialized
//! [`api::Timeline`]s, usually to a frontend sub-process.
use crate::capture::Capture;
use crate::sinks::{Sink, SinkError};

use std::io::Write;

pub struct FrontendSink {
    writer: Box<dyn Write>,
    description: String,
}

impl FrontendSink {
    pub fn new(socket: std::os::unix::net::UnixStream) -> Self {
        let description = format!("frontend using socket {:?}", socket);
        Self {
            writer: Box::new(socket),
            description,
        }
    }

    /// Writes to any stream, e.g. stdout or a file.
    pub fn with_writer(writer: Box<dyn Write>, description: String) -> Self {
        Self {
            writer,
            description,
        }
    }
}

impl Sink for FrontendSink {
    fn drain(&mut self, capture: &Capture) -> Result<(), SinkError> {
        let json = serde_json::to_string(capture.timeline())?
        // line-delimited for frontends reading asynchronously
        + "\n";

        self.writer
            .write_all(json.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(SinkError::DrainIOError)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}
