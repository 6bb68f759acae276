//! In-process host for running one exchange without a proxy.
//!
//! [`LocalHost`] implements [`HostTransaction`] over a shared exchange log,
//! recording every call the transaction makes. [`run_exchange`] drives a
//! transaction the way a relaying host would: it streams a reader through in
//! fixed-size chunks and writes the adapted body as soon as it is available.

use crate::host::HostTransaction;
use crate::message::Message;
use crate::service::AdapterService;
use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::rc::Rc;
use tracing::debug;

/// A call the transaction made on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    PumpStart,
    PumpMore,
    PumpStop,
    Adapted { final_call: bool },
    OutputAvailable,
    OutputDone { at_end: bool },
    Aborted,
}

#[derive(Debug, Default)]
struct ExchangeLog {
    pending_input: Vec<u8>,
    events: Vec<HostEvent>,
    adapted: Option<Message>,
}

/// Host side of a local exchange.
#[derive(Debug)]
pub struct LocalHost {
    virgin: Message,
    log: Rc<RefCell<ExchangeLog>>,
}

/// Test and driver handle onto a [`LocalHost`]'s exchange.
#[derive(Debug, Clone)]
pub struct ExchangeHandle {
    log: Rc<RefCell<ExchangeLog>>,
}

impl LocalHost {
    /// Create a host for `virgin` and a handle to feed and inspect it.
    pub fn new(virgin: Message) -> (Self, ExchangeHandle) {
        let log = Rc::new(RefCell::new(ExchangeLog::default()));
        let handle = ExchangeHandle {
            log: Rc::clone(&log),
        };
        (Self { virgin, log }, handle)
    }

    fn record(&self, event: HostEvent) {
        self.log.borrow_mut().events.push(event);
    }
}

impl ExchangeHandle {
    /// Make virgin bytes available to the next pull.
    pub fn push_input(&self, bytes: &[u8]) {
        self.log.borrow_mut().pending_input.extend_from_slice(bytes);
    }

    /// Every host call so far, in order.
    pub fn events(&self) -> Vec<HostEvent> {
        self.log.borrow().events.clone()
    }

    /// How many times `event` was recorded.
    pub fn count(&self, event: &HostEvent) -> usize {
        self.log.borrow().events.iter().filter(|e| *e == event).count()
    }

    /// The adapted message, once delivered.
    pub fn adapted(&self) -> Option<Message> {
        self.log.borrow().adapted.clone()
    }

    /// Virgin bytes pushed but not yet pulled.
    pub fn unread_input(&self) -> usize {
        self.log.borrow().pending_input.len()
    }
}

impl HostTransaction for LocalHost {
    fn virgin(&self) -> &Message {
        &self.virgin
    }

    fn pump_start(&mut self) {
        self.record(HostEvent::PumpStart);
    }

    fn pump_more(&mut self) {
        self.record(HostEvent::PumpMore);
    }

    fn pump_stop(&mut self) {
        self.record(HostEvent::PumpStop);
    }

    fn deliver_adapted(&mut self, adapted: Message) {
        let mut log = self.log.borrow_mut();
        log.adapted = Some(adapted);
        log.events.push(HostEvent::Adapted { final_call: false });
    }

    fn deliver_adapted_final(&mut self, adapted: Message) {
        let mut log = self.log.borrow_mut();
        log.adapted = Some(adapted);
        log.events.push(HostEvent::Adapted { final_call: true });
    }

    fn pull_available_input(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.log.borrow_mut().pending_input)
    }

    fn notify_output_available(&mut self) {
        self.record(HostEvent::OutputAvailable);
    }

    fn notify_output_done(&mut self, at_end: bool) {
        self.record(HostEvent::OutputDone { at_end });
    }

    fn notify_aborted(&mut self) {
        self.record(HostEvent::Aborted);
    }
}

/// Outcome of [`run_exchange`].
#[derive(Debug, Clone)]
pub struct ExchangeSummary {
    /// Adapted message header as delivered
    pub adapted: Option<Message>,
    /// Virgin body bytes read
    pub bytes_in: u64,
    /// Adapted body bytes written
    pub bytes_out: u64,
    /// Definition version the transaction ran with
    pub definition_version: Option<String>,
}

/// Stream `input` through one transaction of `service`, writing the adapted
/// body to `output`.
///
/// An I/O error aborts the exchange; the transaction is dropped while live
/// and tells the host so.
pub fn run_exchange<R: Read, W: Write>(
    service: &AdapterService,
    virgin: Message,
    mut input: R,
    output: &mut W,
    chunk_size: usize,
) -> io::Result<ExchangeSummary> {
    let (host, handle) = LocalHost::new(virgin);
    let mut xaction = service.make_transaction(host);
    xaction.start();

    let mut summary = ExchangeSummary {
        adapted: handle.adapted(),
        bytes_in: 0,
        bytes_out: 0,
        definition_version: xaction.definition().map(|d| d.version().to_string()),
    };

    // no body: start() already made the last host call
    if !xaction.is_callable() {
        xaction.stop();
        return Ok(summary);
    }

    xaction.request_start_output();

    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        summary.bytes_in += n as u64;
        handle.push_input(&buf[..n]);
        xaction.on_input_available();

        let available = xaction.pending_output();
        output.write_all(xaction.read_output(0, available))?;
        xaction.consume_output(available);
        summary.bytes_out += available as u64;
    }

    xaction.on_input_done(true);
    let available = xaction.pending_output();
    output.write_all(xaction.read_output(0, available))?;
    xaction.consume_output(available);
    summary.bytes_out += available as u64;
    output.flush()?;

    debug!(
        xaction = xaction.id(),
        bytes_in = summary.bytes_in,
        bytes_out = summary.bytes_out,
        "Local exchange finished"
    );

    xaction.stop();
    Ok(summary)
}
