//! Host transaction interface.
//!
//! The host relays traffic and owns the real message exchange. The adapter
//! only ever talks to it through [`HostTransaction`], which keeps the
//! transaction logic testable against a fake host.

use crate::message::Message;

/// Operations the adapter may invoke on the host side of one exchange.
pub trait HostTransaction {
    /// The original message as received by the host.
    fn virgin(&self) -> &Message;

    /// Ask the host to start supplying virgin body content.
    fn pump_start(&mut self);

    /// Ask the host for more virgin body content.
    fn pump_more(&mut self);

    /// Tell the host that no more virgin body content is wanted.
    fn pump_stop(&mut self);

    /// Hand over the adapted message; body exchange continues afterwards.
    fn deliver_adapted(&mut self, adapted: Message);

    /// Hand over the adapted message as the last call of this exchange.
    ///
    /// The host may release its transaction as soon as this returns.
    fn deliver_adapted_final(&mut self, adapted: Message);

    /// Take every virgin body byte currently available.
    fn pull_available_input(&mut self) -> Vec<u8>;

    /// Adapted body content is ready to be read.
    fn notify_output_available(&mut self);

    /// No more adapted body content will be produced.
    fn notify_output_done(&mut self, at_end: bool);

    /// The adapter gave up on the exchange.
    fn notify_aborted(&mut self);
}

/// Link from a transaction to its host.
///
/// Severing is one-way: once `Severed`, the transaction is inert.
#[derive(Debug)]
pub enum HostLink<H> {
    Present(H),
    Severed,
}

impl<H> HostLink<H> {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn get_mut(&mut self) -> Option<&mut H> {
        match self {
            Self::Present(host) => Some(host),
            Self::Severed => None,
        }
    }

    pub fn get(&self) -> Option<&H> {
        match self {
            Self::Present(host) => Some(host),
            Self::Severed => None,
        }
    }

    /// Sever the link, returning the handle if it was still present.
    pub fn sever(&mut self) -> Option<H> {
        match std::mem::replace(self, Self::Severed) {
            Self::Present(host) => Some(host),
            Self::Severed => None,
        }
    }
}
