// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The EP0 control transfer engine.
//!
//! A control transfer is a SETUP packet, an optional data stage in the
//! direction the SETUP asked for, and a zero-length status stage in the
//! opposite direction. `ControlEndpoint` sequences those stages and leaves
//! the meaning of each request to a `ControlHandler`.
//!
//! Data stages go through a staging buffer owned by the control endpoint.
//! Responses are copied in whole, then fed to the hardware one max-packet
//! chunk at a time as IN completions arrive; OUT data is collected there
//! until the host has sent everything it announced.

use log::{trace, warn};

use crate::config::CONTROL_BUFFER_SIZE;
use crate::descriptor::EndpointType;
use crate::endpoint::{Endpoint, InEndpoint, OutEndpoint};
use crate::hal::UsbHardware;
use crate::setup::{Recipient, SetupPacket, UsbDir};

/// Where EP0 is in the current control transfer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Ep0State {
    Idle,
    /// SETUP received, no data or status stage started yet.
    Setup,
    DataIn,
    DataOut,
    StatusIn,
    StatusOut,
    /// Both directions stalled; the next SETUP recovers.
    Stall,
}

/// Request handling plugged into the control engine.
///
/// Each method receives the parsed request and a `Control` through which it
/// answers: start a data stage, acknowledge, or stall. A handler that returns
/// without doing any of those leaves EP0 in `Ep0State::Setup`, which the host
/// will see as a timeout.
pub trait ControlHandler<H: UsbHardware> {
    /// Data stage hooks only fire once the device is configured.
    fn is_configured(&self) -> bool;

    fn std_dev_req(&mut self, ctl: &mut Control<'_, H>, req: &SetupPacket);

    fn std_itf_req(&mut self, ctl: &mut Control<'_, H>, req: &SetupPacket);

    fn std_ep_req(&mut self, ctl: &mut Control<'_, H>, req: &SetupPacket);

    /// The last packet of an IN data stage has gone out.
    fn ep0_tx_sent(&mut self, req: &SetupPacket);

    /// An OUT data stage is complete; `data` is everything the host sent.
    fn ep0_rx_ready(&mut self, req: &SetupPacket, data: &[u8]);
}

/// Endpoint 0, both directions, plus the control transfer state.
pub struct ControlEndpoint {
    in_ep: InEndpoint,
    out_ep: OutEndpoint,
    state: Ep0State,
    in_total: usize,
    in_rem: usize,
    out_total: usize,
    out_rem: usize,
    /// wLength of the current request. Cleared once a terminating ZLP has
    /// been queued so the next IN completion moves on to the status stage.
    data_length: u16,
    request: SetupPacket,
    buf: [u8; CONTROL_BUFFER_SIZE],
}

impl ControlEndpoint {
    /// # Panics
    ///
    /// If `max_packet_size` is not one of the sizes USB 2.0 allows for EP0:
    /// 8, 16, 32 or 64.
    pub fn new(max_packet_size: u16) -> Self {
        assert!(
            matches!(max_packet_size, 8 | 16 | 32 | 64),
            "invalid EP0 max packet size {}",
            max_packet_size
        );
        let attributes = EndpointType::Control as u8;
        ControlEndpoint {
            in_ep: InEndpoint::new(0, attributes, max_packet_size, 0, None),
            out_ep: OutEndpoint::new(0, attributes, max_packet_size, 0, None),
            state: Ep0State::Idle,
            in_total: 0,
            in_rem: 0,
            out_total: 0,
            out_rem: 0,
            data_length: 0,
            request: SetupPacket::new(0, 0, 0, 0, 0),
            buf: [0; CONTROL_BUFFER_SIZE],
        }
    }

    /// Opens both directions of EP0 and forgets any transfer in progress.
    pub fn open<H: UsbHardware>(&mut self, hw: &mut H) {
        self.in_ep.bus_reset();
        self.out_ep.bus_reset();
        self.in_ep.open(hw);
        self.out_ep.open(hw);
        self.state = Ep0State::Idle;
    }

    pub fn state(&self) -> Ep0State {
        self.state
    }

    pub fn request(&self) -> &SetupPacket {
        &self.request
    }

    pub fn max_packet_size(&self) -> u16 {
        self.in_ep.max_packet_size()
    }

    pub fn in_endpoint(&self) -> &InEndpoint {
        &self.in_ep
    }

    pub fn out_endpoint(&self) -> &OutEndpoint {
        &self.out_ep
    }

    fn mps(&self) -> usize {
        usize::from(self.in_ep.max_packet_size())
    }

    /// Handles the 8 bytes of a SETUP stage. Anything in flight is dropped.
    pub fn setup_stage<H, D>(&mut self, hw: &mut H, handler: &mut D, bytes: &[u8])
    where
        H: UsbHardware,
        D: ControlHandler<H>,
    {
        self.in_ep.clear_protocol_stall();
        self.out_ep.clear_protocol_stall();

        let mut ctl = Control { ep: self, hw };
        let Some(req) = SetupPacket::parse(bytes) else {
            warn!("malformed SETUP of {} bytes", bytes.len());
            ctl.error();
            return;
        };
        trace!("SETUP {:?}", req);

        ctl.ep.request = req;
        ctl.ep.state = Ep0State::Setup;
        ctl.ep.data_length = req.length();

        match req.recipient() {
            Some(Recipient::Device) => handler.std_dev_req(&mut ctl, &req),
            Some(Recipient::Interface) => handler.std_itf_req(&mut ctl, &req),
            Some(Recipient::Endpoint) => handler.std_ep_req(&mut ctl, &req),
            _ => {
                warn!("unsupported recipient in {:#04x}", req.request_type);
                ctl.stall_in();
            }
        }
    }

    /// Called when a packet queued on EP0 IN has been collected by the host.
    pub fn data_in_stage<H, D>(&mut self, hw: &mut H, handler: &mut D)
    where
        H: UsbHardware,
        D: ControlHandler<H>,
    {
        let mps = self.mps();
        match self.state {
            Ep0State::DataIn => {
                if self.in_rem > mps {
                    self.in_rem -= mps;
                    let start = self.in_total - self.in_rem;
                    let end = start + self.in_rem.min(mps);
                    trace!("EP0 IN continues at {}", start);
                    self.in_ep.transmit(hw, &self.buf[start..end]);
                } else if self.in_total % mps == 0
                    && self.in_total >= mps
                    && self.in_total < usize::from(self.data_length)
                {
                    // The host asked for more than we have and our last
                    // packet was full: it can't tell we're done.
                    trace!("EP0 IN terminating ZLP");
                    self.in_ep.transmit(hw, &[]);
                    self.data_length = 0;
                    self.out_ep.receive(hw, 0);
                } else {
                    if handler.is_configured() {
                        handler.ep0_tx_sent(&self.request);
                    }
                    Control { ep: self, hw }.receive_status();
                }
            }
            Ep0State::StatusIn => {
                self.state = Ep0State::Idle;
            }
            _ => (),
        }
    }

    /// Called with the contents of a packet received on EP0 OUT.
    pub fn data_out_stage<H, D>(&mut self, hw: &mut H, handler: &mut D, data: &[u8])
    where
        H: UsbHardware,
        D: ControlHandler<H>,
    {
        let mps = self.mps();
        match self.state {
            Ep0State::DataOut => {
                let offset = self.out_total - self.out_rem;
                let n = data.len().min(self.out_rem);
                self.buf[offset..offset + n].copy_from_slice(&data[..n]);

                if self.out_rem > mps && n == mps {
                    self.out_rem -= mps;
                    self.out_ep.receive(hw, self.out_rem.min(mps));
                } else {
                    self.out_rem -= n;
                    let received = self.out_total - self.out_rem;
                    if handler.is_configured() {
                        handler.ep0_rx_ready(&self.request, &self.buf[..received]);
                    }
                    Control { ep: self, hw }.send_status();
                }
            }
            Ep0State::StatusOut => {
                self.state = Ep0State::Idle;
            }
            _ => (),
        }
    }
}

/// EP0 as seen from a request handler: the current transfer plus the
/// hardware it runs on.
pub struct Control<'x, H: UsbHardware> {
    ep: &'x mut ControlEndpoint,
    hw: &'x mut H,
}

impl<'x, H: UsbHardware> Control<'x, H> {
    pub fn new(ep: &'x mut ControlEndpoint, hw: &'x mut H) -> Self {
        Control { ep, hw }
    }

    pub fn request(&self) -> &SetupPacket {
        &self.ep.request
    }

    pub fn state(&self) -> Ep0State {
        self.ep.state
    }

    pub fn hw(&mut self) -> &mut H {
        &mut *self.hw
    }

    /// Starts an IN data stage sending `data`, cut to what the host asked for.
    pub fn transmit(&mut self, data: &[u8]) {
        self.transmit_with(|buf| {
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            data.len()
        });
    }

    /// Starts an IN data stage whose payload `fill` writes straight into the
    /// staging buffer, returning its full length.
    ///
    /// Payloads bigger than the staging buffer stall EP0.
    pub fn transmit_with(&mut self, fill: impl FnOnce(&mut [u8]) -> usize) {
        let len = fill(&mut self.ep.buf[..]);
        if len > CONTROL_BUFFER_SIZE {
            warn!("{} byte IN data stage exceeds the EP0 buffer", len);
            self.error();
            return;
        }
        let len = len.min(usize::from(self.ep.data_length));
        let ep = &mut *self.ep;
        ep.state = Ep0State::DataIn;
        ep.in_total = len;
        ep.in_rem = len;
        let first = len.min(ep.mps());
        ep.in_ep.transmit(self.hw, &ep.buf[..first]);
    }

    /// Starts an OUT data stage expecting `len` bytes.
    pub fn receive(&mut self, len: usize) {
        if len > CONTROL_BUFFER_SIZE {
            warn!("{} byte OUT data stage exceeds the EP0 buffer", len);
            self.error();
            return;
        }
        let ep = &mut *self.ep;
        ep.state = Ep0State::DataOut;
        ep.out_total = len;
        ep.out_rem = len;
        let first = len.min(ep.mps());
        ep.out_ep.receive(self.hw, first);
    }

    /// Acknowledges the request with a zero-length IN status stage.
    pub fn send_status(&mut self) {
        self.ep.state = Ep0State::StatusIn;
        self.ep.in_ep.transmit(self.hw, &[]);
    }

    /// Arms EP0 OUT for the host's zero-length status stage.
    pub fn receive_status(&mut self) {
        self.ep.state = Ep0State::StatusOut;
        self.ep.out_ep.receive(self.hw, 0);
    }

    /// Rejects the request by stalling both directions of EP0.
    pub fn error(&mut self) {
        trace!("EP0 stall");
        self.ep.in_ep.stall(self.hw);
        self.ep.out_ep.stall(self.hw);
        self.ep.state = Ep0State::Stall;
    }

    pub fn stall_in(&mut self) {
        self.ep.in_ep.stall(self.hw);
        self.ep.state = Ep0State::Stall;
    }

    /// One of EP0's two halves, picked by the direction bit of `address`.
    pub fn ep0(&mut self, address: u8) -> &mut Endpoint {
        match UsbDir::of_endpoint_addr(address) {
            UsbDir::In => &mut *self.ep.in_ep,
            UsbDir::Out => &mut *self.ep.out_ep,
        }
    }
}
