// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A `UsbHardware` that does nothing but remember what it was asked to do.

use crate::descriptor::EndpointType;
use crate::hal::UsbHardware;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    SetAddress(u8),
    Open(u8, u16, EndpointType),
    Close(u8),
    Stall(u8),
    ClearStall(u8),
    Flush(u8),
    Transmit(u8, Vec<u8>),
    Receive(u8, usize),
}

#[derive(Debug, Default)]
pub struct MockHardware {
    pub calls: Vec<Call>,
}

impl UsbHardware for MockHardware {
    fn set_address(&mut self, address: u8) {
        self.calls.push(Call::SetAddress(address));
    }

    fn open_endpoint(&mut self, address: u8, max_packet_size: u16, kind: EndpointType) {
        self.calls.push(Call::Open(address, max_packet_size, kind));
    }

    fn close_endpoint(&mut self, address: u8) {
        self.calls.push(Call::Close(address));
    }

    fn stall(&mut self, address: u8) {
        self.calls.push(Call::Stall(address));
    }

    fn clear_stall(&mut self, address: u8) {
        self.calls.push(Call::ClearStall(address));
    }

    fn flush(&mut self, address: u8) {
        self.calls.push(Call::Flush(address));
    }

    fn transmit(&mut self, address: u8, data: &[u8]) {
        self.calls.push(Call::Transmit(address, data.to_vec()));
    }

    fn receive(&mut self, address: u8, len: usize) {
        self.calls.push(Call::Receive(address, len));
    }
}
