// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The hardware side of the stack.
//!
//! The stack never touches registers. Everything that reaches the wire goes
//! through `UsbHardware`, implemented once per USB controller. All of these
//! operations are fire-and-forget: completion comes back later through the
//! event entry points on `Device` (`on_data_in_stage`, `on_data_out_stage`,
//! and so on), driven by the controller's interrupt handler.

use crate::descriptor::EndpointType;

pub trait UsbHardware {
    /// Programs the device address.
    ///
    /// This is called before the status stage of SET_ADDRESS has gone out.
    /// Controllers that apply the address immediately (rather than latching
    /// it until the status IN completes) must defer it themselves: the status
    /// stage has to be answered from the _old_ address.
    fn set_address(&mut self, address: u8);

    /// Enables an endpoint with the given max packet size and transfer type.
    fn open_endpoint(&mut self, address: u8, max_packet_size: u16, kind: EndpointType);

    fn close_endpoint(&mut self, address: u8);

    /// Makes the endpoint answer STALL until cleared or, for EP0, until the
    /// next SETUP packet.
    fn stall(&mut self, address: u8);

    /// Clears a stall. For non-control endpoints this also resets the data
    /// toggle to DATA0.
    fn clear_stall(&mut self, address: u8);

    /// Discards any data buffered in the controller for this endpoint.
    fn flush(&mut self, address: u8);

    /// Configures an IN endpoint to send `data` when the host next asks for
    /// it. An empty slice sends a zero-length packet.
    ///
    /// The contents of `data` are _copied_ into controller memory before this
    /// returns, so callers can reuse the buffer immediately.
    fn transmit(&mut self, address: u8, data: &[u8]);

    /// Configures an OUT endpoint to accept up to `len` bytes from the host.
    /// The data is handed back through `Device::on_data_out_stage`.
    fn receive(&mut self, address: u8, len: usize);
}
