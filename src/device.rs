// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The device: enumeration state, standard request handling, and the event
//! entry points the controller driver calls into.
//!
//! # Driving a `Device`
//!
//! Everything happens in response to hardware events. The controller driver
//! forwards each one to the matching `on_*` method, from a single context
//! (typically the USB interrupt handler), and never re-enters: each call
//! runs to completion before the next event is delivered.
//!
//! Before the host is allowed to see the device, the application calls
//! `init` to build the device descriptor and `add_config` for each
//! configuration, then lets the controller attach to the bus. The first bus
//! reset opens EP0 and enumeration proceeds from there.

use alloc::vec;
use alloc::vec::Vec;

use log::{debug, info, trace, warn};
use num_traits::FromPrimitive;

use crate::config::{EP0_MAX_PACKET_SIZE, LANGID_EN_US, MAX_CONFIGS, MAX_STRINGS};
use crate::configuration::Configuration;
use crate::control::{Control, ControlEndpoint, ControlHandler, Ep0State};
use crate::descriptor::{DescriptorType, DeviceDescriptor, DeviceDescriptorInfo, StringDescriptor};
use crate::endpoint::{EndpointIo, EndpointTable};
use crate::error::{Error, Result};
use crate::hal::UsbHardware;
use crate::setup::{Feature, Request, RequestKind, SetupPacket, UsbDir};

/// Enumeration state of the device, as seen by the host.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceState {
    /// Attached and reset, answering at address 0.
    Default,
    /// Has an address, no configuration selected.
    Addressed,
    /// A configuration is active and its endpoints are open.
    Configured,
    /// Bus idle. The state before suspension comes back on resume.
    Suspended,
}

bitflags::bitflags! {
    /// Status word reported by GET_STATUS on the device.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct DeviceStatus: u16 {
        const SELF_POWERED = 0x0001;
        const REMOTE_WAKEUP = 0x0002;
    }
}

/// What goes into the device descriptor.
///
/// The strings are registered in the string table by `Device::init`; a
/// missing serial number is reported as string index 0.
#[derive(Copy, Clone, Debug)]
pub struct DeviceInfo<'s> {
    pub bcd_usb: u16,
    pub device_class: u8,
    pub device_subclass: u8,
    pub device_protocol: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub bcd_device: u16,
    pub manufacturer: &'s str,
    pub product: &'s str,
    pub serial_number: Option<&'s str>,
    pub num_configurations: u8,
}

/// A USB device on one controller.
pub struct Device<'a, H: UsbHardware> {
    hw: H,
    ctl: ControlEndpoint,
    core: DeviceCore<'a, H>,
    in_event: bool,
}

/// Everything the standard request handlers touch, kept apart from EP0 and
/// the hardware so the control engine can hold both while calling in here.
struct DeviceCore<'a, H: UsbHardware> {
    state: DeviceState,
    old_state: DeviceState,
    address: u8,
    /// Value of the selected configuration, 0 if none.
    config: u8,
    status: DeviceStatus,
    connected: bool,
    device_desc: [u8; DeviceDescriptor::SIZE],
    /// String descriptors by index. Slot 0 holds the language IDs.
    strings: [Option<Vec<u8>>; MAX_STRINGS],
    /// Configurations by value: slot `n` holds configuration value `n + 1`.
    configs: [Option<Configuration<'a, H>>; MAX_CONFIGS],
    endpoints: EndpointTable,
    #[cfg(feature = "bos")]
    bos: Option<&'a [u8]>,
}

fn config_slot(value: u8) -> Option<usize> {
    let slot = usize::from(value).checked_sub(1)?;
    (slot < MAX_CONFIGS).then_some(slot)
}

impl<'a, H: UsbHardware> Device<'a, H> {
    pub fn new(hw: H, self_powered: bool) -> Self {
        Self::with_ep0_max_packet(hw, self_powered, EP0_MAX_PACKET_SIZE)
    }

    /// # Panics
    ///
    /// If `max_packet_size` is not 8, 16, 32 or 64.
    pub fn with_ep0_max_packet(hw: H, self_powered: bool, max_packet_size: u16) -> Self {
        let ctl = ControlEndpoint::new(max_packet_size);

        let [lo, hi] = LANGID_EN_US.to_le_bytes();
        let langids = vec![4, DescriptorType::String as u8, lo, hi];

        let mut strings: [Option<Vec<u8>>; MAX_STRINGS] = core::array::from_fn(|_| None);
        strings[0] = Some(langids);

        let status = if self_powered {
            DeviceStatus::SELF_POWERED
        } else {
            DeviceStatus::empty()
        };

        Device {
            hw,
            ctl,
            core: DeviceCore {
                state: DeviceState::Default,
                old_state: DeviceState::Default,
                address: 0,
                config: 0,
                status,
                connected: false,
                device_desc: [0; DeviceDescriptor::SIZE],
                strings,
                configs: core::array::from_fn(|_| None),
                endpoints: EndpointTable::new(),
                #[cfg(feature = "bos")]
                bos: None,
            },
            in_event: false,
        }
    }

    /// Builds the device descriptor, registering its strings.
    pub fn init(&mut self, info: &DeviceInfo<'_>) -> Result<()> {
        let manufacturer = self.create_str(info.manufacturer)?;
        let product = self.create_str(info.product)?;
        let serial_number = match info.serial_number {
            Some(serial) => self.create_str(serial)?,
            None => 0,
        };
        DeviceDescriptor::new(&mut self.core.device_desc).init(&DeviceDescriptorInfo {
            bcd_usb: info.bcd_usb,
            device_class: info.device_class,
            device_subclass: info.device_subclass,
            device_protocol: info.device_protocol,
            max_packet_size0: self.ctl.max_packet_size() as u8,
            vendor_id: info.vendor_id,
            product_id: info.product_id,
            bcd_device: info.bcd_device,
            manufacturer,
            product,
            serial_number,
            num_configurations: info.num_configurations,
        })
    }

    /// Registers a string descriptor for `text` and returns its index.
    ///
    /// Only ASCII is accepted.
    pub fn create_str(&mut self, text: &str) -> Result<u8> {
        let slot = self
            .core
            .strings
            .iter()
            .position(Option::is_none)
            .ok_or(Error::StringTableFull)?;
        if !text.is_ascii() {
            return Err(Error::NonAscii);
        }
        if StringDescriptor::size_for(text) > usize::from(u8::MAX) {
            return Err(Error::StringTooLong(text.len()));
        }
        let mut data = vec![0u8; StringDescriptor::size_for(text)];
        StringDescriptor::new(&mut data).init(text)?;
        trace!("string {} = {:?}", slot, text);
        self.core.strings[slot] = Some(data);
        Ok(slot as u8)
    }

    /// Makes `config` selectable by the host under its configuration value.
    ///
    /// # Panics
    ///
    /// If the value is 0, above `MAX_CONFIGS`, or already registered.
    pub fn add_config(&mut self, config: Configuration<'a, H>) {
        let value = config.value();
        let slot = config_slot(value);
        assert!(
            slot.map_or(false, |s| self.core.configs[s].is_none()),
            "configuration value {} is invalid or already registered",
            value
        );
        if let Some(slot) = slot {
            self.core.configs[slot] = Some(config);
        }
    }

    /// Registers the BOS descriptor returned for GET_DESCRIPTOR(BOS).
    #[cfg(feature = "bos")]
    pub fn set_bos_descriptor(&mut self, bos: &'a [u8]) {
        self.core.bos = Some(bos);
    }

    pub fn state(&self) -> DeviceState {
        self.core.state
    }

    pub fn address(&self) -> u8 {
        self.core.address
    }

    /// Value of the selected configuration, 0 when unconfigured.
    pub fn configuration(&self) -> u8 {
        self.core.config
    }

    pub fn status(&self) -> DeviceStatus {
        self.core.status
    }

    pub fn remote_wakeup_enabled(&self) -> bool {
        self.core.status.contains(DeviceStatus::REMOTE_WAKEUP)
    }

    pub fn is_connected(&self) -> bool {
        self.core.connected
    }

    pub fn ep0_state(&self) -> Ep0State {
        self.ctl.state()
    }

    pub fn string(&self, index: u8) -> Option<&[u8]> {
        self.core.strings.get(usize::from(index))?.as_deref()
    }

    pub fn device_descriptor(&self) -> &[u8] {
        &self.core.device_desc
    }

    pub fn hw(&self) -> &H {
        &self.hw
    }

    pub fn hw_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    /// Transfers on class endpoints from outside an event, e.g. to queue
    /// data produced by the application.
    pub fn endpoints(&mut self) -> EndpointIo<'_, H> {
        EndpointIo::new(&mut self.hw, &mut self.core.endpoints)
    }

    fn dispatch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        debug_assert!(!self.in_event, "USB event delivered while another is running");
        self.in_event = true;
        let r = f(self);
        self.in_event = false;
        r
    }

    /// A SETUP packet arrived on EP0.
    pub fn on_setup_stage(&mut self, bytes: &[u8]) {
        self.dispatch(|dev| dev.ctl.setup_stage(&mut dev.hw, &mut dev.core, bytes));
    }

    /// Data arrived on OUT endpoint `epnum`. Returns `false` if nothing
    /// could take it.
    pub fn on_data_out_stage(&mut self, epnum: u8, data: &[u8]) -> bool {
        self.dispatch(|dev| {
            if epnum == 0 {
                dev.ctl.data_out_stage(&mut dev.hw, &mut dev.core, data);
                true
            } else {
                dev.core.class_data_out(&mut dev.hw, epnum, data)
            }
        })
    }

    /// A packet queued on IN endpoint `epnum` was sent. Returns `false` if
    /// no endpoint is there to hear about it.
    pub fn on_data_in_stage(&mut self, epnum: u8) -> bool {
        self.dispatch(|dev| {
            if epnum == 0 {
                dev.ctl.data_in_stage(&mut dev.hw, &mut dev.core);
                true
            } else {
                dev.core.class_data_in(&mut dev.hw, epnum)
            }
        })
    }

    pub fn on_start_of_frame(&mut self) {
        self.dispatch(|dev| {
            if let Some(cfg) = dev.core.active_config() {
                cfg.start_of_frame();
            }
        });
    }

    /// Bus reset: EP0 comes back, any configuration goes away.
    pub fn on_reset(&mut self) {
        self.dispatch(|dev| {
            debug!("bus reset");
            dev.ctl.open(&mut dev.hw);
            dev.core.deactivate(&mut dev.hw);
            dev.core.address = 0;
            dev.core.status.remove(DeviceStatus::REMOTE_WAKEUP);
            dev.core.set_state(DeviceState::Default);
        });
    }

    pub fn on_suspend(&mut self) {
        self.dispatch(|dev| {
            if dev.core.state != DeviceState::Suspended {
                dev.core.old_state = dev.core.state;
                dev.core.set_state(DeviceState::Suspended);
            }
        });
    }

    pub fn on_resume(&mut self) {
        self.dispatch(|dev| {
            if dev.core.state == DeviceState::Suspended {
                let old = dev.core.old_state;
                dev.core.set_state(old);
            }
        });
    }

    pub fn on_connect(&mut self) {
        self.dispatch(|dev| {
            info!("connected");
            dev.core.connected = true;
        });
    }

    pub fn on_disconnect(&mut self) {
        self.dispatch(|dev| {
            info!("disconnected");
            dev.core.connected = false;
        });
    }

    /// An isochronous IN transfer on `epnum` missed its frame.
    pub fn on_iso_in_incomplete(&mut self, epnum: u8) {
        self.dispatch(|dev| dev.core.iso_incomplete(UsbDir::In.endpoint(epnum)));
    }

    /// An isochronous OUT transfer on `epnum` missed its frame.
    pub fn on_iso_out_incomplete(&mut self, epnum: u8) {
        self.dispatch(|dev| dev.core.iso_incomplete(UsbDir::Out.endpoint(epnum)));
    }
}

impl<'a, H: UsbHardware> DeviceCore<'a, H> {
    fn set_state(&mut self, state: DeviceState) {
        if state != self.state {
            debug!("{:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn active_config(&mut self) -> Option<&mut Configuration<'a, H>> {
        if self.state != DeviceState::Configured {
            return None;
        }
        self.configs[config_slot(self.config)?].as_mut()
    }

    /// Takes down the selected configuration, if any.
    fn deactivate(&mut self, hw: &mut H) {
        if let Some(slot) = config_slot(self.config) {
            if let Some(cfg) = self.configs[slot].as_mut() {
                cfg.deinit(&mut self.endpoints, hw);
            }
        }
        self.config = 0;
    }

    /// Brings up configuration `value`. On failure nothing is left open.
    fn activate(&mut self, hw: &mut H, value: u8) -> Result<()> {
        let cfg = config_slot(value)
            .and_then(|slot| self.configs[slot].as_mut())
            .ok_or(Error::NoConfiguration(value))?;
        cfg.init_default_iface(&mut self.endpoints, hw)?;
        self.config = value;
        Ok(())
    }

    fn class_data_out(&mut self, hw: &mut H, epnum: u8, data: &[u8]) -> bool {
        let address = UsbDir::Out.endpoint(epnum);
        let Some(owner) = self.endpoints.get(address).and_then(|ep| ep.iface()) else {
            return false;
        };
        let Some(slot) = config_slot(self.config) else {
            return false;
        };
        match self.configs[slot].as_mut() {
            Some(cfg) if self.state == DeviceState::Configured => {
                cfg.data_out(owner, address, data, &mut self.endpoints, hw);
                true
            }
            _ => false,
        }
    }

    fn class_data_in(&mut self, hw: &mut H, epnum: u8) -> bool {
        let address = UsbDir::In.endpoint(epnum);
        let Some(owner) = self.endpoints.get(address).and_then(|ep| ep.iface()) else {
            return false;
        };
        let Some(slot) = config_slot(self.config) else {
            return false;
        };
        match self.configs[slot].as_mut() {
            Some(cfg) if self.state == DeviceState::Configured => {
                cfg.data_in(owner, address, &mut self.endpoints, hw);
                true
            }
            _ => false,
        }
    }

    fn iso_incomplete(&mut self, address: u8) {
        let Some(owner) = self.endpoints.get(address).and_then(|ep| ep.iface()) else {
            return;
        };
        if let Some(cfg) = self.active_config() {
            match UsbDir::of_endpoint_addr(address) {
                UsbDir::In => cfg.iso_in_incomplete(owner, address),
                UsbDir::Out => cfg.iso_out_incomplete(owner, address),
            }
        }
    }

    cfg_if::cfg_if! {
        if #[cfg(feature = "bos")] {
            fn bos_descriptor(&self) -> Option<&'a [u8]> {
                self.bos
            }
        } else {
            fn bos_descriptor(&self) -> Option<&'a [u8]> {
                None
            }
        }
    }

    fn get_descriptor(&mut self, ctl: &mut Control<'_, H>, req: &SetupPacket) {
        let (kind, index) = req.descriptor_type_and_index();
        let kind = DescriptorType::from_u8(kind);

        // A zero-length read has nothing to send but still needs its status
        // stage, as long as the descriptor exists.
        let exists = match kind {
            Some(DescriptorType::Device) => self.device_desc[0] != 0,
            Some(DescriptorType::Configuration) => {
                self.configs.iter().flatten().nth(usize::from(index)).is_some()
            }
            Some(DescriptorType::String) => {
                self.strings.get(usize::from(index)).map_or(false, Option::is_some)
            }
            Some(DescriptorType::Bos) => self.bos_descriptor().is_some(),
            _ => false,
        };
        if !exists {
            warn!("GET_DESCRIPTOR {:#06x} unavailable", req.value());
            ctl.error();
            return;
        }
        if req.length() == 0 {
            ctl.send_status();
            return;
        }

        match kind {
            Some(DescriptorType::Device) => ctl.transmit(&self.device_desc),
            Some(DescriptorType::Configuration) => {
                if let Some(cfg) = self.configs.iter().flatten().nth(usize::from(index)) {
                    let desc = cfg.descriptor();
                    ctl.transmit_with(|buf| {
                        desc.copy_to(buf);
                        usize::from(desc.w_total_length())
                    });
                }
            }
            Some(DescriptorType::String) => {
                if let Some(Some(s)) = self.strings.get(usize::from(index)) {
                    ctl.transmit(s);
                }
            }
            Some(DescriptorType::Bos) => {
                if let Some(bos) = self.bos_descriptor() {
                    ctl.transmit(bos);
                }
            }
            _ => ctl.error(),
        }
    }

    fn set_address(&mut self, ctl: &mut Control<'_, H>, req: &SetupPacket) {
        if req.index() != 0 || req.length() != 0 || self.state == DeviceState::Configured {
            warn!("SET_ADDRESS refused in {:?}", self.state);
            ctl.error();
            return;
        }
        let address = (req.value() & 0x7F) as u8;
        self.address = address;
        ctl.hw().set_address(address);
        ctl.send_status();
        self.set_state(if address != 0 {
            DeviceState::Addressed
        } else {
            DeviceState::Default
        });
    }

    fn set_configuration(&mut self, ctl: &mut Control<'_, H>, req: &SetupPacket) {
        let value = req.value() as u8;
        let unknown = value != 0
            && config_slot(value).map_or(true, |s| self.configs[s].is_none());
        if req.value() > u16::from(u8::MAX) || unknown {
            warn!("SET_CONFIGURATION to unknown configuration {}", req.value());
            ctl.error();
            return;
        }

        match self.state {
            DeviceState::Addressed => {
                if value != 0 {
                    if let Err(e) = self.activate(ctl.hw(), value) {
                        warn!("configuration {} failed: {}", value, e);
                        ctl.error();
                        return;
                    }
                    self.set_state(DeviceState::Configured);
                }
                ctl.send_status();
            }
            DeviceState::Configured => {
                if value == 0 {
                    self.deactivate(ctl.hw());
                    self.set_state(DeviceState::Addressed);
                } else if value != self.config {
                    self.deactivate(ctl.hw());
                    if let Err(e) = self.activate(ctl.hw(), value) {
                        warn!("configuration {} failed: {}", value, e);
                        self.set_state(DeviceState::Addressed);
                        ctl.error();
                        return;
                    }
                }
                ctl.send_status();
            }
            _ => {
                warn!("SET_CONFIGURATION in {:?}", self.state);
                ctl.error();
            }
        }
    }

    fn get_configuration(&mut self, ctl: &mut Control<'_, H>, req: &SetupPacket) {
        match self.state {
            DeviceState::Addressed | DeviceState::Configured if req.length() == 1 => {
                ctl.transmit(&[self.config]);
            }
            _ => ctl.error(),
        }
    }

    fn get_status(&mut self, ctl: &mut Control<'_, H>) {
        match self.state {
            DeviceState::Addressed | DeviceState::Configured => {
                ctl.transmit(&self.status.bits().to_le_bytes());
            }
            _ => ctl.error(),
        }
    }

    fn set_feature(&mut self, ctl: &mut Control<'_, H>, req: &SetupPacket, enabled: bool) {
        let addressed = matches!(self.state, DeviceState::Addressed | DeviceState::Configured);
        if !addressed || Feature::from_u16(req.value()) != Some(Feature::RemoteWakeup) {
            ctl.error();
            return;
        }
        self.status.set(DeviceStatus::REMOTE_WAKEUP, enabled);
        debug!("remote wakeup {}", if enabled { "on" } else { "off" });
        if let Some(cfg) = self.active_config() {
            cfg.device_feature(Feature::RemoteWakeup, enabled);
        }
        ctl.send_status();
    }

    /// Class or vendor request with the device as recipient: offered to the
    /// current interface of the active configuration.
    fn device_class_request(&mut self, ctl: &mut Control<'_, H>, req: &SetupPacket) {
        let accepted = match self.active_config() {
            Some(cfg) => match cfg.current_iface() {
                Some(iface) => cfg.setup_request(iface, req, ctl),
                None => false,
            },
            None => false,
        };
        finish_class_request(ctl, req, accepted);
    }

    /// Standard requests to EP0 itself.
    fn ep0_request(&mut self, ctl: &mut Control<'_, H>, req: &SetupPacket) {
        let address = req.index_low();
        match (req.standard_request(), Feature::from_u16(req.value())) {
            (Some(Request::GetStatus), _) => {
                let status = ctl.ep0(address).status_bytes();
                ctl.transmit(&status);
            }
            (Some(Request::ClearFeature), Some(Feature::EndpointHalt)) => ctl.send_status(),
            _ => {
                warn!("request {:#04x} refused on EP0", req.request);
                ctl.error();
            }
        }
    }
}

/// Wraps up a class or vendor request after the interface has seen it.
fn finish_class_request<H: UsbHardware>(
    ctl: &mut Control<'_, H>,
    req: &SetupPacket,
    accepted: bool,
) {
    if !accepted {
        warn!("class request {:#04x} rejected", req.request);
        ctl.error();
        return;
    }
    if ctl.state() != Ep0State::Setup {
        // The interface answered on its own.
        return;
    }
    match (req.length(), req.direction()) {
        (0, _) => ctl.send_status(),
        (len, UsbDir::Out) => ctl.receive(usize::from(len)),
        (_, UsbDir::In) => {
            warn!("class request {:#04x} accepted without data", req.request);
            ctl.error();
        }
    }
}

impl<'a, H: UsbHardware> ControlHandler<H> for DeviceCore<'a, H> {
    fn is_configured(&self) -> bool {
        self.state == DeviceState::Configured
    }

    fn std_dev_req(&mut self, ctl: &mut Control<'_, H>, req: &SetupPacket) {
        if req.kind() != RequestKind::Standard {
            self.device_class_request(ctl, req);
            return;
        }
        match req.standard_request() {
            Some(Request::GetDescriptor) => self.get_descriptor(ctl, req),
            Some(Request::SetAddress) => self.set_address(ctl, req),
            Some(Request::SetConfiguration) => self.set_configuration(ctl, req),
            Some(Request::GetConfiguration) => self.get_configuration(ctl, req),
            Some(Request::GetStatus) => self.get_status(ctl),
            Some(Request::SetFeature) => self.set_feature(ctl, req, true),
            Some(Request::ClearFeature) => self.set_feature(ctl, req, false),
            _ => {
                warn!("unsupported device request {:#04x}", req.request);
                ctl.error();
            }
        }
    }

    fn std_itf_req(&mut self, ctl: &mut Control<'_, H>, req: &SetupPacket) {
        let number = req.index_low();
        let Some(cfg) = self.active_config() else {
            warn!("interface request while not configured");
            ctl.error();
            return;
        };

        match req.kind() {
            RequestKind::Class | RequestKind::Vendor => {
                let accepted = cfg.setup_request(number, req, ctl);
                finish_class_request(ctl, req, accepted);
            }
            RequestKind::Standard => match (req.standard_request(), cfg.alternate_setting(number)) {
                (Some(Request::GetInterface), Some(alt)) => ctl.transmit(&[alt]),
                // Only the registered alternate setting exists.
                (Some(Request::SetInterface), Some(_)) => ctl.send_status(),
                _ => {
                    warn!("interface request {:#04x} to {} refused", req.request, number);
                    ctl.error();
                }
            },
            RequestKind::Reserved => ctl.error(),
        }
    }

    fn std_ep_req(&mut self, ctl: &mut Control<'_, H>, req: &SetupPacket) {
        let address = req.index_low();
        let is_ep0 = address & 0x0F == 0;

        if matches!(req.kind(), RequestKind::Class | RequestKind::Vendor) {
            let owner = self.endpoints.get(address).and_then(|ep| ep.iface());
            let accepted = match (owner, self.active_config()) {
                (Some(owner), Some(cfg)) if !is_ep0 => {
                    cfg.endpoint_request(owner, address, req, ctl)
                }
                _ => false,
            };
            finish_class_request(ctl, req, accepted);
            return;
        }

        match self.state {
            DeviceState::Addressed | DeviceState::Configured if is_ep0 => {
                self.ep0_request(ctl, req)
            }
            DeviceState::Configured => {
                let Some(ep) = self.endpoints.get_mut(address) else {
                    warn!("request to missing endpoint {:#04x}", address);
                    ctl.error();
                    return;
                };
                match (req.standard_request(), Feature::from_u16(req.value())) {
                    (Some(Request::SetFeature), Some(Feature::EndpointHalt)) => {
                        ep.stall(ctl.hw());
                        ctl.send_status();
                    }
                    (Some(Request::ClearFeature), Some(Feature::EndpointHalt)) => {
                        ep.clear_stall(ctl.hw());
                        ctl.send_status();
                    }
                    (Some(Request::GetStatus), _) => {
                        let status = ep.status_bytes();
                        ctl.transmit(&status);
                    }
                    _ => {
                        warn!("endpoint request {:#04x} to {:#04x} refused", req.request, address);
                        ctl.error();
                    }
                }
            }
            _ => {
                warn!("endpoint request in {:?}", self.state);
                ctl.error();
            }
        }
    }

    fn ep0_tx_sent(&mut self, req: &SetupPacket) {
        if let Some(cfg) = self.active_config() {
            cfg.ep0_tx_sent(req);
        }
    }

    fn ep0_rx_ready(&mut self, req: &SetupPacket, data: &[u8]) {
        if let Some(cfg) = self.active_config() {
            cfg.ep0_rx_ready(req, data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::UsbInterface;
    use crate::descriptor::{ConfigAttributes, ConfigDescriptor, EndpointType, InterfaceInfo};
    use crate::mock::{Call, MockHardware};
    use alloc::rc::Rc;
    use core::cell::RefCell;
    use zerocopy::AsBytes;

    type Events = Rc<RefCell<Vec<String>>>;

    /// Vendor interface: request 0x01 reads back the last data written with
    /// request 0x02.
    struct Loopback {
        events: Events,
        stored: Vec<u8>,
    }

    impl UsbInterface<MockHardware> for Loopback {
        fn handle_class_or_vendor_request(
            &mut self,
            req: &SetupPacket,
            ctl: &mut Control<'_, MockHardware>,
        ) -> bool {
            self.events.borrow_mut().push(format!("request {:#04x}", req.request));
            match req.request {
                0x01 => {
                    ctl.transmit(&self.stored);
                    true
                }
                0x02 => true,
                _ => false,
            }
        }

        fn on_control_data_received(&mut self, _req: &SetupPacket, data: &[u8]) {
            self.stored = data.to_vec();
        }

        fn on_activate(&mut self, _io: &mut EndpointIo<'_, MockHardware>) {
            self.events.borrow_mut().push("activate".into());
        }

        fn on_deactivate(&mut self) {
            self.events.borrow_mut().push("deactivate".into());
        }

        fn on_device_feature(&mut self, feature: Feature, enabled: bool) {
            self.events.borrow_mut().push(format!("{:?} {}", feature, enabled));
        }

        fn on_data_out(&mut self, address: u8, data: &[u8], io: &mut EndpointIo<'_, MockHardware>) {
            io.transmit(address | 0x80, data).unwrap();
        }

        /// Accepts vendor request 0x03 on any of its endpoints.
        fn handle_endpoint_request(
            &mut self,
            address: u8,
            req: &SetupPacket,
            _ctl: &mut Control<'_, MockHardware>,
        ) -> bool {
            self.events
                .borrow_mut()
                .push(format!("ep request {:#04x} {:#04x}", address, req.request));
            req.request == 0x03
        }

        fn on_start_of_frame(&mut self) {
            self.events.borrow_mut().push("sof".into());
        }

        fn on_iso_in_incomplete(&mut self, address: u8) {
            self.events.borrow_mut().push(format!("iso in {:#04x}", address));
        }

        fn on_iso_out_incomplete(&mut self, address: u8) {
            self.events.borrow_mut().push(format!("iso out {:#04x}", address));
        }
    }

    fn config<'a>(
        buf: &'a mut [u8],
        value: u8,
        events: &Events,
    ) -> Configuration<'a, MockHardware> {
        let desc = ConfigDescriptor::new(buf);
        desc.init(value, 0, ConfigAttributes::empty(), 50).unwrap();
        let mut cfg = Configuration::new(desc);
        let mut iface = cfg.begin_interface();
        iface
            .init(&InterfaceInfo {
                number: 0,
                alternate_setting: 0,
                class: 0xFF,
                subclass: 0,
                protocol: 0,
                string: 0,
            })
            .unwrap();
        let ep = iface.begin_ep();
        ep.init_in(1, EndpointType::Bulk as u8, 64, 0).unwrap();
        iface.end_ep(&ep).unwrap();
        let ep = iface.begin_ep();
        ep.init_out(1, EndpointType::Bulk as u8, 64, 0).unwrap();
        iface.end_ep(&ep).unwrap();
        cfg.end_interface(
            iface,
            Loopback {
                events: events.clone(),
                stored: Vec::new(),
            },
        )
        .unwrap();
        cfg
    }

    fn device<'a>(
        buf1: &'a mut [u8],
        buf2: &'a mut [u8],
        events: &Events,
    ) -> Device<'a, MockHardware> {
        let mut dev = Device::new(MockHardware::default(), true);
        dev.init(&DeviceInfo {
            bcd_usb: DeviceDescriptor::USB_2_0,
            device_class: 0,
            device_subclass: 0,
            device_protocol: 0,
            vendor_id: 0x1209,
            product_id: 0x0001,
            bcd_device: 0x0100,
            manufacturer: "Acme",
            product: "Widget",
            serial_number: None,
            num_configurations: 2,
        })
        .unwrap();
        dev.add_config(config(buf1, 1, events));
        dev.add_config(config(buf2, 2, events));
        dev.on_reset();
        dev
    }

    /// Runs an IN control transfer to completion. `None` if EP0 stalled.
    fn get(dev: &mut Device<'_, MockHardware>, setup: SetupPacket) -> Option<Vec<u8>> {
        dev.hw_mut().calls.clear();
        dev.on_setup_stage(setup.as_bytes());
        if dev.ep0_state() == Ep0State::Stall {
            return None;
        }
        while dev.ep0_state() == Ep0State::DataIn {
            dev.on_data_in_stage(0);
        }
        assert_eq!(dev.ep0_state(), Ep0State::StatusOut);
        let data = dev
            .hw()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Transmit(0x80, d) => Some(d.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        dev.on_data_out_stage(0, &[]);
        assert_eq!(dev.ep0_state(), Ep0State::Idle);
        Some(data)
    }

    /// Runs a control transfer without data stage. `false` if EP0 stalled.
    fn set(dev: &mut Device<'_, MockHardware>, setup: SetupPacket) -> bool {
        dev.hw_mut().calls.clear();
        dev.on_setup_stage(setup.as_bytes());
        if dev.ep0_state() == Ep0State::Stall {
            return false;
        }
        assert_eq!(dev.ep0_state(), Ep0State::StatusIn);
        dev.on_data_in_stage(0);
        assert_eq!(dev.ep0_state(), Ep0State::Idle);
        true
    }

    fn set_address(value: u16) -> SetupPacket {
        SetupPacket::new(0x00, Request::SetAddress as u8, value, 0, 0)
    }

    fn set_configuration(value: u16) -> SetupPacket {
        SetupPacket::new(0x00, Request::SetConfiguration as u8, value, 0, 0)
    }

    fn get_descriptor(kind: DescriptorType, index: u8, length: u16) -> SetupPacket {
        let value = (kind as u16) << 8 | u16::from(index);
        SetupPacket::new(0x80, Request::GetDescriptor as u8, value, 0, length)
    }

    fn get_configuration(length: u16) -> SetupPacket {
        SetupPacket::new(0x80, Request::GetConfiguration as u8, 0, 0, length)
    }

    #[test]
    fn reset_opens_ep0() {
        let events = Events::default();
        let (mut b1, mut b2) = ([0u8; 64], [0u8; 64]);
        let mut dev = device(&mut b1, &mut b2, &events);
        assert_eq!(dev.state(), DeviceState::Default);
        assert_eq!(
            dev.hw().calls,
            vec![
                Call::Open(0x80, 64, EndpointType::Control),
                Call::Open(0x00, 64, EndpointType::Control),
            ]
        );

        // A second reset reopens EP0 in the controller.
        dev.hw_mut().calls.clear();
        dev.on_reset();
        assert_eq!(dev.hw().calls.len(), 2);
    }

    #[test]
    fn set_address_programs_hardware_once() {
        let events = Events::default();
        let (mut b1, mut b2) = ([0u8; 64], [0u8; 64]);
        let mut dev = device(&mut b1, &mut b2, &events);

        assert!(set(&mut dev, set_address(5)));
        assert_eq!(dev.state(), DeviceState::Addressed);
        assert_eq!(dev.address(), 5);
        let programmed: Vec<_> =
            dev.hw().calls.iter().filter(|c| matches!(c, Call::SetAddress(_))).collect();
        assert_eq!(programmed, vec![&Call::SetAddress(5)]);

        assert!(set(&mut dev, set_address(0)));
        assert_eq!(dev.state(), DeviceState::Default);
    }

    #[test]
    fn set_address_validates_request() {
        let events = Events::default();
        let (mut b1, mut b2) = ([0u8; 64], [0u8; 64]);
        let mut dev = device(&mut b1, &mut b2, &events);

        assert!(!set(&mut dev, SetupPacket::new(0x00, Request::SetAddress as u8, 5, 1, 0)));
        assert_eq!(dev.state(), DeviceState::Default);

        assert!(set(&mut dev, set_address(5)));
        assert!(set(&mut dev, set_configuration(1)));
        assert!(!set(&mut dev, set_address(6)));
        assert_eq!(dev.address(), 5);
    }

    #[test]
    fn device_descriptor_is_clamped() {
        let events = Events::default();
        let (mut b1, mut b2) = ([0u8; 64], [0u8; 64]);
        let mut dev = device(&mut b1, &mut b2, &events);

        let full = get(&mut dev, get_descriptor(DescriptorType::Device, 0, 64)).unwrap();
        assert_eq!(full.len(), 18);
        assert_eq!(&full[..8], &[18, 1, 0x00, 0x02, 0, 0, 0, 64]);
        assert_eq!(&full[14..], &[1, 2, 0, 2]);

        let short = get(&mut dev, get_descriptor(DescriptorType::Device, 0, 8)).unwrap();
        assert_eq!(short, &full[..8]);
    }

    #[test]
    fn string_descriptors() {
        let events = Events::default();
        let (mut b1, mut b2) = ([0u8; 64], [0u8; 64]);
        let mut dev = device(&mut b1, &mut b2, &events);

        assert_eq!(
            get(&mut dev, get_descriptor(DescriptorType::String, 0, 255)).unwrap(),
            vec![4, 3, 0x09, 0x04]
        );
        assert_eq!(
            get(&mut dev, get_descriptor(DescriptorType::String, 1, 255)).unwrap(),
            vec![10, 3, b'A', 0, b'c', 0, b'm', 0, b'e', 0]
        );
        assert_eq!(get(&mut dev, get_descriptor(DescriptorType::String, 7, 255)), None);
        assert_eq!(get(&mut dev, get_descriptor(DescriptorType::String, 200, 255)), None);
    }

    #[test]
    fn unsupported_descriptors_stall() {
        let events = Events::default();
        let (mut b1, mut b2) = ([0u8; 64], [0u8; 64]);
        let mut dev = device(&mut b1, &mut b2, &events);

        assert_eq!(get(&mut dev, get_descriptor(DescriptorType::DeviceQualifier, 0, 10)), None);
        let other_speed = get_descriptor(DescriptorType::OtherSpeedConfiguration, 0, 9);
        assert_eq!(get(&mut dev, other_speed), None);
        assert_eq!(get(&mut dev, SetupPacket::new(0x80, 0x06, 0x4200, 0, 9)), None);
        assert_eq!(dev.hw().calls, vec![Call::Stall(0x80), Call::Stall(0x00)]);
    }

    #[test]
    fn configuration_descriptor_by_index() {
        let events = Events::default();
        let (mut b1, mut b2) = ([0u8; 64], [0u8; 64]);
        let mut dev = device(&mut b1, &mut b2, &events);

        let first = get(&mut dev, get_descriptor(DescriptorType::Configuration, 0, 255)).unwrap();
        assert_eq!(first.len(), 9 + 9 + 7 + 7);
        assert_eq!(&first[..6], &[9, 2, 32, 0, 1, 1]);

        let second = get(&mut dev, get_descriptor(DescriptorType::Configuration, 1, 9)).unwrap();
        assert_eq!(&second[..6], &[9, 2, 32, 0, 1, 2]);

        assert_eq!(get(&mut dev, get_descriptor(DescriptorType::Configuration, 2, 9)), None);
    }

    #[test]
    fn configuration_lifecycle() {
        let events = Events::default();
        let (mut b1, mut b2) = ([0u8; 64], [0u8; 64]);
        let mut dev = device(&mut b1, &mut b2, &events);

        // Not before an address is assigned.
        assert!(!set(&mut dev, set_configuration(1)));
        assert!(set(&mut dev, set_address(3)));

        assert!(set(&mut dev, set_configuration(0)));
        assert_eq!(dev.state(), DeviceState::Addressed);
        assert!(!set(&mut dev, set_configuration(3)));

        assert!(set(&mut dev, set_configuration(1)));
        assert_eq!(dev.state(), DeviceState::Configured);
        assert_eq!(dev.configuration(), 1);
        assert!(dev.hw().calls.contains(&Call::Open(0x81, 64, EndpointType::Bulk)));

        // Same value: acknowledged, nothing reactivated.
        assert!(set(&mut dev, set_configuration(1)));
        assert!(!dev.hw().calls.iter().any(|c| matches!(c, Call::Open(..) | Call::Close(_))));
        assert_eq!(*events.borrow(), vec!["activate"]);

        assert_eq!(get(&mut dev, get_configuration(1)), Some(vec![1]));

        // Switch: old torn down, new brought up.
        assert!(set(&mut dev, set_configuration(2)));
        assert_eq!(dev.configuration(), 2);
        assert_eq!(*events.borrow(), vec!["activate", "deactivate", "activate"]);

        assert!(set(&mut dev, set_configuration(0)));
        assert_eq!(dev.state(), DeviceState::Addressed);
        assert!(dev.hw().calls.contains(&Call::Close(0x81)));
        assert_eq!(get(&mut dev, get_configuration(1)), Some(vec![0]));
        assert_eq!(get(&mut dev, get_configuration(2)), None);
    }

    #[test]
    fn device_status_and_remote_wakeup() {
        let events = Events::default();
        let (mut b1, mut b2) = ([0u8; 64], [0u8; 64]);
        let mut dev = device(&mut b1, &mut b2, &events);
        let get_status = SetupPacket::new(0x80, Request::GetStatus as u8, 0, 0, 2);
        let wakeup = Feature::RemoteWakeup as u16;

        assert_eq!(get(&mut dev, get_status), None);
        assert!(set(&mut dev, set_address(3)));
        assert_eq!(get(&mut dev, get_status), Some(vec![0x01, 0x00]));

        assert!(set(&mut dev, set_configuration(1)));
        assert!(set(&mut dev, SetupPacket::new(0x00, Request::SetFeature as u8, wakeup, 0, 0)));
        assert!(dev.remote_wakeup_enabled());
        assert_eq!(get(&mut dev, get_status), Some(vec![0x03, 0x00]));

        assert!(set(&mut dev, SetupPacket::new(0x00, Request::ClearFeature as u8, wakeup, 0, 0)));
        assert_eq!(get(&mut dev, get_status), Some(vec![0x01, 0x00]));
        assert_eq!(*events.borrow(), vec!["activate", "RemoteWakeup true", "RemoteWakeup false"]);

        // Test mode is not supported.
        assert!(!set(&mut dev, SetupPacket::new(0x00, Request::SetFeature as u8, 2, 0, 0)));
    }

    #[test]
    fn endpoint_halt_gating() {
        let events = Events::default();
        let (mut b1, mut b2) = ([0u8; 64], [0u8; 64]);
        let mut dev = device(&mut b1, &mut b2, &events);
        let halt = |request: Request, ep: u16| SetupPacket::new(0x02, request as u8, 0, ep, 0);
        let status = |ep: u16| SetupPacket::new(0x82, Request::GetStatus as u8, 0, ep, 2);

        assert!(set(&mut dev, set_address(3)));
        // No class endpoints before configuration.
        assert!(!set(&mut dev, halt(Request::SetFeature, 0x81)));
        assert_eq!(get(&mut dev, status(0x80)), Some(vec![0, 0]));

        assert!(set(&mut dev, set_configuration(1)));
        assert!(!set(&mut dev, halt(Request::SetFeature, 0x00)));
        assert!(!set(&mut dev, halt(Request::SetFeature, 0x80)));

        assert!(set(&mut dev, halt(Request::SetFeature, 0x81)));
        assert_eq!(dev.hw().calls[0], Call::Stall(0x81));
        assert_eq!(get(&mut dev, status(0x81)), Some(vec![1, 0]));
        assert_eq!(get(&mut dev, status(0x01)), Some(vec![0, 0]));

        assert!(set(&mut dev, halt(Request::ClearFeature, 0x81)));
        assert_eq!(dev.hw().calls[0], Call::ClearStall(0x81));
        assert_eq!(get(&mut dev, status(0x81)), Some(vec![0, 0]));

        assert!(!set(&mut dev, halt(Request::SetFeature, 0x85)));
    }

    #[test]
    fn vendor_requests_reach_the_interface() {
        let events = Events::default();
        let (mut b1, mut b2) = ([0u8; 64], [0u8; 64]);
        let mut dev = device(&mut b1, &mut b2, &events);

        // Stalled until configured.
        assert_eq!(get(&mut dev, SetupPacket::new(0xC1, 0x01, 0, 0, 16)), None);

        assert!(set(&mut dev, set_address(3)));
        assert!(set(&mut dev, set_configuration(1)));

        dev.hw_mut().calls.clear();
        dev.on_setup_stage(SetupPacket::new(0x41, 0x02, 0, 0, 3).as_bytes());
        assert_eq!(dev.ep0_state(), Ep0State::DataOut);
        dev.on_data_out_stage(0, &[7, 8, 9]);
        assert_eq!(dev.ep0_state(), Ep0State::StatusIn);
        dev.on_data_in_stage(0);

        assert_eq!(get(&mut dev, SetupPacket::new(0xC1, 0x01, 0, 0, 16)), Some(vec![7, 8, 9]));
        // Device recipient goes to the current interface.
        assert_eq!(get(&mut dev, SetupPacket::new(0xC0, 0x01, 0, 0, 16)), Some(vec![7, 8, 9]));
        // Unknown request, unknown interface.
        assert_eq!(get(&mut dev, SetupPacket::new(0xC1, 0x09, 0, 0, 16)), None);
        assert_eq!(get(&mut dev, SetupPacket::new(0xC1, 0x01, 0, 3, 16)), None);

        let get_interface = SetupPacket::new(0x81, Request::GetInterface as u8, 0, 0, 1);
        assert_eq!(get(&mut dev, get_interface), Some(vec![0]));
        assert!(set(&mut dev, SetupPacket::new(0x01, Request::SetInterface as u8, 0, 0, 0)));
    }

    #[test]
    fn class_endpoint_data_is_routed() {
        let events = Events::default();
        let (mut b1, mut b2) = ([0u8; 64], [0u8; 64]);
        let mut dev = device(&mut b1, &mut b2, &events);

        assert!(!dev.on_data_out_stage(1, b"early"));

        assert!(set(&mut dev, set_address(3)));
        assert!(set(&mut dev, set_configuration(1)));
        dev.hw_mut().calls.clear();
        assert!(dev.on_data_out_stage(1, b"echo"));
        assert_eq!(dev.hw().calls, vec![Call::Transmit(0x81, b"echo".to_vec())]);
        assert!(dev.on_data_in_stage(1));
        assert!(!dev.on_data_in_stage(2));

        dev.hw_mut().calls.clear();
        dev.endpoints().transmit(0x81, b"app").unwrap();
        assert_eq!(dev.hw().calls, vec![Call::Transmit(0x81, b"app".to_vec())]);
    }

    #[test]
    fn suspend_and_resume_restore_state() {
        let events = Events::default();
        let (mut b1, mut b2) = ([0u8; 64], [0u8; 64]);
        let mut dev = device(&mut b1, &mut b2, &events);
        assert!(set(&mut dev, set_address(3)));

        dev.hw_mut().calls.clear();
        dev.on_suspend();
        dev.on_suspend();
        assert_eq!(dev.state(), DeviceState::Suspended);
        dev.on_resume();
        assert_eq!(dev.state(), DeviceState::Addressed);
        assert!(dev.hw().calls.is_empty());
    }

    #[test]
    fn reset_deactivates_configuration() {
        let events = Events::default();
        let (mut b1, mut b2) = ([0u8; 64], [0u8; 64]);
        let mut dev = device(&mut b1, &mut b2, &events);
        assert!(set(&mut dev, set_address(3)));
        assert!(set(&mut dev, set_configuration(1)));

        dev.on_reset();
        assert_eq!(dev.state(), DeviceState::Default);
        assert_eq!(dev.configuration(), 0);
        assert_eq!(dev.address(), 0);
        assert!(dev.hw().calls.contains(&Call::Close(0x01)));
        assert_eq!(*events.borrow(), vec!["activate", "deactivate"]);
    }

    #[test]
    fn endpoint_class_requests_reach_the_owner() {
        let events = Events::default();
        let (mut b1, mut b2) = ([0u8; 64], [0u8; 64]);
        let mut dev = device(&mut b1, &mut b2, &events);
        let vendor = |request: u8, ep: u16| SetupPacket::new(0x42, request, 0, ep, 0);

        assert!(set(&mut dev, set_address(3)));
        // Endpoints are not published before configuration.
        assert!(!set(&mut dev, vendor(0x03, 0x81)));

        assert!(set(&mut dev, set_configuration(1)));
        assert!(set(&mut dev, vendor(0x03, 0x81)));
        assert!(set(&mut dev, vendor(0x03, 0x01)));
        assert!(!set(&mut dev, vendor(0x04, 0x81)));

        // EP0 belongs to no interface; unknown endpoints to nobody.
        assert!(!set(&mut dev, vendor(0x03, 0x00)));
        assert!(!set(&mut dev, vendor(0x03, 0x85)));
        assert_eq!(dev.hw().calls, vec![Call::Stall(0x80), Call::Stall(0x00)]);

        assert_eq!(
            *events.borrow(),
            vec!["activate", "ep request 0x81 0x03", "ep request 0x01 0x03", "ep request 0x81 0x04"]
        );
    }

    #[test]
    fn frame_and_iso_events_reach_the_interface() {
        let events = Events::default();
        let (mut b1, mut b2) = ([0u8; 64], [0u8; 64]);
        let mut dev = device(&mut b1, &mut b2, &events);

        dev.on_start_of_frame();
        dev.on_iso_in_incomplete(1);
        assert!(events.borrow().is_empty());

        assert!(set(&mut dev, set_address(3)));
        assert!(set(&mut dev, set_configuration(1)));
        dev.on_start_of_frame();
        dev.on_iso_in_incomplete(1);
        dev.on_iso_out_incomplete(1);
        dev.on_iso_in_incomplete(5);
        assert_eq!(*events.borrow(), vec!["activate", "sof", "iso in 0x81", "iso out 0x01"]);
    }

    #[test]
    fn zero_length_descriptor_read_is_acknowledged() {
        let events = Events::default();
        let (mut b1, mut b2) = ([0u8; 64], [0u8; 64]);
        let mut dev = device(&mut b1, &mut b2, &events);

        assert!(set(&mut dev, get_descriptor(DescriptorType::Device, 0, 0)));
        assert_eq!(dev.hw().calls, vec![Call::Transmit(0x80, vec![])]);
        assert!(set(&mut dev, get_descriptor(DescriptorType::Configuration, 1, 0)));
        assert!(!set(&mut dev, get_descriptor(DescriptorType::String, 9, 0)));
    }

    #[test]
    fn resume_restores_configured_state() {
        let events = Events::default();
        let (mut b1, mut b2) = ([0u8; 64], [0u8; 64]);
        let mut dev = device(&mut b1, &mut b2, &events);
        assert!(set(&mut dev, set_address(3)));
        assert!(set(&mut dev, set_configuration(1)));

        dev.hw_mut().calls.clear();
        dev.on_suspend();
        assert_eq!(dev.state(), DeviceState::Suspended);
        // No class traffic while suspended.
        assert!(!dev.on_data_out_stage(1, b"zz"));

        dev.on_resume();
        assert_eq!(dev.state(), DeviceState::Configured);
        assert_eq!(dev.configuration(), 1);
        assert!(dev.hw().calls.is_empty());
        assert!(dev.on_data_out_stage(1, b"up"));
        assert_eq!(dev.hw().calls, vec![Call::Transmit(0x81, b"up".to_vec())]);
        assert_eq!(*events.borrow(), vec!["activate"]);
    }

    #[test]
    fn string_table_limits() {
        let mut dev = Device::new(MockHardware::default(), false);
        assert_eq!(dev.create_str("caf\u{e9}"), Err(Error::NonAscii));
        assert_eq!(dev.create_str(&"x".repeat(127)), Err(Error::StringTooLong(127)));
        for i in 1..MAX_STRINGS {
            assert_eq!(dev.create_str("s"), Ok(i as u8));
        }
        assert_eq!(dev.create_str("s"), Err(Error::StringTableFull));
        assert_eq!(dev.string(1), Some(&[4, 3, b's', 0][..]));
    }

    #[test]
    #[should_panic]
    fn duplicate_configuration_panics() {
        let events = Events::default();
        let (mut b1, mut b2) = ([0u8; 64], [0u8; 64]);
        let mut dev = Device::new(MockHardware::default(), false);
        dev.add_config(config(&mut b1, 1, &events));
        dev.add_config(config(&mut b2, 1, &events));
    }
}
