// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory fakes of every trait in this crate, for driving
//! `scope-sampler` from host-side tests. Never compiled into firmware.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::vec::Vec;

use crate::dma::{Dma, DmaChannelId, DmaClient};
use crate::fatal::{FatalCode, FatalHandler};
use crate::fifo::{CoreFifo, CoreFifoError, CoreMessage};
use crate::gpio::VoltageRangeSource;
use crate::led::Led;
use crate::pio::{PioTrigger, PioTriggerClient, TriggerEdge, TriggerSnapshot};
use crate::pwm::SignalGenerator;
use crate::transport::SerialTransport;
use crate::BoardIdentity;

/// A round-robin ADC fake that replays a fixed sequence of raw samples.
pub struct MockAdc {
    script: RefCell<VecDeque<u16>>,
    selected_channel: Cell<u8>,
    running: Cell<bool>,
    reinit_count: Cell<u32>,
}

impl MockAdc {
    pub fn new(script: impl IntoIterator<Item = u16>) -> Self {
        MockAdc {
            script: RefCell::new(script.into_iter().collect()),
            selected_channel: Cell::new(0),
            running: Cell::new(false),
            reinit_count: Cell::new(0),
        }
    }

    pub fn reinit_count(&self) -> u32 {
        self.reinit_count.get()
    }
}

impl crate::adc::Adc for MockAdc {
    fn select_channel(&mut self, channel: u8) {
        self.selected_channel.set(channel);
    }

    fn read_sample(&mut self) -> u16 {
        self.script.borrow_mut().pop_front().unwrap_or(0)
    }

    fn configure_round_robin(&mut self, _channel_mask: u8) {}

    fn set_clkdiv(&mut self, _clkdiv_int: u32) {}

    fn start_free_running(&mut self) {
        self.running.set(true);
    }

    fn stop(&mut self) {
        self.running.set(false);
    }

    fn drain_fifo(&mut self) {
        self.script.borrow_mut().clear();
    }

    fn reinit(&mut self) {
        self.reinit_count.set(self.reinit_count.get() + 1);
    }
}

/// A DMA channel fake that records every write address it was pointed at
/// and lets the test drive completion callbacks explicitly.
pub struct MockDma {
    pub id: DmaChannelId,
    write_addrs: RefCell<Vec<u32>>,
    chained_to_self: Cell<bool>,
    running: Cell<bool>,
    client: Cell<Option<&'static dyn DmaClient>>,
}

impl MockDma {
    pub fn new(id: DmaChannelId) -> Self {
        MockDma {
            id,
            write_addrs: RefCell::new(Vec::new()),
            chained_to_self: Cell::new(false),
            running: Cell::new(false),
            client: Cell::new(None),
        }
    }

    pub fn write_addrs(&self) -> Vec<u32> {
        self.write_addrs.borrow().clone()
    }

    pub fn is_chained_to_self(&self) -> bool {
        self.chained_to_self.get()
    }

    /// Test hook: simulates the hardware finishing a transfer.
    pub fn fire_complete(&self) {
        if let Some(client) = self.client.get() {
            client.transfer_complete(self.id);
        }
    }
}

impl Dma for MockDma {
    fn configure(&mut self, _source_addr: u32, _chain_to: DmaChannelId) {
        self.chained_to_self.set(false);
    }

    fn set_write_address(&mut self, addr: u32, _len: u32) {
        self.write_addrs.borrow_mut().push(addr);
    }

    fn start(&mut self) {
        self.running.set(true);
    }

    fn stop(&mut self) {
        self.running.set(false);
    }

    fn chain_to_self(&mut self) {
        self.chained_to_self.set(true);
    }

    fn set_client(&mut self, client: &'static dyn DmaClient) {
        self.client.set(Some(client));
    }
}

#[derive(Default)]
pub struct MockPioTrigger {
    edge: Cell<Option<TriggerEdge>>,
    enabled: Cell<bool>,
    client: Cell<Option<&'static dyn PioTriggerClient>>,
}

impl MockPioTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self, snapshot: TriggerSnapshot) {
        if let Some(client) = self.client.get() {
            client.triggered(snapshot);
        }
    }
}

impl PioTrigger for MockPioTrigger {
    fn load_program(&mut self, edge: TriggerEdge, _gpio: u8) {
        self.edge.set(Some(edge));
    }

    fn set_clkdiv(&mut self, _clkdiv_int: u32) {}

    fn set_client(&mut self, client: &'static dyn PioTriggerClient) {
        self.client.set(Some(client));
    }

    fn enable(&mut self) {
        self.enabled.set(true);
    }

    fn disable(&mut self) {
        self.enabled.set(false);
    }
}

/// A fixed voltage range per channel, as if read once from GPIO.
pub struct MockVoltageRangeSource {
    ranges: [u8; 8],
}

impl MockVoltageRangeSource {
    pub fn new(ranges: [u8; 8]) -> Self {
        MockVoltageRangeSource { ranges }
    }
}

impl VoltageRangeSource for MockVoltageRangeSource {
    fn read_range(&self, channel: u8) -> u8 {
        self.ranges[channel as usize & 0x07]
    }
}

#[derive(Default)]
pub struct MockSignalGenerator {
    pub last_config: Cell<Option<(u8, u8, u32, u16)>>,
}

impl SignalGenerator for MockSignalGenerator {
    fn configure(&mut self, func: u8, gpio: u8, freq_hz: u32, duty_permille: u16) {
        self.last_config.set(Some((func, gpio, freq_hz, duty_permille)));
    }

    fn stop(&mut self, _gpio: u8) {
        self.last_config.set(None);
    }
}

#[derive(Default)]
pub struct MockLed {
    pub on: Cell<bool>,
}

impl Led for MockLed {
    fn set(&mut self, on: bool) {
        self.on.set(on);
    }
}

/// Records the last fatal code instead of actually halting, so assertions
/// can inspect it.
#[derive(Default)]
pub struct MockFatalHandler {
    pub last: RefCell<Option<FatalCode>>,
}

impl FatalHandler for MockFatalHandler {
    fn fatal(&self, code: FatalCode) -> ! {
        *self.last.borrow_mut() = Some(code);
        panic!("fatal: {code:?}");
    }
}

/// A mock of one core's view of the SIO mailbox: a single-slot outbound
/// queue (what this side has sent to its peer) and a single-slot inbound
/// queue (what the test, standing in for the peer, has injected).
#[derive(Default)]
pub struct MockCoreFifo {
    outbound: RefCell<VecDeque<CoreMessage>>,
    inbound: RefCell<VecDeque<CoreMessage>>,
}

impl MockCoreFifo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: injects a message as if sent by the peer core.
    pub fn inject(&self, msg: CoreMessage) {
        self.inbound.borrow_mut().push_back(msg);
    }

    /// Test hook: pops the oldest message this side has sent, if any.
    pub fn take_sent(&self) -> Option<CoreMessage> {
        self.outbound.borrow_mut().pop_front()
    }
}

impl CoreFifo for MockCoreFifo {
    fn send(&self, msg: CoreMessage) -> Result<(), CoreFifoError> {
        let mut outbound = self.outbound.borrow_mut();
        if outbound.len() >= 1 {
            return Err(CoreFifoError::WouldBlock);
        }
        outbound.push_back(msg);
        Ok(())
    }

    fn try_receive(&self) -> Option<CoreMessage> {
        self.inbound.borrow_mut().pop_front()
    }
}

/// A byte transport backed by two in-memory queues.
#[derive(Default)]
pub struct MockSerialTransport {
    pub inbound: RefCell<VecDeque<u8>>,
    pub outbound: RefCell<Vec<u8>>,
}

impl MockSerialTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_inbound(&self, bytes: &[u8]) {
        self.inbound.borrow_mut().extend(bytes.iter().copied());
    }
}

impl SerialTransport for MockSerialTransport {
    fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        let mut inbound = self.inbound.borrow_mut();
        let n = buf.len().min(inbound.len());
        for slot in buf.iter_mut().take(n) {
            *slot = inbound.pop_front().unwrap();
        }
        n
    }

    fn write_bytes(&mut self, buf: &[u8]) -> usize {
        self.outbound.borrow_mut().extend_from_slice(buf);
        buf.len()
    }
}

pub struct MockBoardIdentity {
    pub chip_id: u32,
    pub unique_id: [u8; 8],
    pub fw_type: u8,
    pub fw_version: u8,
    pub build_number: i32,
}

impl Default for MockBoardIdentity {
    fn default() -> Self {
        MockBoardIdentity {
            chip_id: 0xAA55_0001,
            unique_id: [1, 2, 3, 4, 5, 6, 7, 8],
            fw_type: 1,
            fw_version: 1,
            build_number: 1,
        }
    }
}

impl BoardIdentity for MockBoardIdentity {
    fn chip_id(&self) -> u32 {
        self.chip_id
    }

    fn unique_id(&self) -> [u8; 8] {
        self.unique_id
    }

    fn fw_type(&self) -> u8 {
        self.fw_type
    }

    fn fw_version(&self) -> u8 {
        self.fw_version
    }

    fn build_number(&self) -> i32 {
        self.build_number
    }
}
